//! HTTP download of deal payloads

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use sim_sp_core::{SimSpError, SimSpResult};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::types::HttpTransferParams;

/// Streams transfer sources to local files
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    download_timeout: Duration,
}

impl HttpFetcher {
    /// `download_timeout` bounds a whole download: request, headers and body
    pub fn new(connect_timeout: Duration, download_timeout: Duration) -> SimSpResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| SimSpError::config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            download_timeout,
        })
    }

    /// Download `params.url` into `dest`, returning the byte count
    ///
    /// Only status 200 is accepted. On any failure `dest` is removed, so a
    /// partial download never survives.
    pub async fn fetch_to_file(&self, params: &HttpTransferParams, dest: &Path) -> SimSpResult<u64> {
        let result = tokio::time::timeout(self.download_timeout, self.download(params, dest))
            .await
            .unwrap_or_else(|_| {
                Err(SimSpError::transport(format!(
                    "download of {} timed out after {:?}",
                    params.url, self.download_timeout
                )))
            });

        if result.is_err() {
            match tokio::fs::remove_file(dest).await {
                Ok(()) => debug!(path = %dest.display(), "Removed partial download"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(SimSpError::storage(dest, e)),
            }
        }
        result
    }

    async fn download(&self, params: &HttpTransferParams, dest: &Path) -> SimSpResult<u64> {
        let mut response = self
            .client
            .get(&params.url)
            .headers(header_map(params)?)
            .send()
            .await
            .map_err(|e| SimSpError::transport(format!("http request failed: {e}")))?;

        if response.status() != StatusCode::OK {
            return Err(SimSpError::transport(format!(
                "http request failed with status {}",
                response.status().as_u16()
            )));
        }

        let mut file = File::create(dest)
            .await
            .map_err(|e| SimSpError::storage(dest, e))?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SimSpError::transport(format!("download interrupted: {e}")))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| SimSpError::storage(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| SimSpError::storage(dest, e))?;
        file.sync_all().await.map_err(|e| SimSpError::storage(dest, e))?;

        debug!(url = %params.url, bytes = written, "Download complete");
        Ok(written)
    }
}

fn header_map(params: &HttpTransferParams) -> SimSpResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &params.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| SimSpError::decode(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| SimSpError::decode(format!("invalid header value for '{name}': {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}
