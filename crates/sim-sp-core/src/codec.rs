//! DAG-CBOR wire codec and stream framing
//!
//! Every message on a protocol stream is one length-delimited frame
//! (4-byte big-endian length) holding a DAG-CBOR body. Streams opened over the
//! node's stream transport start with a single header frame naming the
//! protocol; it is read without buffering past its end so the remaining bytes
//! can be handed to the protocol handler untouched.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::{SimSpError, SimSpResult};

/// Largest accepted message frame
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Largest accepted protocol identifier
pub const MAX_PROTOCOL_ID_LEN: usize = 256;

/// A stream wrapped in the message framing
pub type MessageStream<S> = Framed<S, LengthDelimitedCodec>;

/// Serialize any serde-compatible value to DAG-CBOR bytes
pub fn to_vec<T: Serialize>(value: &T) -> SimSpResult<Vec<u8>> {
    serde_ipld_dagcbor::to_vec(value)
        .map_err(|e| SimSpError::decode(format!("Failed to serialize to DAG-CBOR: {e}")))
}

/// Deserialize DAG-CBOR bytes
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> SimSpResult<T> {
    serde_ipld_dagcbor::from_slice(bytes).map_err(|e| SimSpError::decode(e.to_string()))
}

/// Wrap `stream` in the message framing
pub fn framed<S>(stream: S) -> MessageStream<S>
where
    S: AsyncRead + AsyncWrite,
{
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec();
    Framed::new(stream, codec)
}

/// Read the next message; `Ok(None)` when the peer closed the stream cleanly
pub async fn read_message<T, S>(stream: &mut MessageStream<S>) -> SimSpResult<Option<T>>
where
    T: DeserializeOwned,
    S: AsyncRead + AsyncWrite + Unpin,
{
    match stream.next().await {
        None => Ok(None),
        Some(Ok(frame)) => from_slice(&frame).map(Some),
        Some(Err(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
            Err(SimSpError::decode(format!("invalid frame: {e}")))
        }
        Some(Err(e)) => Err(SimSpError::transport(format!("stream read failed: {e}"))),
    }
}

/// Encode and send one message
pub async fn write_message<T, S>(stream: &mut MessageStream<S>, message: &T) -> SimSpResult<()>
where
    T: Serialize,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let body = to_vec(message)?;
    stream
        .send(Bytes::from(body))
        .await
        .map_err(|e| SimSpError::transport(format!("stream write failed: {e}")))
}

/// Flush and close the write half of a framed stream
pub async fn close<S>(stream: &mut MessageStream<S>) -> SimSpResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    SinkExt::<Bytes>::close(stream)
        .await
        .map_err(|e| SimSpError::transport(format!("stream close failed: {e}")))
}

/// Write the protocol header frame that opens an outbound stream
pub async fn write_protocol_header<S>(stream: &mut S, protocol: &str) -> SimSpResult<()>
where
    S: AsyncWrite + Unpin,
{
    if protocol.is_empty() || protocol.len() > MAX_PROTOCOL_ID_LEN {
        return Err(SimSpError::decode(format!(
            "protocol id length {} out of range",
            protocol.len()
        )));
    }
    let len = u32::try_from(protocol.len())
        .map_err(|_| SimSpError::decode("protocol id too long"))?;
    stream
        .write_u32(len)
        .await
        .map_err(|e| SimSpError::transport(format!("cannot write protocol header: {e}")))?;
    stream
        .write_all(protocol.as_bytes())
        .await
        .map_err(|e| SimSpError::transport(format!("cannot write protocol header: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| SimSpError::transport(format!("cannot write protocol header: {e}")))
}

/// Read the protocol header frame of an inbound stream
pub async fn read_protocol_header<S>(stream: &mut S) -> SimSpResult<String>
where
    S: AsyncRead + Unpin,
{
    let len = stream
        .read_u32()
        .await
        .map_err(|e| SimSpError::transport(format!("cannot read protocol header: {e}")))?
        as usize;
    if len == 0 || len > MAX_PROTOCOL_ID_LEN {
        return Err(SimSpError::decode(format!(
            "protocol id length {len} out of range"
        )));
    }
    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| SimSpError::transport(format!("cannot read protocol header: {e}")))?;
    String::from_utf8(buf).map_err(|e| SimSpError::decode(format!("protocol id is not UTF-8: {e}")))
}
