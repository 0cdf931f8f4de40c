//! TCP stream transport
//!
//! Each TCP connection carries one stream. The dialer writes a protocol header
//! naming the protocol; the listener reads it and hands the rest of the
//! connection to the [`StreamRouter`] as a framed stream. A connection that
//! sends no header within the header timeout is dropped.

use multiaddr::{Multiaddr, Protocol};
use sim_sp_core::codec::{self, MessageStream};
use sim_sp_core::{ShutdownSignal, SimSpError, SimSpResult};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::router::{ByteStream, StreamRouter};

/// How long an accepted connection may take to name its protocol
pub const PROTOCOL_HEADER_TIMEOUT: Duration = Duration::from_secs(10);

/// Convert `/ip4|ip6/<addr>/tcp/<port>` to a socket address
pub fn multiaddr_to_socket_addr(addr: &Multiaddr) -> SimSpResult<SocketAddr> {
    let mut parts = addr.iter();
    let ip: IpAddr = match parts.next() {
        Some(Protocol::Ip4(ip)) => ip.into(),
        Some(Protocol::Ip6(ip)) => ip.into(),
        _ => {
            return Err(SimSpError::config(format!(
                "listen address {addr} must start with /ip4 or /ip6"
            )))
        }
    };
    let port = match parts.next() {
        Some(Protocol::Tcp(port)) => port,
        _ => {
            return Err(SimSpError::config(format!(
                "listen address {addr} must continue with /tcp/<port>"
            )))
        }
    };
    if parts.next().is_some() {
        return Err(SimSpError::config(format!(
            "listen address {addr} has unsupported trailing components"
        )));
    }
    Ok(SocketAddr::new(ip, port))
}

/// Convert a socket address to `/ip4|ip6/<addr>/tcp/<port>`
pub fn socket_addr_to_multiaddr(addr: SocketAddr) -> Multiaddr {
    let ip = match addr.ip() {
        IpAddr::V4(v4) => Protocol::Ip4(v4),
        IpAddr::V6(v6) => Protocol::Ip6(v6),
    };
    Multiaddr::empty().with(ip).with(Protocol::Tcp(addr.port()))
}

/// Bound listeners, not yet accepting
pub struct TcpStreamTransport {
    listeners: Vec<TcpListener>,
    listen_addrs: Vec<Multiaddr>,
    header_timeout: Duration,
}

impl TcpStreamTransport {
    /// Bind every address; any failure is fatal
    pub async fn bind(addrs: &[Multiaddr]) -> SimSpResult<Self> {
        if addrs.is_empty() {
            return Err(SimSpError::config("no listen addresses configured"));
        }
        let mut listeners = Vec::with_capacity(addrs.len());
        let mut listen_addrs = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let socket_addr = multiaddr_to_socket_addr(addr)?;
            let listener = TcpListener::bind(socket_addr)
                .await
                .map_err(|e| SimSpError::config(format!("cannot listen on {addr}: {e}")))?;
            let bound = listener
                .local_addr()
                .map_err(|e| SimSpError::transport(format!("cannot read listen address: {e}")))?;
            listen_addrs.push(socket_addr_to_multiaddr(bound));
            listeners.push(listener);
        }
        Ok(Self {
            listeners,
            listen_addrs,
            header_timeout: PROTOCOL_HEADER_TIMEOUT,
        })
    }

    pub fn with_header_timeout(mut self, timeout: Duration) -> Self {
        self.header_timeout = timeout;
        self
    }

    /// Actually bound addresses (port 0 resolved)
    pub fn listen_addrs(&self) -> &[Multiaddr] {
        &self.listen_addrs
    }

    /// Accept connections until `shutdown` fires
    ///
    /// Connections still open at shutdown are aborted.
    pub async fn run(self, router: Arc<StreamRouter>, shutdown: ShutdownSignal) {
        let mut accept_loops = JoinSet::new();
        for (listener, addr) in self.listeners.into_iter().zip(self.listen_addrs) {
            info!(%addr, "Listening for streams");
            accept_loops.spawn(accept_loop(
                listener,
                router.clone(),
                self.header_timeout,
                shutdown.clone(),
            ));
        }
        while accept_loops.join_next().await.is_some() {}
    }
}

async fn accept_loop(
    listener: TcpListener,
    router: Arc<StreamRouter>,
    header_timeout: Duration,
    mut shutdown: ShutdownSignal,
) {
    let mut connections = JoinSet::new();
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                connections.spawn(handle_connection(stream, peer, router.clone(), header_timeout));
            }
            Err(e) => warn!(error = %e, "Accept failed"),
        }
    }
    if !connections.is_empty() {
        debug!(open = connections.len(), "Aborting open connections");
    }
    connections.shutdown().await;
    debug!("Accept loop stopped");
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    router: Arc<StreamRouter>,
    header_timeout: Duration,
) {
    let header = tokio::time::timeout(header_timeout, codec::read_protocol_header(&mut stream)).await;
    let protocol = match header {
        Ok(Ok(protocol)) => protocol,
        Ok(Err(e)) => {
            warn!(%peer, error = %e, "Dropping connection without a valid protocol header");
            return;
        }
        Err(_) => {
            warn!(%peer, timeout = ?header_timeout, "Dropping connection that sent no protocol header");
            return;
        }
    };
    let stream: Box<dyn ByteStream> = Box::new(stream);
    router.dispatch(&protocol, codec::framed(stream), peer).await;
}

/// Open a stream for `protocol` to a transport listening at `addr`
pub async fn dial(addr: &Multiaddr, protocol: &str) -> SimSpResult<MessageStream<TcpStream>> {
    let socket_addr = multiaddr_to_socket_addr(addr)?;
    let mut stream = TcpStream::connect(socket_addr)
        .await
        .map_err(|e| SimSpError::transport(format!("cannot connect to {addr}: {e}")))?;
    codec::write_protocol_header(&mut stream, protocol).await?;
    Ok(codec::framed(stream))
}
