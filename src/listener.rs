use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use tokio::net::{TcpSocket, UdpSocket};
use tokio::time;
use tracing::{error, info, warn};

use crate::types::Protocol;

/// Reply sent to the first UDP datagram received.
pub const UDP_ACK: &[u8] = b"PONG";

/// How a listener task ended. None of these affect a port's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenOutcome {
    /// A peer connected (tcp) or sent a datagram (udp).
    Contacted(SocketAddr),
    TimedOut,
    /// Bind or socket error; already logged.
    Failed,
}

/// Occupy `host:port` until one peer shows up or `timeout` elapses, then close.
///
/// Socket errors are logged and reported as [`ListenOutcome::Failed`]; they never
/// propagate, since the prober's answer is the only source of the verdict.
pub async fn listen_once(
    protocol: Protocol,
    host: Ipv4Addr,
    port: u16,
    timeout: Duration,
) -> ListenOutcome {
    let addr = SocketAddrV4::new(host, port);
    let res = match protocol {
        Protocol::Tcp => listen_tcp(addr, timeout).await,
        Protocol::Udp => listen_udp(addr, timeout).await,
    };
    match res {
        Ok(Some(peer)) => ListenOutcome::Contacted(peer),
        Ok(None) => {
            warn!(
                "{} server on {addr} timed out after {:.1} seconds",
                protocol.as_str().to_uppercase(),
                timeout.as_secs_f64()
            );
            ListenOutcome::TimedOut
        }
        Err(e) => {
            error!(
                "Socket error in {} server on {addr}: {e}",
                protocol.as_str().to_uppercase()
            );
            ListenOutcome::Failed
        }
    }
}

/// Bind, listen with a backlog of one and accept at most one connection.
async fn listen_tcp(addr: SocketAddrV4, timeout: Duration) -> io::Result<Option<SocketAddr>> {
    info!("Starting TCP server on {addr}");
    let socket = TcpSocket::new_v4()?;
    #[cfg(unix)]
    socket.set_reuseaddr(true)?;
    socket.bind(SocketAddr::V4(addr))?;
    let listener = socket.listen(1)?;

    match time::timeout(timeout, listener.accept()).await {
        Ok(Ok((stream, peer))) => {
            info!("Connection accepted from {peer}");
            drop(stream);
            Ok(Some(peer))
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(None),
    }
}

/// Bind, wait for one datagram and answer it with [`UDP_ACK`].
async fn listen_udp(addr: SocketAddrV4, timeout: Duration) -> io::Result<Option<SocketAddr>> {
    info!("Starting UDP server on {addr}");
    let socket = UdpSocket::bind(addr).await?;
    let mut buf = [0u8; 1024];

    match time::timeout(timeout, socket.recv_from(&mut buf)).await {
        Ok(Ok((_, peer))) => {
            info!("Received data from {peer}");
            socket.send_to(UDP_ACK, peer).await?;
            Ok(Some(peer))
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(None),
    }
}
