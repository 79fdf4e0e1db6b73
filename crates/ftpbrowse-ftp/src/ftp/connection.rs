//! TCP transport for the control connection.
//!
//! Resolves and connects within `connect_timeout_sec` and records both
//! endpoint addresses, which the data-channel code needs later.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::FtpCodec;
use crate::ftp::types::ConnectionDescriptor;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// A freshly connected control socket, greeting not yet read.
pub struct ControlTransport {
    pub codec: FtpCodec,
    pub local_addr: Option<SocketAddr>,
    pub peer_addr: Option<SocketAddr>,
}

/// Open the TCP control connection described by `descriptor`.
pub async fn connect(descriptor: &ConnectionDescriptor) -> FtpResult<ControlTransport> {
    let addr = descriptor.address();
    let dur = descriptor.connect_timeout();

    let tcp = timeout(dur, TcpStream::connect(&addr))
        .await
        .map_err(|_| FtpError::timeout(format!("TCP connect to {} timed out", addr)))?
        .map_err(|e| FtpError::connect_failed(format!("TCP connect to {}: {}", addr, e)))?;

    tcp.set_nodelay(true).ok();
    let local_addr = tcp.local_addr().ok();
    let peer_addr = tcp.peer_addr().ok();
    log::debug!("FTP control connection {} -> {:?}", addr, peer_addr);

    Ok(ControlTransport {
        codec: FtpCodec::from_tcp(tcp, descriptor.reply_timeout()),
        local_addr,
        peer_addr,
    })
}
