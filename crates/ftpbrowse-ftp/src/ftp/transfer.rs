//! Data-channel management for listings and file transfers.
//!
//! Supports four modes (RFC 959 + RFC 2428):
//! - **PASV** — server opens a port, client connects
//! - **EPSV** — extended passive (IPv6-ready)
//! - **PORT** — client opens a port, tells server
//! - **EPRT** — extended active (IPv6-ready)
//!
//! Passive modes are connected before the transfer command is sent. Active
//! modes hand back a listener that is only accepted once the server has
//! answered the transfer command with a preliminary reply.

use crate::ftp::client::ControlChannel;
use crate::ftp::error::{FtpError, FtpErrorKind, FtpResult};
use crate::ftp::types::{DataChannelMode, TransferTask};
use lazy_static::lazy_static;
use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};

/// Chunk size for streaming transfers (64 KiB).
pub const CHUNK_SIZE: usize = 65_536;

/// Largest listing payload held in memory (16 MiB).
pub const MAX_LISTING_LEN: usize = 16 * 1024 * 1024;

lazy_static! {
    static ref PASV_RE: Regex =
        Regex::new(r"\((\d+),(\d+),(\d+),(\d+),(\d+),(\d+)\)").unwrap();
    static ref EPSV_RE: Regex = Regex::new(r"\(\|\|\|(\d+)\|\)").unwrap();
}

/// A negotiated data connection, possibly still waiting for the server.
pub enum DataConnector {
    /// Passive: already connected.
    Ready(TcpStream),
    /// Active: waiting for the server to connect back.
    Pending(TcpListener),
}

impl DataConnector {
    /// Produce the connected stream, accepting within `limit` if needed.
    pub async fn establish(self, limit: Duration) -> FtpResult<TcpStream> {
        match self {
            DataConnector::Ready(tcp) => Ok(tcp),
            DataConnector::Pending(listener) => {
                let (tcp, from) = timeout(limit, listener.accept())
                    .await
                    .map_err(|_| FtpError::timeout("Server did not open the data connection"))?
                    .map_err(|e| FtpError::io_error(format!("Data accept: {}", e)))?;
                log::trace!("FTP data connection accepted from {}", from);
                Ok(tcp)
            }
        }
    }
}

/// Parameters for negotiating one data connection.
#[derive(Debug, Clone)]
pub struct DataChannelOptions<'a> {
    pub mode: DataChannelMode,
    /// Host used when the control peer address is unknown.
    pub host: &'a str,
    pub data_timeout: Duration,
    pub active_bind: Option<&'a str>,
}

/// Negotiate a data connection on `channel` according to `opts.mode`.
pub async fn open_data_channel(
    channel: &mut ControlChannel,
    opts: &DataChannelOptions<'_>,
) -> FtpResult<DataConnector> {
    match opts.mode {
        DataChannelMode::Passive => open_pasv(channel, opts).await,
        DataChannelMode::ExtendedPassive => open_epsv(channel, opts).await,
        DataChannelMode::Active => open_port(channel, opts).await,
        DataChannelMode::ExtendedActive => open_eprt(channel, opts).await,
    }
}

fn expect_completion(verb: &str, resp: &crate::ftp::types::FtpResponse) -> FtpResult<()> {
    if resp.is_completion() {
        Ok(())
    } else {
        Err(FtpError::from_reply(
            FtpErrorKind::Protocol,
            resp.code,
            &format!("{} rejected: {}", verb, resp.text()),
        ))
    }
}

async fn connect_data(addr: SocketAddr, limit: Duration) -> FtpResult<TcpStream> {
    let tcp = timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| FtpError::timeout(format!("Data connect to {} timed out", addr)))?
        .map_err(|e| FtpError::io_error(format!("Data connect to {}: {}", addr, e)))?;
    log::trace!("FTP data connection to {}", addr);
    Ok(tcp)
}

// ─── PASV ────────────────────────────────────────────────────────────

/// Issue `PASV`, parse the reply, connect to the returned address.
///
/// Reply format: `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`
async fn open_pasv(
    channel: &mut ControlChannel,
    opts: &DataChannelOptions<'_>,
) -> FtpResult<DataConnector> {
    let resp = channel.send_command("PASV", None).await?;
    expect_completion("PASV", &resp)?;
    let mut addr = parse_pasv_response(&resp.text())?;
    // Servers behind NAT sometimes advertise 0.0.0.0.
    if addr.ip().is_unspecified() {
        if let Some(peer) = channel.peer_addr() {
            addr.set_ip(peer.ip());
        }
    }
    connect_data(addr, opts.data_timeout)
        .await
        .map(DataConnector::Ready)
}

/// Parse `(h1,h2,h3,h4,p1,p2)` from a 227 reply.
pub fn parse_pasv_response(text: &str) -> FtpResult<SocketAddr> {
    let caps = PASV_RE
        .captures(text)
        .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse PASV: {}", text)))?;

    let nums: Vec<u8> = (1..=6)
        .map(|i| {
            caps[i]
                .parse::<u8>()
                .map_err(|_| FtpError::protocol_error("PASV number out of range"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let ip = IpAddr::from([nums[0], nums[1], nums[2], nums[3]]);
    let port = (nums[4] as u16) * 256 + (nums[5] as u16);
    Ok(SocketAddr::new(ip, port))
}

// ─── EPSV ────────────────────────────────────────────────────────────

/// Issue `EPSV`, parse the port, connect to the control peer on that port.
///
/// Reply format: `229 Entering Extended Passive Mode (|||port|)`
async fn open_epsv(
    channel: &mut ControlChannel,
    opts: &DataChannelOptions<'_>,
) -> FtpResult<DataConnector> {
    let resp = channel.send_command("EPSV", None).await?;
    expect_completion("EPSV", &resp)?;
    let port = parse_epsv_response(&resp.text())?;

    let addr = match channel.peer_addr() {
        Some(peer) => SocketAddr::new(peer.ip(), port),
        None => {
            let resolved = tokio::net::lookup_host((opts.host, port))
                .await
                .map_err(|e| FtpError::io_error(format!("Resolve {}: {}", opts.host, e)))?
                .next();
            resolved.ok_or_else(|| {
                FtpError::io_error(format!("Cannot resolve data host {}", opts.host))
            })?
        }
    };
    connect_data(addr, opts.data_timeout)
        .await
        .map(DataConnector::Ready)
}

pub fn parse_epsv_response(text: &str) -> FtpResult<u16> {
    let caps = EPSV_RE
        .captures(text)
        .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse EPSV: {}", text)))?;
    caps[1]
        .parse::<u16>()
        .map_err(|_| FtpError::protocol_error("EPSV port out of range"))
}

// ─── PORT / EPRT ─────────────────────────────────────────────────────

/// Bind a listener on the configured address, else on the control
/// connection's local address.
async fn bind_active(
    control_local: Option<SocketAddr>,
    opts: &DataChannelOptions<'_>,
) -> FtpResult<TcpListener> {
    let ip: IpAddr = match opts.active_bind {
        Some(bind) => bind
            .parse()
            .map_err(|_| FtpError::invalid_config(format!("Invalid bind address '{}'", bind)))?,
        None => control_local
            .map(|a| a.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
    };
    TcpListener::bind(SocketAddr::new(ip, 0))
        .await
        .map_err(|e| FtpError::io_error(format!("Data listener bind on {}: {}", ip, e)))
}

/// Tell the server where to connect via `PORT h1,h2,h3,h4,p1,p2`.
async fn open_port(
    channel: &mut ControlChannel,
    opts: &DataChannelOptions<'_>,
) -> FtpResult<DataConnector> {
    let listener = bind_active(channel.local_addr(), opts).await?;
    let local = listener.local_addr()?;
    let cmd = format_port_argument(local)?;
    let resp = channel.send_command("PORT", Some(&cmd)).await?;
    expect_completion("PORT", &resp)?;
    Ok(DataConnector::Pending(listener))
}

pub fn format_port_argument(addr: SocketAddr) -> FtpResult<String> {
    let ip = match addr.ip() {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => {
            return Err(FtpError::invalid_config(
                "PORT requires IPv4; enable extended data commands",
            ))
        }
    };
    let o = ip.octets();
    let port = addr.port();
    Ok(format!(
        "{},{},{},{},{},{}",
        o[0],
        o[1],
        o[2],
        o[3],
        port / 256,
        port % 256
    ))
}

/// Tell the server where to connect via `EPRT |af|ip|port|`.
async fn open_eprt(
    channel: &mut ControlChannel,
    opts: &DataChannelOptions<'_>,
) -> FtpResult<DataConnector> {
    let listener = bind_active(channel.local_addr(), opts).await?;
    let local = listener.local_addr()?;
    let af = match local.ip() {
        IpAddr::V4(_) => 1,
        IpAddr::V6(_) => 2,
    };
    let arg = format!("|{}|{}|{}|", af, local.ip(), local.port());
    let resp = channel.send_command("EPRT", Some(&arg)).await?;
    expect_completion("EPRT", &resp)?;
    Ok(DataConnector::Pending(listener))
}

// ─── Streaming ───────────────────────────────────────────────────────

/// Copy `src` into `dst` chunk by chunk, bounding each read and write.
///
/// `task.bytes_transferred` is kept current so a failure can report how far
/// the transfer got.
pub async fn pump<R, W>(
    src: &mut R,
    dst: &mut W,
    limit: Duration,
    task: &mut TransferTask,
) -> FtpResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = timeout(limit, src.read(&mut buf))
            .await
            .map_err(|_| FtpError::timeout("Data read stalled"))??;
        if n == 0 {
            break;
        }
        timeout(limit, dst.write_all(&buf[..n]))
            .await
            .map_err(|_| FtpError::timeout("Data write stalled"))??;
        task.bytes_transferred += n as u64;
    }
    timeout(limit, dst.flush())
        .await
        .map_err(|_| FtpError::timeout("Data flush stalled"))??;
    Ok(task.bytes_transferred)
}

/// Read `src` to the end into memory, refusing anything over `cap` bytes.
pub async fn collect<R>(
    src: &mut R,
    cap: usize,
    limit: Duration,
    task: &mut TransferTask,
) -> FtpResult<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut payload = Vec::new();
    let mut bounded = (&mut *src).take(cap as u64 + 1);
    pump(&mut bounded, &mut payload, limit, task).await?;
    if payload.len() > cap {
        return Err(FtpError::protocol_error(format!(
            "Data payload exceeds {} bytes",
            cap
        )));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftp::types::TransferDirection;

    #[test]
    fn pasv_reply() {
        let addr =
            parse_pasv_response("227 Entering Passive Mode (192,168,1,10,195,80).").unwrap();
        assert_eq!(addr, "192.168.1.10:50000".parse().unwrap());
    }

    #[test]
    fn pasv_out_of_range() {
        assert!(parse_pasv_response("227 (300,0,0,1,1,1)").is_err());
        assert!(parse_pasv_response("227 no address").is_err());
    }

    #[test]
    fn epsv_reply() {
        let port = parse_epsv_response("229 Entering Extended Passive Mode (|||6446|)").unwrap();
        assert_eq!(port, 6446);
    }

    #[test]
    fn port_argument() {
        let arg = format_port_argument("10.0.0.5:50000".parse().unwrap()).unwrap();
        assert_eq!(arg, "10,0,0,5,195,80");
        assert!(format_port_argument("[::1]:21".parse().unwrap()).is_err());
    }

    #[tokio::test]
    async fn pump_counts_bytes() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 17];
        let mut src: &[u8] = &data;
        let mut dst: Vec<u8> = Vec::new();
        let mut task = TransferTask::new("/x", TransferDirection::Download);
        let n = pump(&mut src, &mut dst, Duration::from_secs(1), &mut task)
            .await
            .unwrap();
        assert_eq!(n, data.len() as u64);
        assert_eq!(dst, data);
    }

    #[tokio::test]
    async fn collect_stops_at_the_cap() {
        let data = vec![b'a'; 100];
        let mut task = TransferTask::new("/list", TransferDirection::Download);

        let mut src: &[u8] = &data;
        let all = collect(&mut src, 100, Duration::from_secs(1), &mut task)
            .await
            .unwrap();
        assert_eq!(all.len(), 100);

        let mut src: &[u8] = &data;
        let err = collect(&mut src, 64, Duration::from_secs(1), &mut task)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FtpErrorKind::Protocol);
    }

    #[tokio::test]
    async fn active_listener_binds_on_control_address() {
        let opts = DataChannelOptions {
            mode: DataChannelMode::Active,
            host: "localhost",
            data_timeout: Duration::from_secs(1),
            active_bind: None,
        };
        let listener = bind_active(Some("127.0.0.1:21".parse().unwrap()), &opts)
            .await
            .unwrap();
        assert_eq!(
            listener.local_addr().unwrap().ip(),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
    }

    #[tokio::test]
    async fn ready_connector_is_immediate() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let tcp = TcpStream::connect(addr).await.unwrap();
        let stream = DataConnector::Ready(tcp)
            .establish(Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn pending_connector_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let err = DataConnector::Pending(listener)
            .establish(Duration::from_millis(30))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FtpErrorKind::Timeout);
    }
}
