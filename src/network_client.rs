use std::fmt::Debug;
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use byteorder::{BigEndian, ByteOrder};
use url::Url;

use crate::kerberos::DEFAULT_KDC_PORT;
use crate::{CancellationToken, CancellationTokenExt, Error, ErrorKind, Result};

/// How long a single blocking read may wait before the cancellation flag is polled again.
const CANCELLATION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 48 000 bytes: default maximum token len in Windows
const MAX_UDP_DATAGRAM_LEN: usize = 0xbb80;

/// Upper bound for a length-prefixed KDC reply read over TCP.
const MAX_TCP_MESSAGE_LEN: u32 = 0x0100_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkProtocol {
    Tcp,
    Udp,
}

impl NetworkProtocol {
    pub const ALL: &'static [Self] = &[Self::Tcp, Self::Udp];

    pub(crate) fn from_url_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            _ => None,
        }
    }
}

/// A single message to a KDC.
///
/// `data` always carries the 4-byte big-endian length prefix. The UDP transport strips it
/// before sending. Replies are returned with the prefix for both transports.
#[derive(Debug, Clone)]
pub struct NetworkRequest {
    pub protocol: NetworkProtocol,
    pub url: Url,
    pub data: Vec<u8>,
    /// Bound for the whole exchange with this address: name lookup, connect, write and read.
    pub timeout: Duration,
}

pub trait NetworkClient: Send + Sync {
    /// Send request to the server and return the response.
    ///
    /// URL scheme is guaranteed to be the same as specified by `protocol` argument.
    /// Transport failures and timeouts must be reported as [`ErrorKind::KdcUnreachable`]
    /// so the caller can move on to the next KDC address.
    fn send(&self, request: &NetworkRequest, cancellation: &CancellationToken) -> Result<Vec<u8>>;
}

/// [`NetworkClient`] over blocking `std::net` sockets.
#[derive(Debug, Clone, Default)]
pub struct StdNetworkClient;

impl StdNetworkClient {
    pub fn new() -> Self {
        Self
    }

    #[instrument(level = "debug", skip_all, fields(url = %url))]
    fn send_tcp(&self, url: &Url, data: &[u8], timeout: Duration, cancellation: &CancellationToken) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let addrs = resolve(url, deadline, cancellation)?;
        let mut stream = connect_tcp(url, &addrs, deadline, cancellation)?;

        stream
            .set_write_timeout(Some(remaining_time(url, deadline)?))
            .map_err(|e| unreachable_error(url, e))?;
        stream.write_all(data).map_err(|e| unreachable_error(url, e))?;

        let mut len = [0; 4];
        read_exact_until(url, &mut stream, &mut len, deadline, cancellation)?;

        let len = BigEndian::read_u32(&len);
        if len > MAX_TCP_MESSAGE_LEN {
            return Err(Error::new(
                ErrorKind::KdcUnreachable,
                format!("{url}: reply length {len} exceeds the allowed maximum"),
            ));
        }

        let mut buf = vec![0; len as usize + 4];
        buf[0..4].copy_from_slice(&(len.to_be_bytes()));

        read_exact_until(url, &mut stream, &mut buf[4..], deadline, cancellation)?;

        trace!(reply_len = buf.len(), "received TCP reply");

        Ok(buf)
    }

    #[instrument(level = "debug", skip_all, fields(url = %url))]
    fn send_udp(&self, url: &Url, data: &[u8], timeout: Duration, cancellation: &CancellationToken) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let addr = resolve(url, deadline, cancellation)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::new(ErrorKind::KdcUnreachable, format!("{url}: no address resolved")))?;

        let local: SocketAddr = if addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let udp_socket = bind_udp(url, local)?;
        udp_socket.connect(addr).map_err(|e| unreachable_error(url, e))?;

        let payload = data
            .get(4..)
            .ok_or_else(|| Error::new(ErrorKind::InternalError, "KDC request is missing its length prefix"))?;
        udp_socket.send(payload).map_err(|e| unreachable_error(url, e))?;

        let mut buf = vec![0; MAX_UDP_DATAGRAM_LEN];
        let n = loop {
            cancellation.check()?;

            let remaining = remaining_time(url, deadline)?;

            udp_socket
                .set_read_timeout(Some(remaining.min(CANCELLATION_POLL_INTERVAL)))
                .map_err(|e| unreachable_error(url, e))?;

            match udp_socket.recv(&mut buf) {
                Ok(n) => break n,
                Err(e) if is_retryable(&e) => continue,
                Err(e) => return Err(unreachable_error(url, e)),
            }
        };

        let mut reply_buf = Vec::with_capacity(n + 4);
        reply_buf.extend_from_slice(&(n as u32).to_be_bytes());
        reply_buf.extend_from_slice(&buf[0..n]);

        trace!(reply_len = reply_buf.len(), "received UDP reply");

        Ok(reply_buf)
    }
}

impl NetworkClient for StdNetworkClient {
    fn send(&self, request: &NetworkRequest, cancellation: &CancellationToken) -> Result<Vec<u8>> {
        match request.protocol {
            NetworkProtocol::Tcp => self.send_tcp(&request.url, &request.data, request.timeout, cancellation),
            NetworkProtocol::Udp => self.send_udp(&request.url, &request.data, request.timeout, cancellation),
        }
    }
}

/// Resolves the KDC host within `deadline`.
///
/// Name lookups run on a helper thread so the wait can be bounded and cancelled. IP literals
/// are used as is.
fn resolve(url: &Url, deadline: Instant, cancellation: &CancellationToken) -> Result<Vec<SocketAddr>> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::new(ErrorKind::InvalidConfiguration, format!("{url}: KDC address has no host")))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = url.port().unwrap_or(DEFAULT_KDC_PORT);

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let (sender, receiver) = mpsc::channel();
    let lookup_host = host.to_owned();
    thread::Builder::new()
        .name("kdc-resolver".to_owned())
        .spawn(move || {
            let addrs = (lookup_host.as_str(), port)
                .to_socket_addrs()
                .map(|addrs| addrs.collect::<Vec<_>>());
            // the receiver is gone when the lookup was abandoned
            let _ = sender.send(addrs);
        })
        .map_err(|e| unreachable_error(url, e))?;

    let addrs = loop {
        cancellation.check()?;

        let remaining = remaining_time(url, deadline)?;

        match receiver.recv_timeout(remaining.min(CANCELLATION_POLL_INTERVAL)) {
            Ok(addrs) => {
                break addrs
                    .map_err(|e| Error::new(ErrorKind::KdcUnreachable, format!("{url}: unable to resolve KDC host: {e}")))?
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Error::new(
                    ErrorKind::KdcUnreachable,
                    format!("{url}: KDC host lookup stopped without an answer"),
                ))
            }
        }
    };

    cancellation.check()?;

    if addrs.is_empty() {
        return Err(Error::new(
            ErrorKind::KdcUnreachable,
            format!("{url}: KDC host resolved to no addresses"),
        ));
    }

    Ok(addrs)
}

/// Tries every resolved address in turn. All attempts together are bounded by `deadline`.
fn connect_tcp(
    url: &Url,
    addrs: &[SocketAddr],
    deadline: Instant,
    cancellation: &CancellationToken,
) -> Result<TcpStream> {
    let mut last_error = None;

    for addr in addrs {
        cancellation.check()?;

        match TcpStream::connect_timeout(addr, remaining_time(url, deadline)?) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "TCP connect failed");
                last_error = Some(e);
            }
        }
    }

    Err(Error::new(
        ErrorKind::KdcUnreachable,
        format!(
            "{url}: unable to connect to the KDC: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ),
    ))
}

fn bind_udp(url: &Url, local: SocketAddr) -> Result<UdpSocket> {
    UdpSocket::bind(local).map_err(|e| unreachable_error(url, e))
}

/// Fills `buf` from `stream`, polling `cancellation` between short read waits.
fn read_exact_until(
    url: &Url,
    stream: &mut TcpStream,
    buf: &mut [u8],
    deadline: Instant,
    cancellation: &CancellationToken,
) -> Result<()> {
    let mut filled = 0;

    while filled < buf.len() {
        cancellation.check()?;

        let remaining = remaining_time(url, deadline)?;

        stream
            .set_read_timeout(Some(remaining.min(CANCELLATION_POLL_INTERVAL)))
            .map_err(|e| unreachable_error(url, e))?;

        match stream.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(Error::new(
                    ErrorKind::KdcUnreachable,
                    format!("{url}: the KDC closed the connection before sending a complete reply"),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if is_retryable(&e) => continue,
            Err(e) => return Err(unreachable_error(url, e)),
        }
    }

    Ok(())
}

/// Time left until `deadline`. Never zero: an expired deadline is a [`ErrorKind::KdcUnreachable`] timeout.
fn remaining_time(url: &Url, deadline: Instant) -> Result<Duration> {
    let remaining = deadline.saturating_duration_since(Instant::now());

    if remaining.is_zero() {
        Err(Error::new(
            ErrorKind::KdcUnreachable,
            format!("{url}: timed out waiting for the KDC"),
        ))
    } else {
        Ok(remaining)
    }
}

fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

fn unreachable_error(url: &Url, err: io::Error) -> Error {
    Error::new(ErrorKind::KdcUnreachable, format!("{url}: {err}"))
}
