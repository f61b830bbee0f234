//! The transport connector abstraction.
//!
//! The concrete transport (plain TCP, TLS, a SOCKS proxy, an HTTP proxy)
//! is treated as an external collaborator: it only needs to hand back
//! something that reads and writes bytes. Two provided implementations
//! ship with the crate — [`TcpConnector`] (the default) and, behind the
//! `tls` feature, a historical command-channel-only SSL wrapper.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::FtpResult;

/// A single byte-stream connection, readable and writable from one
/// thread while `close`/`shutdown` may be called from another to unblock
/// it — the mechanism [`crate::session`] uses to implement
/// `abort_current_transfer`. `Sync` is required (not just `Send`) because
/// `shutdown`/`set_read_timeout` take `&self` and are meant to be called
/// from a different thread than whichever one is blocked in a read/write —
/// the same reason `ControlChannel`'s emergency shutdown handle and
/// `DataEndpoint`'s abort-path shutdown handle can live behind a shared
/// `Arc` instead of needing their own lock.
pub trait Connection: io::Read + io::Write + Send + Sync {
    /// Close the connection. Safe to call more than once.
    fn close(&mut self) -> io::Result<()>;

    /// Produce an independent handle to the same underlying connection,
    /// usable to `shutdown` it from another thread while the original
    /// handle is blocked in a read or write.
    fn try_clone(&self) -> io::Result<Box<dyn Connection>>;

    /// Forcibly unblock any in-progress read/write on this connection
    /// (and on every handle produced by `try_clone`). Idempotent.
    fn shutdown(&self) -> io::Result<()>;

    /// Bound how long the next read blocks. Used only around the
    /// trailing-reply read that follows a failed data pump — a server
    /// that never sends that reply must not hang the control channel
    /// forever.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// This connection's local endpoint. Used to derive the host's
    /// primary local address to advertise in `PORT` when no
    /// `ACTIVE_DT_HOST_ADDRESS` override is configured.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Connection for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Already shut down / not connected — treat as success.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn try_clone(&self) -> io::Result<Box<dyn Connection>> {
        Ok(Box::new(TcpStream::try_clone(self)?))
    }

    fn shutdown(&self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }
}

/// Produces connections for the control channel and for data transfers.
/// Implementations must be safe to use repeatedly and concurrently — a
/// session reuses the same connector for every data connection it
/// negotiates over its lifetime.
pub trait Connector: Send + Sync {
    fn connect_for_command(&self, host: &str, port: u16) -> FtpResult<Box<dyn Connection>>;
    fn connect_for_data(&self, host: &str, port: u16) -> FtpResult<Box<dyn Connection>>;
}

/// Plain TCP for both the control and data channels — the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector {
    pub connect_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(timeout: Duration) -> Self {
        Self {
            connect_timeout: Some(timeout),
        }
    }

    fn dial(&self, host: &str, port: u16) -> FtpResult<TcpStream> {
        use std::net::ToSocketAddrs;
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}"))
            })?;
        let stream = match self.connect_timeout {
            Some(d) => TcpStream::connect_timeout(&addr, d)?,
            None => TcpStream::connect(addr)?,
        };
        stream.set_nodelay(true).ok();
        Ok(stream)
    }
}

impl Connector for TcpConnector {
    fn connect_for_command(&self, host: &str, port: u16) -> FtpResult<Box<dyn Connection>> {
        Ok(Box::new(self.dial(host, port)?))
    }

    fn connect_for_data(&self, host: &str, port: u16) -> FtpResult<Box<dyn Connection>> {
        Ok(Box::new(self.dial(host, port)?))
    }
}
