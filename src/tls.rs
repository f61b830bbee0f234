//! Historical SSL connector — command channel wrapped in TLS at connect
//! time, data channel left plain.
//!
//! Full FTPS negotiation (`AUTH TLS`, `CCC`, `PROT`) is out of scope; this
//! only reproduces the legacy behavior of wrapping the command socket in
//! TLS from the first byte, with the data channel staying plain TCP as
//! historical implicit-FTPS clients did. Built on `rustls` and
//! `rustls-native-certs`, using rustls's blocking `StreamOwned` adapter.

use std::io;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use crate::connector::{Connection, Connector, TcpConnector};
use crate::error::{FtpError, FtpResult};

/// A command channel secured by TLS from the moment the socket connects,
/// with a plain-TCP data channel (matching historical implicit-FTPS-like
/// clients that never learned `PROT`/`PBSZ`).
#[derive(Clone)]
pub struct LegacySslConnector {
    tls_config: Arc<ClientConfig>,
    tcp: TcpConnector,
}

impl LegacySslConnector {
    pub fn new() -> FtpResult<Self> {
        let mut roots = RootCertStore::empty();
        for cert in rustls_native_certs::load_native_certs().certs {
            let _ = roots.add(cert);
        }
        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self {
            tls_config: Arc::new(tls_config),
            tcp: TcpConnector::new(),
        })
    }
}

impl Connector for LegacySslConnector {
    fn connect_for_command(&self, host: &str, port: u16) -> FtpResult<Box<dyn Connection>> {
        let tcp = dial_tcp(host, port)?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| FtpError::IllegalState(format!("invalid TLS server name: {e}")))?;
        let conn = ClientConnection::new(self.tls_config.clone(), server_name)
            .map_err(|e| FtpError::IllegalState(format!("TLS handshake setup failed: {e}")))?;
        let shutdown_handle = tcp.try_clone()?;
        let stream = StreamOwned::new(conn, tcp);
        Ok(Box::new(TlsConnection {
            stream: Arc::new(Mutex::new(stream)),
            shutdown_handle,
        }))
    }

    fn connect_for_data(&self, host: &str, port: u16) -> FtpResult<Box<dyn Connection>> {
        self.tcp.connect_for_data(host, port)
    }
}

fn dial_tcp(host: &str, port: u16) -> FtpResult<TcpStream> {
    use std::net::ToSocketAddrs;
    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}")))?;
    let stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true).ok();
    Ok(stream)
}

/// One TLS-wrapped command connection. `stream` is shared behind a mutex
/// rather than split, because a single `rustls::ClientConnection` owns
/// the session's sequence numbers and record buffering — two independent
/// `ClientConnection`s layered over clones of the same raw socket (as a
/// plain `TcpStream::try_clone` would give us) would each think they own
/// the whole TLS record stream and corrupt it. `try_clone` therefore
/// clones the `Arc`, not the session, so [`crate::control::ControlChannel`]'s
/// separate reader/writer handles still decrypt/encrypt through the one
/// real session. `shutdown_handle` is the one piece that's safe to treat
/// as a bare socket — a raw TCP shutdown needs no TLS state at all.
struct TlsConnection {
    stream: Arc<Mutex<StreamOwned<ClientConnection, TcpStream>>>,
    shutdown_handle: TcpStream,
}

impl io::Read for TlsConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.lock().unwrap().read(buf)
    }
}

impl io::Write for TlsConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.lock().unwrap().flush()
    }
}

impl Connection for TlsConnection {
    fn close(&mut self) -> io::Result<()> {
        Connection::shutdown(self)
    }

    fn try_clone(&self) -> io::Result<Box<dyn Connection>> {
        Ok(Box::new(TlsConnection {
            stream: Arc::clone(&self.stream),
            shutdown_handle: self.shutdown_handle.try_clone()?,
        }))
    }

    fn shutdown(&self) -> io::Result<()> {
        Connection::shutdown(&self.shutdown_handle)
    }

    fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> io::Result<()> {
        self.stream.lock().unwrap().sock.set_read_timeout(timeout)
    }

    fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.shutdown_handle.local_addr()
    }
}
