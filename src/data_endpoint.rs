//! The data endpoint factory: PASV/PORT negotiation.
//!
//! A [`DataEndpoint`] is a one-shot producer — negotiated once per
//! transfer, consumed by exactly one [`DataEndpoint::open_data_connection`]
//! call, then discarded. It does not know how to send arbitrary commands;
//! it only needs something that can send one line and read back one
//! reply, which [`crate::control::ControlChannel`] provides through the
//! [`CommandChannel`] trait below.

use std::net::{IpAddr, Ipv4Addr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;

use crate::connector::{Connection, Connector};
use crate::error::{FtpError, FtpResult};
use crate::reply::Reply;

lazy_static! {
    /// Matches a PASV/EPSV-style reply sextuple, with or without the
    /// surrounding parentheses some servers omit.
    static ref SEXTUPLE_RE: Regex =
        Regex::new(r"(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3})").unwrap();
}

/// The minimal capability the data endpoint factory needs from the
/// control channel: send one command line, read back the next reply.
pub trait CommandChannel {
    fn send_command(&self, command: &str) -> FtpResult<()>;
    fn read_reply(&self) -> FtpResult<Reply>;
}

/// A negotiated, not-yet-opened data connection.
pub enum DataEndpoint {
    /// Server is listening; we dial out to `host:port`.
    Passive {
        connector: Arc<dyn Connector>,
        host: String,
        port: u16,
    },
    /// We are listening; the server will dial in. `accept_timeout` bounds
    /// how long `open_data_connection` waits for that connection.
    Active {
        listener: TcpListener,
        accept_timeout: Option<Duration>,
    },
}

impl DataEndpoint {
    /// Send `PASV`, parse the sextuple from the reply text, and hold the
    /// resulting address for a later dial.
    ///
    /// A success reply that carries no parseable sextuple is treated as
    /// `IllegalReply` with no retry — we cannot recover an address the
    /// server never actually gave us.
    pub fn negotiate_passive(
        channel: &impl CommandChannel,
        connector: Arc<dyn Connector>,
    ) -> FtpResult<Self> {
        channel.send_command("PASV")?;
        let reply = channel.read_reply()?;
        if !reply.is_success() {
            return Err(FtpError::server_error(reply.code, reply.lines));
        }
        let text = reply.text();
        let caps = SEXTUPLE_RE
            .captures(&text)
            .ok_or_else(|| FtpError::illegal_reply(format!("no address sextuple in: {text:?}")))?;

        let mut parts = [0u16; 6];
        for i in 0..6 {
            parts[i] = caps[i + 1]
                .parse()
                .map_err(|_| FtpError::illegal_reply(format!("bad sextuple octet in: {text:?}")))?;
        }
        for &octet in &parts[..4] {
            if octet > 255 {
                return Err(FtpError::illegal_reply(format!(
                    "sextuple octet out of range in: {text:?}"
                )));
            }
        }
        let host = format!("{}.{}.{}.{}", parts[0], parts[1], parts[2], parts[3]);
        let port = parts[4] * 256 + parts[5];

        Ok(Self::Passive {
            connector,
            host,
            port,
        })
    }

    /// Bind an ephemeral local listener, send `PORT` with the encoded
    /// sextuple, and wait for the server to connect in once
    /// `open_data_connection` is called.
    ///
    /// `advertise_addr` is the address to encode in the `PORT` command and
    /// to bind the listener on; callers resolve this from
    /// [`ClientConfig::active_dt_host_address`] when set, else from the
    /// control connection's local address. `accept_timeout` bounds how
    /// long the later `open_data_connection` call waits for the server to
    /// dial back in; callers that want one pass it explicitly.
    pub fn negotiate_active(
        channel: &impl CommandChannel,
        advertise_addr: Ipv4Addr,
        accept_timeout: Option<Duration>,
    ) -> FtpResult<Self> {
        let listener = TcpListener::bind((IpAddr::V4(advertise_addr), 0))?;
        let local_port = listener.local_addr()?.port();

        let octets = advertise_addr.octets();
        let p1 = local_port / 256;
        let p2 = local_port % 256;
        let command = format!(
            "PORT {},{},{},{},{},{}",
            octets[0], octets[1], octets[2], octets[3], p1, p2
        );
        channel.send_command(&command)?;
        let reply = channel.read_reply()?;
        if !reply.is_success() {
            return Err(FtpError::server_error(reply.code, reply.lines));
        }

        Ok(Self::Active {
            listener,
            accept_timeout,
        })
    }

    /// Consume this endpoint to obtain the data connection: dial out for
    /// `Passive`, accept the single inbound connection for `Active`.
    pub fn open_data_connection(self) -> FtpResult<Box<dyn Connection>> {
        match self {
            Self::Passive {
                connector,
                host,
                port,
            } => connector.connect_for_data(&host, port),
            Self::Active {
                listener,
                accept_timeout,
            } => {
                let stream = match accept_timeout {
                    None => listener.accept()?.0,
                    Some(timeout) => {
                        listener.set_nonblocking(true)?;
                        let deadline = std::time::Instant::now() + timeout;
                        loop {
                            match listener.accept() {
                                Ok((stream, _)) => break stream,
                                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                                    if std::time::Instant::now() >= deadline {
                                        return Err(FtpError::Io(std::io::Error::new(
                                            std::io::ErrorKind::TimedOut,
                                            "timed out waiting for active-mode data connection",
                                        )));
                                    }
                                    std::thread::sleep(Duration::from_millis(20));
                                }
                                Err(e) => return Err(FtpError::Io(e)),
                            }
                        }
                    }
                };
                stream.set_nodelay(true).ok();
                Ok(Box::new(stream))
            }
        }
    }

    /// Release any resources this endpoint holds without opening a
    /// connection (the `PASV`/`PORT` negotiation happened but the
    /// transfer never started, e.g. a subsequent `TYPE` failed).
    pub fn dispose(self) {
        // `Passive` holds no local resource; `Active`'s listener is
        // closed by drop.
    }
}
