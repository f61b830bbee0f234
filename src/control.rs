//! The control channel: command/reply framing over a persistent
//! connection.
//!
//! Held behind its own lock, separate from the session lock, so the
//! keep-alive ticker can send `NOOP` and consume its reply without
//! waiting on whatever transfer the session lock is guarding — a NOOP
//! command and its reply always land on the wire back to back, never
//! interleaved with another command's. A second handle, cloned
//! once at construction and never behind a lock, lets
//! `abruptly_close_communication` tear the connection down even while
//! another thread is stuck holding the channel lock mid-read.

use std::io::{BufReader, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::connector::Connection;
use crate::data_endpoint::CommandChannel;
use crate::error::{FtpError, FtpResult};
use crate::reply::{self, Reply};

/// Observes commands sent and replies received — used for diagnostics and
/// logging fan-out, never for control flow.
pub trait ProtocolListener: Send + Sync {
    fn command_sent(&self, _command: &str) {}
    fn reply_received(&self, _reply: &Reply) {}
}

/// The charset used to validate outgoing command text. Swapped exactly
/// once, after a successful post-login `OPTS UTF8 ON`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Ascii,
    Utf8,
}

struct Inner {
    reader: BufReader<Box<dyn Connection>>,
    writer: Box<dyn Connection>,
}

pub struct ControlChannel {
    inner: Mutex<Inner>,
    charset: Mutex<Charset>,
    listeners: Mutex<Vec<Arc<dyn ProtocolListener>>>,
    emergency_handle: Box<dyn Connection>,
}

impl ControlChannel {
    /// Wrap a freshly-dialed command connection. Clones it twice: once
    /// for the read half, once as the lock-free emergency shutdown
    /// handle.
    pub fn new(connection: Box<dyn Connection>) -> FtpResult<Self> {
        let reader_half = connection.try_clone()?;
        let emergency_handle = connection.try_clone()?;
        Ok(Self {
            inner: Mutex::new(Inner {
                reader: BufReader::new(reader_half),
                writer: connection,
            }),
            charset: Mutex::new(Charset::Ascii),
            listeners: Mutex::new(Vec::new()),
            emergency_handle,
        })
    }

    pub fn register_listener(&self, listener: Arc<dyn ProtocolListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    pub fn set_charset(&self, charset: Charset) {
        *self.charset.lock().unwrap() = charset;
    }

    pub fn charset(&self) -> Charset {
        *self.charset.lock().unwrap()
    }

    fn check_encodable(&self, command: &str) -> FtpResult<()> {
        if self.charset() == Charset::Ascii && !command.is_ascii() {
            return Err(FtpError::illegal_state(format!(
                "command {command:?} contains non-ASCII bytes but UTF-8 has not been negotiated"
            )));
        }
        Ok(())
    }

    fn notify_sent(&self, command: &str) {
        for l in self.listeners.lock().unwrap().iter() {
            l.command_sent(command);
        }
    }

    fn notify_received(&self, reply: &Reply) {
        for l in self.listeners.lock().unwrap().iter() {
            l.reply_received(reply);
        }
    }

    /// Send one command line; `command` must not include the CRLF
    /// terminator.
    pub fn send_only(&self, command: &str) -> FtpResult<()> {
        self.check_encodable(command)?;
        let mut inner = self.inner.lock().unwrap();
        inner.writer.write_all(command.as_bytes())?;
        inner.writer.write_all(b"\r\n")?;
        inner.writer.flush()?;
        drop(inner);
        self.notify_sent(command);
        Ok(())
    }

    /// Read the next reply without sending anything first (used by the
    /// keep-alive ticker to consume a `NOOP` reply it just sent, and by
    /// the transfer engine to consume the trailing `226`/`426` after a
    /// data pump completes).
    pub fn receive_only(&self) -> FtpResult<Reply> {
        let mut inner = self.inner.lock().unwrap();
        let reply = reply::read_reply(&mut inner.reader)?;
        drop(inner);
        self.notify_received(&reply);
        Ok(reply)
    }

    /// Send a command and read back its reply, holding the channel lock
    /// across both so no other command (or keep-alive `NOOP`) can
    /// interleave between them.
    pub fn execute(&self, command: &str) -> FtpResult<Reply> {
        self.check_encodable(command)?;
        let mut inner = self.inner.lock().unwrap();
        inner.writer.write_all(command.as_bytes())?;
        inner.writer.write_all(b"\r\n")?;
        inner.writer.flush()?;
        let reply = reply::read_reply(&mut inner.reader)?;
        drop(inner);
        self.notify_sent(command);
        self.notify_received(&reply);
        Ok(reply)
    }

    /// Send a command, expecting a reply class (`2` for success, etc.);
    /// translate a non-matching reply into a `ServerError`.
    pub fn execute_expect_success(&self, command: &str) -> FtpResult<Reply> {
        let reply = self.execute(command)?;
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(FtpError::server_error(reply.code, reply.lines))
        }
    }

    /// Forcibly unblock any in-progress read/write on this channel,
    /// without taking the channel lock. Idempotent; used by
    /// `abruptly_close_communication`.
    pub fn abruptly_close(&self) -> FtpResult<()> {
        self.emergency_handle.shutdown()
    }

    /// Bound how long the next `receive_only` blocks. Used around the
    /// trailing-reply read that follows a failed data pump, so a broken
    /// server that never sends it can't hang the control channel forever.
    pub fn with_read_timeout(&self, timeout: Option<Duration>) -> FtpResult<()> {
        let inner = self.inner.lock().unwrap();
        inner.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    /// The control connection's local endpoint, used to derive the
    /// advertised address for active-mode `PORT` when no override is
    /// configured.
    pub fn local_addr(&self) -> FtpResult<std::net::SocketAddr> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.reader.get_ref().local_addr()?)
    }
}

impl CommandChannel for ControlChannel {
    fn send_command(&self, command: &str) -> FtpResult<()> {
        self.send_only(command)
    }

    fn read_reply(&self) -> FtpResult<Reply> {
        self.receive_only()
    }
}
