//! The transfer engine: the eight-step pipeline that turns
//! a `RETR`/`STOR`/`APPE`/`LIST`/`NLST` command into bytes moved over a
//! data connection, plus the abort pathway that can cut it short from
//! another thread.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::ClientConfig;
use crate::connector::Connection;
use crate::control::ControlChannel;
use crate::data_endpoint::DataEndpoint;
use crate::error::{FtpError, FtpResult};
use crate::keepalive::KeepAliveTicker;
use crate::type_selector::EffectiveType;

/// Fixed buffer size for the binary pump loop, matching the reference
/// design's `PUMP_BUFFER_SIZE`.
const PUMP_BUFFER_SIZE: usize = 1024;

/// Direction of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Observes transfer progress. Every method must return promptly —
/// listeners run inline on the pump thread.
pub trait ProgressListener: Send + Sync {
    fn started(&self, _direction: TransferDirection, _total: Option<u64>) {}
    fn transferred(&self, _bytes_so_far: u64) {}
    fn completed(&self) {}
    fn aborted(&self) {}
    fn failed(&self, _error: &FtpError) {}
}

/// Shared, lock-guarded state the abort pathway touches. Reachable
/// without holding the session lock, so `abort_current_transfer` works
/// while the transfer thread is blocked inside it.
#[derive(Default)]
pub struct AbortState {
    pub ongoing: bool,
    pub aborted: bool,
    /// Set when the abort that's in progress actually sent `ABOR` (vs.
    /// just cutting the data connection), so the cleanup path in
    /// `run_transfer` knows whether one or two trailing replies are
    /// pending.
    abor_sent: bool,
    data_shutdown_handle: Option<Box<dyn Connection>>,
}

impl AbortState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One transfer request: what to send, how to move bytes, who to tell
/// about progress.
pub struct TransferRequest<'a> {
    pub direction: TransferDirection,
    /// Command verb and argument, e.g. `RETR` / `path/to/file`.
    pub command: String,
    pub effective_type: EffectiveType,
    /// `REST` offset to request before the transfer command, if any.
    pub restart_at: Option<u64>,
    pub endpoint: DataEndpoint,
    /// Source for an upload, sink for a download — exactly one is used,
    /// selected by `direction`.
    pub upload_source: Option<&'a mut dyn Read>,
    pub download_sink: Option<&'a mut dyn Write>,
    /// Bytes to skip in `upload_source` before sending. Independent of
    /// `restart_at`, which is only a hint to the server; ignored for
    /// downloads.
    pub stream_offset: u64,
    /// Bytes to send from `upload_source` after skipping `stream_offset`,
    /// or `None` to send until EOF. Ignored for downloads.
    pub stream_length: Option<u64>,
    pub listener: Option<Arc<dyn ProgressListener>>,
    /// Expected total size, if known (e.g. from a prior `SIZE`), passed
    /// through to `ProgressListener::started`.
    pub total_size: Option<u64>,
}

/// Adapts an upload source to skip `to_skip` bytes and then yield at most
/// `remaining` more, so the transfer engine alone is responsible for
/// honoring `stream_offset`/`stream_length`.
struct BoundedReader<'a> {
    inner: &'a mut dyn Read,
    to_skip: u64,
    remaining: Option<u64>,
}

impl Read for BoundedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.to_skip > 0 {
            let chunk = std::cmp::min(self.to_skip, buf.len() as u64) as usize;
            let n = self.inner.read(&mut buf[..chunk])?;
            if n == 0 {
                return Ok(0);
            }
            self.to_skip -= n as u64;
        }
        let cap = match self.remaining {
            Some(r) => std::cmp::min(r, buf.len() as u64) as usize,
            None => buf.len(),
        };
        if cap == 0 {
            return Ok(0);
        }
        let n = self.inner.read(&mut buf[..cap])?;
        if let Some(r) = &mut self.remaining {
            *r -= n as u64;
        }
        Ok(n)
    }
}

/// Run the eight-step pipeline for one transfer. Returns the number of
/// bytes moved over the data connection.
pub fn run_transfer(
    control: &Arc<ControlChannel>,
    config: &ClientConfig,
    abort_state: &Arc<Mutex<AbortState>>,
    request: TransferRequest<'_>,
) -> FtpResult<u64> {
    let TransferRequest {
        direction,
        command,
        effective_type,
        restart_at,
        endpoint,
        upload_source,
        download_sink,
        stream_offset,
        stream_length,
        listener,
        total_size,
    } = request;

    if abort_state.lock().unwrap().aborted {
        return Err(FtpError::Aborted);
    }

    // Step 2: TYPE.
    control.execute_expect_success(&format!("TYPE {}", effective_type.type_command_arg()))?;

    // Step 3: REST, if requested. A 502 here means the server doesn't
    // support restart at all; translate it to a fixed message rather than
    // whatever the server happened to say. Any other non-350 is surfaced
    // as-is.
    if let Some(offset) = restart_at {
        let reply = control.execute(&format!("REST {offset}"))?;
        if reply.code == 502 {
            endpoint.dispose();
            return Err(FtpError::server_error(
                502,
                vec!["Resume is not supported by this server".to_string()],
            ));
        }
        if reply.code != 350 {
            endpoint.dispose();
            return Err(FtpError::server_error(reply.code, reply.lines));
        }
    }

    // Step 4: the transfer command itself.
    control.send_only(&command)?;

    // Step 5: open the data connection, then read the preliminary reply.
    // Some servers write to the data socket before the preliminary reply
    // arrives, so the connection must exist first.
    let mut data_conn = match endpoint.open_data_connection() {
        Ok(conn) => conn,
        Err(e) => {
            // Still owe the server a reply read for the command we sent.
            let _ = control.receive_only();
            return Err(e);
        }
    };
    let preliminary = control.receive_only()?;
    if preliminary.code != 150 && preliminary.code != 125 {
        return Err(FtpError::server_error(preliminary.code, preliminary.lines));
    }

    // Step 6: mark ongoing, register the shutdown handle, start the
    // keep-alive ticker.
    {
        let mut state = abort_state.lock().unwrap();
        if state.aborted {
            let _ = data_conn.close();
            return Err(FtpError::Aborted);
        }
        state.ongoing = true;
        state.data_shutdown_handle = Some(data_conn.try_clone()?);
    }
    let ticker = config
        .dt_auto_noop_delay
        .map(|delay| KeepAliveTicker::start(Arc::clone(control), delay));

    if let Some(l) = &listener {
        l.started(direction, total_size);
    }

    let pump_result = match direction {
        TransferDirection::Upload => {
            let source = upload_source.expect("upload transfer requires a source reader");
            let mut bounded = BoundedReader {
                inner: source,
                to_skip: stream_offset,
                remaining: stream_length,
            };
            pump(
                &mut bounded,
                &mut *data_conn,
                effective_type,
                PumpDirection::ToWire,
                listener.as_deref(),
            )
        }
        TransferDirection::Download => {
            let sink = download_sink.expect("download transfer requires a sink writer");
            pump(
                &mut *data_conn,
                sink,
                effective_type,
                PumpDirection::FromWire,
                listener.as_deref(),
            )
        }
    };

    // Step 7 done; step 8: cleanup. Always consume the trailing reply,
    // regardless of how the pump ended.
    drop(ticker);
    let _ = data_conn.close();

    let (was_aborted, abor_sent) = {
        let mut state = abort_state.lock().unwrap();
        let was_aborted = state.aborted;
        let abor_sent = state.abor_sent;
        state.ongoing = false;
        state.aborted = false;
        state.abor_sent = false;
        state.data_shutdown_handle = None;
        (was_aborted, abor_sent)
    };

    if was_aborted {
        // The interrupted transfer's own reply is always pending; a
        // second one (`ABOR`'s) is pending only if it was actually sent.
        consume_reply_best_effort(control, None);
        if abor_sent {
            consume_reply_best_effort(control, None);
        }
        if let Some(l) = &listener {
            l.aborted();
        }
        return Err(FtpError::Aborted);
    }

    match pump_result {
        Ok(bytes) => {
            let trailing = control.receive_only()?;
            if !trailing.is_success() {
                let err = FtpError::server_error(trailing.code, trailing.lines);
                if let Some(l) = &listener {
                    l.failed(&err);
                }
                return Err(err);
            }
            if let Some(l) = &listener {
                l.completed();
            }
            Ok(bytes)
        }
        Err(e) => {
            // A read timeout here is swallowed, not propagated: the pump
            // already failed, and we shouldn't hang the control channel
            // waiting for a reply a broken server may never send.
            consume_reply_best_effort(control, Some(Duration::from_secs(30)));
            if let Some(l) = &listener {
                l.failed(&e);
            }
            Err(e)
        }
    }
}

/// Forcibly end the currently-running transfer from another thread.
/// Safe to call even while the transfer thread is blocked holding the
/// session lock, since this only touches the control channel's own lock
/// and the abort lock. `send_abor` controls whether `ABOR` is sent first;
/// either way the data streams are closed so the blocked pump unblocks
/// with an `IOError`.
pub fn abort_current_transfer(
    control: &Arc<ControlChannel>,
    abort_state: &Arc<Mutex<AbortState>>,
    send_abor: bool,
) -> FtpResult<()> {
    let mut state = abort_state.lock().unwrap();
    if !state.ongoing || state.aborted {
        return Ok(());
    }
    state.aborted = true;
    if send_abor {
        control.send_only("ABOR")?;
        state.abor_sent = true;
    }
    if let Some(handle) = &state.data_shutdown_handle {
        let _ = handle.shutdown();
    }
    Ok(())
}

fn consume_reply_best_effort(control: &ControlChannel, timeout: Option<Duration>) {
    if let Some(t) = timeout {
        if let Err(e) = control.with_read_timeout(Some(t)) {
            log::warn!("could not apply read timeout before trailing reply: {e}");
        }
    }
    if let Err(e) = control.receive_only() {
        log::debug!("trailing reply not consumed (ignored): {e}");
    }
    if timeout.is_some() {
        let _ = control.with_read_timeout(None);
    }
}

/// Which way a textual pump is translating line endings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpDirection {
    /// Local bytes going out: bare `\n` is widened to `\r\n` (NVT-ASCII
    /// requires every line end in CRLF on the wire).
    ToWire,
    /// Wire bytes coming in: `\r\n` is narrowed back to `\n`.
    FromWire,
}

/// Move bytes from `src` to `dst` until EOF, translating line endings for
/// `EffectiveType::Textual` per `direction` and passing bytes through
/// untouched for `Binary`.
fn pump(
    src: &mut dyn Read,
    dst: &mut dyn Write,
    effective_type: EffectiveType,
    direction: PumpDirection,
    listener: Option<&dyn ProgressListener>,
) -> FtpResult<u64> {
    let mut buf = [0u8; PUMP_BUFFER_SIZE];
    let mut total = 0u64;
    let mut pending_cr = false;

    loop {
        let n = src.read(&mut buf).map_err(FtpError::data_transfer)?;
        if n == 0 {
            break;
        }
        match effective_type {
            EffectiveType::Binary => {
                dst.write_all(&buf[..n]).map_err(FtpError::data_transfer)?;
            }
            EffectiveType::Textual => {
                let mut out = Vec::with_capacity(n + n / 32);
                match direction {
                    PumpDirection::ToWire => {
                        for &byte in &buf[..n] {
                            if pending_cr {
                                pending_cr = false;
                                if byte != b'\n' {
                                    out.push(b'\r');
                                    out.push(b'\n');
                                }
                            }
                            if byte == b'\r' {
                                pending_cr = true;
                                continue;
                            }
                            if byte == b'\n' {
                                out.push(b'\r');
                                out.push(b'\n');
                            } else {
                                out.push(byte);
                            }
                        }
                    }
                    PumpDirection::FromWire => {
                        for &byte in &buf[..n] {
                            if pending_cr {
                                pending_cr = false;
                                if byte == b'\n' {
                                    out.push(b'\n');
                                    continue;
                                }
                                // A lone CR not followed by LF is not
                                // valid NVT-ASCII; pass it through as-is.
                                out.push(b'\r');
                            }
                            if byte == b'\r' {
                                pending_cr = true;
                                continue;
                            }
                            out.push(byte);
                        }
                    }
                }
                dst.write_all(&out).map_err(FtpError::data_transfer)?;
            }
        }
        total += n as u64;
        if let Some(l) = listener {
            l.transferred(total);
        }
    }

    if pending_cr && effective_type == EffectiveType::Textual {
        dst.write_all(b"\r").map_err(FtpError::data_transfer)?;
    }

    Ok(total)
}
