//! The keep-alive ticker: while a transfer's data pump is
//! running, periodically send `NOOP` over the control channel so
//! stateful firewalls and NAT devices don't time out the otherwise-idle
//! control socket.
//!
//! Every `NOOP` send-and-receive goes through
//! [`crate::control::ControlChannel::execute`], which holds the channel's
//! internal lock across both the write and the read. That gives us the
//! atomicity we need: a `NOOP` reply can never be mistaken for the
//! trailing reply the transfer engine reads once the data pump finishes,
//! because whichever of the two threads reaches the lock first completes
//! its entire send+receive before the other starts.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::control::ControlChannel;

/// A running keep-alive ticker. Dropping or calling [`KeepAliveTicker::stop`]
/// ends the background thread; `stop` is synchronous and joins it.
pub struct KeepAliveTicker {
    stop_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl KeepAliveTicker {
    /// Start sending `NOOP` every `delay`. A `delay` of zero never spawns
    /// a thread and `stop` is a no-op — the ticker is effectively
    /// disabled.
    pub fn start(control: Arc<ControlChannel>, delay: Duration) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel();
        if delay.is_zero() {
            return Self {
                stop_tx,
                handle: None,
            };
        }

        let handle = std::thread::spawn(move || loop {
            match stop_rx.recv_timeout(delay) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    // Keep-alive failures are always swallowed: a dead
                    // control channel will surface to the foreground
                    // caller on its own next command.
                    if let Err(e) = control.execute("NOOP") {
                        log::debug!("keep-alive NOOP failed (ignored): {e}");
                    }
                }
            }
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Stop the ticker and wait for its thread to exit.
    pub fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for KeepAliveTicker {
    fn drop(&mut self) {
        self.stop_inner();
    }
}
