//! Directory-listing dialect fan-out.
//!
//! A `LIST` reply's body is just lines of server-specific text; which
//! dialect it's written in is not negotiated. [`ListParser`] is the
//! per-dialect parsing contract — pluggable, like the connector — with
//! four built-in implementations and a [`registry::ListParserRegistry`]
//! that probes them in order and remembers whichever one first succeeds.

pub mod dos;
pub mod eplf;
pub mod netware;
pub mod registry;
pub mod unix;

use crate::error::FtpResult;
use crate::types::RemoteFileEntry;

/// Parses one directory-listing dialect's output into structured entries.
pub trait ListParser: Send + Sync {
    /// A short name for diagnostics (e.g. `"unix"`, `"dos"`).
    fn name(&self) -> &str;

    /// Parse a full `LIST` reply body. Returns `Err` if even one line
    /// doesn't match this dialect — a registry never accepts a partial
    /// match as a win.
    fn parse(&self, lines: &[String]) -> FtpResult<Vec<RemoteFileEntry>>;
}

pub use dos::DosListParser;
pub use eplf::EplfListParser;
pub use netware::NetwareListParser;
pub use registry::ListParserRegistry;
pub use unix::UnixListParser;
