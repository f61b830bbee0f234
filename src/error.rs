//! Crate error type.
//!
//! Taxonomy follows the seven failure modes distinguished by the reference
//! design: a command issued in the wrong state, a transport failure, a
//! malformed reply, a legal-but-unsuccessful reply, a data-pump transport
//! failure, a concurrent abort, and an unrecognized directory listing.

use std::fmt;
use std::io;

/// Result alias used throughout the crate.
pub type FtpResult<T> = Result<T, FtpError>;

/// A categorized FTP client error.
#[derive(Debug)]
pub enum FtpError {
    /// A command was issued in a session state that forbids it (not
    /// connected, not authenticated, already connected, transfer already
    /// in progress, ...).
    IllegalState(String),
    /// Transport failure on a control- or data-channel read/write.
    Io(io::Error),
    /// A reply was structurally malformed, or metadata inside it
    /// (PWD quoting, MDTM format, SIZE number, PASV sextuple) could not
    /// be parsed.
    IllegalReply(String),
    /// A legal reply carried a non-success code in a context requiring
    /// success.
    ServerError { code: u16, lines: Vec<String> },
    /// A data-channel transport failure during a transfer, wrapping the
    /// underlying I/O error.
    DataTransferError(io::Error),
    /// The transfer was ended by a concurrent `abort_current_transfer`
    /// call.
    Aborted,
    /// No registered list parser accepted a directory listing.
    ListParseError(String),
}

impl FtpError {
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    pub fn illegal_reply(msg: impl Into<String>) -> Self {
        Self::IllegalReply(msg.into())
    }

    pub fn list_parse(msg: impl Into<String>) -> Self {
        Self::ListParseError(msg.into())
    }

    pub fn data_transfer(e: io::Error) -> Self {
        Self::DataTransferError(e)
    }

    /// Build a `ServerError` from a reply that failed an expectation.
    pub fn server_error(code: u16, lines: Vec<String>) -> Self {
        Self::ServerError { code, lines }
    }

    /// The reply code, if this error wraps one.
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::ServerError { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalState(msg) => write!(f, "illegal state: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::IllegalReply(msg) => write!(f, "illegal reply: {msg}"),
            Self::ServerError { code, lines } => {
                write!(f, "server error {code}: {}", lines.join(" "))
            }
            Self::DataTransferError(e) => write!(f, "data transfer error: {e}"),
            Self::Aborted => write!(f, "transfer aborted"),
            Self::ListParseError(msg) => write!(f, "list parse error: {msg}"),
        }
    }
}

impl std::error::Error for FtpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::DataTransferError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FtpError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
