//! # ftpclient — blocking FTP client
//!
//! RFC 959 plus the extensions that matter in practice: `FEAT`, `SIZE`,
//! `MDTM`, `REST`, `PASV`, the `OPTS UTF8 ON` option, `NLST`, and `LIST`
//! across four directory-listing dialects (Unix, DOS, EPLF, NetWare).
//!
//! The entry point is [`Session`]: one control connection, one command
//! in flight at a time, with transfers abortable from another thread
//! while they're running. [`connector::Connector`] and
//! [`listing::ListParser`] are the two seams meant for callers to extend
//! — a custom transport (SOCKS, an HTTP proxy) or an extra listing
//! dialect plug in without touching the rest of the crate.
//!
//! ```no_run
//! use ftpclient::Session;
//! use ftpclient::session::DownloadOptions;
//!
//! # fn main() -> ftpclient::error::FtpResult<()> {
//! let session = Session::new();
//! session.connect("ftp.example.com", 21)?;
//! session.login("anonymous", Some("guest@example.com"), None)?;
//!
//! let mut out = Vec::new();
//! session.download("README.txt", &mut out, DownloadOptions::default())?;
//! session.disconnect(true)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connector;
pub mod control;
pub mod data_endpoint;
pub mod error;
pub mod keepalive;
pub mod listing;
pub mod reply;
pub mod session;
#[cfg(feature = "tls")]
pub mod tls;
pub mod transfer_engine;
pub mod type_selector;
pub mod types;

pub use error::{FtpError, FtpResult};
pub use session::{DownloadOptions, Session, UploadOptions};
pub use type_selector::TransferType;
pub use types::{FileKind, RemoteFileEntry};
