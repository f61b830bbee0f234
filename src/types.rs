//! Shared data-model types that don't belong to any single
//! component: what a directory listing entry looks like, and the kind of
//! remote object it names.

use chrono::NaiveDateTime;

/// What kind of filesystem object a [`RemoteFileEntry`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    Link,
}

/// One entry in a parsed directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileEntry {
    pub name: String,
    /// `0` when the dialect has no byte count to report for this entry
    /// (e.g. a DOS-style `<DIR>` line), not an absent value.
    pub size: u64,
    pub modified: Option<NaiveDateTime>,
    pub kind: FileKind,
    /// Set only for `FileKind::Link`, when the dialect exposes it
    /// (`name -> target` in Unix-style listings).
    pub link_target: Option<String>,
}
