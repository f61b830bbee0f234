//! The list parser registry: tries each registered dialect
//! in order until one accepts the whole listing, then remembers which one
//! worked so later listings skip straight to it.
//!
//! The cache itself (`Option<usize>`) lives in the session's state, not
//! here — the registry is stateless and shared, while the cache is
//! per-session and cleared on every new connection.

use crate::error::FtpResult;
use crate::types::RemoteFileEntry;

use super::{DosListParser, EplfListParser, ListParser, NetwareListParser, UnixListParser};

/// An ordered set of directory-listing dialect parsers.
pub struct ListParserRegistry {
    parsers: Vec<Box<dyn ListParser>>,
}

impl ListParserRegistry {
    /// The four built-in dialects, in the order they're probed: Unix is
    /// overwhelmingly the most common server in the wild, so it goes
    /// first.
    pub fn with_builtins() -> Self {
        Self {
            parsers: vec![
                Box::new(UnixListParser),
                Box::new(DosListParser),
                Box::new(EplfListParser),
                Box::new(NetwareListParser),
            ],
        }
    }

    pub fn new() -> Self {
        Self { parsers: Vec::new() }
    }

    /// Append a parser to the end of the probe order.
    pub fn register(&mut self, parser: Box<dyn ListParser>) {
        self.parsers.push(parser);
    }

    /// Parse `lines` using `cached` if set, else probe every registered
    /// parser in order and remember whichever one succeeds first.
    ///
    /// A cache hit that fails to parse is *not* retried against the other
    /// parsers — a server's dialect doesn't change mid-session, so a
    /// failure there means the listing itself is malformed, not that the
    /// cache went stale.
    pub fn parse(
        &self,
        lines: &[String],
        cached: &mut Option<usize>,
    ) -> FtpResult<Vec<RemoteFileEntry>> {
        if let Some(idx) = *cached {
            return self.parsers[idx].parse(lines);
        }

        let mut last_err = None;
        for (idx, parser) in self.parsers.iter().enumerate() {
            match parser.parse(lines) {
                Ok(entries) => {
                    *cached = Some(idx);
                    return Ok(entries);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            crate::error::FtpError::list_parse("no registered list parser and no listing to parse")
        }))
    }
}

impl Default for ListParserRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_first_successful_parser() {
        let registry = ListParserRegistry::with_builtins();
        let mut cached = None;
        let unix_listing =
            vec!["-rw-r--r--   1 user group      1234 Jan 15 10:32 readme.txt".to_string()];
        registry.parse(&unix_listing, &mut cached).unwrap();
        assert_eq!(cached, Some(0));

        // A second, still-unix listing reuses the cached parser.
        let second = vec!["drwxr-xr-x   2 user group      4096 Jan 15 10:32 subdir".to_string()];
        let entries = registry.parse(&second, &mut cached).unwrap();
        assert_eq!(entries[0].name, "subdir");
        assert_eq!(cached, Some(0));
    }

    #[test]
    fn cache_miss_does_not_reprobe_other_dialects() {
        let registry = ListParserRegistry::with_builtins();
        let mut cached = Some(0); // pinned to unix
        let dos_listing = vec!["01-15-26  10:32AM       <DIR>          subdir".to_string()];
        // Even though the DOS parser would accept this, a cached unix
        // parser must not be bypassed.
        assert!(registry.parse(&dos_listing, &mut cached).is_err());
    }

    #[test]
    fn fails_when_no_dialect_matches() {
        let registry = ListParserRegistry::with_builtins();
        let mut cached = None;
        let garbage = vec!["not a listing line at all".to_string()];
        assert!(registry.parse(&garbage, &mut cached).is_err());
        assert_eq!(cached, None);
    }
}
