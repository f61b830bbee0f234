//! EPLF ("Easily Parsed List Format") directory listings.
//!
//! Each line is a leading `+`, a comma-separated list of one-letter
//! facts, a tab, then the name:
//!
//! ```text
//! +i8388621.29609,m824255902,r,s24,\tfile.txt
//! +i8388621.48594,m824255902,/,\tsubdir
//! ```
//!
//! Recognized facts: `r` (plain file), `/` (directory), `s<size>`,
//! `m<unix-seconds>`. Unrecognized facts (`i<inode>`, `up<perm>`) are
//! skipped rather than rejected, since EPLF is explicitly extensible.

use chrono::{NaiveDateTime, TimeZone, Utc};

use super::ListParser;
use crate::error::{FtpError, FtpResult};
use crate::types::{FileKind, RemoteFileEntry};

pub struct EplfListParser;

impl ListParser for EplfListParser {
    fn name(&self) -> &str {
        "eplf"
    }

    fn parse(&self, lines: &[String]) -> FtpResult<Vec<RemoteFileEntry>> {
        let mut entries = Vec::new();
        for line in lines {
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            entries.push(parse_line(line)?);
        }
        Ok(entries)
    }
}

fn parse_line(line: &str) -> FtpResult<RemoteFileEntry> {
    let rest = line
        .strip_prefix('+')
        .ok_or_else(|| FtpError::list_parse(format!("not an EPLF listing line: {line:?}")))?;
    let (facts, name) = rest
        .split_once('\t')
        .ok_or_else(|| FtpError::list_parse(format!("missing EPLF name field in: {line:?}")))?;

    let mut kind = None;
    let mut size = None;
    let mut modified = None;

    for fact in facts.split(',') {
        if fact.is_empty() {
            continue;
        }
        match fact.as_bytes()[0] {
            b'r' => kind = Some(FileKind::File),
            b'/' => kind = Some(FileKind::Dir),
            b's' => size = fact[1..].parse::<u64>().ok(),
            b'm' => {
                modified = fact[1..]
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                    .map(|dt| dt.naive_utc());
            }
            _ => {}
        }
    }

    let kind =
        kind.ok_or_else(|| FtpError::list_parse(format!("no type fact in EPLF line: {line:?}")))?;

    Ok(RemoteFileEntry {
        name: name.to_string(),
        size: size.unwrap_or(0),
        modified,
        kind,
        link_target: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_file() {
        let lines = vec!["+i8388621.29609,m824255902,r,s24,\tfile.txt".to_string()];
        let entries = EplfListParser.parse(&lines).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "file.txt");
        assert_eq!(entries[0].size, 24);
        assert_eq!(entries[0].kind, FileKind::File);
        assert!(entries[0].modified.is_some());
    }

    #[test]
    fn parses_directory() {
        let lines = vec!["+i8388621.48594,m824255902,/,\tsubdir".to_string()];
        let entries = EplfListParser.parse(&lines).unwrap();
        assert_eq!(entries[0].kind, FileKind::Dir);
        assert_eq!(entries[0].name, "subdir");
    }

    #[test]
    fn rejects_foreign_dialect() {
        let lines = vec!["-rw-r--r--   1 user group      1234 Jan 15 10:32 readme.txt".to_string()];
        assert!(EplfListParser.parse(&lines).is_err());
    }

    #[test]
    fn rejects_line_without_type_fact() {
        let lines = vec!["+i8388621.29609,m824255902,s24,\tfile.txt".to_string()];
        assert!(EplfListParser.parse(&lines).is_err());
    }
}
