//! Unix `ls -l`-style directory listings.
//!
//! ```text
//! drwxr-xr-x   2 user group      4096 Jan 15 10:32 subdir
//! -rw-r--r--   1 user group      1234 Jan 15 10:32 readme.txt
//! lrwxrwxrwx   1 user group        11 Jan 15 10:32 current -> releases/1
//! ```

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;

use super::ListParser;
use crate::error::{FtpError, FtpResult};
use crate::types::{FileKind, RemoteFileEntry};

lazy_static! {
    static ref LINE_RE: Regex = Regex::new(
        r"(?x)
        ^([\-dlbcps])            # file type
        ([\-rwxXsStT]{9})\s+     # permissions
        \d+\s+                  # link count
        \S+\s+                  # owner
        \S+\s+                  # group
        (\d+)\s+                # size
        (\w{3}\s+\d{1,2}\s+(?:\d{4}|\d{1,2}:\d{2}))\s+ # date
        (.+)$                    # name (and, for symlinks, ' -> target')
        "
    )
    .unwrap();
}

pub struct UnixListParser;

impl ListParser for UnixListParser {
    fn name(&self) -> &str {
        "unix"
    }

    fn parse(&self, lines: &[String]) -> FtpResult<Vec<RemoteFileEntry>> {
        let mut entries = Vec::new();
        for line in lines {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with("total ") {
                continue;
            }
            let caps = LINE_RE
                .captures(line)
                .ok_or_else(|| FtpError::list_parse(format!("not a unix listing line: {line:?}")))?;

            let type_char = &caps[1];
            let size: u64 = caps[3]
                .parse()
                .map_err(|_| FtpError::list_parse(format!("bad size in: {line:?}")))?;
            let modified = parse_unix_date(&caps[4]);
            let rest = caps[5].to_string();

            let (kind, name, link_target) = match type_char {
                "d" => (FileKind::Dir, rest, None),
                "l" => match rest.split_once(" -> ") {
                    Some((name, target)) => {
                        (FileKind::Link, name.to_string(), Some(target.to_string()))
                    }
                    None => (FileKind::Link, rest, None),
                },
                _ => (FileKind::File, rest, None),
            };

            entries.push(RemoteFileEntry {
                name,
                size,
                modified,
                kind,
                link_target,
            });
        }
        Ok(entries)
    }
}

/// Parse the loose `Mon D HH:MM` (current year, time known) or
/// `Mon D YYYY` (year known, time unknown) date Unix `ls` emits.
fn parse_unix_date(raw: &str) -> Option<NaiveDateTime> {
    let normalized: Vec<&str> = raw.split_whitespace().collect();
    if normalized.len() != 3 {
        return None;
    }
    let (month, day, last) = (normalized[0], normalized[1], normalized[2]);

    if let Some((hour, minute)) = last.split_once(':') {
        let year = Local::now().year();
        let date_str = format!("{month} {day} {year}");
        let date = NaiveDate::parse_from_str(&date_str, "%b %d %Y").ok()?;
        let time = NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)?;
        Some(NaiveDateTime::new(date, time))
    } else {
        let date_str = format!("{month} {day} {last}");
        let date = NaiveDate::parse_from_str(&date_str, "%b %d %Y").ok()?;
        Some(date.and_hms_opt(0, 0, 0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_file() {
        let lines = vec!["-rw-r--r--   1 user group      1234 Jan 15 10:32 readme.txt".to_string()];
        let entries = UnixListParser.parse(&lines).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "readme.txt");
        assert_eq!(entries[0].size, 1234);
        assert_eq!(entries[0].kind, FileKind::File);
    }

    #[test]
    fn parses_directory() {
        let lines = vec!["drwxr-xr-x   2 user group      4096 Jan 15 10:32 subdir".to_string()];
        let entries = UnixListParser.parse(&lines).unwrap();
        assert_eq!(entries[0].kind, FileKind::Dir);
        assert_eq!(entries[0].name, "subdir");
    }

    #[test]
    fn parses_symlink_target() {
        let lines =
            vec!["lrwxrwxrwx   1 user group        11 Jan 15 10:32 current -> releases/1".to_string()];
        let entries = UnixListParser.parse(&lines).unwrap();
        assert_eq!(entries[0].kind, FileKind::Link);
        assert_eq!(entries[0].name, "current");
        assert_eq!(entries[0].link_target.as_deref(), Some("releases/1"));
    }

    #[test]
    fn skips_total_line_and_blank_lines() {
        let lines = vec![
            "total 8".to_string(),
            "".to_string(),
            "-rw-r--r--   1 user group      1234 Jan 15 10:32 readme.txt".to_string(),
        ];
        let entries = UnixListParser.parse(&lines).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn rejects_foreign_dialect() {
        let lines = vec!["01-15-26  10:32AM       <DIR>          subdir".to_string()];
        assert!(UnixListParser.parse(&lines).is_err());
    }
}
