//! NetWare FTP server directory listings.
//!
//! ```text
//! d [R----F--] supervisor              512       Jan 16 18:53    login
//! - [R----F--] rion                  146004       Jan 16 18:53    agenda.txt
//! ```
//!
//! One type character, a bracketed rights string, an owner, a size, a
//! date, and a name — no link count or group column, unlike Unix `ls -l`.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;

use super::ListParser;
use crate::error::{FtpError, FtpResult};
use crate::types::{FileKind, RemoteFileEntry};

lazy_static! {
    static ref LINE_RE: Regex = Regex::new(
        r"(?x)
        ^([d\-])\s+              # type
        \[[^\]]*\]\s+            # bracketed rights
        \S+\s+                   # owner
        (\d+)\s+                 # size
        (\w{3}\s+\d{1,2}\s+(?:\d{4}|\d{1,2}:\d{2}))\s+ # date
        (.+)$                    # name
        "
    )
    .unwrap();
}

pub struct NetwareListParser;

impl ListParser for NetwareListParser {
    fn name(&self) -> &str {
        "netware"
    }

    fn parse(&self, lines: &[String]) -> FtpResult<Vec<RemoteFileEntry>> {
        let mut entries = Vec::new();
        for line in lines {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let caps = LINE_RE.captures(line).ok_or_else(|| {
                FtpError::list_parse(format!("not a netware listing line: {line:?}"))
            })?;

            let kind = if &caps[1] == "d" {
                FileKind::Dir
            } else {
                FileKind::File
            };
            let size: u64 = caps[2]
                .parse()
                .map_err(|_| FtpError::list_parse(format!("bad size in: {line:?}")))?;
            let modified = parse_netware_date(&caps[3]);

            entries.push(RemoteFileEntry {
                name: caps[4].to_string(),
                size,
                modified,
                kind,
                link_target: None,
            });
        }
        Ok(entries)
    }
}

fn parse_netware_date(raw: &str) -> Option<NaiveDateTime> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.len() != 3 {
        return None;
    }
    let (month, day, last) = (parts[0], parts[1], parts[2]);

    if let Some((hour, minute)) = last.split_once(':') {
        let year = Local::now().year();
        let date = NaiveDate::parse_from_str(&format!("{month} {day} {year}"), "%b %d %Y").ok()?;
        let time = NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)?;
        Some(NaiveDateTime::new(date, time))
    } else {
        let date = NaiveDate::parse_from_str(&format!("{month} {day} {last}"), "%b %d %Y").ok()?;
        date.and_hms_opt(0, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_entry() {
        let lines =
            vec!["- [R----F--] rion                  146004       Jan 16 18:53    agenda.txt".to_string()];
        let entries = NetwareListParser.parse(&lines).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, FileKind::File);
        assert_eq!(entries[0].size, 146004);
        assert_eq!(entries[0].name, "agenda.txt");
    }

    #[test]
    fn parses_directory_entry() {
        let lines =
            vec!["d [R----F--] supervisor              512       Jan 16 18:53    login".to_string()];
        let entries = NetwareListParser.parse(&lines).unwrap();
        assert_eq!(entries[0].kind, FileKind::Dir);
        assert_eq!(entries[0].name, "login");
    }

    #[test]
    fn rejects_foreign_dialect() {
        let lines = vec!["01-15-26  10:32AM       <DIR>          subdir".to_string()];
        assert!(NetwareListParser.parse(&lines).is_err());
    }
}
