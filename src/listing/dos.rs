//! DOS/IIS-style directory listings, as emitted by Microsoft FTP servers.
//!
//! ```text
//! 01-15-26  10:32AM       <DIR>          subdir
//! 01-15-26  10:32AM             1234 readme.txt
//! ```

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;

use super::ListParser;
use crate::error::{FtpError, FtpResult};
use crate::types::{FileKind, RemoteFileEntry};

lazy_static! {
    static ref LINE_RE: Regex = Regex::new(
        r"(?x)
        ^(\d{2}-\d{2}-\d{2,4})\s+   # date
        (\d{1,2}:\d{2}(?:AM|PM))\s+ # time
        (<DIR>|\d+)\s+              # <DIR> or size
        (.+)$                       # name
        "
    )
    .unwrap();
}

pub struct DosListParser;

impl ListParser for DosListParser {
    fn name(&self) -> &str {
        "dos"
    }

    fn parse(&self, lines: &[String]) -> FtpResult<Vec<RemoteFileEntry>> {
        let mut entries = Vec::new();
        for line in lines {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let caps = LINE_RE
                .captures(line)
                .ok_or_else(|| FtpError::list_parse(format!("not a dos listing line: {line:?}")))?;

            let modified = parse_windows_date(&caps[1], &caps[2]);
            let (kind, size) = if &caps[3] == "<DIR>" {
                (FileKind::Dir, 0)
            } else {
                let size: u64 = caps[3]
                    .parse()
                    .map_err(|_| FtpError::list_parse(format!("bad size in: {line:?}")))?;
                (FileKind::File, size)
            };

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

fn parse_windows_date(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date, "%m-%d-%Y")
        .or_else(|_| NaiveDate::parse_from_str(date, "%m-%d-%y"))
        .ok()?;
    let time = NaiveTime::parse_from_str(time, "%I:%M%p").ok()?;
    Some(NaiveDateTime::new(date, time))
}
