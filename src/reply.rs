//! The FTP reply framer (RFC 959 §4, reply format).
//!
//! A reply is either single-line (`NNN SP text`) or multi-line: the first
//! line has the form `NNN-text`, and every following line is a
//! continuation until one begins with the same three-digit code followed
//! by a space. Leading whitespace in continuation lines is preserved
//! verbatim — only the trailing CRLF is stripped.

use std::io::BufRead;

use crate::error::{FtpError, FtpResult};

/// A single (possibly multi-line) FTP reply. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    /// All lines joined with `\n`, for error messages and diagnostics.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// 1xx/2xx/3xx — a reply that does not require the caller to treat
    /// the command as failed.
    pub fn is_success(&self) -> bool {
        matches!(self.code, 100..=399)
    }

    /// 1xx — positive preliminary reply.
    pub fn is_preliminary(&self) -> bool {
        matches!(self.code, 100..=199)
    }

    /// 2xx — positive completion reply.
    pub fn is_completion(&self) -> bool {
        matches!(self.code, 200..=299)
    }

    /// 3xx — positive intermediate reply.
    pub fn is_intermediate(&self) -> bool {
        matches!(self.code, 300..=399)
    }

    /// First digit of the reply code (1-5).
    pub fn class(&self) -> u16 {
        self.code / 100
    }
}

/// Read one complete reply from `reader`, which must yield CRLF-terminated
/// lines already decoded to valid UTF-8 text.
///
/// Fails with `IllegalReply` on any protocol violation (non-digit code,
/// code outside 100-599, or EOF before a multi-line reply's terminator),
/// and propagates the underlying `Io` error on transport failure.
pub fn read_reply(reader: &mut impl BufRead) -> FtpResult<Reply> {
    let first = read_line(reader)?;
    if first.len() < 4 {
        return Err(FtpError::illegal_reply(format!(
            "reply line too short: {first:?}"
        )));
    }

    if !first.as_bytes()[..3].iter().all(u8::is_ascii_digit) {
        return Err(FtpError::illegal_reply(format!(
            "non-numeric reply code in: {first:?}"
        )));
    }
    let code = parse_code(&first[..3])?;
    let sep = first.as_bytes()[3];
    let mut lines = vec![first[4..].to_string()];

    if sep == b'-' {
        let terminator_code = first[..3].to_string();
        loop {
            let line = read_line(reader)?;
            if line.len() >= 4
                && line.as_bytes()[3] == b' '
                && line.starts_with(&terminator_code)
            {
                lines.push(line[4..].to_string());
                break;
            }
            lines.push(line);
        }
    } else if sep != b' ' {
        return Err(FtpError::illegal_reply(format!(
            "malformed reply separator in: {first:?}"
        )));
    }

    Ok(Reply { code, lines })
}

fn parse_code(digits: &str) -> FtpResult<u16> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FtpError::illegal_reply(format!(
            "non-numeric reply code: {digits:?}"
        )));
    }
    let code: u16 = digits
        .parse()
        .map_err(|_| FtpError::illegal_reply(format!("reply code out of range: {digits:?}")))?;
    if !(100..=599).contains(&code) {
        return Err(FtpError::illegal_reply(format!(
            "reply code out of range: {code}"
        )));
    }
    Ok(code)
}

/// Read one CRLF (or bare LF)-terminated line, stripped of its terminator.
fn read_line(reader: &mut impl BufRead) -> FtpResult<String> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(FtpError::illegal_reply("EOF mid-reply"));
    }
    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    String::from_utf8(buf).map_err(|e| FtpError::illegal_reply(format!("non-UTF-8 reply: {e}")))
}
