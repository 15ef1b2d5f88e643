//! Person identities and git's timestamp encoding.
//!
//! Commits, tags and reflog lines all carry `Name <email> <secs> <zone>`
//! where `<zone>` is the `±HHMM` offset the identity was recorded in.

use bstr::{BStr, BString, ByteSlice};
use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone};

use crate::{Result, UtilError};

/// Seconds since the epoch plus the recorded UTC offset in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GitTime {
    pub seconds: i64,
    /// Offset east of UTC, in minutes (-300 for EST).
    pub offset_minutes: i32,
}

impl GitTime {
    pub fn new(seconds: i64, offset_minutes: i32) -> Self {
        Self {
            seconds,
            offset_minutes,
        }
    }

    /// The current wall-clock time in the local zone.
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            seconds: now.timestamp(),
            offset_minutes: now.offset().fix().local_minus_utc() / 60,
        }
    }

    /// Render the zone as git writes it: `+0130`, `-0500`.
    pub fn zone(&self) -> String {
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        let abs = self.offset_minutes.unsigned_abs();
        format!("{}{:02}{:02}", sign, abs / 60, abs % 60)
    }

    /// Parse a `±HHMM` zone token into minutes east of UTC.
    pub fn parse_zone(token: &str) -> Result<i32> {
        let bytes = token.as_bytes();
        if bytes.len() != 5 || (bytes[0] != b'+' && bytes[0] != b'-') {
            return Err(UtilError::BadTime(format!("bad zone: {token}")));
        }
        let digits: i32 = token[1..]
            .parse()
            .map_err(|_| UtilError::BadTime(format!("bad zone: {token}")))?;
        let minutes = (digits / 100) * 60 + digits % 100;
        Ok(if bytes[0] == b'-' { -minutes } else { minutes })
    }

    /// Format the timestamp for human output, honoring the stored zone.
    pub fn to_iso(&self) -> String {
        let offset = FixedOffset::east_opt(self.offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
        match offset.timestamp_opt(self.seconds, 0) {
            chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S %z").to_string(),
            _ => format!("{} {}", self.seconds, self.zone()),
        }
    }

    /// Parse an RFC 3339 / RFC 2822 / raw `"<secs> <zone>"` date.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(UtilError::BadTime("empty date".into()));
        }

        if let Some((secs, zone)) = input.split_once(' ') {
            if let (Ok(seconds), Ok(offset)) = (secs.parse::<i64>(), Self::parse_zone(zone)) {
                return Ok(Self::new(seconds, offset));
            }
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
            return Ok(Self::new(dt.timestamp(), dt.offset().local_minus_utc() / 60));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(input) {
            return Ok(Self::new(dt.timestamp(), dt.offset().local_minus_utc() / 60));
        }
        Err(UtilError::BadTime(input.into()))
    }
}

/// A person identity as it appears in commit and tag headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: BString,
    pub email: BString,
    pub when: GitTime,
}

impl Ident {
    pub fn new(name: impl Into<BString>, email: impl Into<BString>, when: GitTime) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            when,
        }
    }

    /// Serialize as `Name <email> <secs> <zone>`.
    pub fn to_bytes(&self) -> BString {
        let mut out = BString::from(Vec::with_capacity(
            self.name.len() + self.email.len() + 24,
        ));
        out.extend_from_slice(&self.name);
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(b"> ");
        out.extend_from_slice(self.when.seconds.to_string().as_bytes());
        out.extend_from_slice(b" ");
        out.extend_from_slice(self.when.zone().as_bytes());
        out
    }

    /// Parse `Name <email> <secs> <zone>`.
    pub fn parse(line: &BStr) -> Result<Self> {
        let lt = line
            .find_byte(b'<')
            .ok_or_else(|| UtilError::BadIdent(line.to_string()))?;
        let gt = line[lt..]
            .find_byte(b'>')
            .map(|i| i + lt)
            .ok_or_else(|| UtilError::BadIdent(line.to_string()))?;

        let name = line[..lt].trim_end_with(|c| c == ' ');
        let email = &line[lt + 1..gt];

        let rest = line[gt + 1..].trim_with(|c| c == ' ');
        let mut parts = rest.split_str(" ");
        let seconds: i64 = parts
            .next()
            .and_then(|s| s.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| UtilError::BadIdent(line.to_string()))?;
        let offset = match parts.next().and_then(|z| z.to_str().ok()) {
            Some(zone) => GitTime::parse_zone(zone)?,
            None => 0,
        };

        Ok(Self {
            name: BString::from(name),
            email: BString::from(email),
            when: GitTime::new(seconds, offset),
        })
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}
