// LogPulse - core/record.rs
//
// Record building: validation, retention filtering, URL decoding, and
// per-record enrichment of a parsed line. Locations are left empty here and
// filled per batch by the file scanner.

use crate::core::enrich::Enricher;
use crate::core::model::{LogRecord, ParsedLine};
use crate::util::constants::EMPTY_USER_AGENT;
use crate::util::error::LineError;
use chrono::{DateTime, Duration, Utc};
use std::borrow::Cow;

/// Turns parsed lines into normalised records for one scan pass.
pub struct RecordBuilder<'a> {
    retention_days: u32,
    enricher: &'a dyn Enricher,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(retention_days: u32, enricher: &'a dyn Enricher) -> Self {
        Self {
            retention_days,
            enricher,
        }
    }

    /// Oldest timestamp still kept when evaluated at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        retention_cutoff(now, self.retention_days)
    }

    /// Validate and normalise one parsed line.
    ///
    /// A record exactly at the cutoff is kept.
    pub fn build(&self, line: ParsedLine, now: DateTime<Utc>) -> Result<LogRecord, LineError> {
        for (value, field) in [
            (&line.ip, "ip"),
            (&line.method, "method"),
            (&line.url, "url"),
        ] {
            if value.is_empty() {
                return Err(LineError::MissingField { field });
            }
        }
        if line.status == 0 {
            return Err(LineError::InvalidStatus {
                raw: line.status.to_string(),
            });
        }

        let cutoff = self.cutoff(now);
        if line.timestamp < cutoff {
            return Err(LineError::Expired {
                timestamp: line.timestamp,
                cutoff,
            });
        }

        let url = query_unescape(&line.url).into_owned();
        let referer = if line.referer.is_empty() {
            line.referer
        } else {
            query_unescape(&line.referer).into_owned()
        };
        let user_agent = if line.user_agent.is_empty() {
            EMPTY_USER_AGENT
        } else {
            line.user_agent.as_str()
        };

        let pageview = self.enricher.is_pageview(line.status, &url, &line.ip);
        let ua = self.enricher.parse_user_agent(user_agent);

        Ok(LogRecord {
            ip: line.ip,
            pageview,
            timestamp: line.timestamp,
            method: line.method,
            url,
            status: line.status,
            bytes_sent: line.bytes_sent,
            referer,
            browser: ua.browser,
            os: ua.os,
            device: ua.device,
            domestic_location: String::new(),
            global_location: String::new(),
        })
    }
}

/// `now - retention_days`, saturating at the earliest representable time.
pub fn retention_cutoff(now: DateTime<Utc>, retention_days: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(retention_days))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Decode a query-style escaped string (`+` is a space, `%XX` a byte).
///
/// Returns the input unchanged when an escape is malformed or the decoded
/// bytes are not valid UTF-8.
pub fn query_unescape(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['%', '+']) {
        return Cow::Borrowed(raw);
    }
    if !escapes_are_well_formed(raw) {
        return Cow::Borrowed(raw);
    }
    let spaced = raw.replace('+', " ");
    match percent_encoding::percent_decode_str(&spaced).decode_utf8() {
        Ok(decoded) => Cow::Owned(decoded.into_owned()),
        Err(_) => Cow::Borrowed(raw),
    }
}

fn escapes_are_well_formed(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|pair| pair.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}
