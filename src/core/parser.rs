// LogPulse - core/parser.rs
//
// Line parser compilation and per-line field extraction.
// Core layer: operates on `&str` lines, never touches the filesystem.
//
// A site's parser is compiled once from its configuration. Priority:
//   1. `log_regex` (anchored if needed)
//   2. `log_format` template (translated by `core::format`)
//   3. `caddy` log type (structured JSON strategy)
//   4. nginx / unset log type (built-in combined pattern)
// Any other log type with neither a regex nor a template is rejected.

use crate::core::fields::{FieldIndex, SemanticField};
use crate::core::format::{ensure_anchors, template_to_pattern};
use crate::core::json_fields::{parse_object, JsonView};
use crate::core::model::{LogType, ParsedLine, SiteConfig};
use crate::core::timestamp::{resolve_json_time, resolve_time};
use crate::util::constants::{DEFAULT_NGINX_PATTERN, MAX_REGEX_PATTERN_LENGTH};
use crate::util::error::{FieldProblem, FormatError, LineError, TimeError};
use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use std::fmt;

/// Where a compiled parser's pattern came from. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserSource {
    Default,
    LogRegex,
    LogFormat,
    CaddyJson,
}

impl ParserSource {
    fn origin(self) -> &'static str {
        match self {
            ParserSource::Default => "default",
            ParserSource::LogRegex => "log_regex",
            ParserSource::LogFormat => "log_format",
            ParserSource::CaddyJson => "caddy",
        }
    }
}

impl fmt::Display for ParserSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.origin())
    }
}

#[derive(Debug)]
enum Strategy {
    Pattern { regex: Regex, fields: FieldIndex },
    CaddyJson,
}

/// Compiled, immutable parser for one site's dialect.
#[derive(Debug)]
pub struct LineParser {
    strategy: Strategy,
    time_layout: Option<String>,
    source: ParserSource,
}

/// JSON keys tried in order for the Caddy time value.
const CADDY_TIME_KEYS: [&str; 3] = ["ts", "time", "timestamp"];

impl LineParser {
    /// Compile the parser for `site`.
    pub fn compile(site: &SiteConfig) -> Result<Self, FormatError> {
        let time_layout = site
            .time_layout
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string);

        let regex_cfg = non_blank(site.log_regex.as_deref());
        let format_cfg = non_blank(site.log_format.as_deref());

        let (pattern, source) = if let Some(re) = regex_cfg {
            (ensure_anchors(re), ParserSource::LogRegex)
        } else if let Some(template) = format_cfg {
            (template_to_pattern(template)?, ParserSource::LogFormat)
        } else {
            match &site.log_type {
                LogType::Caddy => {
                    return Ok(Self {
                        strategy: Strategy::CaddyJson,
                        time_layout,
                        source: ParserSource::CaddyJson,
                    });
                }
                LogType::Nginx => (DEFAULT_NGINX_PATTERN.to_string(), ParserSource::Default),
                LogType::Other(other) => {
                    return Err(FormatError::UnsupportedLogType {
                        site_id: site.id.clone(),
                        log_type: other.clone(),
                    });
                }
            }
        };

        let (regex, fields) = compile_pattern(&pattern, source.origin())?;
        tracing::debug!(
            site = %site.id,
            source = %source,
            groups = regex.capture_names().flatten().count(),
            "Line parser compiled"
        );

        Ok(Self {
            strategy: Strategy::Pattern { regex, fields },
            time_layout,
            source,
        })
    }

    pub fn source(&self) -> ParserSource {
        self.source
    }

    /// Extract the raw fields of one line and resolve its time.
    pub fn parse_line(&self, line: &str) -> Result<ParsedLine, LineError> {
        match &self.strategy {
            Strategy::Pattern { regex, fields } => {
                let caps = regex.captures(line).ok_or(LineError::NoMatch)?;
                self.extract_pattern(&caps, fields)
            }
            Strategy::CaddyJson => self.extract_caddy(line),
        }
    }

    fn extract_pattern(&self, caps: &Captures<'_>, fields: &FieldIndex) -> Result<ParsedLine, LineError> {
        let get = |field: SemanticField| capture(caps, fields, field);

        let mut method = get(SemanticField::Method).to_string();
        let mut url = get(SemanticField::Url).to_string();
        let request = get(SemanticField::Request);

        if (method.is_empty() || url.is_empty()) && !request.is_empty() {
            let (m, u) = split_request_line(request)?;
            if method.is_empty() {
                method = m;
            }
            if url.is_empty() {
                url = u;
            }
        }

        let ip = get(SemanticField::Ip);
        let raw_time = get(SemanticField::Time);
        let raw_status = get(SemanticField::Status);

        for (value, field) in [
            (ip, SemanticField::Ip),
            (raw_time, SemanticField::Time),
            (raw_status, SemanticField::Status),
            (url.as_str(), SemanticField::Url),
        ] {
            if value.is_empty() {
                return Err(LineError::MissingField {
                    field: field.label(),
                });
            }
        }

        let timestamp = resolve_time(raw_time, self.time_layout.as_deref())?;
        let status = parse_status(raw_status)?;

        let bytes_sent = match get(SemanticField::Bytes) {
            "" | "-" => 0,
            raw => raw.parse::<u64>().unwrap_or(0),
        };

        Ok(ParsedLine {
            ip: ip.to_string(),
            timestamp,
            method,
            url,
            status,
            bytes_sent,
            referer: get(SemanticField::Referer).to_string(),
            user_agent: get(SemanticField::UserAgent).to_string(),
        })
    }

    fn extract_caddy(&self, line: &str) -> Result<ParsedLine, LineError> {
        let payload = parse_object(line)?;
        let root = JsonView::new(&payload);
        let request = root.object("request");
        let headers = request.object("headers");

        let ip = first_string(&[(request, "remote_ip"), (request, "client_ip"), (root, "remote_ip")])?;
        let method = json_string(&request, "method")?;
        let url = json_string(&request, "uri")?;

        let status = match root.integer("status") {
            Ok(code) => u16::try_from(code)
                .ok()
                .filter(|c| *c > 0)
                .ok_or_else(|| LineError::InvalidStatus {
                    raw: code.to_string(),
                })?,
            Err(problem) => {
                return Err(LineError::JsonField {
                    field: "status",
                    problem,
                })
            }
        };

        let bytes_sent = match root.integer("size") {
            Ok(n) => u64::try_from(n).unwrap_or(0),
            Err(FieldProblem::Absent) => 0,
            Err(problem) => {
                return Err(LineError::JsonField {
                    field: "size",
                    problem,
                })
            }
        };

        let timestamp = self.caddy_time(&root)?;

        Ok(ParsedLine {
            ip,
            timestamp,
            method,
            url,
            status,
            bytes_sent,
            referer: headers.header("Referer").unwrap_or_default(),
            user_agent: headers.header("User-Agent").unwrap_or_default(),
        })
    }

    /// First of `ts`, `time`, `timestamp` that resolves. Reports the last
    /// resolution failure, or an absent `ts` when none is present.
    fn caddy_time(&self, root: &JsonView<'_>) -> Result<DateTime<Utc>, LineError> {
        let mut last_err: Option<TimeError> = None;
        for key in CADDY_TIME_KEYS {
            if let Some(value) = root.value(key) {
                match resolve_json_time(value, self.time_layout.as_deref()) {
                    Ok(ts) => return Ok(ts),
                    Err(e) => last_err = Some(e),
                }
            }
        }
        Err(match last_err {
            Some(e) => LineError::Timestamp(e),
            None => LineError::JsonField {
                field: CADDY_TIME_KEYS[0],
                problem: FieldProblem::Absent,
            },
        })
    }
}

/// Text of the group supplying `field`, empty when absent or unmatched.
fn capture<'t>(caps: &Captures<'t>, fields: &FieldIndex, field: SemanticField) -> &'t str {
    fields
        .get(field)
        .and_then(|idx| caps.get(idx))
        .map_or("", |m| m.as_str())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Compile and validate a pattern: length limit, named groups, and the
/// mandatory semantic fields.
fn compile_pattern(pattern: &str, origin: &'static str) -> Result<(Regex, FieldIndex), FormatError> {
    if pattern.len() > MAX_REGEX_PATTERN_LENGTH {
        return Err(FormatError::RegexTooLong {
            origin,
            length: pattern.len(),
            max_length: MAX_REGEX_PATTERN_LENGTH,
        });
    }

    let regex = Regex::new(pattern).map_err(|source| FormatError::InvalidRegex {
        origin,
        pattern: pattern.to_string(),
        source,
    })?;

    let named: Vec<(usize, &str)> = regex
        .capture_names()
        .enumerate()
        .filter_map(|(idx, name)| name.map(|n| (idx, n)))
        .collect();
    if named.is_empty() {
        return Err(FormatError::NoNamedGroups { origin });
    }

    let fields = FieldIndex::resolve(named.iter().copied());
    for field in [SemanticField::Ip, SemanticField::Time, SemanticField::Status] {
        if !fields.has(field) {
            return Err(FormatError::MissingField {
                origin,
                field: field.label(),
                accepted: field.aliases(),
            });
        }
    }
    if !fields.has(SemanticField::Url) && !fields.has(SemanticField::Request) {
        return Err(FormatError::MissingField {
            origin,
            field: "url or request",
            accepted: SemanticField::Url.aliases(),
        });
    }

    Ok((regex, fields))
}

/// Split `GET /path HTTP/1.1` into method and URL.
fn split_request_line(request: &str) -> Result<(String, String), LineError> {
    let mut parts = request.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(method), Some(url)) => Ok((method.to_string(), url.to_string())),
        _ => Err(LineError::InvalidRequestLine {
            request: request.to_string(),
        }),
    }
}

fn parse_status(raw: &str) -> Result<u16, LineError> {
    raw.trim()
        .parse::<u16>()
        .ok()
        .filter(|code| *code > 0)
        .ok_or_else(|| LineError::InvalidStatus {
            raw: raw.to_string(),
        })
}

/// Optional JSON string: absent reads as empty, wrong type is an error.
fn json_string(view: &JsonView<'_>, key: &'static str) -> Result<String, LineError> {
    view.non_empty_string(key)
        .map(Option::unwrap_or_default)
        .map_err(|problem| LineError::JsonField {
            field: key,
            problem,
        })
}

fn first_string(candidates: &[(JsonView<'_>, &'static str)]) -> Result<String, LineError> {
    for &(view, key) in candidates {
        let value = json_string(&view, key)?;
        if !value.is_empty() {
            return Ok(value);
        }
    }
    Ok(String::new())
}
