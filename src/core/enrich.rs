// LogPulse - core/enrich.rs
//
// Enrichment collaborator contract: geolocation, user-agent decomposition,
// and page-view classification. The scanner only relies on the call
// contract; `DefaultEnricher` is the built-in implementation.

use std::collections::HashMap;
use woothee::parser::Parser;

/// Resolved location of one IP address.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub domestic: String,
    pub global: String,
}

/// Browser, OS, and device class derived from a user-agent string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentParts {
    pub browser: String,
    pub os: String,
    pub device: String,
}

/// Enrichment services used while building records.
///
/// Implementations must be safe to call from a background scan thread.
pub trait Enricher: Send + Sync {
    /// One-time initialisation, called when the coordinator is constructed.
    fn init_filters(&self) {}

    /// Locations for a batch of IPs. IPs missing from the map are stored
    /// with the "unknown" sentinel.
    fn locate_batch(&self, ips: &[&str]) -> HashMap<String, Location>;

    fn parse_user_agent(&self, user_agent: &str) -> UserAgentParts;

    /// Whether a request counts as a page view.
    fn is_pageview(&self, status: u16, path: &str, ip: &str) -> bool;
}

/// Path suffixes of static assets that never count as page views.
const STATIC_SUFFIXES: &[&str] = &[
    ".css", ".js", ".mjs", ".map", ".json", ".xml", ".txt", ".ico", ".png", ".jpg", ".jpeg",
    ".gif", ".svg", ".webp", ".avif", ".bmp", ".woff", ".woff2", ".ttf", ".otf", ".eot", ".mp4",
    ".webm", ".mp3", ".wav", ".pdf", ".zip", ".gz",
];

const UNKNOWN: &str = "Unknown";

/// Built-in enricher: woothee for user agents, a suffix/status heuristic for
/// page views, and no geolocation database.
pub struct DefaultEnricher {
    parser: Parser,
}

impl DefaultEnricher {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }
}

impl Default for DefaultEnricher {
    fn default() -> Self {
        Self::new()
    }
}

impl Enricher for DefaultEnricher {
    fn init_filters(&self) {
        tracing::debug!(
            static_suffixes = STATIC_SUFFIXES.len(),
            "Page-view filters initialised"
        );
    }

    fn locate_batch(&self, _ips: &[&str]) -> HashMap<String, Location> {
        HashMap::new()
    }

    fn parse_user_agent(&self, user_agent: &str) -> UserAgentParts {
        let Some(result) = self.parser.parse(user_agent) else {
            return UserAgentParts {
                browser: UNKNOWN.to_string(),
                os: UNKNOWN.to_string(),
                device: "Other".to_string(),
            };
        };

        let device = match result.category {
            "pc" => "Desktop",
            "smartphone" | "mobilephone" => "Mobile",
            "tablet" => "Tablet",
            "crawler" => "Bot",
            _ => "Other",
        };

        UserAgentParts {
            browser: known_or_unknown(result.name),
            os: known_or_unknown(result.os),
            device: device.to_string(),
        }
    }

    fn is_pageview(&self, status: u16, path: &str, ip: &str) -> bool {
        let counted_status = (200..300).contains(&status) || status == 304;
        if ip.is_empty() || !counted_status {
            return false;
        }
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let lower = path.to_ascii_lowercase();
        !STATIC_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
    }
}

fn known_or_unknown(value: &str) -> String {
    if value.is_empty() || value.eq_ignore_ascii_case("UNKNOWN") {
        UNKNOWN.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pageview_heuristic() {
        let e = DefaultEnricher::new();
        assert!(e.is_pageview(200, "/blog/post?id=1", "1.2.3.4"));
        assert!(e.is_pageview(304, "/", "1.2.3.4"));
        assert!(!e.is_pageview(200, "/static/app.JS", "1.2.3.4"));
        assert!(!e.is_pageview(404, "/missing", "1.2.3.4"));
        assert!(!e.is_pageview(301, "/moved", "1.2.3.4"));
        assert!(!e.is_pageview(200, "/", ""));
    }

    #[test]
    fn test_user_agent_decomposition() {
        let e = DefaultEnricher::new();
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
        let parts = e.parse_user_agent(ua);
        assert_eq!(parts.browser, "Chrome");
        assert_eq!(parts.device, "Desktop");

        let bot = e.parse_user_agent("Googlebot/2.1 (+http://www.google.com/bot.html)");
        assert_eq!(bot.device, "Bot");
    }

    #[test]
    fn test_placeholder_user_agent_is_unknown() {
        let parts = DefaultEnricher::new().parse_user_agent("-");
        assert_eq!(parts.browser, UNKNOWN);
    }

    #[test]
    fn test_no_geolocation_by_default() {
        assert!(DefaultEnricher::new().locate_batch(&["1.2.3.4"]).is_empty());
    }
}
