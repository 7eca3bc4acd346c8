// LogPulse - core/format.rs
//
// Translation of nginx-style `log_format` templates into anchored regex
// patterns with named capture groups.
//
// Literal text between `$variables` is escaped verbatim. Each recognised
// variable becomes a named group; a group name is captured at most once,
// later occurrences reuse the bare sub-pattern. Unknown variables match a
// single whitespace-free token without capturing it.

use crate::util::error::FormatError;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Group name and sub-pattern for a template variable, `None` if unknown.
fn variable_token(name: &str) -> Option<(&'static str, &'static str)> {
    let token = match name {
        "remote_addr" => ("ip", r"\S+"),
        "remote_user" => ("user", r"\S+"),
        "time_local" => ("time", r"[^\]]+"),
        "time_iso8601" => ("time", r"\S+"),
        "request" => ("request", r#"[^"]+"#),
        "request_method" => ("method", r"\S+"),
        "request_uri" | "uri" => ("url", r"\S+"),
        "status" => ("status", r"\d{3}"),
        "body_bytes_sent" | "bytes_sent" => ("bytes", r"\d+"),
        "http_referer" => ("referer", r#"[^"]*"#),
        "http_user_agent" => ("ua", r#"[^"]*"#),
        _ => return None,
    };
    Some(token)
}

/// Pattern used for variables with no field mapping.
const UNKNOWN_VARIABLE_PATTERN: &str = r"\S+";

fn variable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\w+").expect("variable token regex is valid"))
}

/// Translate a `log_format` template into an anchored regex pattern.
pub fn template_to_pattern(template: &str) -> Result<String, FormatError> {
    if template.trim().is_empty() {
        return Err(FormatError::EmptyTemplate);
    }

    let mut pattern = String::with_capacity(template.len() * 2);
    let mut used: HashSet<&'static str> = HashSet::new();
    let mut last = 0;
    let mut variables = 0usize;

    for m in variable_regex().find_iter(template) {
        variables += 1;
        pattern.push_str(&regex::escape(&template[last..m.start()]));

        // Skip the leading `$`.
        let name = &template[m.start() + 1..m.end()];
        match variable_token(name) {
            Some((group, sub)) if used.insert(group) => {
                pattern.push_str("(?P<");
                pattern.push_str(group);
                pattern.push('>');
                pattern.push_str(sub);
                pattern.push(')');
            }
            Some((_, sub)) => pattern.push_str(sub),
            None => pattern.push_str(UNKNOWN_VARIABLE_PATTERN),
        }
        last = m.end();
    }

    if variables == 0 {
        return Err(FormatError::TemplateWithoutVariables {
            template: template.to_string(),
        });
    }

    pattern.push_str(&regex::escape(&template[last..]));
    Ok(format!("^{pattern}$"))
}

/// Anchor a user-supplied pattern at both ends, leaving existing anchors.
pub fn ensure_anchors(pattern: &str) -> String {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut anchored = String::with_capacity(trimmed.len() + 2);
    if !trimmed.starts_with('^') {
        anchored.push('^');
    }
    anchored.push_str(trimmed);
    if !trimmed.ends_with('$') {
        anchored.push('$');
    }
    anchored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_combined_subset() {
        let pattern = template_to_pattern(
            r#"$remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent"#,
        )
        .unwrap();
        let re = Regex::new(&pattern).unwrap();
        let caps = re
            .captures(r#"203.0.113.5 - - [10/Oct/2023:13:55:36 -0700] "GET /a HTTP/1.1" 200 512"#)
            .expect("line should match");
        assert_eq!(&caps["ip"], "203.0.113.5");
        assert_eq!(&caps["time"], "10/Oct/2023:13:55:36 -0700");
        assert_eq!(&caps["request"], "GET /a HTTP/1.1");
        assert_eq!(&caps["status"], "200");
        assert_eq!(&caps["bytes"], "512");
    }

    #[test]
    fn test_repeated_group_is_captured_once() {
        // `$uri` and `$request_uri` both map to `url`.
        let pattern = template_to_pattern("$remote_addr $uri $request_uri $status").unwrap();
        assert_eq!(pattern.matches("(?P<url>").count(), 1);
        // Must still compile: duplicate group names would be rejected.
        assert!(Regex::new(&pattern).is_ok());
    }

    #[test]
    fn test_unknown_variable_is_not_captured() {
        let pattern = template_to_pattern("$remote_addr $upstream_addr $status").unwrap();
        let re = Regex::new(&pattern).unwrap();
        let names: Vec<_> = re.capture_names().flatten().collect();
        assert_eq!(names, vec!["ip", "status"]);
        assert!(re.is_match("10.0.0.1 127.0.0.1:8080 404"));
    }

    #[test]
    fn test_status_is_exactly_three_digits() {
        let re = Regex::new(&template_to_pattern("$remote_addr $status").unwrap()).unwrap();
        assert!(re.is_match("1.2.3.4 200"));
        assert!(!re.is_match("1.2.3.4 2000"));
    }

    #[test]
    fn test_literal_metacharacters_escaped() {
        let re = Regex::new(&template_to_pattern("$remote_addr (x.y) $status").unwrap()).unwrap();
        assert!(re.is_match("1.2.3.4 (x.y) 200"));
        assert!(!re.is_match("1.2.3.4 (xzy) 200"));
    }

    #[test]
    fn test_empty_and_variable_free_templates_rejected() {
        assert!(matches!(
            template_to_pattern("   "),
            Err(FormatError::EmptyTemplate)
        ));
        assert!(matches!(
            template_to_pattern("static text"),
            Err(FormatError::TemplateWithoutVariables { .. })
        ));
    }

    #[test]
    fn test_ensure_anchors() {
        assert_eq!(ensure_anchors(r"(?P<ip>\S+)"), r"^(?P<ip>\S+)$");
        assert_eq!(ensure_anchors(r"^(?P<ip>\S+)$"), r"^(?P<ip>\S+)$");
        assert_eq!(ensure_anchors("  "), "");
    }
}
