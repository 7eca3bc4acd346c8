// LogPulse - core/json_fields.rs
//
// Typed optional-field access over a decoded JSON object.
//
// Every accessor reports whether a key was absent (missing or null) or
// present with an unusable type, so the structured line strategy can turn
// either case into a precise `LineError::JsonField`.

use crate::util::error::{FieldProblem, LineError};
use serde_json::{Map, Value};

/// Borrowed view of a JSON object. `None` stands for a missing parent
/// object, which makes every lookup through it `Absent`.
#[derive(Debug, Clone, Copy)]
pub struct JsonView<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> JsonView<'a> {
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Self { map: Some(map) }
    }

    fn missing() -> Self {
        Self { map: None }
    }

    /// Raw value for `key`; null counts as absent.
    pub fn value(&self, key: &str) -> Option<&'a Value> {
        self.map
            .and_then(|m| m.get(key))
            .filter(|v| !v.is_null())
    }

    /// Nested object. A missing key or a non-object value yields an empty
    /// view rather than an error; callers decide which leaves are required.
    pub fn object(&self, key: &str) -> JsonView<'a> {
        match self.value(key) {
            Some(Value::Object(inner)) => JsonView::new(inner),
            _ => JsonView::missing(),
        }
    }

    /// String field. Numbers are accepted and rendered in decimal.
    pub fn string(&self, key: &str) -> Result<String, FieldProblem> {
        match self.value(key) {
            None => Err(FieldProblem::Absent),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(_) => Err(FieldProblem::WrongType { expected: "string" }),
        }
    }

    /// Like `string` but collapses absent and empty to `None`.
    pub fn non_empty_string(&self, key: &str) -> Result<Option<String>, FieldProblem> {
        match self.string(key) {
            Ok(s) if s.is_empty() => Ok(None),
            Ok(s) => Ok(Some(s)),
            Err(FieldProblem::Absent) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Integer field. Floats are truncated; numeric strings are parsed.
    pub fn integer(&self, key: &str) -> Result<i64, FieldProblem> {
        const EXPECTED: FieldProblem = FieldProblem::WrongType {
            expected: "integer",
        };
        match self.value(key) {
            None => Err(FieldProblem::Absent),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                .ok_or(EXPECTED),
            Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| EXPECTED),
            Some(_) => Err(EXPECTED),
        }
    }

    /// Case-insensitive header lookup in a `{"Name": ["v", ...]}` map.
    /// Arrays yield their first element; plain strings are returned as-is.
    pub fn header(&self, name: &str) -> Option<String> {
        let map = self.map?;
        let value = map
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)?;
        match value {
            Value::Array(items) => items.first().map(value_to_text),
            Value::Null => None,
            other => Some(value_to_text(other)),
        }
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decode one line into a JSON object.
pub fn parse_object(line: &str) -> Result<Map<String, Value>, LineError> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(LineError::JsonField {
            field: "<line>",
            problem: FieldProblem::WrongType { expected: "object" },
        }),
        Err(source) => Err(LineError::Json { source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_absent_vs_wrong_type() {
        let m = obj(json!({"a": "x", "b": [1], "c": null}));
        let view = JsonView::new(&m);
        assert_eq!(view.string("a"), Ok("x".to_string()));
        assert_eq!(view.string("missing"), Err(FieldProblem::Absent));
        assert_eq!(view.string("c"), Err(FieldProblem::Absent));
        assert_eq!(
            view.string("b"),
            Err(FieldProblem::WrongType { expected: "string" })
        );
    }

    #[test]
    fn test_integer_accepts_numbers_and_numeric_strings() {
        let m = obj(json!({"i": 200, "f": 512.9, "s": "404", "bad": "x"}));
        let view = JsonView::new(&m);
        assert_eq!(view.integer("i"), Ok(200));
        assert_eq!(view.integer("f"), Ok(512));
        assert_eq!(view.integer("s"), Ok(404));
        assert!(matches!(
            view.integer("bad"),
            Err(FieldProblem::WrongType { .. })
        ));
    }

    #[test]
    fn test_nested_missing_object_is_absent() {
        let m = obj(json!({"request": "not an object"}));
        let view = JsonView::new(&m);
        assert_eq!(
            view.object("request").string("method"),
            Err(FieldProblem::Absent)
        );
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let m = obj(json!({"user-agent": ["curl/8.0", "other"], "Referer": "https://a/"}));
        let view = JsonView::new(&m);
        assert_eq!(view.header("User-Agent").as_deref(), Some("curl/8.0"));
        assert_eq!(view.header("referer").as_deref(), Some("https://a/"));
        assert_eq!(view.header("Cookie"), None);
    }

    #[test]
    fn test_parse_object_rejects_non_objects() {
        assert!(parse_object(r#"{"a":1}"#).is_ok());
        assert!(matches!(parse_object("[1,2]"), Err(LineError::JsonField { .. })));
        assert!(matches!(parse_object("{oops"), Err(LineError::Json { .. })));
    }
}
