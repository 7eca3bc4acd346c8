// LogPulse - core/fields.rs
//
// Semantic fields of an access-log line and the capture-group names that
// may supply each of them. Resolution happens once, when a pattern is
// compiled, so per-line extraction is an array lookup.

/// A field the record builder understands, independent of dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticField {
    Ip,
    Time,
    Method,
    Url,
    Status,
    Bytes,
    Referer,
    UserAgent,
    /// Full request line (`GET /path HTTP/1.1`), split when method or URL
    /// has no dedicated group.
    Request,
}

impl SemanticField {
    /// Every field, in resolution order.
    pub const ALL: [SemanticField; 9] = [
        SemanticField::Ip,
        SemanticField::Time,
        SemanticField::Method,
        SemanticField::Url,
        SemanticField::Status,
        SemanticField::Bytes,
        SemanticField::Referer,
        SemanticField::UserAgent,
        SemanticField::Request,
    ];

    /// Accepted capture-group names; the first one present in a pattern wins.
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            SemanticField::Ip => &["ip", "remote_addr", "client_ip"],
            SemanticField::Time => &["time", "time_local", "time_iso8601"],
            SemanticField::Method => &["method", "request_method"],
            SemanticField::Url => &["url", "request_uri", "uri", "path"],
            SemanticField::Status => &["status"],
            SemanticField::Bytes => &["bytes", "body_bytes_sent", "bytes_sent"],
            SemanticField::Referer => &["referer", "http_referer"],
            SemanticField::UserAgent => &["ua", "user_agent", "http_user_agent"],
            SemanticField::Request => &["request", "request_line"],
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            SemanticField::Ip => "ip",
            SemanticField::Time => "time",
            SemanticField::Method => "method",
            SemanticField::Url => "url",
            SemanticField::Status => "status",
            SemanticField::Bytes => "bytes",
            SemanticField::Referer => "referer",
            SemanticField::UserAgent => "user agent",
            SemanticField::Request => "request",
        }
    }

    const fn slot(self) -> usize {
        self as usize
    }
}

/// Capture-group index for each semantic field of one compiled pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldIndex {
    slots: [Option<usize>; 9],
}

impl FieldIndex {
    /// Resolve every semantic field against the pattern's group names.
    ///
    /// `group_names` yields `(capture index, name)` for named groups only.
    pub fn resolve<'a, I>(group_names: I) -> Self
    where
        I: IntoIterator<Item = (usize, &'a str)> + Clone,
    {
        let mut slots = [None; 9];
        for field in SemanticField::ALL {
            slots[field.slot()] = field.aliases().iter().find_map(|alias| {
                group_names
                    .clone()
                    .into_iter()
                    .find(|(_, name)| name == alias)
                    .map(|(idx, _)| idx)
            });
        }
        Self { slots }
    }

    /// Capture index supplying `field`, if any.
    pub fn get(&self, field: SemanticField) -> Option<usize> {
        self.slots[field.slot()]
    }

    pub fn has(&self, field: SemanticField) -> bool {
        self.get(field).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_alias_in_declared_order_wins() {
        // Both `ip` and `client_ip` are present; `ip` is declared first.
        let names = vec![(1, "client_ip"), (2, "ip")];
        let index = FieldIndex::resolve(names.iter().copied());
        assert_eq!(index.get(SemanticField::Ip), Some(2));
    }

    #[test]
    fn test_alias_resolution() {
        let names = vec![(1, "remote_addr"), (2, "time_local"), (3, "request_uri")];
        let index = FieldIndex::resolve(names.iter().copied());
        assert_eq!(index.get(SemanticField::Ip), Some(1));
        assert_eq!(index.get(SemanticField::Time), Some(2));
        assert_eq!(index.get(SemanticField::Url), Some(3));
        assert!(!index.has(SemanticField::Status));
    }
}
