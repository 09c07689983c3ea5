//! Dotted-path lookup with one failure mode for every field access.

use serde_json::Value;

/// Outcome of resolving a dotted path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    /// A non-null value.
    Found(&'a Value),
    /// The path exists and holds `null`.
    Null,
    /// Some segment is missing, or an intermediate node is not an object.
    Absent,
}

impl<'a> Lookup<'a> {
    pub fn value(self) -> Option<&'a Value> {
        match self {
            Lookup::Found(v) => Some(v),
            _ => None,
        }
    }
}

/// Resolve `path` (`a.b.c`) below `root`. The empty path is `root` itself.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Lookup<'a> {
    let mut cur = root;
    if !path.is_empty() {
        for seg in path.split('.') {
            cur = match cur.as_object().and_then(|m| m.get(seg)) {
                Some(v) => v,
                None => return Lookup::Absent,
            };
        }
    }
    if cur.is_null() { Lookup::Null } else { Lookup::Found(cur) }
}

/// Integer at `path`, accepting numeric strings.
pub fn lookup_u64(root: &Value, path: &str) -> Option<u64> {
    let v = lookup(root, path).value()?;
    v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_distinguishes_null_from_absent() {
        let v = json!({"fixture": {"venue": null, "id": 7}, "tags": [1]});
        assert_eq!(lookup(&v, "fixture.id"), Lookup::Found(&json!(7)));
        assert_eq!(lookup(&v, "fixture.venue"), Lookup::Null);
        assert_eq!(lookup(&v, "fixture.venue.name"), Lookup::Absent);
        assert_eq!(lookup(&v, "tags.0"), Lookup::Absent);
        assert_eq!(lookup(&v, ""), Lookup::Found(&v));
    }

    #[test]
    fn paging_total_accepts_numbers_and_strings() {
        let v = json!({"paging": {"current": 1, "total": 4}, "alt": {"total": " 3 "}});
        assert_eq!(lookup_u64(&v, "paging.total"), Some(4));
        assert_eq!(lookup_u64(&v, "alt.total"), Some(3));
        assert_eq!(lookup_u64(&v, "paging.missing"), None);
    }
}
