use serde_json::Value;

use crate::models::{RecordId, Row, ID_FIELD};
use crate::registry::KeyKind;

/// Row filter for [`RemoteStore::delete_where`](super::RemoteStore::delete_where).
///
/// The remote store refuses unfiltered deletes, so "all rows" is spelled as
/// a predicate every key satisfies, which depends on the key kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    AllRows(KeyKind),
    IdEq(RecordId),
}

impl Predicate {
    /// Renders the predicate as a query string filter.
    pub fn to_query(&self) -> String {
        match self {
            Predicate::AllRows(KeyKind::Numeric) => format!("id=gte.{}", i64::MIN),
            Predicate::AllRows(KeyKind::Opaque) => "id=neq.".to_string(),
            Predicate::IdEq(id) => format!("id=eq.{}", urlencoding::encode(id.as_str())),
        }
    }

    /// Parses a filter produced by [`Predicate::to_query`].
    pub fn parse(query: &str) -> Option<Self> {
        let filter = query
            .split('&')
            .find_map(|pair| pair.strip_prefix("id="))?;

        if filter == "neq." {
            return Some(Predicate::AllRows(KeyKind::Opaque));
        }
        if let Some(bound) = filter.strip_prefix("gte.") {
            return match bound.parse::<i64>() {
                Ok(i64::MIN) => Some(Predicate::AllRows(KeyKind::Numeric)),
                _ => None,
            };
        }

        let value = filter.strip_prefix("eq.")?;
        let decoded = urlencoding::decode(value).ok()?;
        if decoded.is_empty() {
            return None;
        }
        Some(Predicate::IdEq(RecordId::new(decoded.into_owned())))
    }

    pub fn matches(&self, row: &Row) -> bool {
        let Some(id) = row.get(ID_FIELD) else {
            return false;
        };

        match self {
            Predicate::AllRows(KeyKind::Numeric) => id.is_i64() || id.is_u64(),
            Predicate::AllRows(KeyKind::Opaque) => !matches!(id, Value::String(s) if s.is_empty()),
            Predicate::IdEq(expected) => match id {
                Value::String(s) => s == expected.as_str(),
                other => other.to_string() == expected.as_str(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_all_rows_query_depends_on_key_kind() {
        assert_eq!(
            Predicate::AllRows(KeyKind::Numeric).to_query(),
            "id=gte.-9223372036854775808"
        );
        assert_eq!(Predicate::AllRows(KeyKind::Opaque).to_query(), "id=neq.");
    }

    #[test]
    fn test_id_eq_is_url_encoded() {
        let predicate = Predicate::IdEq(RecordId::from("a b&c"));
        assert_eq!(predicate.to_query(), "id=eq.a%20b%26c");
        assert_eq!(Predicate::parse(&predicate.to_query()), Some(predicate));
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            Predicate::parse("id=gte.-9223372036854775808"),
            Some(Predicate::AllRows(KeyKind::Numeric))
        );
        assert_eq!(
            Predicate::parse("select=*&id=neq."),
            Some(Predicate::AllRows(KeyKind::Opaque))
        );
        assert_eq!(Predicate::parse("id=gte.0"), None);
        assert_eq!(Predicate::parse("id=eq."), None);
        assert_eq!(Predicate::parse("select=*"), None);
    }

    #[test]
    fn test_matches() {
        let numeric = row(json!({"id": 3, "nombre": "martillo"}));
        let opaque = row(json!({"id": "p1"}));

        assert!(Predicate::AllRows(KeyKind::Numeric).matches(&numeric));
        assert!(!Predicate::AllRows(KeyKind::Numeric).matches(&opaque));
        assert!(Predicate::AllRows(KeyKind::Opaque).matches(&opaque));
        assert!(Predicate::IdEq(RecordId::from(3)).matches(&numeric));
        assert!(Predicate::IdEq(RecordId::from("p1")).matches(&opaque));
        assert!(!Predicate::IdEq(RecordId::from("p2")).matches(&opaque));
    }
}
