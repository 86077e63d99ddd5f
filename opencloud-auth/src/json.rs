//! Helpers for loosely typed JSON fields.

use serde_json::Value;

/// Read an id sent either as a JSON number or as a decimal string.
pub(crate) fn parse_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_id_accepts_numbers_and_strings() {
        assert_eq!(parse_id(&json!(1234)), Some(1234));
        assert_eq!(parse_id(&json!("1234")), Some(1234));
        assert_eq!(parse_id(&json!(-1)), None);
        assert_eq!(parse_id(&json!(1.5)), None);
        assert_eq!(parse_id(&json!("12a")), None);
        assert_eq!(parse_id(&json!(null)), None);
    }
}
