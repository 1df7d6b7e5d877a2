use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical column types.
///
/// References to other entities are `Uuid` columns carrying a foreign key
/// constraint; there is no separate reference type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Opaque identifier
    Uuid,
    /// Unlimited text
    Text,
    /// Text restricted to a closed set of values
    Enum(Vec<String>),
    /// Boolean
    Boolean,
    /// Fixed-point decimal with precision and scale
    Decimal { precision: u8, scale: u8 },
    /// Opaque JSON document
    Json,
    /// 32-bit integer
    Integer,
    /// Timestamp with timezone
    Timestamp,
}

impl ColumnType {
    /// Generate the SQL type declaration.
    pub fn to_sql(&self) -> String {
        match self {
            ColumnType::Uuid => "UUID".to_string(),
            ColumnType::Text | ColumnType::Enum(_) => "TEXT".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Decimal { precision, scale } => {
                format!("NUMERIC({}, {})", precision, scale)
            }
            ColumnType::Json => "JSONB".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Timestamp => "TIMESTAMPTZ".to_string(),
        }
    }

    /// Values of an enumerated column.
    pub fn enum_values(&self) -> Option<&[String]> {
        match self {
            ColumnType::Enum(values) => Some(values),
            _ => None,
        }
    }
}

/// Column default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    Bool(bool),
    Integer(i64),
    Text(String),
    Json(Value),
    /// Current timestamp at insert time
    Now,
    /// Freshly generated UUID
    RandomUuid,
}

impl DefaultValue {
    /// The empty JSON object, the default for every JSON column.
    pub fn empty_object() -> Self {
        DefaultValue::Json(Value::Object(serde_json::Map::new()))
    }

    /// Generate the SQL default expression.
    pub fn to_sql(&self) -> String {
        match self {
            DefaultValue::Bool(b) => b.to_string(),
            DefaultValue::Integer(n) => n.to_string(),
            DefaultValue::Text(s) => quote_literal(s),
            DefaultValue::Json(v) => format!("{}::jsonb", quote_literal(&v.to_string())),
            DefaultValue::Now => "NOW()".to_string(),
            DefaultValue::RandomUuid => "gen_random_uuid()".to_string(),
        }
    }

    /// Whether this default can populate a column of the given type.
    pub fn fits(&self, column_type: &ColumnType) -> bool {
        match (self, column_type) {
            (DefaultValue::Bool(_), ColumnType::Boolean) => true,
            (DefaultValue::Integer(n), ColumnType::Integer) => i32::try_from(*n).is_ok(),
            (DefaultValue::Integer(_), ColumnType::Decimal { .. }) => true,
            (DefaultValue::Text(_), ColumnType::Text) => true,
            (DefaultValue::Text(s), ColumnType::Enum(values)) => values.contains(s),
            (DefaultValue::Json(_), ColumnType::Json) => true,
            (DefaultValue::Now, ColumnType::Timestamp) => true,
            (DefaultValue::RandomUuid, ColumnType::Uuid) => true,
            _ => false,
        }
    }

    /// Produce a concrete value for a new row.
    pub fn materialize(&self) -> Value {
        match self {
            DefaultValue::Bool(b) => Value::Bool(*b),
            DefaultValue::Integer(n) => Value::from(*n),
            DefaultValue::Text(s) => Value::String(s.clone()),
            DefaultValue::Json(v) => v.clone(),
            DefaultValue::Now => Value::String(chrono::Utc::now().to_rfc3339()),
            DefaultValue::RandomUuid => Value::String(uuid::Uuid::new_v4().to_string()),
        }
    }
}

/// Quote a string as a SQL literal.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Whether `name` is a plain lowercase SQL identifier that never needs quoting.
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_to_sql() {
        assert_eq!(ColumnType::Uuid.to_sql(), "UUID");
        assert_eq!(ColumnType::Enum(vec!["a".into()]).to_sql(), "TEXT");
        assert_eq!(
            ColumnType::Decimal {
                precision: 10,
                scale: 2
            }
            .to_sql(),
            "NUMERIC(10, 2)"
        );
        assert_eq!(ColumnType::Timestamp.to_sql(), "TIMESTAMPTZ");
    }

    #[test]
    fn test_default_to_sql() {
        assert_eq!(DefaultValue::empty_object().to_sql(), "'{}'::jsonb");
        assert_eq!(DefaultValue::Text("it's".into()).to_sql(), "'it''s'");
        assert_eq!(DefaultValue::Bool(true).to_sql(), "true");
        assert_eq!(DefaultValue::RandomUuid.to_sql(), "gen_random_uuid()");
    }

    #[test]
    fn test_default_fits() {
        let role = ColumnType::Enum(vec!["member".into(), "admin".into()]);
        assert!(DefaultValue::Text("member".into()).fits(&role));
        assert!(!DefaultValue::Text("owner".into()).fits(&role));
        assert!(!DefaultValue::Integer(1).fits(&ColumnType::Text));
        assert!(!DefaultValue::Integer(i64::MAX).fits(&ColumnType::Integer));
        assert!(DefaultValue::empty_object().fits(&ColumnType::Json));
    }

    #[test]
    fn test_materialize_empty_object_is_not_null() {
        let value = DefaultValue::empty_object().materialize();
        assert!(value.is_object());
        assert!(!value.is_null());
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("tenant_id"));
        assert!(!is_identifier("Tenant"));
        assert!(!is_identifier("1users"));
        assert!(!is_identifier("users; drop"));
        assert!(!is_identifier(""));
    }
}
