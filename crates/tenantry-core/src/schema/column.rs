use serde::{Deserialize, Serialize};

use super::error::SchemaError;
use super::types::{is_identifier, ColumnType, DefaultValue};

/// Definition of a table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name in SQL.
    pub name: String,

    /// Logical type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// Whether the column accepts NULL.
    #[serde(default)]
    pub nullable: bool,

    /// Default value.
    #[serde(default)]
    pub default: Option<DefaultValue>,

    /// Single-column unique constraint.
    #[serde(default)]
    pub unique: bool,

    /// Primary key.
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnDef {
    /// Create a NOT NULL column with no default.
    ///
    /// JSON columns are the exception: they default to `{}`.
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        let default = matches!(column_type, ColumnType::Json).then(DefaultValue::empty_object);
        Self {
            name: name.to_string(),
            column_type,
            nullable: false,
            default,
            unique: false,
            primary_key: false,
        }
    }

    /// Generated UUID primary key named `id`.
    pub fn primary_id() -> Self {
        Self {
            default: Some(DefaultValue::RandomUuid),
            primary_key: true,
            ..Self::new("id", ColumnType::Uuid)
        }
    }

    /// Fill in implied defaults for columns read from unit files.
    pub fn normalize(&mut self) {
        if self.default.is_none()
            && !self.nullable
            && matches!(self.column_type, ColumnType::Json)
        {
            self.default = Some(DefaultValue::empty_object());
        }
    }

    /// Name of the implicit unique constraint created by `unique: true`.
    pub fn unique_constraint_name(&self, table: &str) -> String {
        format!("{}_{}_key", table, self.name)
    }

    /// Name of the implicit check constraint guarding enum values.
    pub fn enum_check_name(&self, table: &str) -> String {
        format!("{}_{}_check", table, self.name)
    }

    /// Check the column in isolation.
    pub fn validate(&self, table: &str) -> Result<(), SchemaError> {
        let invalid = |msg: String| SchemaError::Invalid(format!("{}.{}: {}", table, self.name, msg));

        if !is_identifier(&self.name) {
            return Err(invalid("column name is not a lowercase identifier".into()));
        }

        match &self.column_type {
            ColumnType::Enum(values) => {
                if values.is_empty() {
                    return Err(invalid("enum has no values".into()));
                }
                let mut seen = std::collections::HashSet::new();
                for v in values {
                    if !seen.insert(v) {
                        return Err(invalid(format!("enum value '{}' is repeated", v)));
                    }
                }
            }
            ColumnType::Decimal { precision, scale } => {
                if *precision == 0 || *precision > 38 || scale > precision {
                    return Err(invalid(format!(
                        "invalid decimal precision/scale ({}, {})",
                        precision, scale
                    )));
                }
            }
            ColumnType::Json if !self.nullable && self.default.is_none() => {
                return Err(invalid("JSON column needs a default or must be nullable".into()));
            }
            _ => {}
        }

        if let Some(default) = &self.default {
            if !default.fits(&self.column_type) {
                return Err(invalid(format!(
                    "default {} does not fit type {}",
                    default.to_sql(),
                    self.column_type.to_sql()
                )));
            }
        }

        if self.primary_key && self.nullable {
            return Err(invalid("primary key cannot be nullable".into()));
        }

        Ok(())
    }

    /// Generate SQL column definition.
    pub fn to_sql_column(&self, table: &str) -> String {
        let mut parts = vec![self.name.clone(), self.column_type.to_sql()];

        if self.primary_key {
            parts.push("PRIMARY KEY".to_string());
        } else if !self.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(ref default) = self.default {
            parts.push(format!("DEFAULT {}", default.to_sql()));
        }

        if self.unique && !self.primary_key {
            parts.push(format!(
                "CONSTRAINT {} UNIQUE",
                self.unique_constraint_name(table)
            ));
        }

        if let Some(check) = self.enum_check_sql(table) {
            parts.push(check);
        }

        parts.join(" ")
    }

    /// `CONSTRAINT .. CHECK (col IN (..))` for enumerated columns.
    pub fn enum_check_sql(&self, table: &str) -> Option<String> {
        self.column_type.enum_values().map(|values| {
            format!(
                "CONSTRAINT {} CHECK ({})",
                self.enum_check_name(table),
                enum_check_expr(&self.name, values)
            )
        })
    }
}

/// `col IN ('a', 'b')`.
pub fn enum_check_expr(column: &str, values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| super::types::quote_literal(v))
        .collect();
    format!("{} IN ({})", column, quoted.join(", "))
}
