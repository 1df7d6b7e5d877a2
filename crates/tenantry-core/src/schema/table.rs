use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use super::column::ColumnDef;
use super::constraint::{Constraint, ForeignKey, IndexDef};
use super::error::SchemaError;
use super::types::{is_identifier, ColumnType};

/// Definition of a table: columns, named constraints and indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name in SQL.
    pub name: String,

    /// Columns in declaration order.
    pub columns: Vec<ColumnDef>,

    /// Table constraints.
    #[serde(default)]
    pub constraints: Vec<Constraint>,

    /// Secondary indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    /// Create a new table definition with no columns.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            constraints: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnDef> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name() == name)
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.constraints.iter().filter_map(|c| match c {
            Constraint::ForeignKey(fk) => Some(fk),
            _ => None,
        })
    }

    /// Every uniqueness guarantee on the table, as `(name, columns)`.
    ///
    /// Includes the primary key, column-level `unique` flags, unique
    /// constraints and unique indexes.
    pub fn unique_sets(&self) -> Vec<(String, BTreeSet<String>)> {
        let mut sets = Vec::new();
        for column in &self.columns {
            let single = BTreeSet::from([column.name.clone()]);
            if column.primary_key {
                sets.push((format!("{}_pkey", self.name), single.clone()));
            }
            if column.unique && !column.primary_key {
                sets.push((column.unique_constraint_name(&self.name), single));
            }
        }
        for constraint in &self.constraints {
            if let Constraint::Unique(u) = constraint {
                sets.push((u.name.clone(), u.columns.clone()));
            }
        }
        for index in self.indexes.iter().filter(|i| i.unique) {
            sets.push((index.name.clone(), index.columns.iter().cloned().collect()));
        }
        sets
    }

    /// Whether a single column is guaranteed unique (a valid foreign key target).
    pub fn is_unique_column(&self, column: &str) -> bool {
        self.unique_sets()
            .iter()
            .any(|(_, cols)| cols.len() == 1 && cols.contains(column))
    }

    /// Names this table occupies in the constraint/index namespace.
    pub fn object_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.unique_sets().into_iter().map(|(n, _)| n).collect();
        for column in &self.columns {
            if column.column_type.enum_values().is_some() {
                names.push(column.enum_check_name(&self.name));
            }
        }
        names.extend(
            self.constraints
                .iter()
                .filter(|c| !matches!(c, Constraint::Unique(_)))
                .map(|c| c.name().to_string()),
        );
        names.extend(
            self.indexes
                .iter()
                .filter(|i| !i.unique)
                .map(|i| i.name.clone()),
        );
        names
    }

    /// Names of constraints and indexes that depend on `column`.
    pub fn dependents_of_column(&self, column: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .constraints
            .iter()
            .filter(|c| c.columns().contains(&column))
            .map(|c| c.name().to_string())
            .collect();
        names.extend(
            self.indexes
                .iter()
                .filter(|i| i.columns.iter().any(|c| c == column))
                .map(|i| i.name.clone()),
        );
        names
    }

    /// Check the definition in isolation (foreign key targets are checked
    /// against the surrounding schema by the snapshot).
    pub fn validate(&self) -> Result<(), SchemaError> {
        if !is_identifier(&self.name) {
            return Err(SchemaError::Invalid(format!(
                "table name '{}' is not a lowercase identifier",
                self.name
            )));
        }
        if self.columns.is_empty() {
            return Err(SchemaError::Invalid(format!("table {} has no columns", self.name)));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::ColumnExists {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
            column.validate(&self.name)?;
        }

        let pk_count = self.columns.iter().filter(|c| c.primary_key).count();
        if pk_count != 1 {
            return Err(SchemaError::Invalid(format!(
                "table {} must have exactly one primary key column, found {}",
                self.name, pk_count
            )));
        }

        for constraint in &self.constraints {
            if !is_identifier(constraint.name()) {
                return Err(SchemaError::Invalid(format!(
                    "constraint name '{}' is not a lowercase identifier",
                    constraint.name()
                )));
            }
            let columns = constraint.columns();
            if columns.is_empty() {
                return Err(SchemaError::Invalid(format!(
                    "constraint {} names no columns",
                    constraint.name()
                )));
            }
            for column in columns {
                self.require_column(column)?;
            }
            if let Constraint::Check(check) = constraint {
                let column = self.require_column(&check.column)?;
                if !matches!(
                    column.column_type,
                    ColumnType::Integer | ColumnType::Decimal { .. }
                ) {
                    return Err(SchemaError::Invalid(format!(
                        "check {} needs a numeric column",
                        check.name
                    )));
                }
            }
        }

        for index in &self.indexes {
            if index.table != self.name {
                return Err(SchemaError::Invalid(format!(
                    "index {} belongs to {}, not {}",
                    index.name, index.table, self.name
                )));
            }
            if !is_identifier(&index.name) || index.columns.is_empty() {
                return Err(SchemaError::Invalid(format!(
                    "index '{}' needs an identifier name and at least one column",
                    index.name
                )));
            }
            for column in &index.columns {
                self.require_column(column)?;
            }
        }

        let mut names = HashSet::new();
        for name in self.object_names() {
            if !names.insert(name.clone()) {
                return Err(SchemaError::NameTaken { name });
            }
        }

        let sets = self.unique_sets();
        for (i, (name, columns)) in sets.iter().enumerate() {
            if let Some((existing, _)) = sets[..i].iter().find(|(_, other)| other == columns) {
                return Err(SchemaError::DuplicateUnique {
                    table: self.name.clone(),
                    name: name.clone(),
                    existing: existing.clone(),
                    columns: columns.iter().cloned().collect::<Vec<_>>().join(", "),
                });
            }
        }

        Ok(())
    }

    fn require_column(&self, column: &str) -> Result<&ColumnDef, SchemaError> {
        self.column(column).ok_or_else(|| SchemaError::UnknownColumn {
            table: self.name.clone(),
            column: column.to_string(),
        })
    }

    /// Copy with columns, constraints and indexes sorted by name, for
    /// order-insensitive structural comparison.
    pub fn normalized(&self) -> TableDef {
        let mut table = self.clone();
        table.columns.sort_by(|a, b| a.name.cmp(&b.name));
        table.constraints.sort_by(|a, b| a.name().cmp(b.name()));
        table.indexes.sort_by(|a, b| a.name.cmp(&b.name));
        table
    }

    /// Generate CREATE TABLE SQL (indexes are separate statements).
    pub fn to_create_table_sql(&self) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {}", c.to_sql_column(&self.name)))
            .collect();
        lines.extend(self.constraints.iter().map(|c| format!("    {}", c.to_sql())));

        format!("CREATE TABLE {} (\n{}\n)", self.name, lines.join(",\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::constraint::{DeletePolicy, UniqueConstraint};
    use crate::schema::types::DefaultValue;

    fn users() -> TableDef {
        let mut table = TableDef::new("users");
        table.columns.push(ColumnDef::primary_id());
        table.columns.push(ColumnDef {
            nullable: true,
            ..ColumnDef::new("tenant_id", ColumnType::Uuid)
        });
        table.columns.push(ColumnDef::new("email", ColumnType::Text));
        table
    }

    #[test]
    fn test_valid_table() {
        let mut table = users();
        table.constraints.push(Constraint::Unique(UniqueConstraint::new(
            "users_tenant_email_key",
            &["tenant_id", "email"],
        )));
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_duplicate_unique_sets_rejected() {
        let mut table = users();
        table.constraints.push(Constraint::Unique(UniqueConstraint::new(
            "users_a_key",
            &["tenant_id", "email"],
        )));
        table.constraints.push(Constraint::Unique(UniqueConstraint::new(
            "users_b_key",
            &["email", "tenant_id"],
        )));
        assert!(matches!(
            table.validate(),
            Err(SchemaError::DuplicateUnique { .. })
        ));
    }

    #[test]
    fn test_unique_constraint_duplicating_column_flag_rejected() {
        let mut table = users();
        table.column_mut("email").unwrap().unique = true;
        table
            .constraints
            .push(Constraint::Unique(UniqueConstraint::new("users_email_uq", &["email"])));
        assert!(matches!(
            table.validate(),
            Err(SchemaError::DuplicateUnique { .. })
        ));
    }

    #[test]
    fn test_requires_single_primary_key() {
        let mut table = TableDef::new("things");
        table.columns.push(ColumnDef::new("name", ColumnType::Text));
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_constraint_columns_must_exist() {
        let mut table = users();
        table.constraints.push(Constraint::ForeignKey(ForeignKey::to_id(
            "users_org_id_fkey",
            "org_id",
            "orgs",
            DeletePolicy::Restrict,
        )));
        assert!(matches!(
            table.validate(),
            Err(SchemaError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_create_table_sql() {
        let mut table = users();
        table.columns.push(ColumnDef {
            default: Some(DefaultValue::Bool(true)),
            ..ColumnDef::new("is_active", ColumnType::Boolean)
        });
        table.constraints.push(Constraint::ForeignKey(ForeignKey::to_id(
            "users_tenant_id_fkey",
            "tenant_id",
            "tenants",
            DeletePolicy::Cascade,
        )));

        let sql = table.to_create_table_sql();
        assert!(sql.starts_with("CREATE TABLE users ("));
        assert!(sql.contains("tenant_id UUID,"));
        assert!(sql.contains("is_active BOOLEAN NOT NULL DEFAULT true"));
        assert!(sql.contains("REFERENCES tenants (id) ON DELETE CASCADE"));
    }

    #[test]
    fn test_normalized_ignores_order() {
        let a = users();
        let mut b = users();
        b.columns.reverse();
        assert_ne!(a, b);
        assert_eq!(a.normalized(), b.normalized());
    }
}
