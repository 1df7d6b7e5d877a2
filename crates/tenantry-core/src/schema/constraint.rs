use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// What happens to referencing rows when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    /// Delete referencing rows as well.
    Cascade,
    /// Refuse the delete while referencing rows exist.
    Restrict,
}

impl DeletePolicy {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
        }
    }
}

/// Uniqueness over an unordered set of columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub name: String,
    pub columns: BTreeSet<String>,
}

impl UniqueConstraint {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Foreign key from a single column to a column of another (or the same) table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    pub column: String,
    pub references_table: String,
    #[serde(default = "default_referenced_column")]
    pub references_column: String,
    pub on_delete: DeletePolicy,
}

fn default_referenced_column() -> String {
    "id".to_string()
}

impl ForeignKey {
    /// Foreign key to `table.id`.
    pub fn to_id(name: &str, column: &str, table: &str, on_delete: DeletePolicy) -> Self {
        Self {
            name: name.to_string(),
            column: column.to_string(),
            references_table: table.to_string(),
            references_column: default_referenced_column(),
            on_delete,
        }
    }
}

/// `column > greater_than`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraint {
    pub name: String,
    pub column: String,
    pub greater_than: i64,
}

/// Named table constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    Unique(UniqueConstraint),
    ForeignKey(ForeignKey),
    Check(CheckConstraint),
}

impl Constraint {
    pub fn name(&self) -> &str {
        match self {
            Constraint::Unique(u) => &u.name,
            Constraint::ForeignKey(fk) => &fk.name,
            Constraint::Check(c) => &c.name,
        }
    }

    /// Columns of the owning table this constraint depends on.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Constraint::Unique(u) => u.columns.iter().map(String::as_str).collect(),
            Constraint::ForeignKey(fk) => vec![fk.column.as_str()],
            Constraint::Check(c) => vec![c.column.as_str()],
        }
    }

    /// Generate the table-constraint clause.
    pub fn to_sql(&self) -> String {
        match self {
            Constraint::Unique(u) => {
                let columns: Vec<&str> = u.columns.iter().map(String::as_str).collect();
                format!("CONSTRAINT {} UNIQUE ({})", u.name, columns.join(", "))
            }
            Constraint::ForeignKey(fk) => format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                fk.name,
                fk.column,
                fk.references_table,
                fk.references_column,
                fk.on_delete.as_sql()
            ),
            Constraint::Check(c) => format!(
                "CONSTRAINT {} CHECK ({} > {})",
                c.name, c.column, c.greater_than
            ),
        }
    }
}

/// Secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    pub fn new(name: &str, table: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        }
    }

    /// Generate CREATE INDEX SQL.
    pub fn to_create_sql(&self) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            self.name,
            self.table,
            self.columns.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_columns_are_unordered() {
        let a = UniqueConstraint::new("a", &["tenant_id", "email"]);
        let b = UniqueConstraint::new("b", &["email", "tenant_id"]);
        assert_eq!(a.columns, b.columns);
    }

    #[test]
    fn test_constraint_sql() {
        let unique = Constraint::Unique(UniqueConstraint::new(
            "users_tenant_email_key",
            &["tenant_id", "email"],
        ));
        assert_eq!(
            unique.to_sql(),
            "CONSTRAINT users_tenant_email_key UNIQUE (email, tenant_id)"
        );

        let fk = Constraint::ForeignKey(ForeignKey::to_id(
            "users_tenant_id_fkey",
            "tenant_id",
            "tenants",
            DeletePolicy::Cascade,
        ));
        assert_eq!(
            fk.to_sql(),
            "CONSTRAINT users_tenant_id_fkey FOREIGN KEY (tenant_id) REFERENCES tenants (id) ON DELETE CASCADE"
        );

        let check = Constraint::Check(CheckConstraint {
            name: "products_package_size_check".into(),
            column: "package_size".into(),
            greater_than: 0,
        });
        assert_eq!(
            check.to_sql(),
            "CONSTRAINT products_package_size_check CHECK (package_size > 0)"
        );
    }

    #[test]
    fn test_index_sql() {
        let mut index = IndexDef::new("idx_users_tenant_id", "users", &["tenant_id"]);
        assert_eq!(
            index.to_create_sql(),
            "CREATE INDEX idx_users_tenant_id ON users (tenant_id)"
        );
        index.unique = true;
        assert!(index.to_create_sql().starts_with("CREATE UNIQUE INDEX"));
    }

    #[test]
    fn test_constraint_serde_is_tagged() {
        let fk = Constraint::ForeignKey(ForeignKey::to_id(
            "fk",
            "tenant_id",
            "tenants",
            DeletePolicy::Restrict,
        ));
        let json = serde_json::to_value(&fk).unwrap();
        assert_eq!(json["kind"], "foreign_key");
        assert_eq!(json["on_delete"], "restrict");
    }
}
