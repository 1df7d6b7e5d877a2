use crate::schema::{ColumnDef, ColumnType, TableDef};

use super::{active_flag, timestamps, unique_text};

pub const TABLE: &str = "tenants";

/// Free-form JSON documents carried by every tenant.
pub const JSON_COLUMNS: [&str; 4] = ["config", "branding", "contact", "settings"];

/// The tenants table.
pub fn table() -> TableDef {
    let mut table = TableDef::new(TABLE);
    table.columns.push(ColumnDef::primary_id());
    table.columns.push(unique_text("slug"));
    table.columns.extend(
        JSON_COLUMNS
            .iter()
            .map(|name| ColumnDef::new(name, ColumnType::Json)),
    );
    table.columns.push(active_flag());
    table.columns.extend(timestamps());
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_is_globally_unique() {
        let table = table();
        assert!(table.column("slug").unwrap().unique);
        assert!(table.is_unique_column("slug"));
    }

    #[test]
    fn test_sql() {
        let sql = table().to_create_table_sql();
        assert!(sql.contains("slug TEXT NOT NULL CONSTRAINT tenants_slug_key UNIQUE"));
        assert!(sql.contains("branding JSONB NOT NULL DEFAULT '{}'::jsonb"));
    }
}
