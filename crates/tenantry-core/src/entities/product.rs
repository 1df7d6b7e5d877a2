use crate::schema::{
    CheckConstraint, ColumnDef, ColumnType, Constraint, DefaultValue, IndexDef, TableDef,
};

use super::{active_flag, optional, timestamps, unique_text};

pub const TABLE: &str = "products";

pub const PACKAGE_SIZE_CHECK: &str = "products_package_size_check";
pub const CATEGORY_INDEX: &str = "idx_products_category";

/// The global product catalog.
pub fn table() -> TableDef {
    let mut table = TableDef::new(TABLE);
    table.columns.push(ColumnDef::primary_id());
    table.columns.push(unique_text("slug"));
    table.columns.push(ColumnDef::new("name", ColumnType::Text));
    table.columns.push(ColumnDef::new("category", ColumnType::Text));
    table.columns.push(ColumnDef::new("unit", ColumnType::Text));
    table.columns.push(ColumnDef {
        default: Some(DefaultValue::Integer(1)),
        ..ColumnDef::new("package_size", ColumnType::Integer)
    });
    table.columns.push(optional(
        "estimated_price",
        ColumnType::Decimal {
            precision: 10,
            scale: 2,
        },
    ));
    table.columns.push(active_flag());
    table.columns.extend(timestamps());

    table.constraints.push(Constraint::Check(CheckConstraint {
        name: PACKAGE_SIZE_CHECK.to_string(),
        column: "package_size".to_string(),
        greater_than: 0,
    }));
    table
}

pub fn indexes() -> Vec<IndexDef> {
    vec![IndexDef::new(CATEGORY_INDEX, TABLE, &["category"])]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_size_is_positive_with_default() {
        let table = table();
        let column = table.column("package_size").unwrap();
        assert_eq!(column.default, Some(DefaultValue::Integer(1)));
        assert!(table
            .to_create_table_sql()
            .contains("CHECK (package_size > 0)"));
    }

    #[test]
    fn test_price_is_optional_decimal() {
        let table = table();
        let column = table.column("estimated_price").unwrap();
        assert!(column.nullable);
        assert_eq!(column.column_type.to_sql(), "NUMERIC(10, 2)");
    }
}
