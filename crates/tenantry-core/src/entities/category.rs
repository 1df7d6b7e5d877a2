use crate::schema::{ColumnDef, ColumnType, DefaultValue, IndexDef, TableDef};

use super::{active_flag, optional, timestamps, unique_text};

pub const TABLE: &str = "product_categories";

pub const SORT_ORDER_INDEX: &str = "idx_product_categories_sort_order";

/// Product categories; `sort_order` drives display order and is not unique.
pub fn table() -> TableDef {
    let mut table = TableDef::new(TABLE);
    table.columns.push(ColumnDef::primary_id());
    table.columns.push(unique_text("slug"));
    table.columns.push(ColumnDef::new("name", ColumnType::Text));
    table.columns.push(optional("icon", ColumnType::Text));
    table.columns.push(optional("color", ColumnType::Text));
    table
        .columns
        .push(ColumnDef::new("metadata", ColumnType::Json));
    table.columns.push(ColumnDef {
        default: Some(DefaultValue::Integer(0)),
        ..ColumnDef::new("sort_order", ColumnType::Integer)
    });
    table.columns.push(active_flag());
    table.columns.extend(timestamps());
    table
}

pub fn indexes() -> Vec<IndexDef> {
    vec![IndexDef::new(SORT_ORDER_INDEX, TABLE, &["sort_order"])]
}
