//! Built-in schema units for the core domain entities.
//!
//! Tenants come first because users reference them; the catalog tables
//! follow and carry no tenant reference.

use tenantry_core::entities::{category, product, tenant, user};
use tenantry_core::error::Result;
use tenantry_core::schema::{Directive, IndexDef, TableDef};

use super::unit::Migration;

fn create_table_unit(
    id: &str,
    description: &str,
    mut table: TableDef,
    indexes: Vec<IndexDef>,
) -> Result<Migration> {
    table.indexes = indexes;
    let drop = Directive::DropTable {
        table: table.name.clone(),
    };
    Ok(Migration::new(id, vec![Directive::CreateTable(table)], vec![drop])?
        .with_description(description))
}

/// All built-in units. They are registered before any file-based units.
pub fn builtin_migrations() -> Result<Vec<Migration>> {
    Ok(vec![
        create_table_unit(
            "001_create_tenants",
            "Tenants, the root of isolation",
            tenant::table(),
            Vec::new(),
        )?,
        create_table_unit(
            "002_create_users",
            "Users scoped to a tenant",
            user::table(),
            user::indexes(),
        )?,
        create_table_unit(
            "003_create_products",
            "Global product catalog",
            product::table(),
            product::indexes(),
        )?,
        create_table_unit(
            "004_create_product_categories",
            "Product categories",
            category::table(),
            category::indexes(),
        )?,
    ])
}
