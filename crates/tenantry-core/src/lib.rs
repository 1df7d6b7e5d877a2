pub mod config;
pub mod entities;
pub mod error;
pub mod schema;
#[cfg(feature = "testing")]
pub mod testing;

pub use config::TenantryConfig;
pub use error::{Result, TenantryError};
pub use schema::{ColumnDef, Directive, Direction, SchemaSnapshot, TableDef};
