mod column;
mod constraint;
mod directive;
mod error;
mod snapshot;
mod table;
mod types;

pub use column::{enum_check_expr, ColumnDef};
pub use constraint::{CheckConstraint, Constraint, DeletePolicy, ForeignKey, IndexDef, UniqueConstraint};
pub use directive::{Direction, Directive};
pub use error::SchemaError;
pub use snapshot::SchemaSnapshot;
pub use table::TableDef;
pub use types::{is_identifier, quote_literal, ColumnType, DefaultValue};
