use thiserror::Error;

use super::directive::Direction;
use crate::error::TenantryError;

/// Failure to apply a directive to a schema (or to the rows it holds).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("table {0} already exists")]
    TableExists(String),

    #[error("table {0} does not exist")]
    UnknownTable(String),

    #[error("column {table}.{column} already exists")]
    ColumnExists { table: String, column: String },

    #[error("column {table}.{column} does not exist")]
    UnknownColumn { table: String, column: String },

    #[error("name {name} is already used by another constraint or index")]
    NameTaken { name: String },

    #[error("constraint {name} does not exist on {table}")]
    UnknownConstraint { table: String, name: String },

    #[error("index {name} does not exist on {table}")]
    UnknownIndex { table: String, name: String },

    #[error("unique constraint {name} on {table} duplicates {existing} over ({columns})")]
    DuplicateUnique {
        table: String,
        name: String,
        existing: String,
        columns: String,
    },

    #[error("{object} is still referenced by {dependents}")]
    Dependents { object: String, dependents: String },

    #[error("invalid definition: {0}")]
    Invalid(String),

    /// Existing rows violate the change.
    #[error("{0}")]
    DataViolation(String),
}

impl SchemaError {
    /// Classify the failure for a unit running in `direction`.
    ///
    /// Forward failures are structural conflicts; reverse failures mean the
    /// `down` cannot run without discarding dependent structure or data.
    pub fn for_unit(self, migration: &str, direction: Direction) -> TenantryError {
        match direction {
            Direction::Up => TenantryError::structural_conflict(migration, self),
            Direction::Down => TenantryError::irreversible_revert(migration, self),
        }
    }
}
