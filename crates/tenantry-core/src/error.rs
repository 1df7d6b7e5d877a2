use thiserror::Error;

/// Core error type for tenantry operations.
#[derive(Error, Debug)]
pub enum TenantryError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A unit or a table definition is malformed, or its `down` does not undo its `up`.
    #[error("Invalid migration {migration}: {cause}")]
    InvalidMigration { migration: String, cause: String },

    /// Existing rows or structure violate a change being applied.
    #[error("Structural conflict in {subject}: {cause}")]
    StructuralConflict { subject: String, cause: String },

    /// A unit was applied or reverted out of identifier order.
    #[error("Ordering violation for {migration}: {cause}")]
    OrderingViolation { migration: String, cause: String },

    #[error("Migration in progress: {0}")]
    LockContention(String),

    /// A `down` would require dropping dependent structure or data.
    #[error("Irreversible revert of {migration}: {cause}")]
    IrreversibleRevert { migration: String, cause: String },
}

impl TenantryError {
    pub fn structural_conflict(subject: impl Into<String>, cause: impl ToString) -> Self {
        Self::StructuralConflict {
            subject: subject.into(),
            cause: cause.to_string(),
        }
    }

    pub fn ordering_violation(migration: impl Into<String>, cause: impl ToString) -> Self {
        Self::OrderingViolation {
            migration: migration.into(),
            cause: cause.to_string(),
        }
    }

    pub fn irreversible_revert(migration: impl Into<String>, cause: impl ToString) -> Self {
        Self::IrreversibleRevert {
            migration: migration.into(),
            cause: cause.to_string(),
        }
    }

    pub fn invalid_migration(migration: impl Into<String>, cause: impl ToString) -> Self {
        Self::InvalidMigration {
            migration: migration.into(),
            cause: cause.to_string(),
        }
    }

    /// Identifier of the unit (or table) the error is about, if any.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::InvalidMigration { migration, .. }
            | Self::OrderingViolation { migration, .. }
            | Self::IrreversibleRevert { migration, .. } => Some(migration),
            Self::StructuralConflict { subject, .. } => Some(subject),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TenantryError {
    fn from(e: serde_json::Error) -> Self {
        TenantryError::Serialization(e.to_string())
    }
}

/// Result type alias using TenantryError.
pub type Result<T> = std::result::Result<T, TenantryError>;
