//! Table definitions for the core domain entities.
//!
//! Tenants are the root of isolation: users hang off a tenant and are
//! unique per tenant. Products and product categories form a global
//! catalog with no tenant reference.

pub mod category;
pub mod product;
pub mod tenant;
pub mod user;

pub use user::UserRole;

use crate::schema::{ColumnDef, ColumnType, DefaultValue};

/// `is_active BOOLEAN NOT NULL DEFAULT true`.
pub(crate) fn active_flag() -> ColumnDef {
    flag("is_active", true)
}

pub(crate) fn flag(name: &str, default: bool) -> ColumnDef {
    ColumnDef {
        default: Some(DefaultValue::Bool(default)),
        ..ColumnDef::new(name, ColumnType::Boolean)
    }
}

/// `created_at` and `updated_at`, both defaulting to now.
pub(crate) fn timestamps() -> [ColumnDef; 2] {
    ["created_at", "updated_at"].map(|name| ColumnDef {
        default: Some(DefaultValue::Now),
        ..ColumnDef::new(name, ColumnType::Timestamp)
    })
}

pub(crate) fn unique_text(name: &str) -> ColumnDef {
    ColumnDef {
        unique: true,
        ..ColumnDef::new(name, ColumnType::Text)
    }
}

pub(crate) fn optional(name: &str, column_type: ColumnType) -> ColumnDef {
    ColumnDef {
        nullable: true,
        ..ColumnDef::new(name, column_type)
    }
}
