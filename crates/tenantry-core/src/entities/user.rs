use std::str::FromStr;

use crate::schema::{
    ColumnDef, ColumnType, Constraint, DefaultValue, DeletePolicy, ForeignKey, IndexDef, TableDef,
    UniqueConstraint,
};

use super::{active_flag, flag, optional, timestamps};

pub const TABLE: &str = "users";

pub const TENANT_FK: &str = "users_tenant_id_fkey";
pub const TENANT_EMAIL_KEY: &str = "users_tenant_id_email_key";
pub const TENANT_PHONE_KEY: &str = "users_tenant_id_phone_key";
pub const TENANT_INDEX: &str = "idx_users_tenant_id";

/// User roles. The set is closed; adding one takes a new migration unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum UserRole {
    #[default]
    Member,
    Coordinator,
    OrgAdmin,
    Admin,
}

impl UserRole {
    pub const ALL: [UserRole; 4] = [Self::Member, Self::Coordinator, Self::OrgAdmin, Self::Admin];

    /// Convert to the stored string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Coordinator => "coordinator",
            Self::OrgAdmin => "org_admin",
            Self::Admin => "admin",
        }
    }

    /// The enumerated column type holding a role.
    pub fn column_type() -> ColumnType {
        ColumnType::Enum(Self::ALL.iter().map(|r| r.as_str().to_string()).collect())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown user role '{}'", s))
    }
}

/// The users table.
///
/// `tenant_id` is nullable for platform-level users; deleting a tenant
/// deletes its users. Email and phone are unique per tenant only.
pub fn table() -> TableDef {
    let mut table = TableDef::new(TABLE);
    table.columns.push(ColumnDef::primary_id());
    table.columns.push(optional("tenant_id", ColumnType::Uuid));
    table.columns.push(ColumnDef::new("email", ColumnType::Text));
    table.columns.push(ColumnDef::new("phone", ColumnType::Text));
    table.columns.push(optional("password_hash", ColumnType::Text));
    table.columns.push(ColumnDef {
        default: Some(DefaultValue::Text(UserRole::default().as_str().to_string())),
        ..ColumnDef::new("role", UserRole::column_type())
    });
    table
        .columns
        .push(ColumnDef::new("preferences", ColumnType::Json));
    table.columns.push(active_flag());
    table.columns.push(flag("is_verified", false));
    table
        .columns
        .push(optional("last_login_at", ColumnType::Timestamp));
    table.columns.extend(timestamps());

    table.constraints.push(Constraint::ForeignKey(ForeignKey::to_id(
        TENANT_FK,
        "tenant_id",
        super::tenant::TABLE,
        DeletePolicy::Cascade,
    )));
    table.constraints.push(Constraint::Unique(UniqueConstraint::new(
        TENANT_EMAIL_KEY,
        &["tenant_id", "email"],
    )));
    table.constraints.push(Constraint::Unique(UniqueConstraint::new(
        TENANT_PHONE_KEY,
        &["tenant_id", "phone"],
    )));
    table
}

pub fn indexes() -> Vec<IndexDef> {
    vec![IndexDef::new(TENANT_INDEX, TABLE, &["tenant_id"])]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in UserRole::ALL {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
        assert!("owner".parse::<UserRole>().is_err());
        assert_eq!(UserRole::default(), UserRole::Member);
    }

    #[test]
    fn test_uniqueness_is_scoped_per_tenant() {
        let table = table();
        assert!(!table.column("email").unwrap().unique);
        assert!(!table.is_unique_column("email"));

        let sets: Vec<_> = table.unique_sets().into_iter().map(|(_, c)| c).collect();
        assert!(sets.iter().any(|c| c.len() == 2
            && c.contains("tenant_id")
            && c.contains("email")));
        assert!(sets.iter().any(|c| c.len() == 2
            && c.contains("tenant_id")
            && c.contains("phone")));
    }

    #[test]
    fn test_tenant_reference_cascades() {
        let table = table();
        let fk = table.foreign_keys().next().unwrap();
        assert_eq!(fk.references_table, "tenants");
        assert_eq!(fk.on_delete, DeletePolicy::Cascade);
        assert!(table.column("tenant_id").unwrap().nullable);
    }

    #[test]
    fn test_validates() {
        let mut table = table();
        table.indexes = indexes();
        assert!(table.validate().is_ok());
    }
}
