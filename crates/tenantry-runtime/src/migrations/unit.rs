use std::cmp::Ordering;
use std::fmt;

use tenantry_core::error::{Result, TenantryError};
use tenantry_core::schema::{Direction, Directive};
use xxhash_rust::xxh3::xxh3_64;

/// Identifier of a migration unit: a numeric prefix, an underscore and a
/// lowercase description (e.g. `002_create_users`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MigrationId {
    raw: String,
    prefix_len: usize,
}

impl MigrationId {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |cause: &str| TenantryError::invalid_migration(raw, cause);

        let (prefix, description) = raw
            .split_once('_')
            .ok_or_else(|| invalid("identifier must look like NNN_description"))?;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("identifier must start with a numeric prefix"));
        }
        if description.is_empty()
            || !description
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(invalid("description must be lowercase snake_case"));
        }

        Ok(Self {
            raw: raw.to_string(),
            prefix_len: prefix.len(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The numeric prefix that determines execution order.
    pub fn prefix(&self) -> &str {
        &self.raw[..self.prefix_len]
    }
}

impl Ord for MigrationId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.prefix()
            .cmp(other.prefix())
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for MigrationId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A reversible schema-change unit.
#[derive(Debug, Clone)]
pub struct Migration {
    pub id: MigrationId,
    pub description: Option<String>,
    pub up: Vec<Directive>,
    pub down: Vec<Directive>,
}

impl Migration {
    /// Build a unit, normalizing its directives and checking every table
    /// definition it creates.
    pub fn new(id: &str, mut up: Vec<Directive>, mut down: Vec<Directive>) -> Result<Self> {
        let id = MigrationId::parse(id)?;
        if up.is_empty() {
            return Err(TenantryError::invalid_migration(id.as_str(), "up has no directives"));
        }

        for directive in up.iter_mut().chain(down.iter_mut()) {
            directive.normalize();
            if let Directive::CreateTable(table) = directive {
                table
                    .validate()
                    .map_err(|e| TenantryError::invalid_migration(id.as_str(), e))?;
            }
        }

        Ok(Self {
            id,
            description: None,
            up,
            down,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn directives(&self, direction: Direction) -> &[Directive] {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }

    /// SQL statements for one direction, in execution order.
    pub fn sql(&self, direction: Direction) -> Vec<String> {
        self.directives(direction)
            .iter()
            .flat_map(Directive::to_sql)
            .collect()
    }

    /// Stable checksum of both halves of the unit as rendered SQL.
    pub fn checksum(&self) -> String {
        let mut content = self.sql(Direction::Up).join(";\n");
        content.push_str("\n--\n");
        content.push_str(&self.sql(Direction::Down).join(";\n"));
        format!("{:016x}", xxh3_64(content.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantry_core::entities::tenant;

    #[test]
    fn test_parse_identifier() {
        let id = MigrationId::parse("001_create_tenants").unwrap();
        assert_eq!(id.prefix(), "001");
        assert_eq!(id.to_string(), "001_create_tenants");

        assert!(MigrationId::parse("create_tenants").is_err());
        assert!(MigrationId::parse("001").is_err());
        assert!(MigrationId::parse("001_").is_err());
        assert!(MigrationId::parse("001_Create").is_err());
        assert!(MigrationId::parse("1a_create").is_err());
    }

    #[test]
    fn test_order_follows_prefix() {
        let mut ids: Vec<MigrationId> = ["010_c", "002_b", "001_a"]
            .iter()
            .map(|s| MigrationId::parse(s).unwrap())
            .collect();
        ids.sort();
        let ordered: Vec<&str> = ids.iter().map(MigrationId::as_str).collect();
        assert_eq!(ordered, ["001_a", "002_b", "010_c"]);
    }

    #[test]
    fn test_invalid_table_rejected_at_construction() {
        let mut table = tenant::table();
        table.columns.clear();
        let err = Migration::new(
            "001_create_tenants",
            vec![Directive::CreateTable(table)],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, TenantryError::InvalidMigration { .. }));
    }

    #[test]
    fn test_checksum_is_stable() {
        let build = || {
            Migration::new(
                "001_create_tenants",
                vec![Directive::CreateTable(tenant::table())],
                vec![Directive::DropTable {
                    table: tenant::TABLE.into(),
                }],
            )
            .unwrap()
        };
        let a = build();
        let b = build();
        assert_eq!(a.checksum(), b.checksum());
        assert_eq!(a.checksum().len(), 16);

        let mut c = build();
        c.down.clear();
        assert_ne!(a.checksum(), c.checksum());
    }
}
