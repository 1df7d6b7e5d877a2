use std::collections::BTreeMap;

use tenantry_core::error::{Result, TenantryError};
use tenantry_core::schema::{Direction, SchemaSnapshot};
use tracing::debug;

use super::unit::{Migration, MigrationId};

/// Explicit, ordered collection of migration units.
///
/// Registration order is irrelevant; iteration is always in ascending
/// identifier order.
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    units: BTreeMap<MigrationId, Migration>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit. Identifiers and their numeric prefixes must be unique.
    pub fn register(&mut self, migration: Migration) -> Result<()> {
        if self.units.contains_key(&migration.id) {
            return Err(TenantryError::invalid_migration(
                migration.id.as_str(),
                "already registered",
            ));
        }
        if let Some(existing) = self
            .units
            .keys()
            .find(|id| id.prefix() == migration.id.prefix())
        {
            return Err(TenantryError::invalid_migration(
                migration.id.as_str(),
                format!("prefix {} is already used by {}", existing.prefix(), existing),
            ));
        }
        debug!(migration = %migration.id, "Registered migration");
        self.units.insert(migration.id.clone(), migration);
        Ok(())
    }

    pub fn register_all(&mut self, migrations: impl IntoIterator<Item = Migration>) -> Result<()> {
        for migration in migrations {
            self.register(migration)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Migration> {
        self.units.values().find(|m| m.id.as_str() == id)
    }

    /// Units in ascending identifier order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Migration> {
        self.units.values()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Replay every unit against an empty schema without touching a database.
    ///
    /// Each `up` must apply cleanly on top of its predecessors and each `down`
    /// must restore exactly the schema that preceded its `up`. Returns the
    /// schema after all units.
    pub fn verify(&self) -> Result<SchemaSnapshot> {
        let mut schema = SchemaSnapshot::new();
        for migration in self.iter() {
            let before = schema.clone();
            let id = migration.id.as_str();

            schema
                .apply_all(migration.directives(Direction::Up))
                .map_err(|e| TenantryError::invalid_migration(id, format!("up: {}", e)))?;

            let mut reverted = schema.clone();
            reverted
                .apply_all(migration.directives(Direction::Down))
                .map_err(|e| TenantryError::invalid_migration(id, format!("down: {}", e)))?;
            if !reverted.structurally_eq(&before) {
                return Err(TenantryError::invalid_migration(
                    id,
                    "down does not restore the schema that preceded up",
                ));
            }
        }
        Ok(schema)
    }
}
