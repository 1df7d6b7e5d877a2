use std::path::Path;

use serde::Deserialize;
use tenantry_core::error::{Result, TenantryError};
use tenantry_core::schema::Directive;
use tracing::debug;

use super::unit::Migration;

/// On-disk layout of a unit file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UnitFile {
    #[serde(default)]
    description: Option<String>,
    up: Vec<Directive>,
    #[serde(default)]
    down: Vec<Directive>,
}

/// Parse a single unit from TOML.
pub fn parse_unit(id: &str, content: &str) -> Result<Migration> {
    let file: UnitFile =
        toml::from_str(content).map_err(|e| TenantryError::invalid_migration(id, e))?;
    let migration = Migration::new(id, file.up, file.down)?;
    Ok(match file.description {
        Some(description) => migration.with_description(description),
        None => migration,
    })
}

/// Load migration units from a directory.
///
/// Units are TOML files named like:
/// - `005_add_tenant_locale.toml`
/// - `006_index_user_email.toml`
///
/// The file stem is the identifier. A missing directory holds no units.
pub fn load_migrations_from_dir(dir: &Path) -> Result<Vec<Migration>> {
    if !dir.exists() {
        debug!("Migrations directory does not exist: {:?}", dir);
        return Ok(Vec::new());
    }

    let mut migrations = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.extension().map(|e| e == "toml").unwrap_or(false) {
            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| TenantryError::Config("Invalid migration filename".into()))?
                .to_string();

            let content = std::fs::read_to_string(&path)?;
            migrations.push(parse_unit(&id, &content)?);
        }
    }

    migrations.sort_by(|a, b| a.id.cmp(&b.id));

    debug!("Loaded {} migration files", migrations.len());
    Ok(migrations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const ADD_LOCALE: &str = r#"
description = "Tenant locale"

[[up]]
op = "add_column"
table = "tenants"

[up.column]
name = "locale"
type = "text"
nullable = true

[[down]]
op = "drop_column"
table = "tenants"
column = "locale"
"#;

    #[test]
    fn test_load_migrations_from_empty_dir() {
        let dir = TempDir::new().unwrap();
        let migrations = load_migrations_from_dir(dir.path()).unwrap();
        assert!(migrations.is_empty());
    }

    #[test]
    fn test_load_migrations_from_nonexistent_dir() {
        let migrations = load_migrations_from_dir(Path::new("/nonexistent/path")).unwrap();
        assert!(migrations.is_empty());
    }

    #[test]
    fn test_load_migrations_sorted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("007_second.toml"), ADD_LOCALE).unwrap();
        fs::write(dir.path().join("005_first.toml"), ADD_LOCALE).unwrap();

        let migrations = load_migrations_from_dir(dir.path()).unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].id.as_str(), "005_first");
        assert_eq!(migrations[1].id.as_str(), "007_second");
        assert_eq!(migrations[0].description.as_deref(), Some("Tenant locale"));
    }

    #[test]
    fn test_load_migrations_ignores_non_toml() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("005_locale.toml"), ADD_LOCALE).unwrap();
        fs::write(dir.path().join("readme.txt"), "Not a migration").unwrap();
        fs::write(dir.path().join("006_backup.toml.bak"), "Backup").unwrap();

        let migrations = load_migrations_from_dir(dir.path()).unwrap();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].up.len(), 1);
        assert_eq!(migrations[0].down.len(), 1);
    }

    #[test]
    fn test_parse_error_names_the_unit() {
        let err = parse_unit("005_broken", "[[up]]\nop = \"rename_table\"\n").unwrap_err();
        assert!(matches!(err, TenantryError::InvalidMigration { .. }));
        assert_eq!(err.subject(), Some("005_broken"));
    }

    #[test]
    fn test_bad_filename_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("locale.toml"), ADD_LOCALE).unwrap();
        assert!(load_migrations_from_dir(dir.path()).is_err());
    }
}
