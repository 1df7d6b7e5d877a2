mod builtin;
mod executor;
mod loader;
mod registry;
mod unit;

pub use builtin::builtin_migrations;
pub use executor::{AppliedStatus, MigrationExecutor, MigrationReport, MigrationStatus};
pub use loader::{load_migrations_from_dir, parse_unit};
pub use registry::MigrationRegistry;
pub use unit::{Migration, MigrationId};
