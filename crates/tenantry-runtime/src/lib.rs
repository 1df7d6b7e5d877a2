pub mod backend;
pub mod db;
pub mod migrations;

pub use backend::{AppliedMigration, MemoryBackend, PostgresBackend, SchemaBackend};
pub use db::Database;
pub use migrations::{
    builtin_migrations, load_migrations_from_dir, Migration, MigrationExecutor, MigrationId,
    MigrationRegistry, MigrationReport, MigrationStatus,
};
