use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::path::Path;
use tracing::debug;

use tenantry_core::config::{LogFormat, LoggingConfig, TenantryConfig};
use tenantry_core::schema::Direction;
use tenantry_runtime::migrations::{
    builtin_migrations, load_migrations_from_dir, MigrationExecutor, MigrationRegistry,
};
use tenantry_runtime::{Database, PostgresBackend};

/// Manage database migrations.
#[derive(Parser)]
pub struct MigrateCommand {
    #[command(subcommand)]
    pub action: MigrateAction,

    /// Configuration file path.
    #[arg(short, long, default_value = "tenantry.toml", global = true)]
    pub config: String,

    /// Migrations directory path (defaults to `migrations.directory`).
    #[arg(short, long, global = true)]
    pub migrations_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum MigrateAction {
    /// Apply all pending migrations.
    Up,

    /// Revert the last N migrations.
    Down {
        /// Number of migrations to revert.
        #[arg(default_value = "1")]
        count: usize,
    },

    /// Show applied and pending migrations.
    Status,

    /// Check offline that every migration applies and reverts cleanly.
    Verify,

    /// Print the SQL a migration runs.
    Sql {
        /// Migration identifier, e.g. 002_create_users.
        id: String,

        /// Print the down SQL instead of the up SQL.
        #[arg(long)]
        down: bool,
    },
}

impl MigrateAction {
    fn needs_database(&self) -> bool {
        !matches!(self, MigrateAction::Verify | MigrateAction::Sql { .. })
    }
}

impl MigrateCommand {
    pub async fn execute(self) -> Result<()> {
        // Load .env if present
        dotenvy::dotenv().ok();

        let config = resolve_config(
            Path::new(&self.config),
            std::env::var("DATABASE_URL").ok(),
            self.action.needs_database(),
        )?;
        init_logging(&config.logging);

        let migrations_dir = self
            .migrations_dir
            .clone()
            .unwrap_or_else(|| config.migrations.directory.clone());
        let registry = build_registry(Path::new(&migrations_dir))?;
        debug!(
            units = registry.len(),
            directory = %migrations_dir,
            "Migration registry built"
        );

        match self.action {
            MigrateAction::Verify => {
                header("Verify");
                let schema = registry.verify()?;
                println!(
                    "  {} {} migration(s) apply and revert cleanly ({} tables)",
                    style("✓").green(),
                    registry.len(),
                    schema.tables().count()
                );
                println!();
                return Ok(());
            }
            MigrateAction::Sql { id, down } => {
                let migration = registry
                    .get(&id)
                    .with_context(|| format!("Migration not found: {}", id))?;
                let direction = if down { Direction::Down } else { Direction::Up };
                for statement in migration.sql(direction) {
                    println!("{};", statement);
                }
                return Ok(());
            }
            _ => {}
        }

        let db = Database::from_config(&config.database).await?;
        let backend = PostgresBackend::new(db.pool().clone(), &config.migrations.ledger_table)
            .with_statement_timeout(config.database.statement_timeout_secs);
        let executor = MigrationExecutor::new(registry, backend).with_config(&config.migrations);

        let result = run_action(&executor, self.action).await;
        db.close().await;
        result
    }
}

async fn run_action(
    executor: &MigrationExecutor<PostgresBackend>,
    action: MigrateAction,
) -> Result<()> {
    match action {
        MigrateAction::Up => {
            header("Migrations");
            println!("  {} Running pending migrations...", style("→").dim());
            let report = executor.apply_pending().await?;
            if report.is_empty() {
                println!("  {} Already up to date", style("ℹ").blue());
            } else {
                for id in &report.units {
                    println!("  {} Applied: {}", style("✓").green(), id);
                }
                println!();
                println!(
                    "  {} Applied {} migration(s)",
                    style("✓").green(),
                    report.len()
                );
            }
            println!();
        }

        MigrateAction::Down { count } => {
            header("Migrations");
            if count == 0 {
                println!("  {} Nothing to revert (count=0)", style("ℹ").blue());
                return Ok(());
            }

            println!(
                "  {} Reverting {} migration(s)...",
                style("→").dim(),
                count
            );
            let report = executor.revert_last(count).await?;
            for id in &report.units {
                println!("  {} Reverted: {}", style("✓").green(), id);
            }
            println!();
            println!(
                "  {} Reverted {} migration(s)",
                style("✓").green(),
                report.len()
            );
            println!();
        }

        MigrateAction::Status => {
            header("Migration Status");
            let status = executor.status().await?;

            if status.applied.is_empty() && status.pending.is_empty() {
                println!("  {} No migrations found", style("ℹ").blue());
                return Ok(());
            }

            if !status.applied.is_empty() {
                println!("  {} Applied:", style("✓").green());
                for m in &status.applied {
                    let marker = if !m.registered {
                        style("?").red().to_string()
                    } else if m.checksum_drift {
                        style("~").yellow().to_string()
                    } else {
                        style("✓").green().to_string()
                    };
                    println!(
                        "    {} {} {} ({}){}",
                        marker,
                        style(&m.id).cyan(),
                        style("at").dim(),
                        m.applied_at.format("%Y-%m-%d %H:%M:%S"),
                        describe(executor.registry(), &m.id)
                    );
                }
            }

            if !status.pending.is_empty() {
                if !status.applied.is_empty() {
                    println!();
                }
                println!("  {} Pending:", style("○").yellow());
                for id in &status.pending {
                    println!(
                        "    {} {}{}",
                        style("→").dim(),
                        style(id).yellow(),
                        describe(executor.registry(), id.as_str())
                    );
                }
            }

            println!();
            println!(
                "  {} {} applied, {} pending",
                style("ℹ").blue(),
                status.applied.len(),
                status.pending.len()
            );
            println!();

            // Legend
            println!(
                "  {} = changed since applied, {} = not registered",
                style("~").yellow(),
                style("?").red()
            );
            println!();
        }

        MigrateAction::Verify | MigrateAction::Sql { .. } => {}
    }

    Ok(())
}

/// The unit's description as a dimmed suffix, if it has one.
fn describe(registry: &MigrationRegistry, id: &str) -> String {
    registry
        .get(id)
        .and_then(|m| m.description.as_deref())
        .map(|d| format!(" {}", style(format!("- {}", d)).dim()))
        .unwrap_or_default()
}

fn header(title: &str) {
    println!();
    println!(
        "  {} {}",
        style("tenantry").bold().cyan(),
        style(title).bold()
    );
    println!();
}

/// Load the config file, falling back to defaults plus `DATABASE_URL`.
fn resolve_config(
    path: &Path,
    database_url: Option<String>,
    needs_database: bool,
) -> Result<TenantryConfig> {
    if path.exists() {
        return Ok(TenantryConfig::from_file(path)?);
    }
    match database_url {
        Some(url) => Ok(TenantryConfig::default_with_database_url(&url)),
        None if !needs_database => Ok(TenantryConfig::default_with_database_url("")),
        None => anyhow::bail!(
            "Configuration file not found: {}\nCreate it or set DATABASE_URL.",
            path.display()
        ),
    }
}

/// Built-in migrations followed by any unit files in `dir`.
fn build_registry(dir: &Path) -> Result<MigrationRegistry> {
    let mut registry = MigrationRegistry::new();
    registry.register_all(builtin_migrations()?)?;
    registry.register_all(load_migrations_from_dir(dir)?)?;
    Ok(registry)
}

fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
}
