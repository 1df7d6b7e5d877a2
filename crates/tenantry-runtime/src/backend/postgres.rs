use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres, Row};
use tenantry_core::error::{Result, TenantryError};
use tenantry_core::schema::Direction;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{AppliedMigration, SchemaBackend};
use crate::migrations::Migration;

/// Advisory lock key for migration runs ("TENANT" in ASCII).
const MIGRATION_LOCK_ID: i64 = 0x54454E414E54;

/// Runs units against PostgreSQL, one transaction per unit.
pub struct PostgresBackend {
    pool: PgPool,
    ledger_table: String,
    statement_timeout_secs: u64,
    /// Session-level advisory locks belong to a connection, so the
    /// connection that took the lock is kept until it is released.
    lock_conn: Mutex<Option<PoolConnection<Postgres>>>,
}

impl PostgresBackend {
    /// `ledger_table` must be a plain identifier; the config layer checks it.
    pub fn new(pool: PgPool, ledger_table: impl Into<String>) -> Self {
        Self {
            pool,
            ledger_table: ledger_table.into(),
            statement_timeout_secs: 0,
            lock_conn: Mutex::new(None),
        }
    }

    /// Abort any single statement that runs longer than `secs` (0 disables).
    pub fn with_statement_timeout(mut self, secs: u64) -> Self {
        self.statement_timeout_secs = secs;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_ledger_inner(&self) -> Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id VARCHAR(255) PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                checksum VARCHAR(64),
                execution_time_ms INTEGER
            )
            "#,
            self.ledger_table
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| TenantryError::Database(format!("Failed to create ledger table: {}", e)))?;
        Ok(())
    }

    async fn try_lock_inner(&self) -> Result<bool> {
        let mut held = self.lock_conn.lock().await;
        if held.is_some() {
            return Ok(false);
        }

        let mut conn = self.pool.acquire().await.map_err(|e| {
            TenantryError::Database(format!("Failed to acquire migration lock: {}", e))
        })?;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(MIGRATION_LOCK_ID)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                TenantryError::Database(format!("Failed to acquire migration lock: {}", e))
            })?;

        if acquired {
            debug!("Migration lock acquired");
            *held = Some(conn);
        }
        Ok(acquired)
    }

    async fn unlock_inner(&self) -> Result<()> {
        let Some(mut conn) = self.lock_conn.lock().await.take() else {
            return Ok(());
        };
        if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&mut *conn)
            .await
        {
            // Never hand a connection that may still hold the lock back to the pool.
            drop(conn.detach());
            return Err(TenantryError::Database(format!(
                "Failed to release migration lock: {}",
                e
            )));
        }
        debug!("Migration lock released");
        Ok(())
    }

    async fn applied_inner(&self) -> Result<Vec<AppliedMigration>> {
        let rows = sqlx::query(&format!(
            "SELECT id, applied_at, checksum, execution_time_ms FROM {} ORDER BY id ASC",
            self.ledger_table
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TenantryError::Database(format!("Failed to read ledger: {}", e)))?;

        rows.iter()
            .map(|row| -> Result<AppliedMigration> {
                Ok(AppliedMigration {
                    id: row.try_get("id")?,
                    applied_at: row.try_get("applied_at")?,
                    checksum: row.try_get("checksum")?,
                    execution_time_ms: row.try_get("execution_time_ms")?,
                })
            })
            .collect()
    }

    async fn run_unit_inner(&self, migration: &Migration, direction: Direction) -> Result<()> {
        let id = migration.id.as_str();
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(|e| {
            TenantryError::Database(format!("Failed to begin transaction for {}: {}", id, e))
        })?;

        if self.statement_timeout_secs > 0 {
            sqlx::query(&format!(
                "SET LOCAL statement_timeout = '{}s'",
                self.statement_timeout_secs
            ))
            .execute(&mut *tx)
            .await
            .map_err(|e| classify(e, id, direction))?;
        }

        match direction {
            Direction::Up => {
                let recorded: i64 = sqlx::query_scalar(&format!(
                    "SELECT COUNT(*) FROM {} WHERE id = $1",
                    self.ledger_table
                ))
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| classify(e, id, direction))?;
                if recorded > 0 {
                    return Err(TenantryError::ordering_violation(id, "already applied"));
                }
            }
            Direction::Down => {
                let removed = sqlx::query(&format!(
                    "DELETE FROM {} WHERE id = $1",
                    self.ledger_table
                ))
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| classify(e, id, direction))?;
                if removed.rows_affected() == 0 {
                    return Err(TenantryError::ordering_violation(id, "never applied"));
                }
            }
        }

        for statement in migration.sql(direction) {
            debug!(migration = %id, %direction, "{}", statement);
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| classify(e, id, direction))?;
        }

        if direction == Direction::Up {
            let elapsed = i32::try_from(start.elapsed().as_millis()).unwrap_or(i32::MAX);
            sqlx::query(&format!(
                "INSERT INTO {} (id, checksum, execution_time_ms) VALUES ($1, $2, $3)",
                self.ledger_table
            ))
            .bind(id)
            .bind(migration.checksum())
            .bind(elapsed)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify(e, id, direction))?;
        }

        tx.commit().await.map_err(|e| {
            TenantryError::Database(format!("Failed to commit migration {}: {}", id, e))
        })?;
        Ok(())
    }
}

/// Map a database error raised inside a unit onto the error taxonomy.
///
/// Integrity violations (class 23), syntax or object errors (class 42) and
/// dependent objects (2BP01) mean the schema or its rows reject the change.
fn classify(err: sqlx::Error, migration: &str, direction: Direction) -> TenantryError {
    if let sqlx::Error::Database(db) = &err {
        let code = db.code().map(|c| c.to_string()).unwrap_or_default();
        if is_structural(&code) {
            return match direction {
                Direction::Up => TenantryError::structural_conflict(migration, db.message()),
                Direction::Down => TenantryError::irreversible_revert(migration, db.message()),
            };
        }
    }
    TenantryError::Database(format!(
        "Failed to run migration {} ({}): {}",
        migration, direction, err
    ))
}

fn is_structural(code: &str) -> bool {
    code.starts_with("23") || code.starts_with("42") || code == "2BP01"
}

impl SchemaBackend for PostgresBackend {
    fn ensure_ledger(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.ensure_ledger_inner())
    }

    fn try_lock(&self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        Box::pin(self.try_lock_inner())
    }

    fn unlock(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.unlock_inner())
    }

    fn release_abandoned_lock(&self) {
        // Session advisory locks die with their session, so the held
        // connection is detached from the pool and dropped, closing it.
        match self.lock_conn.try_lock() {
            Ok(mut held) => {
                if let Some(conn) = held.take() {
                    drop(conn.detach());
                    debug!("Migration lock connection closed");
                }
            }
            Err(_) => warn!("Migration lock connection busy; it is released when the pool closes"),
        }
    }

    fn applied(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AppliedMigration>>> + Send + '_>> {
        Box::pin(self.applied_inner())
    }

    fn run_unit<'a>(
        &'a self,
        migration: &'a Migration,
        direction: Direction,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.run_unit_inner(migration, direction))
    }
}
