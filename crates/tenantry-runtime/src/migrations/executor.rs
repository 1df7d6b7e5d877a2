use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tenantry_core::config::MigrationsConfig;
use tenantry_core::error::{Result, TenantryError};
use tenantry_core::schema::Direction;
use tracing::{debug, info, warn};

use super::registry::MigrationRegistry;
use super::unit::{Migration, MigrationId};
use crate::backend::{AppliedMigration, SchemaBackend};

/// Units applied or reverted by one executor call, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub direction: Direction,
    pub units: Vec<MigrationId>,
}

impl MigrationReport {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            units: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// A ledger entry as seen against the current registry.
#[derive(Debug, Clone)]
pub struct AppliedStatus {
    pub id: String,
    pub applied_at: DateTime<Utc>,
    /// False when the ledger names a unit the registry does not know.
    pub registered: bool,
    /// The registered unit no longer renders the SQL that was applied.
    pub checksum_drift: bool,
}

#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub applied: Vec<AppliedStatus>,
    pub pending: Vec<MigrationId>,
}

/// Applies and reverts registered units against a backend, one at a time,
/// under the backend's single-writer lock.
pub struct MigrationExecutor<B: SchemaBackend> {
    registry: MigrationRegistry,
    backend: B,
    lock_timeout: Duration,
    lock_poll_interval: Duration,
}

impl<B: SchemaBackend> MigrationExecutor<B> {
    pub fn new(registry: MigrationRegistry, backend: B) -> Self {
        let config = MigrationsConfig::default();
        Self {
            registry,
            backend,
            lock_timeout: config.lock_timeout(),
            lock_poll_interval: config.lock_poll_interval(),
        }
    }

    /// Take lock timing from configuration.
    pub fn with_config(mut self, config: &MigrationsConfig) -> Self {
        self.lock_timeout = config.lock_timeout();
        self.lock_poll_interval = config.lock_poll_interval();
        self
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Apply every registered unit not yet in the ledger, in ascending order.
    ///
    /// Stops at the first failing unit; units before it stay applied.
    pub async fn apply_pending(&self) -> Result<MigrationReport> {
        self.registry.verify()?;
        self.locked(self.apply_pending_inner()).await
    }

    async fn apply_pending_inner(&self) -> Result<MigrationReport> {
        let applied = self.load_ledger().await?;
        let pending = self.pending(&applied)?;

        let mut report = MigrationReport::new(Direction::Up);
        if pending.is_empty() {
            debug!("No pending migrations");
            return Ok(report);
        }

        for migration in pending {
            self.run(migration, Direction::Up).await?;
            report.units.push(migration.id.clone());
        }
        Ok(report)
    }

    /// Revert the `n` most recently applied units, newest first.
    pub async fn revert_last(&self, n: usize) -> Result<MigrationReport> {
        if n == 0 {
            return Ok(MigrationReport::new(Direction::Down));
        }
        self.locked(self.revert_last_inner(n)).await
    }

    async fn revert_last_inner(&self, n: usize) -> Result<MigrationReport> {
        let applied = self.load_ledger().await?;
        if n > applied.len() {
            let subject = applied
                .first()
                .map(|a| a.id.clone())
                .unwrap_or_else(|| "ledger".to_string());
            return Err(TenantryError::ordering_violation(
                subject,
                format!("cannot revert {} units, only {} applied", n, applied.len()),
            ));
        }

        let targets = applied
            .iter()
            .rev()
            .take(n)
            .map(|entry| self.registered(&entry.id))
            .collect::<Result<Vec<_>>>()?;

        let mut report = MigrationReport::new(Direction::Down);
        for migration in targets {
            self.run(migration, Direction::Down).await?;
            report.units.push(migration.id.clone());
        }
        Ok(report)
    }

    /// Apply one unit. It must be the next pending unit in order.
    pub async fn apply_unit(&self, id: &str) -> Result<()> {
        let migration = self
            .registry
            .get(id)
            .ok_or_else(|| TenantryError::NotFound(format!("migration {}", id)))?;
        self.registry.verify()?;
        self.locked(async {
            let applied = self.load_ledger().await?;
            if applied.iter().any(|a| a.id == id) {
                return Err(TenantryError::ordering_violation(id, "already applied"));
            }
            let pending = self.pending(&applied)?;
            match pending.first() {
                Some(next) if next.id == migration.id => self.run(migration, Direction::Up).await,
                Some(next) => Err(TenantryError::ordering_violation(
                    id,
                    format!("{} must be applied first", next.id),
                )),
                None => Err(TenantryError::ordering_violation(id, "nothing is pending")),
            }
        })
        .await
    }

    /// Revert one unit. It must be the most recently applied unit.
    pub async fn revert_unit(&self, id: &str) -> Result<()> {
        self.locked(async {
            let applied = self.load_ledger().await?;
            match applied.last() {
                _ if !applied.iter().any(|a| a.id == id) => {
                    Err(TenantryError::ordering_violation(id, "never applied"))
                }
                Some(last) if last.id != id => Err(TenantryError::ordering_violation(
                    id,
                    format!("{} was applied after it and must be reverted first", last.id),
                )),
                _ => {
                    let migration = self.registered(id)?;
                    self.run(migration, Direction::Down).await
                }
            }
        })
        .await
    }

    /// Applied units (flagging drift and unknown entries) and pending units.
    pub async fn status(&self) -> Result<MigrationStatus> {
        let applied = self.load_ledger().await?;
        let applied_ids: HashSet<&str> = applied.iter().map(|a| a.id.as_str()).collect();

        let pending = self
            .registry
            .iter()
            .filter(|m| !applied_ids.contains(m.id.as_str()))
            .map(|m| m.id.clone())
            .collect();

        let applied = applied
            .iter()
            .map(|entry| {
                let registered = self.registry.get(&entry.id);
                AppliedStatus {
                    id: entry.id.clone(),
                    applied_at: entry.applied_at,
                    registered: registered.is_some(),
                    checksum_drift: registered.is_some_and(|m| has_drift(entry, m)),
                }
            })
            .collect();

        Ok(MigrationStatus { applied, pending })
    }

    async fn locked<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        self.acquire_lock().await?;
        let mut guard = LockGuard {
            backend: &self.backend,
            held: true,
        };

        let result = op.await;

        // Always release lock, even on error
        match self.backend.unlock().await {
            Ok(()) => guard.held = false,
            Err(e) => warn!("Failed to release migration lock: {}", e),
        }

        result
    }

    async fn acquire_lock(&self) -> Result<()> {
        debug!("Acquiring migration lock...");
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            if self.backend.try_lock().await? {
                debug!("Migration lock acquired");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(TenantryError::LockContention(format!(
                    "lock not acquired within {}s",
                    self.lock_timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.lock_poll_interval).await;
        }
    }

    /// Ledger entries in ascending identifier order, with warnings for
    /// entries the registry does not know and for checksum drift.
    async fn load_ledger(&self) -> Result<Vec<AppliedMigration>> {
        self.backend.ensure_ledger().await?;
        let mut applied = self.backend.applied().await?;
        applied.sort_by_key(|a| (MigrationId::parse(&a.id).ok(), a.id.clone()));
        debug!("Already applied migrations: {}", applied.len());

        for entry in &applied {
            match self.registry.get(&entry.id) {
                None => warn!(migration = %entry.id, "Applied migration is not registered"),
                Some(m) if has_drift(entry, m) => warn!(
                    migration = %entry.id,
                    "Applied migration has changed since it was applied"
                ),
                Some(_) => {}
            }
        }
        Ok(applied)
    }

    /// Registered units missing from the ledger, in order. None may sort
    /// before a unit that is already applied.
    fn pending(&self, applied: &[AppliedMigration]) -> Result<Vec<&Migration>> {
        let applied_ids: HashSet<&str> = applied.iter().map(|a| a.id.as_str()).collect();
        let highest = applied
            .iter()
            .filter_map(|a| MigrationId::parse(&a.id).ok())
            .max();

        let pending: Vec<&Migration> = self
            .registry
            .iter()
            .filter(|m| !applied_ids.contains(m.id.as_str()))
            .collect();

        if let Some(highest) = highest {
            if let Some(early) = pending.iter().find(|m| m.id < highest) {
                return Err(TenantryError::ordering_violation(
                    early.id.as_str(),
                    format!("sorts before {}, which is already applied", highest),
                ));
            }
        }
        Ok(pending)
    }

    fn registered(&self, id: &str) -> Result<&Migration> {
        self.registry.get(id).ok_or_else(|| {
            TenantryError::ordering_violation(id, "applied but not registered; its down is unknown")
        })
    }

    async fn run(&self, migration: &Migration, direction: Direction) -> Result<()> {
        let verb = match direction {
            Direction::Up => "Applying",
            Direction::Down => "Reverting",
        };
        info!(migration = %migration.id, "{} migration", verb);
        let start = Instant::now();
        self.backend.run_unit(migration, direction).await?;
        info!(
            migration = %migration.id,
            %direction,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Migration complete"
        );
        Ok(())
    }
}

/// Releases the lock if a run is dropped before it unlocks normally.
struct LockGuard<'a, B: SchemaBackend> {
    backend: &'a B,
    held: bool,
}

impl<B: SchemaBackend> Drop for LockGuard<'_, B> {
    fn drop(&mut self) {
        if self.held {
            warn!("Migration run ended without unlocking; releasing lock");
            self.backend.release_abandoned_lock();
        }
    }
}

fn has_drift(entry: &AppliedMigration, migration: &Migration) -> bool {
    entry
        .checksum
        .as_deref()
        .is_some_and(|c| c != migration.checksum())
}
