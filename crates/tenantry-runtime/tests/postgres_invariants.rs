//! Schema invariants against a real PostgreSQL database.
//!
//! Runs only when `TEST_DATABASE_URL` is set; each test gets its own database.

use sqlx::PgPool;
use tenantry_core::config::MigrationsConfig;
use tenantry_core::error::TenantryError;
use tenantry_core::schema::{Constraint, Direction, Directive, UniqueConstraint};
use tenantry_core::testing::{IsolatedTestDb, TestDatabase};
use tenantry_runtime::{
    builtin_migrations, Migration, MigrationExecutor, MigrationRegistry, PostgresBackend,
    SchemaBackend,
};

const LEDGER: &str = "tenantry_migrations";

/// `None` only when `TEST_DATABASE_URL` is unset; a URL that cannot be
/// reached fails the test.
async fn isolated(test_name: &str) -> Option<IsolatedTestDb> {
    if std::env::var_os("TEST_DATABASE_URL").is_none() {
        eprintln!("TEST_DATABASE_URL not set, skipping {}", test_name);
        return None;
    }
    let base = TestDatabase::from_env()
        .await
        .expect("TEST_DATABASE_URL is set but the database is unreachable");
    Some(base.isolated(test_name).await.unwrap())
}

fn registry_with(extra: Vec<Migration>) -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    registry.register_all(builtin_migrations().unwrap()).unwrap();
    registry.register_all(extra).unwrap();
    registry
}

fn executor(pool: &PgPool, extra: Vec<Migration>) -> MigrationExecutor<PostgresBackend> {
    MigrationExecutor::new(
        registry_with(extra),
        PostgresBackend::new(pool.clone(), LEDGER),
    )
}

async fn user_tables(pool: &PgPool) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT table_name::TEXT FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_name <> $1 ORDER BY table_name",
    )
    .bind(LEDGER)
    .fetch_all(pool)
    .await
    .unwrap()
}

async fn ledger_len(pool: &PgPool) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", LEDGER))
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn insert_tenant(pool: &PgPool, slug: &str) -> uuid::Uuid {
    sqlx::query_scalar("INSERT INTO tenants (slug) VALUES ($1) RETURNING id")
        .bind(slug)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn insert_user(
    pool: &PgPool,
    tenant_id: Option<uuid::Uuid>,
    email: &str,
    phone: &str,
) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO users (tenant_id, email, phone) VALUES ($1, $2, $3)")
        .bind(tenant_id)
        .bind(email)
        .bind(phone)
        .execute(pool)
        .await
        .map(|_| ())
}

fn unique_violation(result: sqlx::Result<()>) -> bool {
    match result {
        Err(sqlx::Error::Database(e)) => e.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[tokio::test]
async fn round_trip_and_idempotency() {
    let Some(db) = isolated("round_trip_and_idempotency").await else {
        return;
    };
    let executor = executor(db.pool(), vec![]);

    assert_eq!(executor.apply_pending().await.unwrap().len(), 4);
    assert!(executor.apply_pending().await.unwrap().is_empty());
    assert_eq!(
        user_tables(db.pool()).await,
        ["product_categories", "products", "tenants", "users"]
    );

    let status = executor.status().await.unwrap();
    assert!(status.pending.is_empty());
    assert!(status.applied.iter().all(|a| !a.checksum_drift));

    assert_eq!(executor.revert_last(4).await.unwrap().len(), 4);
    assert!(user_tables(db.pool()).await.is_empty());
    assert_eq!(ledger_len(db.pool()).await, 0);

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn tenant_scoped_uniqueness_and_cascade() {
    let Some(db) = isolated("tenant_scoped_uniqueness_and_cascade").await else {
        return;
    };
    executor(db.pool(), vec![]).apply_pending().await.unwrap();
    let pool = db.pool();

    let acme = insert_tenant(pool, "acme").await;
    let globex = insert_tenant(pool, "globex").await;

    insert_user(pool, Some(acme), "pat@example.com", "1").await.unwrap();
    insert_user(pool, Some(globex), "pat@example.com", "1").await.unwrap();
    assert!(unique_violation(
        insert_user(pool, Some(acme), "pat@example.com", "2").await
    ));

    let role: String = sqlx::query_scalar("SELECT role FROM users WHERE tenant_id = $1")
        .bind(acme)
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(role, "member");

    db.execute("INSERT INTO products (slug, name, category, unit) VALUES ('rice', 'Rice', 'grains', 'kg')")
        .await
        .unwrap();
    db.execute("INSERT INTO product_categories (slug, name, sort_order) VALUES ('grains', 'Grains', 1)")
        .await
        .unwrap();
    db.execute("INSERT INTO product_categories (slug, name, sort_order) VALUES ('dairy', 'Dairy', 1)")
        .await
        .unwrap();
    assert!(db
        .execute("INSERT INTO product_categories (slug, name) VALUES ('grains', 'Other')")
        .await
        .is_err());

    sqlx::query("DELETE FROM tenants WHERE id = $1")
        .bind(acme)
        .execute(pool)
        .await
        .unwrap();
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(remaining, 1);
    let products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(products, 1);

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn failing_unit_rolls_back() {
    let Some(db) = isolated("failing_unit_rolls_back").await else {
        return;
    };
    executor(db.pool(), vec![]).apply_pending().await.unwrap();
    db.execute(
        "INSERT INTO products (slug, name, category, unit) VALUES \
         ('rice-1kg', 'Rice', 'grains', 'kg'), ('rice-5kg', 'Rice', 'grains', 'kg')",
    )
    .await
    .unwrap();

    let unique_name = Migration::new(
        "005_unique_product_name",
        vec![Directive::AddConstraint {
            table: "products".into(),
            constraint: Constraint::Unique(UniqueConstraint::new("products_name_key", &["name"])),
        }],
        vec![Directive::DropConstraint {
            table: "products".into(),
            name: "products_name_key".into(),
        }],
    )
    .unwrap();

    let err = executor(db.pool(), vec![unique_name])
        .apply_pending()
        .await
        .unwrap_err();
    assert!(matches!(err, TenantryError::StructuralConflict { .. }));
    assert_eq!(err.subject(), Some("005_unique_product_name"));
    assert_eq!(ledger_len(db.pool()).await, 4);

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn dropping_referenced_table_is_irreversible() {
    let Some(db) = isolated("dropping_referenced_table_is_irreversible").await else {
        return;
    };
    let executor = executor(db.pool(), vec![]);
    executor.apply_pending().await.unwrap();

    let tenants = executor.registry().get("001_create_tenants").unwrap();
    let err = executor
        .backend()
        .run_unit(tenants, Direction::Down)
        .await
        .unwrap_err();
    assert!(matches!(err, TenantryError::IrreversibleRevert { .. }));
    assert_eq!(ledger_len(db.pool()).await, 4);
    assert_eq!(user_tables(db.pool()).await.len(), 4);

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn concurrent_run_reports_lock_contention() {
    let Some(db) = isolated("concurrent_run_reports_lock_contention").await else {
        return;
    };
    let holder = PostgresBackend::new(db.pool().clone(), LEDGER);
    assert!(holder.try_lock().await.unwrap());

    let config = MigrationsConfig {
        lock_timeout_secs: 0,
        ..Default::default()
    };
    let err = executor(db.pool(), vec![])
        .with_config(&config)
        .apply_pending()
        .await
        .unwrap_err();
    assert!(matches!(err, TenantryError::LockContention(_)));

    holder.unlock().await.unwrap();
    executor(db.pool(), vec![])
        .with_config(&config)
        .apply_pending()
        .await
        .unwrap();

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn abandoned_lock_is_released_with_its_session() {
    let Some(db) = isolated("abandoned_lock_is_released_with_its_session").await else {
        return;
    };
    let holder = PostgresBackend::new(db.pool().clone(), LEDGER);
    assert!(holder.try_lock().await.unwrap());
    holder.release_abandoned_lock();

    // The server drops the advisory lock once it notices the closed session.
    let config = MigrationsConfig {
        lock_timeout_secs: 5,
        lock_poll_interval_ms: 50,
        ..Default::default()
    };
    let report = executor(db.pool(), vec![])
        .with_config(&config)
        .apply_pending()
        .await
        .unwrap();
    assert_eq!(report.len(), 4);

    db.cleanup().await.unwrap();
}
