use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use tenantry_core::error::{Result, TenantryError};
use tenantry_core::schema::{
    ColumnDef, ColumnType, Constraint, DeletePolicy, Direction, Directive, ForeignKey,
    SchemaError, SchemaSnapshot, TableDef,
};
use tokio::sync::Mutex;
use tracing::debug;

use super::{AppliedMigration, SchemaBackend};
use crate::migrations::Migration;

/// A stored row, keyed by column name.
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Default)]
struct State {
    schema: SchemaSnapshot,
    rows: BTreeMap<String, Vec<Row>>,
    ledger: BTreeMap<String, AppliedMigration>,
}

/// In-memory backend with the same atomicity and constraint semantics as
/// the database: every unit and every row write runs against a copy of the
/// state that replaces the original only on success.
///
/// Clones share state and lock, so two executors built from clones of one
/// backend contend like two processes on one database.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    locked: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current schema.
    pub async fn snapshot(&self) -> SchemaSnapshot {
        self.state.lock().await.schema.clone()
    }

    /// Rows of a table in insertion order.
    pub async fn rows(&self, table: &str) -> Result<Vec<Row>> {
        self.state
            .lock()
            .await
            .rows
            .get(table)
            .cloned()
            .ok_or_else(|| TenantryError::NotFound(format!("table {}", table)))
    }

    /// Insert a row, filling defaults. Returns the stored row.
    pub async fn insert(&self, table: &str, values: Row) -> Result<Row> {
        let mut state = self.state.lock().await;
        if state.schema.table(table).is_none() {
            return Err(TenantryError::NotFound(format!("table {}", table)));
        }
        let mut next = state.clone();
        let row = next
            .insert(table, values)
            .map_err(|e| TenantryError::structural_conflict(table, e))?;
        *state = next;
        Ok(row)
    }

    /// Delete a row by primary key, following foreign key delete policies.
    /// Returns the number of rows removed across all tables.
    pub async fn delete(&self, table: &str, id: &str) -> Result<usize> {
        let mut state = self.state.lock().await;
        let pk = state
            .schema
            .table(table)
            .and_then(TableDef::primary_key)
            .cloned()
            .ok_or_else(|| TenantryError::NotFound(format!("table {}", table)))?;
        let key = check_value(table, &pk, Value::String(id.to_string()))
            .map_err(|e| TenantryError::structural_conflict(table, e))?;

        let mut next = state.clone();
        let removed = next
            .delete_where(table, &pk.name, &key)
            .map_err(|e| TenantryError::structural_conflict(table, e))?;
        if removed == 0 {
            return Err(TenantryError::NotFound(format!("{} row {}", table, id)));
        }
        *state = next;
        Ok(removed)
    }

    async fn run_unit_inner(&self, migration: &Migration, direction: Direction) -> Result<()> {
        let id = migration.id.as_str();
        let start = Instant::now();
        let mut state = self.state.lock().await;
        let mut next = state.clone();

        match direction {
            Direction::Up if next.ledger.contains_key(id) => {
                return Err(TenantryError::ordering_violation(id, "already applied"));
            }
            Direction::Down if next.ledger.remove(id).is_none() => {
                return Err(TenantryError::ordering_violation(id, "never applied"));
            }
            _ => {}
        }

        for directive in migration.directives(direction) {
            debug!(migration = %id, %direction, "{}", directive.describe());
            next.apply(directive).map_err(|e| e.for_unit(id, direction))?;
        }

        if direction == Direction::Up {
            next.ledger.insert(
                id.to_string(),
                AppliedMigration {
                    id: id.to_string(),
                    applied_at: Utc::now(),
                    checksum: Some(migration.checksum()),
                    execution_time_ms: Some(
                        i32::try_from(start.elapsed().as_millis()).unwrap_or(i32::MAX),
                    ),
                },
            );
        }

        *state = next;
        Ok(())
    }
}

impl State {
    /// Apply a directive to the schema and bring existing rows along.
    fn apply(&mut self, directive: &Directive) -> std::result::Result<(), SchemaError> {
        self.schema.apply(directive)?;
        match directive {
            Directive::CreateTable(table) => {
                self.rows.insert(table.name.clone(), Vec::new());
            }
            Directive::DropTable { table } => {
                self.rows.remove(table);
            }
            Directive::AddColumn { table, column } => {
                for row in self.rows.entry(table.clone()).or_default() {
                    let value = column
                        .default
                        .as_ref()
                        .map(|d| d.materialize())
                        .unwrap_or(Value::Null);
                    row.insert(column.name.clone(), value);
                }
                self.check_table(table)?;
            }
            Directive::DropColumn { table, column } => {
                for row in self.rows.entry(table.clone()).or_default() {
                    row.remove(column);
                }
            }
            Directive::AddConstraint { table, .. } | Directive::SetEnumValues { table, .. } => {
                self.check_table(table)?;
            }
            Directive::CreateIndex(index) => self.check_table(&index.table)?,
            Directive::DropConstraint { .. } | Directive::DropIndex { .. } => {}
        }
        Ok(())
    }

    fn insert(&mut self, table: &str, mut row: Row) -> std::result::Result<Row, SchemaError> {
        let def = self
            .schema
            .table(table)
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))?;
        for column in &def.columns {
            if !row.contains_key(&column.name) {
                if let Some(default) = &column.default {
                    row.insert(column.name.clone(), default.materialize());
                }
            }
        }
        self.rows.entry(table.to_string()).or_default().push(row);
        self.check_table(table)?;
        self.rows
            .get(table)
            .and_then(|rows| rows.last().cloned())
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))
    }

    /// Remove rows where `column = key`, cascading or refusing per the
    /// delete policy of every foreign key pointing at `table`.
    fn delete_where(
        &mut self,
        table: &str,
        column: &str,
        key: &Value,
    ) -> std::result::Result<usize, SchemaError> {
        let rows = self
            .rows
            .get_mut(table)
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))?;
        let (removed, kept): (Vec<Row>, Vec<Row>) = std::mem::take(rows)
            .into_iter()
            .partition(|r| r.get(column) == Some(key));
        *rows = kept;

        let referencing: Vec<(String, ForeignKey)> = self
            .schema
            .foreign_keys()
            .into_iter()
            .filter(|(_, fk)| fk.references_table == table)
            .map(|(owner, fk)| (owner.to_string(), fk.clone()))
            .collect();

        let mut count = removed.len();
        for row in &removed {
            for (owner, fk) in &referencing {
                let Some(value) = row.get(&fk.references_column).filter(|v| !v.is_null()) else {
                    continue;
                };
                match fk.on_delete {
                    DeletePolicy::Cascade => count += self.delete_where(owner, &fk.column, value)?,
                    DeletePolicy::Restrict => {
                        let referenced = self
                            .rows
                            .get(owner)
                            .is_some_and(|rows| rows.iter().any(|r| r.get(&fk.column) == Some(value)));
                        if referenced {
                            return Err(SchemaError::DataViolation(format!(
                                "delete on table {} violates foreign key constraint {} on table {}",
                                table, fk.name, owner
                            )));
                        }
                    }
                }
            }
        }
        Ok(count)
    }

    /// Normalize every row of `table` and check it against the table's
    /// columns, uniqueness guarantees, foreign keys and checks.
    fn check_table(&mut self, table: &str) -> std::result::Result<(), SchemaError> {
        let def = self
            .schema
            .table(table)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))?;

        let mut rows = self.rows.get(table).cloned().unwrap_or_default();
        for row in rows.iter_mut() {
            normalize_row(&def, row)?;
        }

        check_unique(&def, &rows)?;
        for fk in def.foreign_keys() {
            let targets: HashSet<String> = if fk.references_table == def.name {
                column_values(&rows, &fk.references_column)
            } else {
                self.rows
                    .get(&fk.references_table)
                    .map(|r| column_values(r, &fk.references_column))
                    .unwrap_or_default()
            };
            if rows
                .iter()
                .filter_map(|r| r.get(&fk.column).filter(|v| !v.is_null()))
                .any(|v| !targets.contains(&v.to_string()))
            {
                return Err(SchemaError::DataViolation(format!(
                    "insert or update on table {} violates foreign key constraint {}",
                    def.name, fk.name
                )));
            }
        }
        check_checks(&def, &rows)?;

        self.rows.insert(table.to_string(), rows);
        Ok(())
    }
}

fn column_values(rows: &[Row], column: &str) -> HashSet<String> {
    rows.iter()
        .filter_map(|r| r.get(column).filter(|v| !v.is_null()))
        .map(Value::to_string)
        .collect()
}

fn normalize_row(def: &TableDef, row: &mut Row) -> std::result::Result<(), SchemaError> {
    if let Some(unknown) = row.keys().find(|k| def.column(k).is_none()) {
        return Err(SchemaError::UnknownColumn {
            table: def.name.clone(),
            column: unknown.clone(),
        });
    }
    for column in &def.columns {
        let value = row.get(&column.name).cloned().unwrap_or(Value::Null);
        row.insert(column.name.clone(), check_value(&def.name, column, value)?);
    }
    Ok(())
}

/// Check a value against its column and return its stored form.
fn check_value(
    table: &str,
    column: &ColumnDef,
    value: Value,
) -> std::result::Result<Value, SchemaError> {
    if value.is_null() {
        return if column.nullable {
            Ok(Value::Null)
        } else {
            Err(SchemaError::DataViolation(format!(
                "null value in column {} of relation {} violates not-null constraint",
                column.name, table
            )))
        };
    }

    let mismatch = || {
        SchemaError::DataViolation(format!(
            "invalid input for column {} of relation {}: expected {}",
            column.name,
            table,
            column.column_type.to_sql()
        ))
    };

    match &column.column_type {
        ColumnType::Uuid => value
            .as_str()
            .and_then(|s| uuid::Uuid::parse_str(s).ok())
            .map(|u| Value::String(u.to_string()))
            .ok_or_else(mismatch),
        ColumnType::Text => value.is_string().then_some(value).ok_or_else(mismatch),
        ColumnType::Enum(values) => {
            let Some(s) = value.as_str() else {
                return Err(mismatch());
            };
            if values.iter().any(|v| v == s) {
                Ok(value)
            } else {
                Err(SchemaError::DataViolation(format!(
                    "new row for relation {} violates check constraint {}",
                    table,
                    column.enum_check_name(table)
                )))
            }
        }
        ColumnType::Boolean => value.is_boolean().then_some(value).ok_or_else(mismatch),
        ColumnType::Decimal { precision, scale } => {
            let mut rounded = parse_decimal(&value)
                .ok_or_else(mismatch)?
                .round_dp_with_strategy(
                    u32::from(*scale),
                    RoundingStrategy::MidpointAwayFromZero,
                );
            // NUMERIC(p, s) always reports `s` fractional digits
            rounded.rescale(u32::from(*scale));
            let integer_digits = rounded
                .trunc()
                .abs()
                .to_string()
                .trim_start_matches('0')
                .len();
            if integer_digits > usize::from(precision - scale) {
                return Err(SchemaError::DataViolation(format!(
                    "numeric field overflow in column {} of relation {}: precision {}, scale {}",
                    column.name, table, precision, scale
                )));
            }
            Ok(Value::String(rounded.to_string()))
        }
        ColumnType::Json => Ok(value),
        ColumnType::Integer => value
            .as_i64()
            .filter(|n| i32::try_from(*n).is_ok())
            .map(Value::from)
            .ok_or_else(mismatch),
        ColumnType::Timestamp => value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| Value::String(ts.with_timezone(&Utc).to_rfc3339()))
            .ok_or_else(mismatch),
    }
}

fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// NULLs are distinct: a row with NULL in any column of a set never conflicts.
fn check_unique(def: &TableDef, rows: &[Row]) -> std::result::Result<(), SchemaError> {
    for (name, columns) in def.unique_sets() {
        let mut seen = HashSet::new();
        for row in rows {
            let key: Option<Vec<String>> = columns
                .iter()
                .map(|c| row.get(c).filter(|v| !v.is_null()).map(Value::to_string))
                .collect();
            if let Some(key) = key {
                if !seen.insert(key) {
                    return Err(SchemaError::DataViolation(format!(
                        "duplicate key value violates unique constraint {}",
                        name
                    )));
                }
            }
        }
    }
    Ok(())
}

fn check_checks(def: &TableDef, rows: &[Row]) -> std::result::Result<(), SchemaError> {
    for constraint in &def.constraints {
        let Constraint::Check(check) = constraint else {
            continue;
        };
        let bound = Decimal::from(check.greater_than);
        let violated = rows
            .iter()
            .filter_map(|r| r.get(&check.column).filter(|v| !v.is_null()))
            .any(|v| parse_decimal(v).map_or(true, |d| d <= bound));
        if violated {
            return Err(SchemaError::DataViolation(format!(
                "new row for relation {} violates check constraint {}",
                def.name, check.name
            )));
        }
    }
    Ok(())
}

impl SchemaBackend for MemoryBackend {
    fn ensure_ledger(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }

    fn try_lock(&self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        Box::pin(async move {
            Ok(self
                .locked
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok())
        })
    }

    fn unlock(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.locked.store(false, Ordering::SeqCst);
            Ok(())
        })
    }

    fn release_abandoned_lock(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    fn applied(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AppliedMigration>>> + Send + '_>> {
        Box::pin(async move { Ok(self.state.lock().await.ledger.values().cloned().collect()) })
    }

    fn run_unit<'a>(
        &'a self,
        migration: &'a Migration,
        direction: Direction,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.run_unit_inner(migration, direction))
    }
}
