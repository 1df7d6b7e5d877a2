use std::collections::BTreeMap;

use serde::Serialize;

use super::column::ColumnDef;
use super::constraint::{Constraint, ForeignKey, IndexDef};
use super::directive::Directive;
use super::error::SchemaError;
use super::table::TableDef;
use super::types::ColumnType;

/// Structural state of a schema: the tables, columns, constraints and
/// indexes that exist after some prefix of migration units has run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    tables: BTreeMap<String, TableDef>,
}

impl SchemaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Every foreign key in the schema with its owning table.
    pub fn foreign_keys(&self) -> Vec<(&str, &ForeignKey)> {
        self.tables
            .values()
            .flat_map(|t| t.foreign_keys().map(move |fk| (t.name.as_str(), fk)))
            .collect()
    }

    /// Foreign keys in other tables that point at `table`.
    pub fn referencing(&self, table: &str) -> Vec<(&str, &ForeignKey)> {
        self.foreign_keys()
            .into_iter()
            .filter(|(owner, fk)| fk.references_table == table && *owner != table)
            .collect()
    }

    /// Order-insensitive equality of two schemas.
    pub fn structurally_eq(&self, other: &SchemaSnapshot) -> bool {
        self.tables.len() == other.tables.len()
            && self.tables.iter().all(|(name, table)| {
                other
                    .tables
                    .get(name)
                    .is_some_and(|o| o.normalized() == table.normalized())
            })
    }

    /// Apply a list of directives; on failure the snapshot is left unchanged.
    pub fn apply_all(&mut self, directives: &[Directive]) -> Result<(), SchemaError> {
        let mut next = self.clone();
        for directive in directives {
            next.apply(directive)?;
        }
        *self = next;
        Ok(())
    }

    /// Apply a single directive.
    ///
    /// A failed directive may leave the snapshot partially modified; use
    /// [`SchemaSnapshot::apply_all`] for all-or-nothing semantics.
    pub fn apply(&mut self, directive: &Directive) -> Result<(), SchemaError> {
        match directive {
            Directive::CreateTable(table) => self.create_table(table),
            Directive::DropTable { table } => self.drop_table(table),
            Directive::AddColumn { table, column } => self.add_column(table, column),
            Directive::DropColumn { table, column } => self.drop_column(table, column),
            Directive::AddConstraint { table, constraint } => {
                self.add_constraint(table, constraint)
            }
            Directive::DropConstraint { table, name } => self.drop_constraint(table, name),
            Directive::CreateIndex(index) => self.create_index(index),
            Directive::DropIndex { table, name } => self.drop_index(table, name),
            Directive::SetEnumValues {
                table,
                column,
                values,
            } => self.set_enum_values(table, column, values),
        }
    }

    fn create_table(&mut self, table: &TableDef) -> Result<(), SchemaError> {
        if self.tables.contains_key(&table.name) {
            return Err(SchemaError::TableExists(table.name.clone()));
        }
        table.validate()?;
        for name in table.object_names() {
            self.ensure_name_free(&name)?;
        }
        self.tables.insert(table.name.clone(), table.clone());
        if let Err(e) = self.check_foreign_keys(&table.name) {
            self.tables.remove(&table.name);
            return Err(e);
        }
        Ok(())
    }

    fn drop_table(&mut self, table: &str) -> Result<(), SchemaError> {
        self.require_table(table)?;
        let dependents: Vec<String> = self
            .referencing(table)
            .iter()
            .map(|(owner, fk)| format!("{}.{}", owner, fk.name))
            .collect();
        if !dependents.is_empty() {
            return Err(SchemaError::Dependents {
                object: format!("table {}", table),
                dependents: dependents.join(", "),
            });
        }
        self.tables.remove(table);
        Ok(())
    }

    fn add_column(&mut self, table: &str, column: &ColumnDef) -> Result<(), SchemaError> {
        if column.primary_key {
            return Err(SchemaError::Invalid(format!(
                "cannot add primary key column {}.{}",
                table, column.name
            )));
        }
        let def = self.require_table(table)?;
        if def.column(&column.name).is_some() {
            return Err(SchemaError::ColumnExists {
                table: table.to_string(),
                column: column.name.clone(),
            });
        }

        let mut updated = def.clone();
        updated.columns.push(column.clone());
        updated.validate()?;
        for name in updated.object_names() {
            if !def.object_names().contains(&name) {
                self.ensure_name_free(&name)?;
            }
        }
        self.tables.insert(table.to_string(), updated);
        Ok(())
    }

    fn drop_column(&mut self, table: &str, column: &str) -> Result<(), SchemaError> {
        let def = self.require_table(table)?;
        let col = def.column(column).ok_or_else(|| SchemaError::UnknownColumn {
            table: table.to_string(),
            column: column.to_string(),
        })?;
        if col.primary_key {
            return Err(SchemaError::Invalid(format!(
                "cannot drop primary key {}.{}",
                table, column
            )));
        }

        let mut dependents = def.dependents_of_column(column);
        dependents.extend(
            self.referencing(table)
                .iter()
                .filter(|(_, fk)| fk.references_column == column)
                .map(|(owner, fk)| format!("{}.{}", owner, fk.name)),
        );
        if !dependents.is_empty() {
            return Err(SchemaError::Dependents {
                object: format!("column {}.{}", table, column),
                dependents: dependents.join(", "),
            });
        }

        if let Some(def) = self.tables.get_mut(table) {
            def.columns.retain(|c| c.name != column);
        }
        Ok(())
    }

    fn add_constraint(&mut self, table: &str, constraint: &Constraint) -> Result<(), SchemaError> {
        let def = self.require_table(table)?;
        self.ensure_name_free(constraint.name())?;

        let original = def.clone();
        let mut updated = def.clone();
        updated.constraints.push(constraint.clone());
        updated.validate()?;
        self.tables.insert(table.to_string(), updated);
        if let Err(e) = self.check_foreign_keys(table) {
            self.tables.insert(table.to_string(), original);
            return Err(e);
        }
        Ok(())
    }

    fn drop_constraint(&mut self, table: &str, name: &str) -> Result<(), SchemaError> {
        let def = self.require_table(table)?;
        let constraint = def
            .constraint(name)
            .ok_or_else(|| SchemaError::UnknownConstraint {
                table: table.to_string(),
                name: name.to_string(),
            })?;

        if let Constraint::Unique(unique) = constraint {
            if unique.columns.len() == 1 {
                if let Some(column) = unique.columns.first() {
                    self.ensure_not_fk_target(table, column, name)?;
                }
            }
        }

        if let Some(def) = self.tables.get_mut(table) {
            def.constraints.retain(|c| c.name() != name);
        }
        Ok(())
    }

    fn create_index(&mut self, index: &IndexDef) -> Result<(), SchemaError> {
        let def = self.require_table(&index.table)?;
        self.ensure_name_free(&index.name)?;

        let mut updated = def.clone();
        updated.indexes.push(index.clone());
        updated.validate()?;
        self.tables.insert(index.table.clone(), updated);
        Ok(())
    }

    fn drop_index(&mut self, table: &str, name: &str) -> Result<(), SchemaError> {
        let def = self.require_table(table)?;
        let index = def
            .indexes
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| SchemaError::UnknownIndex {
                table: table.to_string(),
                name: name.to_string(),
            })?;

        if let (true, [column]) = (index.unique, &index.columns[..]) {
            self.ensure_not_fk_target(table, column, name)?;
        }

        if let Some(def) = self.tables.get_mut(table) {
            def.indexes.retain(|i| i.name != name);
        }
        Ok(())
    }

    fn set_enum_values(
        &mut self,
        table: &str,
        column: &str,
        values: &[String],
    ) -> Result<(), SchemaError> {
        let def = self.require_table(table)?;
        let mut updated = def.clone();
        let col = updated
            .column_mut(column)
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })?;
        if !matches!(col.column_type, ColumnType::Enum(_)) {
            return Err(SchemaError::Invalid(format!(
                "{}.{} is not an enumerated column",
                table, column
            )));
        }
        col.column_type = ColumnType::Enum(values.to_vec());
        updated.validate()?;
        self.tables.insert(table.to_string(), updated);
        Ok(())
    }

    fn require_table(&self, table: &str) -> Result<&TableDef, SchemaError> {
        self.tables
            .get(table)
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))
    }

    fn ensure_name_free(&self, name: &str) -> Result<(), SchemaError> {
        if self
            .tables
            .values()
            .any(|t| t.object_names().iter().any(|n| n == name))
        {
            return Err(SchemaError::NameTaken {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// A unique guarantee backing a foreign key cannot be removed from under it.
    fn ensure_not_fk_target(
        &self,
        table: &str,
        column: &str,
        object: &str,
    ) -> Result<(), SchemaError> {
        let def = self.require_table(table)?;
        let backing = def
            .unique_sets()
            .iter()
            .filter(|(_, cols)| cols.len() == 1 && cols.contains(column))
            .count();
        if backing > 1 {
            return Ok(());
        }
        let dependents: Vec<String> = self
            .foreign_keys()
            .iter()
            .filter(|(_, fk)| fk.references_table == table && fk.references_column == column)
            .map(|(owner, fk)| format!("{}.{}", owner, fk.name))
            .collect();
        if dependents.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Dependents {
                object: object.to_string(),
                dependents: dependents.join(", "),
            })
        }
    }

    /// Every foreign key declared on `table` must point at an existing,
    /// unique column of the same type.
    fn check_foreign_keys(&self, table: &str) -> Result<(), SchemaError> {
        let def = self.require_table(table)?;
        for fk in def.foreign_keys() {
            let target = self
                .tables
                .get(&fk.references_table)
                .ok_or_else(|| SchemaError::UnknownTable(fk.references_table.clone()))?;
            let target_column =
                target
                    .column(&fk.references_column)
                    .ok_or_else(|| SchemaError::UnknownColumn {
                        table: fk.references_table.clone(),
                        column: fk.references_column.clone(),
                    })?;
            if !target.is_unique_column(&fk.references_column) {
                return Err(SchemaError::Invalid(format!(
                    "foreign key {} targets {}.{}, which is not unique",
                    fk.name, fk.references_table, fk.references_column
                )));
            }
            let source_type = def
                .column(&fk.column)
                .map(|c| &c.column_type)
                .ok_or_else(|| SchemaError::UnknownColumn {
                    table: table.to_string(),
                    column: fk.column.clone(),
                })?;
            if *source_type != target_column.column_type {
                return Err(SchemaError::Invalid(format!(
                    "foreign key {} joins {} to {}",
                    fk.name,
                    source_type.to_sql(),
                    target_column.column_type.to_sql()
                )));
            }
        }
        Ok(())
    }
}
