use serde::{Deserialize, Serialize};

use super::column::{enum_check_expr, ColumnDef};
use super::constraint::{Constraint, IndexDef};
use super::table::TableDef;

/// Which half of a migration unit is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single schema change. Units run their directives in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Directive {
    CreateTable(TableDef),
    DropTable {
        table: String,
    },
    AddColumn {
        table: String,
        column: ColumnDef,
    },
    DropColumn {
        table: String,
        column: String,
    },
    AddConstraint {
        table: String,
        constraint: Constraint,
    },
    DropConstraint {
        table: String,
        name: String,
    },
    CreateIndex(IndexDef),
    DropIndex {
        table: String,
        name: String,
    },
    /// Replace the closed value set of an enumerated column.
    SetEnumValues {
        table: String,
        column: String,
        values: Vec<String>,
    },
}

impl Directive {
    /// Short human-readable description for logs.
    pub fn describe(&self) -> String {
        match self {
            Directive::CreateTable(t) => format!("create table {}", t.name),
            Directive::DropTable { table } => format!("drop table {}", table),
            Directive::AddColumn { table, column } => {
                format!("add column {}.{}", table, column.name)
            }
            Directive::DropColumn { table, column } => format!("drop column {}.{}", table, column),
            Directive::AddConstraint { table, constraint } => {
                format!("add constraint {} on {}", constraint.name(), table)
            }
            Directive::DropConstraint { table, name } => {
                format!("drop constraint {} on {}", name, table)
            }
            Directive::CreateIndex(i) => format!("create index {} on {}", i.name, i.table),
            Directive::DropIndex { table, name } => format!("drop index {} on {}", name, table),
            Directive::SetEnumValues { table, column, .. } => {
                format!("set enum values of {}.{}", table, column)
            }
        }
    }

    /// Generate the SQL statements for this directive, in execution order.
    ///
    /// Drops never cascade: a drop that other objects depend on fails.
    pub fn to_sql(&self) -> Vec<String> {
        match self {
            Directive::CreateTable(t) => {
                let mut statements = vec![t.to_create_table_sql()];
                statements.extend(t.indexes.iter().map(IndexDef::to_create_sql));
                statements
            }
            Directive::DropTable { table } => vec![format!("DROP TABLE {}", table)],
            Directive::AddColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                table,
                column.to_sql_column(table)
            )],
            Directive::DropColumn { table, column } => {
                vec![format!("ALTER TABLE {} DROP COLUMN {}", table, column)]
            }
            Directive::AddConstraint { table, constraint } => {
                vec![format!("ALTER TABLE {} ADD {}", table, constraint.to_sql())]
            }
            Directive::DropConstraint { table, name } => {
                vec![format!("ALTER TABLE {} DROP CONSTRAINT {}", table, name)]
            }
            Directive::CreateIndex(index) => vec![index.to_create_sql()],
            Directive::DropIndex { name, .. } => vec![format!("DROP INDEX {}", name)],
            Directive::SetEnumValues {
                table,
                column,
                values,
            } => {
                let check = format!("{}_{}_check", table, column);
                vec![
                    format!("ALTER TABLE {} DROP CONSTRAINT {}", table, check),
                    format!(
                        "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({})",
                        table,
                        check,
                        enum_check_expr(column, values)
                    ),
                ]
            }
        }
    }

    /// Fill in implied column defaults.
    pub fn normalize(&mut self) {
        match self {
            Directive::CreateTable(t) => t.columns.iter_mut().for_each(ColumnDef::normalize),
            Directive::AddColumn { column, .. } => column.normalize(),
            _ => {}
        }
    }
}
