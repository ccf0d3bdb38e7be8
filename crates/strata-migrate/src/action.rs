//! Schema actions.
//!
//! An [`Action`] is one atomic schema change bound to a table. Table
//! handles accumulate actions; the planner orders them and adapters
//! execute them. Reversible actions know their own inverse.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::schema::{Column, ForeignKey, Index, TableRef, TableUpdate};

/// The kind of an action, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Add a column.
    AddColumn,
    /// Remove a column.
    RemoveColumn,
    /// Rename a column.
    RenameColumn,
    /// Change a column definition.
    ChangeColumn,
    /// Add an index.
    AddIndex,
    /// Drop an index.
    DropIndex,
    /// Add a foreign key.
    AddForeignKey,
    /// Drop a foreign key.
    DropForeignKey,
    /// Create a table.
    CreateTable,
    /// Drop a table.
    DropTable,
    /// Rename a table.
    RenameTable,
    /// Update table-level options.
    UpdateTable,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AddColumn => "AddColumn",
            Self::RemoveColumn => "RemoveColumn",
            Self::RenameColumn => "RenameColumn",
            Self::ChangeColumn => "ChangeColumn",
            Self::AddIndex => "AddIndex",
            Self::DropIndex => "DropIndex",
            Self::AddForeignKey => "AddForeignKey",
            Self::DropForeignKey => "DropForeignKey",
            Self::CreateTable => "CreateTable",
            Self::DropTable => "DropTable",
            Self::RenameTable => "RenameTable",
            Self::UpdateTable => "UpdateTable",
        };
        f.write_str(name)
    }
}

/// A single schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Add a column to an existing table.
    AddColumn {
        /// Target table.
        table: TableRef,
        /// Column definition.
        column: Column,
    },

    /// Remove a column.
    RemoveColumn {
        /// Target table.
        table: TableRef,
        /// Column name.
        column: String,
    },

    /// Rename a column.
    RenameColumn {
        /// Target table.
        table: TableRef,
        /// Current column name.
        column: String,
        /// New column name.
        new_name: String,
    },

    /// Replace a column definition.
    ChangeColumn {
        /// Target table.
        table: TableRef,
        /// Column being changed.
        column: String,
        /// New definition (may carry a new name).
        definition: Column,
    },

    /// Add an index.
    AddIndex {
        /// Target table.
        table: TableRef,
        /// Index definition.
        index: Index,
    },

    /// Drop an index, located by name if it has one, otherwise by columns.
    DropIndex {
        /// Target table.
        table: TableRef,
        /// Index to drop.
        index: Index,
    },

    /// Add a foreign key.
    AddForeignKey {
        /// Target table.
        table: TableRef,
        /// Foreign key definition.
        foreign_key: ForeignKey,
    },

    /// Drop a foreign key, located by columns and optional constraint name.
    DropForeignKey {
        /// Target table.
        table: TableRef,
        /// Foreign key to drop.
        foreign_key: ForeignKey,
    },

    /// Create a table with its initial columns, indexes and foreign keys.
    CreateTable {
        /// Table to create.
        table: TableRef,
        /// Column definitions, excluding the implicit id.
        columns: Vec<Column>,
        /// Indexes created with the table.
        indexes: Vec<Index>,
        /// Foreign keys created with the table.
        foreign_keys: Vec<ForeignKey>,
    },

    /// Drop a table.
    DropTable {
        /// Table to drop.
        table: TableRef,
    },

    /// Rename a table.
    RenameTable {
        /// Table to rename.
        table: TableRef,
        /// New table name.
        new_name: String,
    },

    /// Change table-level options.
    UpdateTable {
        /// Target table.
        table: TableRef,
        /// Changes to apply.
        update: TableUpdate,
    },
}

impl Action {
    /// Returns the table this action is bound to.
    #[must_use]
    pub fn table(&self) -> &TableRef {
        match self {
            Self::AddColumn { table, .. }
            | Self::RemoveColumn { table, .. }
            | Self::RenameColumn { table, .. }
            | Self::ChangeColumn { table, .. }
            | Self::AddIndex { table, .. }
            | Self::DropIndex { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::DropForeignKey { table, .. }
            | Self::CreateTable { table, .. }
            | Self::DropTable { table }
            | Self::RenameTable { table, .. }
            | Self::UpdateTable { table, .. } => table,
        }
    }

    fn table_mut(&mut self) -> &mut TableRef {
        match self {
            Self::AddColumn { table, .. }
            | Self::RemoveColumn { table, .. }
            | Self::RenameColumn { table, .. }
            | Self::ChangeColumn { table, .. }
            | Self::AddIndex { table, .. }
            | Self::DropIndex { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::DropForeignKey { table, .. }
            | Self::CreateTable { table, .. }
            | Self::DropTable { table }
            | Self::RenameTable { table, .. }
            | Self::UpdateTable { table, .. } => table,
        }
    }

    /// Returns the kind of this action.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::AddColumn { .. } => ActionKind::AddColumn,
            Self::RemoveColumn { .. } => ActionKind::RemoveColumn,
            Self::RenameColumn { .. } => ActionKind::RenameColumn,
            Self::ChangeColumn { .. } => ActionKind::ChangeColumn,
            Self::AddIndex { .. } => ActionKind::AddIndex,
            Self::DropIndex { .. } => ActionKind::DropIndex,
            Self::AddForeignKey { .. } => ActionKind::AddForeignKey,
            Self::DropForeignKey { .. } => ActionKind::DropForeignKey,
            Self::CreateTable { .. } => ActionKind::CreateTable,
            Self::DropTable { .. } => ActionKind::DropTable,
            Self::RenameTable { .. } => ActionKind::RenameTable,
            Self::UpdateTable { .. } => ActionKind::UpdateTable,
        }
    }

    /// Returns the inverse action.
    ///
    /// # Errors
    ///
    /// Returns `IrreversibleAction` for actions that lose information
    /// (drops, removals, column changes, table updates).
    pub fn invert(&self) -> Result<Self> {
        match self {
            Self::CreateTable { table, .. } => Ok(Self::DropTable {
                table: table.clone(),
            }),
            Self::AddColumn { table, column } => Ok(Self::RemoveColumn {
                table: table.clone(),
                column: column.name.clone(),
            }),
            Self::RenameColumn {
                table,
                column,
                new_name,
            } => Ok(Self::RenameColumn {
                table: table.clone(),
                column: new_name.clone(),
                new_name: column.clone(),
            }),
            Self::RenameTable { table, new_name } => Ok(Self::RenameTable {
                table: table.renamed(new_name.clone()),
                new_name: table.name.clone(),
            }),
            Self::AddIndex { table, index } => Ok(Self::DropIndex {
                table: table.clone(),
                index: index.clone(),
            }),
            Self::AddForeignKey { table, foreign_key } => Ok(Self::DropForeignKey {
                table: table.clone(),
                foreign_key: foreign_key.clone(),
            }),
            other => Err(MigrateError::IrreversibleAction(other.kind().to_string())),
        }
    }

    /// Returns true if [`Action::invert`] succeeds for this action.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        matches!(
            self.kind(),
            ActionKind::CreateTable
                | ActionKind::AddColumn
                | ActionKind::RenameColumn
                | ActionKind::RenameTable
                | ActionKind::AddIndex
                | ActionKind::AddForeignKey
        )
    }

    /// Returns a copy with every table name passed through `rename`.
    ///
    /// Covers the bound table, foreign key referenced tables and rename
    /// targets.
    #[must_use]
    pub fn map_tables(&self, rename: &dyn Fn(&str) -> String) -> Self {
        let mut action = self.clone();
        let table = action.table_mut();
        table.name = rename(&table.name);
        match &mut action {
            Self::AddForeignKey { foreign_key, .. } => {
                foreign_key.referenced_table = rename(&foreign_key.referenced_table);
            }
            Self::DropForeignKey { foreign_key, .. } if !foreign_key.referenced_table.is_empty() => {
                foreign_key.referenced_table = rename(&foreign_key.referenced_table);
            }
            Self::CreateTable { foreign_keys, .. } => {
                for fk in foreign_keys {
                    fk.referenced_table = rename(&fk.referenced_table);
                }
            }
            Self::RenameTable { new_name, .. } => {
                *new_name = rename(new_name);
            }
            _ => {}
        }
        action
    }

    /// Returns a human-readable description of this action.
    #[must_use]
    pub fn description(&self) -> String {
        let table = &self.table().name;
        match self {
            Self::AddColumn { column, .. } => format!("Add column {} to {table}", column.name),
            Self::RemoveColumn { column, .. } => format!("Remove column {column} from {table}"),
            Self::RenameColumn {
                column, new_name, ..
            } => format!("Rename column {table}.{column} to {new_name}"),
            Self::ChangeColumn { column, .. } => format!("Change column {table}.{column}"),
            Self::AddIndex { index, .. } => format!("Add index {}", index.name_for(table)),
            Self::DropIndex { index, .. } => format!("Drop index {}", index.name_for(table)),
            Self::AddForeignKey { foreign_key, .. } => format!(
                "Add foreign key {table}({}) -> {}",
                foreign_key.columns.join(", "),
                foreign_key.referenced_table
            ),
            Self::DropForeignKey { foreign_key, .. } => format!(
                "Drop foreign key {table}({})",
                foreign_key.columns.join(", ")
            ),
            Self::CreateTable { .. } => format!("Create table {table}"),
            Self::DropTable { .. } => format!("Drop table {table}"),
            Self::RenameTable { new_name, .. } => format!("Rename table {table} to {new_name}"),
            Self::UpdateTable { .. } => format!("Update table {table}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    fn users() -> TableRef {
        TableRef::new("users")
    }

    #[test]
    fn test_create_table_inverse() {
        let action = Action::CreateTable {
            table: users(),
            columns: vec![Column::new("email", ColumnType::String)],
            indexes: vec![],
            foreign_keys: vec![],
        };

        assert_eq!(action.invert().ok(), Some(Action::DropTable { table: users() }));
    }

    #[test]
    fn test_rename_table_inverse() {
        let action = Action::RenameTable {
            table: users(),
            new_name: "accounts".to_string(),
        };

        let inverse = action.invert().expect("reversible");
        assert_eq!(
            inverse,
            Action::RenameTable {
                table: TableRef::new("accounts"),
                new_name: "users".to_string(),
            }
        );
    }

    #[test]
    fn test_add_column_inverse() {
        let action = Action::AddColumn {
            table: users(),
            column: Column::new("age", ColumnType::Integer),
        };

        assert_eq!(
            action.invert().ok(),
            Some(Action::RemoveColumn {
                table: users(),
                column: "age".to_string(),
            })
        );
    }

    #[test]
    fn test_irreversible_actions() {
        let drop = Action::DropTable { table: users() };
        assert!(!drop.is_reversible());

        let err = drop.invert().expect_err("drop is not reversible");
        assert!(matches!(err, MigrateError::IrreversibleAction(ref kind) if kind == "DropTable"));

        let remove = Action::RemoveColumn {
            table: users(),
            column: "age".into(),
        };
        assert!(remove.invert().is_err());
    }

    #[test]
    fn test_map_tables_rewrites_references() {
        let action = Action::AddForeignKey {
            table: TableRef::new("posts"),
            foreign_key: ForeignKey::new(["user_id"], "users", ["id"]),
        };

        let mapped = action.map_tables(&|name| format!("app_{name}"));
        match mapped {
            Action::AddForeignKey { table, foreign_key } => {
                assert_eq!(table.name, "app_posts");
                assert_eq!(foreign_key.referenced_table, "app_users");
            }
            other => panic!("unexpected action {other:?}"),
        }

        let rename = Action::RenameTable {
            table: users(),
            new_name: "people".into(),
        }
        .map_tables(&|name| format!("{name}_v2"));
        assert_eq!(rename.table().name, "users_v2");
        assert!(matches!(rename, Action::RenameTable { ref new_name, .. } if new_name == "people_v2"));
    }

    #[test]
    fn test_description() {
        let action = Action::AddIndex {
            table: users(),
            index: Index::new(["email"]),
        };
        assert_eq!(action.description(), "Add index users_email");
        assert_eq!(action.kind().to_string(), "AddIndex");
    }
}
