//! Change planning.
//!
//! An [`Intent`] is the unordered list of actions a table handle collected.
//! A [`Plan`] is the validated, ordered form of one intent, ready to hand
//! to an adapter in a single `execute_actions` call.

use std::collections::HashSet;

use crate::action::{Action, ActionKind};
use crate::adapter::Adapter;
use crate::error::{MigrateError, Result};
use crate::schema::{Column, ForeignKey, Index, TableRef};

/// Actions accumulated by a table handle, in call order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intent {
    actions: Vec<Action>,
}

impl Intent {
    /// Creates an empty intent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an action.
    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Appends every action from another intent.
    pub fn merge(&mut self, other: Intent) {
        self.actions.extend(other.actions);
    }

    /// Returns the accumulated actions.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Returns true if no action was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns true if the intent renames its table.
    #[must_use]
    pub fn renames_table(&self) -> bool {
        self.actions
            .iter()
            .any(|a| a.kind() == ActionKind::RenameTable)
    }
}

impl From<Vec<Action>> for Intent {
    fn from(actions: Vec<Action>) -> Self {
        Self { actions }
    }
}

/// Execution stage of an action against an existing table.
fn stage(kind: ActionKind) -> u8 {
    match kind {
        ActionKind::CreateTable => 0,
        ActionKind::DropForeignKey => 1,
        ActionKind::DropIndex => 2,
        ActionKind::AddColumn
        | ActionKind::ChangeColumn
        | ActionKind::RenameColumn
        | ActionKind::UpdateTable => 3,
        ActionKind::AddIndex => 4,
        ActionKind::AddForeignKey => 5,
        ActionKind::RemoveColumn => 6,
        ActionKind::RenameTable => 7,
        ActionKind::DropTable => 8,
    }
}

/// An ordered, validated sequence of actions for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    table: TableRef,
    actions: Vec<Action>,
}

impl Plan {
    /// Builds a plan from an intent.
    ///
    /// When the table does not exist (and the intent does not rename it),
    /// column, index and foreign key additions are folded into a single
    /// `CreateTable` that runs first. Otherwise actions keep their call
    /// order within a stage and stages run in dependency order.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvedDependency` when a new table declares a column
    /// twice, or indexes/references a column the batch never defines.
    pub fn new(table: &TableRef, intent: Intent, exists: bool) -> Result<Self> {
        let exists = exists || intent.renames_table();
        let mut actions = intent.actions;

        if !exists {
            let mut columns: Vec<Column> = Vec::new();
            let mut indexes: Vec<Index> = Vec::new();
            let mut foreign_keys: Vec<ForeignKey> = Vec::new();
            let mut rest = Vec::new();

            for action in actions {
                match action {
                    Action::AddColumn { column, .. } => columns.push(column),
                    Action::AddIndex { index, .. } => indexes.push(index),
                    Action::AddForeignKey { foreign_key, .. } => foreign_keys.push(foreign_key),
                    other => rest.push(other),
                }
            }

            validate_new_table(table, &columns, &indexes, &foreign_keys)?;
            rest.sort_by_key(|a| stage(a.kind()));

            actions = Vec::with_capacity(rest.len() + 1);
            actions.push(Action::CreateTable {
                table: table.clone(),
                columns,
                indexes,
                foreign_keys,
            });
            actions.extend(rest);
        } else {
            actions.sort_by_key(|a| stage(a.kind()));
        }

        Ok(Self {
            table: table.clone(),
            actions,
        })
    }

    /// Returns the table this plan targets.
    #[must_use]
    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Returns the ordered actions.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Returns true if there is nothing to execute.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs every action through the adapter in one batch.
    ///
    /// # Errors
    ///
    /// Propagates the first failing action as reported by the adapter.
    pub async fn execute(&self, adapter: &dyn Adapter) -> Result<()> {
        if self.actions.is_empty() {
            return Ok(());
        }
        adapter.execute_actions(&self.table, &self.actions).await
    }
}

fn validate_new_table(
    table: &TableRef,
    columns: &[Column],
    indexes: &[Index],
    foreign_keys: &[ForeignKey],
) -> Result<()> {
    let unresolved = |message: String| MigrateError::UnresolvedDependency {
        table: table.name.clone(),
        message,
    };

    let mut defined: HashSet<&str> = HashSet::new();
    if let Some(id) = table.options.id_column() {
        defined.insert(id);
    }
    for column in columns {
        if !defined.insert(column.name.as_str()) {
            return Err(unresolved(format!(
                "column \"{}\" is defined more than once",
                column.name
            )));
        }
    }

    for index in indexes {
        if let Some(missing) = index.columns.iter().find(|c| !defined.contains(c.as_str())) {
            return Err(unresolved(format!(
                "index references undefined column \"{missing}\""
            )));
        }
    }

    for fk in foreign_keys {
        if let Some(missing) = fk.columns.iter().find(|c| !defined.contains(c.as_str())) {
            return Err(unresolved(format!(
                "foreign key references undefined column \"{missing}\""
            )));
        }
    }

    if let Some(missing) = table
        .options
        .primary_key
        .iter()
        .find(|c| !defined.contains(c.as_str()))
    {
        return Err(unresolved(format!(
            "primary key references undefined column \"{missing}\""
        )));
    }

    Ok(())
}
