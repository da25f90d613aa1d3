use crate::domain::todo::driven_ports::{TodoReader, TodoWriter};
use crate::domain::todo::driving_ports::TodoError;
use crate::external_connections::{ExternalConnectivity, Transactable, TransactionHandle};
use anyhow::{Context, anyhow};
use tracing::{error, info};

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct TodoItem {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
}

#[derive(Debug)]
#[cfg_attr(test, derive(Clone))]
pub struct NewTodo {
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
}

/// Incoming changes to a todo. What an absent field means depends on the [UpdatePolicy].
#[derive(Debug, Default)]
#[cfg_attr(test, derive(Clone, PartialEq, Eq))]
pub struct TodoUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// Absent title keeps the existing one, every other absent field resets to its default
    FullReplace,
    /// Absent fields are left untouched
    PartialPatch,
}

/// Produces the next state of `existing` after applying `update` under `policy`. The id never
/// changes and a supplied title is always trimmed. Blank titles must be rejected before
/// calling this.
pub fn reconcile(existing: &TodoItem, update: &TodoUpdate, policy: UpdatePolicy) -> TodoItem {
    let title = match update.title {
        Some(ref new_title) => new_title.trim().to_owned(),
        None => existing.title.clone(),
    };

    match policy {
        UpdatePolicy::FullReplace => TodoItem {
            id: existing.id,
            title,
            description: update.description.clone(),
            completed: update.completed.unwrap_or(false),
        },
        UpdatePolicy::PartialPatch => TodoItem {
            id: existing.id,
            title,
            description: update
                .description
                .clone()
                .or_else(|| existing.description.clone()),
            completed: update.completed.unwrap_or(existing.completed),
        },
    }
}

/// Rejects non-positive ids before anything reaches storage
fn validate_todo_id(todo_id: i64) -> Result<(), TodoError> {
    if todo_id <= 0 {
        return Err(TodoError::InvalidArgument(format!(
            "todo id must be a positive integer, got {todo_id}"
        )));
    }

    Ok(())
}

pub mod driven_ports {
    use super::*;

    pub trait TodoReader: Sync {
        async fn all(
            &self,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Vec<TodoItem>, anyhow::Error>;
        async fn by_id(
            &self,
            todo_id: i64,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Option<TodoItem>, anyhow::Error>;
    }

    pub trait TodoWriter: Sync {
        async fn create(
            &self,
            new_todo: &NewTodo,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<TodoItem, anyhow::Error>;

        /// Overwrites the stored todo with the same id. Returns false if there was no such todo.
        async fn update(
            &self,
            todo: &TodoItem,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<bool, anyhow::Error>;

        /// Returns whether a todo with the id existed and was removed
        async fn delete(
            &self,
            todo_id: i64,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<bool, anyhow::Error>;

        /// Returns the number of removed todos
        async fn delete_all(
            &self,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<u64, anyhow::Error>;
    }
}

pub mod driving_ports {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum TodoError {
        #[error("{0}")]
        InvalidArgument(String),
        #[error("todo {0} does not exist")]
        NotFound(i64),
        #[error(transparent)]
        PortError(#[from] anyhow::Error),
    }


    pub trait TodoPort {
        async fn list_todos(
            &self,
            ext_cxn: &mut impl ExternalConnectivity,
            todo_read: &impl driven_ports::TodoReader,
        ) -> Result<Vec<TodoItem>, TodoError>;
        async fn todo_by_id(
            &self,
            todo_id: i64,
            ext_cxn: &mut impl ExternalConnectivity,
            todo_read: &impl driven_ports::TodoReader,
        ) -> Result<Option<TodoItem>, TodoError>;
        async fn create_todo(
            &self,
            new_todo: &NewTodo,
            ext_cxn: &impl Transactable,
            todo_write: &impl driven_ports::TodoWriter,
        ) -> Result<TodoItem, TodoError>;
        async fn replace_todo(
            &self,
            todo_id: i64,
            update: &TodoUpdate,
            ext_cxn: &impl Transactable,
            todo_read: &impl driven_ports::TodoReader,
            todo_write: &impl driven_ports::TodoWriter,
        ) -> Result<TodoItem, TodoError>;
        async fn patch_todo(
            &self,
            todo_id: i64,
            update: &TodoUpdate,
            ext_cxn: &impl Transactable,
            todo_read: &impl driven_ports::TodoReader,
            todo_write: &impl driven_ports::TodoWriter,
        ) -> Result<TodoItem, TodoError>;
        async fn delete_todo(
            &self,
            todo_id: i64,
            ext_cxn: &impl Transactable,
            todo_write: &impl driven_ports::TodoWriter,
        ) -> Result<bool, TodoError>;
        async fn delete_all_todos(
            &self,
            ext_cxn: &impl Transactable,
            todo_write: &impl driven_ports::TodoWriter,
        ) -> Result<u64, TodoError>;
    }
}

pub struct TodoService {}

impl TodoService {
    /// Shared body of full and partial updates: look up, reconcile, write back, all inside one
    /// transaction. A write that finds no row after a successful lookup is a port failure, not
    /// a missing todo.
    async fn apply_update(
        &self,
        todo_id: i64,
        update: &TodoUpdate,
        policy: UpdatePolicy,
        ext_cxn: &impl Transactable,
        todo_read: &impl TodoReader,
        todo_write: &impl TodoWriter,
    ) -> Result<TodoItem, TodoError> {
        validate_todo_id(todo_id)?;

        let mut txn = ext_cxn
            .start_transaction()
            .await
            .context("starting a transaction to update a todo")?;
        let existing = todo_read
            .by_id(todo_id, &mut txn)
            .await
            .context("looking up a todo to update")?
            .ok_or(TodoError::NotFound(todo_id))?;

        let next_state = reconcile(&existing, update, policy);
        let write_result = todo_write.update(&next_state, &mut txn).await;
        let updated = match write_result {
            Ok(updated) => updated,
            Err(port_err) => {
                error!("Failed to write todo {todo_id} after looking it up: {port_err}");
                return Err(TodoError::PortError(port_err.context("updating a todo")));
            }
        };
        if !updated {
            return Err(TodoError::PortError(anyhow!(
                "todo {todo_id} disappeared before it could be updated"
            )));
        }

        txn.commit().await.context("committing a todo update")?;
        Ok(next_state)
    }
}

impl driving_ports::TodoPort for TodoService {
    async fn list_todos(
        &self,
        ext_cxn: &mut impl ExternalConnectivity,
        todo_read: &impl TodoReader,
    ) -> Result<Vec<TodoItem>, TodoError> {
        let todos = todo_read
            .all(&mut *ext_cxn)
            .await
            .context("fetching all todos")?;

        Ok(todos)
    }

    async fn todo_by_id(
        &self,
        todo_id: i64,
        ext_cxn: &mut impl ExternalConnectivity,
        todo_read: &impl TodoReader,
    ) -> Result<Option<TodoItem>, TodoError> {
        validate_todo_id(todo_id)?;
        let todo = todo_read
            .by_id(todo_id, &mut *ext_cxn)
            .await
            .context("fetching a todo by id")?;

        Ok(todo)
    }

    async fn create_todo(
        &self,
        new_todo: &NewTodo,
        ext_cxn: &impl Transactable,
        todo_write: &impl TodoWriter,
    ) -> Result<TodoItem, TodoError> {
        let trimmed = NewTodo {
            title: new_todo.title.trim().to_owned(),
            description: new_todo.description.clone(),
            completed: new_todo.completed,
        };

        let mut txn = ext_cxn
            .start_transaction()
            .await
            .context("starting a transaction to create a todo")?;
        let created = todo_write
            .create(&trimmed, &mut txn)
            .await
            .context("creating a todo")?;
        txn.commit().await.context("committing a new todo")?;

        info!("Created todo {}", created.id);
        Ok(created)
    }

    async fn replace_todo(
        &self,
        todo_id: i64,
        update: &TodoUpdate,
        ext_cxn: &impl Transactable,
        todo_read: &impl TodoReader,
        todo_write: &impl TodoWriter,
    ) -> Result<TodoItem, TodoError> {
        self.apply_update(
            todo_id,
            update,
            UpdatePolicy::FullReplace,
            ext_cxn,
            todo_read,
            todo_write,
        )
        .await
    }

    async fn patch_todo(
        &self,
        todo_id: i64,
        update: &TodoUpdate,
        ext_cxn: &impl Transactable,
        todo_read: &impl TodoReader,
        todo_write: &impl TodoWriter,
    ) -> Result<TodoItem, TodoError> {
        self.apply_update(
            todo_id,
            update,
            UpdatePolicy::PartialPatch,
            ext_cxn,
            todo_read,
            todo_write,
        )
        .await
    }

    async fn delete_todo(
        &self,
        todo_id: i64,
        ext_cxn: &impl Transactable,
        todo_write: &impl TodoWriter,
    ) -> Result<bool, TodoError> {
        validate_todo_id(todo_id)?;

        let mut txn = ext_cxn
            .start_transaction()
            .await
            .context("starting a transaction to delete a todo")?;
        let deleted = todo_write
            .delete(todo_id, &mut txn)
            .await
            .context("deleting a todo")?;
        txn.commit().await.context("committing a todo delete")?;

        Ok(deleted)
    }

    async fn delete_all_todos(
        &self,
        ext_cxn: &impl Transactable,
        todo_write: &impl TodoWriter,
    ) -> Result<u64, TodoError> {
        let mut txn = ext_cxn
            .start_transaction()
            .await
            .context("starting a transaction to delete all todos")?;
        let deleted_count = todo_write
            .delete_all(&mut txn)
            .await
            .context("deleting all todos")?;
        txn.commit().await.context("committing bulk todo delete")?;

        info!("Deleted {deleted_count} todos");
        Ok(deleted_count)
    }
}
