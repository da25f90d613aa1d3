use crate::domain;
use crate::domain::todo::{NewTodo, TodoItem};
use crate::external_connections::{ConnectionHandle, ExternalConnectivity};
use anyhow::Context;
use sqlx::{FromRow, query, query_as};

pub struct DbTodoReader {}

#[derive(FromRow)]
struct TodoItemRow {
    id: i64,
    title: String,
    description: Option<String>,
    completed: bool,
}

impl From<TodoItemRow> for TodoItem {
    fn from(row: TodoItemRow) -> Self {
        TodoItem {
            id: row.id,
            title: row.title,
            description: row.description,
            completed: row.completed,
        }
    }
}

impl domain::todo::driven_ports::TodoReader for DbTodoReader {
    async fn all(
        &self,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Vec<TodoItem>, anyhow::Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let todos = query_as::<_, TodoItemRow>(
            "SELECT id, title, description, completed FROM todo_item ORDER BY id",
        )
        .fetch_all(cxn.borrow_connection())
        .await
        .context("Fetching all todos")?
        .into_iter()
        .map(TodoItem::from)
        .collect();

        Ok(todos)
    }

    async fn by_id(
        &self,
        todo_id: i64,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Option<TodoItem>, anyhow::Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let todo = query_as::<_, TodoItemRow>(
            "SELECT id, title, description, completed FROM todo_item WHERE id = $1",
        )
        .bind(todo_id)
        .fetch_optional(cxn.borrow_connection())
        .await
        .context("Fetching a todo by id")?;

        Ok(todo.map(TodoItem::from))
    }
}

pub struct DbTodoWriter {}

impl domain::todo::driven_ports::TodoWriter for DbTodoWriter {
    async fn create(
        &self,
        new_todo: &NewTodo,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<TodoItem, anyhow::Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let created = query_as::<_, TodoItemRow>(
            "INSERT INTO todo_item(title, description, completed) VALUES ($1, $2, $3) \
             RETURNING id, title, description, completed",
        )
        .bind(&new_todo.title)
        .bind(&new_todo.description)
        .bind(new_todo.completed)
        .fetch_one(cxn.borrow_connection())
        .await
        .context("Inserting a new todo")?;

        Ok(created.into())
    }

    async fn update(
        &self,
        todo: &TodoItem,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<bool, anyhow::Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let result = query(
            "UPDATE todo_item SET title = $1, description = $2, completed = $3 WHERE id = $4",
        )
        .bind(&todo.title)
        .bind(&todo.description)
        .bind(todo.completed)
        .bind(todo.id)
        .execute(cxn.borrow_connection())
        .await
        .context("Updating a todo")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(
        &self,
        todo_id: i64,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<bool, anyhow::Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let result = query("DELETE FROM todo_item WHERE id = $1")
            .bind(todo_id)
            .execute(cxn.borrow_connection())
            .await
            .context("Deleting a todo")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(
        &self,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<u64, anyhow::Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let result = query("DELETE FROM todo_item")
            .execute(cxn.borrow_connection())
            .await
            .context("Deleting all todos")?;

        Ok(result.rows_affected())
    }
}
