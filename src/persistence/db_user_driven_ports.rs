use crate::domain;
use crate::domain::user::{NewUserRecord, Role, TodoUser};
use crate::external_connections::{ConnectionHandle, ExternalConnectivity};
use anyhow::Context;
use sqlx::{FromRow, query_as, query_scalar};

pub struct DbDetectUser {}

impl domain::user::driven_ports::DetectUser for DbDetectUser {
    async fn username_exists(
        &self,
        username: &str,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<bool, anyhow::Error> {
        let mut connection = ext_cxn.database_cxn().await?;

        let exists: bool =
            query_scalar("SELECT EXISTS(SELECT 1 FROM todo_user tu WHERE tu.username = $1)")
                .bind(username)
                .fetch_one(connection.borrow_connection())
                .await
                .context("Detecting user via username")?;

        Ok(exists)
    }
}

#[derive(FromRow)]
struct TodoUserRow {
    id: i64,
    username: String,
    password_hash: String,
    role: String,
}

impl TryFrom<TodoUserRow> for TodoUser {
    type Error = anyhow::Error;

    fn try_from(row: TodoUserRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .with_context(|| format!("Reading the role of user {}", row.id))?;

        Ok(TodoUser {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            role,
        })
    }
}

pub struct DbReadUsers {}

impl domain::user::driven_ports::UserReader for DbReadUsers {
    async fn by_username(
        &self,
        username: &str,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Option<TodoUser>, anyhow::Error> {
        let mut cxn_handle = ext_cxn.database_cxn().await?;

        let user = query_as::<_, TodoUserRow>(
            "SELECT id, username, password_hash, role FROM todo_user tu WHERE tu.username = $1",
        )
        .bind(username)
        .fetch_optional(cxn_handle.borrow_connection())
        .await
        .context("Fetching a user by username")?;

        user.map(TodoUser::try_from).transpose()
    }
}

pub struct DbWriteUsers {}

impl domain::user::driven_ports::UserWriter for DbWriteUsers {
    async fn create_user(
        &self,
        user: &NewUserRecord,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Option<TodoUser>, anyhow::Error> {
        let mut cxn_handle = ext_cxn.database_cxn().await?;

        let insert_result = query_as::<_, TodoUserRow>(
            "INSERT INTO todo_user(username, password_hash, role) VALUES ($1, $2, $3) \
             RETURNING id, username, password_hash, role",
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.to_string())
        .fetch_one(cxn_handle.borrow_connection())
        .await;

        match insert_result {
            Ok(created) => Ok(Some(created.try_into()?)),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(None),
            Err(err) => Err(err).context("Inserting new user"),
        }
    }
}
