pub mod db_todo_driven_ports;
pub mod db_user_driven_ports;

use crate::external_connections::{self, ConnectionHandle};
use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::{Acquire, PgConnection, PgPool, Postgres, Transaction};

/// PostgreSQL behind the [external_connections] traits. Clones share one pool.
#[derive(Clone)]
pub struct PgConnectivity {
    pool: PgPool,
}

impl PgConnectivity {
    pub fn new(pool: PgPool) -> Self {
        PgConnectivity { pool }
    }
}

/// A connection checked out of the pool for one adapter call, returned when dropped
pub struct PooledConnection(PoolConnection<Postgres>);

/// An open transaction. Dropping it without calling commit rolls back every write made on it.
pub struct PgTransaction(Transaction<'static, Postgres>);

/// The transaction's connection, lent to one adapter call
pub struct TransactionConnection<'tx>(&'tx mut PgConnection);

impl ConnectionHandle for PooledConnection {
    fn borrow_connection(&mut self) -> &mut PgConnection {
        &mut self.0
    }
}

impl ConnectionHandle for TransactionConnection<'_> {
    fn borrow_connection(&mut self) -> &mut PgConnection {
        &mut *self.0
    }
}

impl external_connections::ExternalConnectivity for PgConnectivity {
    type DbHandle<'cxn_borrow> = PooledConnection;

    async fn database_cxn(&mut self) -> Result<PooledConnection, anyhow::Error> {
        let connection = self
            .pool
            .acquire()
            .await
            .context("checking a connection out of the pool")?;

        Ok(PooledConnection(connection))
    }
}

impl external_connections::Transactable for PgConnectivity {
    type Handle = PgTransaction;

    async fn start_transaction(&self) -> Result<PgTransaction, anyhow::Error> {
        let txn = self.pool.begin().await.context("beginning a transaction")?;

        Ok(PgTransaction(txn))
    }
}

impl external_connections::ExternalConnectivity for PgTransaction {
    type DbHandle<'tx_borrow>
        = TransactionConnection<'tx_borrow>
    where
        Self: 'tx_borrow;

    async fn database_cxn(&mut self) -> Result<TransactionConnection<'_>, anyhow::Error> {
        let connection = self
            .0
            .acquire()
            .await
            .context("borrowing the transaction's connection")?;

        Ok(TransactionConnection(connection))
    }
}

impl external_connections::TransactionHandle for PgTransaction {
    async fn commit(self) -> Result<(), anyhow::Error> {
        self.0.commit().await.context("committing a transaction")
    }
}
