use sqlx::PgConnection;

/// A borrowed database connection, either pooled or inside a transaction
pub trait ConnectionHandle {
    fn borrow_connection(&mut self) -> &mut PgConnection;
}

/// Gives driven adapters access to the external systems they talk to without tying business
/// logic to a concrete client
pub trait ExternalConnectivity: Send + Sync {
    type DbHandle<'cxn_borrow>: ConnectionHandle + Send
    where
        Self: 'cxn_borrow;

    async fn database_cxn(&mut self) -> Result<Self::DbHandle<'_>, anyhow::Error>;
}

/// Connectivity that can open a transaction. The returned handle rolls back if dropped
/// without [TransactionHandle::commit] being called.
pub trait Transactable: ExternalConnectivity {
    type Handle: TransactionHandle;

    async fn start_transaction(&self) -> Result<Self::Handle, anyhow::Error>;
}

/// Connectivity with an open transaction which can be committed
pub trait TransactionHandle: ExternalConnectivity {
    async fn commit(self) -> Result<(), anyhow::Error>;
}
