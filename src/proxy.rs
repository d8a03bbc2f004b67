//! Proxying connection factory that notifies lifecycle listeners.

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DbErr;

use crate::info::{
    ConnectionInfo, ExecutionType, Method, MethodExecutionInfo, QueryExecutionInfo, QueryInfo,
};
use crate::listener::{CompositeListener, LifecycleListener};
use crate::store::ValueStore;

/// Creates raw database connections on demand.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    type Connection: Connection;

    async fn create(&self) -> Result<Self::Connection, DbErr>;
}

/// A single raw database connection.
#[async_trait]
pub trait Connection: Send {
    type Row: Send;

    async fn begin_transaction(&mut self) -> Result<(), DbErr>;

    async fn commit_transaction(&mut self) -> Result<(), DbErr>;

    async fn rollback_transaction(&mut self) -> Result<(), DbErr>;

    async fn create_savepoint(&mut self, name: &str) -> Result<(), DbErr>;

    async fn rollback_transaction_to_savepoint(&mut self, name: &str) -> Result<(), DbErr>;

    /// Run one statement and return the rows it produced.
    async fn execute(&mut self, sql: &str) -> Result<Vec<Self::Row>, DbErr>;

    /// Run several statements and return the rows affected by each.
    async fn execute_batch(&mut self, statements: &[String]) -> Result<Vec<u64>, DbErr>;

    /// Close the connection. Closing an already closed connection succeeds.
    async fn close(&mut self) -> Result<(), DbErr>;
}

/// Assigns identifiers to newly created connections.
pub trait ConnectionIdManager: Send + Sync {
    fn next_id(&self) -> String;
}

/// Decimal ids from a per-factory counter starting at 1.
#[derive(Debug, Default)]
pub struct SequentialIdManager {
    next: AtomicU64,
}

impl ConnectionIdManager for SequentialIdManager {
    fn next_id(&self) -> String {
        (self.next.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}

fn as_error(err: &DbErr) -> &(dyn Error + '_) {
    err
}

/// Builder for [`ProxyConnectionFactory`].
pub struct ProxyConnectionFactoryBuilder<F> {
    factory: F,
    listeners: CompositeListener,
    id_manager: Arc<dyn ConnectionIdManager>,
}

impl<F: ConnectionFactory> ProxyConnectionFactoryBuilder<F> {
    /// Register a listener. Listeners are notified in registration order.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: LifecycleListener + 'static,
    {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Register a listener that is shared with other factories.
    pub fn shared_listener(mut self, listener: Arc<dyn LifecycleListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Replace the default [`SequentialIdManager`].
    pub fn id_manager<M>(mut self, id_manager: M) -> Self
    where
        M: ConnectionIdManager + 'static,
    {
        self.id_manager = Arc::new(id_manager);
        self
    }

    pub fn build(self) -> ProxyConnectionFactory<F> {
        ProxyConnectionFactory {
            inner: Arc::new(self.factory),
            listeners: Arc::new(self.listeners),
            id_manager: self.id_manager,
        }
    }
}

/// Wraps a [`ConnectionFactory`] so every connection, transaction and query
/// operation notifies the registered listeners.
///
/// Cloning is cheap and clones share listeners and the id sequence.
pub struct ProxyConnectionFactory<F> {
    inner: Arc<F>,
    listeners: Arc<CompositeListener>,
    id_manager: Arc<dyn ConnectionIdManager>,
}

impl<F> Clone for ProxyConnectionFactory<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            listeners: self.listeners.clone(),
            id_manager: self.id_manager.clone(),
        }
    }
}

impl<F: ConnectionFactory> ProxyConnectionFactory<F> {
    /// Start building a proxy around `factory`.
    pub fn builder(factory: F) -> ProxyConnectionFactoryBuilder<F> {
        ProxyConnectionFactoryBuilder {
            factory,
            listeners: CompositeListener::new(),
            id_manager: Arc::new(SequentialIdManager::default()),
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Create a connection. A failure is returned unchanged after listeners saw it.
    pub async fn create(&self) -> Result<ProxyConnection<F::Connection>, DbErr> {
        // Event info is not `Send` and must not live across the await.
        let store = {
            let mut info = MethodExecutionInfo::new(
                Method::CreateConnection,
                Vec::new(),
                ValueStore::new(),
                None,
            );
            self.listeners.before(&mut info);
            info.into_value_store()
        };

        match self.inner.create().await {
            Ok(connection) => {
                let mut connection_info = ConnectionInfo::new(self.id_manager.next_id());
                let mut info = MethodExecutionInfo::new(
                    Method::CreateConnection,
                    Vec::new(),
                    store,
                    Some(&mut connection_info),
                );
                self.listeners.after(&mut info);
                drop(info);

                tracing::debug!(connection_id = %connection_info.connection_id(), "Connection created");
                Ok(ProxyConnection {
                    inner: connection,
                    info: connection_info,
                    listeners: self.listeners.clone(),
                })
            }
            Err(err) => {
                let mut info =
                    MethodExecutionInfo::new(Method::CreateConnection, Vec::new(), store, None)
                        .with_thrown(Some(as_error(&err)));
                self.listeners.after(&mut info);
                drop(info);

                tracing::debug!(error = %err, "Connection creation failed");
                Err(err)
            }
        }
    }
}

impl<F> fmt::Debug for ProxyConnectionFactory<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConnectionFactory")
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

/// A connection created by [`ProxyConnectionFactory`].
///
/// Owns its [`ConnectionInfo`]; no other connection can reach it. Dropping the
/// connection without closing it drops its store and whatever spans remain in it.
pub struct ProxyConnection<C> {
    inner: C,
    info: ConnectionInfo,
    listeners: Arc<CompositeListener>,
}

impl<C: Connection> ProxyConnection<C> {
    /// Id assigned when the connection was created.
    pub fn connection_id(&self) -> &str {
        self.info.connection_id()
    }

    /// Counters and value store of this connection.
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// The wrapped connection.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn before(&mut self, method: Method, args: &[String]) -> ValueStore {
        let mut info = MethodExecutionInfo::new(
            method,
            args.to_vec(),
            ValueStore::new(),
            Some(&mut self.info),
        );
        self.listeners.before(&mut info);
        info.into_value_store()
    }

    fn after(
        &mut self,
        method: Method,
        args: &[String],
        store: ValueStore,
        thrown: Option<&DbErr>,
    ) {
        let mut info = MethodExecutionInfo::new(method, args.to_vec(), store, Some(&mut self.info))
            .with_thrown(thrown.map(as_error));
        self.listeners.after(&mut info);
    }

    pub async fn begin_transaction(&mut self) -> Result<(), DbErr> {
        let store = self.before(Method::BeginTransaction, &[]);
        let result = self.inner.begin_transaction().await;
        if result.is_ok() {
            self.info.increment_transaction_count();
        }
        self.after(Method::BeginTransaction, &[], store, result.as_ref().err());
        result
    }

    pub async fn commit_transaction(&mut self) -> Result<(), DbErr> {
        let store = self.before(Method::CommitTransaction, &[]);
        let result = self.inner.commit_transaction().await;
        if result.is_ok() {
            self.info.increment_commit_count();
        }
        self.after(Method::CommitTransaction, &[], store, result.as_ref().err());
        result
    }

    pub async fn rollback_transaction(&mut self) -> Result<(), DbErr> {
        let store = self.before(Method::RollbackTransaction, &[]);
        let result = self.inner.rollback_transaction().await;
        if result.is_ok() {
            self.info.increment_rollback_count();
        }
        self.after(Method::RollbackTransaction, &[], store, result.as_ref().err());
        result
    }

    pub async fn create_savepoint(&mut self, name: &str) -> Result<(), DbErr> {
        let args = [name.to_string()];
        let store = self.before(Method::CreateSavepoint, &args);
        let result = self.inner.create_savepoint(name).await;
        self.after(Method::CreateSavepoint, &args, store, result.as_ref().err());
        result
    }

    pub async fn rollback_transaction_to_savepoint(&mut self, name: &str) -> Result<(), DbErr> {
        let args = [name.to_string()];
        let store = self.before(Method::RollbackTransactionToSavepoint, &args);
        let result = self.inner.rollback_transaction_to_savepoint(name).await;
        self.after(
            Method::RollbackTransactionToSavepoint,
            &args,
            store,
            result.as_ref().err(),
        );
        result
    }

    /// Execute one statement.
    pub async fn execute(&mut self, sql: &str) -> Result<Vec<C::Row>, DbErr> {
        let queries = vec![QueryInfo::new(sql)];
        let store = self.before_query(ExecutionType::Statement, queries.clone());
        let result = self.inner.execute(sql).await;
        let count = result.as_ref().map(Vec::len).unwrap_or(0);
        self.after_query(ExecutionType::Statement, queries, store, count, result.as_ref().err());
        result
    }

    /// Execute statements as one batch.
    pub async fn execute_batch<I, S>(&mut self, statements: I) -> Result<Vec<u64>, DbErr>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let statements: Vec<String> = statements.into_iter().map(Into::into).collect();
        let queries: Vec<QueryInfo> = statements.iter().map(|s| QueryInfo::new(s.as_str())).collect();
        let store = self.before_query(ExecutionType::Batch, queries.clone());
        let result = self.inner.execute_batch(&statements).await;
        let count = result.as_ref().map(Vec::len).unwrap_or(0);
        self.after_query(ExecutionType::Batch, queries, store, count, result.as_ref().err());
        result
    }

    fn before_query(&self, execution_type: ExecutionType, queries: Vec<QueryInfo>) -> ValueStore {
        let mut info = QueryExecutionInfo::new(execution_type, queries, ValueStore::new(), &self.info);
        self.listeners.before_query(&mut info);
        info.into_value_store()
    }

    fn after_query(
        &self,
        execution_type: ExecutionType,
        queries: Vec<QueryInfo>,
        store: ValueStore,
        result_count: usize,
        thrown: Option<&DbErr>,
    ) {
        let mut info = QueryExecutionInfo::new(execution_type, queries, store, &self.info)
            .with_result_count(result_count)
            .with_thrown(thrown.map(as_error));
        self.listeners.after_query(&mut info);
    }

    /// Close the connection.
    ///
    /// May be called more than once; every call notifies listeners.
    pub async fn close(&mut self) -> Result<(), DbErr> {
        let store = self.before(Method::CloseConnection, &[]);
        let result = self.inner.close().await;
        if result.is_ok() {
            self.info.mark_closed();
        }
        self.after(Method::CloseConnection, &[], store, result.as_ref().err());
        tracing::debug!(connection_id = %self.info.connection_id(), "Connection closed");
        result
    }
}

impl<C> fmt::Debug for ProxyConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConnection")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}
