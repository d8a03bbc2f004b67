//! Event payloads handed to lifecycle listeners.

use std::error::Error;
use std::fmt;
use std::thread;

use crate::store::ValueStore;

/// Connection-level operations that produce before/after notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    CreateConnection,
    CloseConnection,
    BeginTransaction,
    CommitTransaction,
    RollbackTransaction,
    CreateSavepoint,
    RollbackTransactionToSavepoint,
}

impl Method {
    /// Snake-case name used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::CreateConnection => "create_connection",
            Method::CloseConnection => "close_connection",
            Method::BeginTransaction => "begin_transaction",
            Method::CommitTransaction => "commit_transaction",
            Method::RollbackTransaction => "rollback_transaction",
            Method::CreateSavepoint => "create_savepoint",
            Method::RollbackTransactionToSavepoint => "rollback_transaction_to_savepoint",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the queries of one execution unit were submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionType {
    Statement,
    Batch,
}

impl ExecutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionType::Statement => "STATEMENT",
            ExecutionType::Batch => "BATCH",
        }
    }
}

impl fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the thread a notification was delivered on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: String,
    pub name: String,
}

impl ThreadInfo {
    /// The thread this is called on.
    pub fn current() -> Self {
        let current = thread::current();
        let debug_id = format!("{:?}", current.id());
        let id = debug_id
            .trim_start_matches("ThreadId(")
            .trim_end_matches(')')
            .to_string();

        Self {
            id,
            name: current.name().unwrap_or("<unnamed>").to_string(),
        }
    }
}

/// State of one live connection handed out by a proxy factory.
///
/// The counters are maintained by the proxy; listeners only read them.
/// The value store belongs exclusively to this connection.
#[derive(Debug)]
pub struct ConnectionInfo {
    connection_id: String,
    transaction_count: u64,
    commit_count: u64,
    rollback_count: u64,
    closed: bool,
    value_store: ValueStore,
}

impl ConnectionInfo {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            transaction_count: 0,
            commit_count: 0,
            rollback_count: 0,
            closed: false,
            value_store: ValueStore::new(),
        }
    }

    /// Id assigned by the proxy factory.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Transactions successfully begun on this connection.
    pub fn transaction_count(&self) -> u64 {
        self.transaction_count
    }

    pub fn commit_count(&self) -> u64 {
        self.commit_count
    }

    /// Full rollbacks. Savepoint rollbacks are not counted.
    pub fn rollback_count(&self) -> u64 {
        self.rollback_count
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Store owned by this connection, shared by all of its notifications.
    pub fn value_store(&self) -> &ValueStore {
        &self.value_store
    }

    pub fn value_store_mut(&mut self) -> &mut ValueStore {
        &mut self.value_store
    }

    pub(crate) fn increment_transaction_count(&mut self) {
        self.transaction_count += 1;
    }

    pub(crate) fn increment_commit_count(&mut self) {
        self.commit_count += 1;
    }

    pub(crate) fn increment_rollback_count(&mut self) {
        self.rollback_count += 1;
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
    }
}

/// Payload for connection factory, connection and transaction notifications.
///
/// The event-scoped value store is created for the "before" half and moved
/// into the "after" half of the same invocation.
pub struct MethodExecutionInfo<'a> {
    method: Method,
    args: Vec<String>,
    thread: ThreadInfo,
    thrown: Option<&'a (dyn Error + 'a)>,
    value_store: ValueStore,
    connection_info: Option<&'a mut ConnectionInfo>,
}

impl<'a> MethodExecutionInfo<'a> {
    /// `connection` is `None` for factory notifications before the connection exists.
    pub fn new(
        method: Method,
        args: Vec<String>,
        value_store: ValueStore,
        connection_info: Option<&'a mut ConnectionInfo>,
    ) -> Self {
        Self {
            method,
            args,
            thread: ThreadInfo::current(),
            thrown: None,
            value_store,
            connection_info,
        }
    }

    /// Attach the failure of the underlying operation.
    pub fn with_thrown(mut self, thrown: Option<&'a (dyn Error + 'a)>) -> Self {
        self.thrown = thrown;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Arguments of the intercepted call, e.g. the savepoint name.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn thread(&self) -> &ThreadInfo {
        &self.thread
    }

    pub fn thread_id(&self) -> &str {
        &self.thread.id
    }

    pub fn thread_name(&self) -> &str {
        &self.thread.name
    }

    /// Failure of the intercepted call; always `None` in the "before" half.
    pub fn thrown(&self) -> Option<&'a (dyn Error + 'a)> {
        self.thrown
    }

    pub fn is_success(&self) -> bool {
        self.thrown.is_none()
    }

    pub fn value_store(&self) -> &ValueStore {
        &self.value_store
    }

    pub fn value_store_mut(&mut self) -> &mut ValueStore {
        &mut self.value_store
    }

    /// `None` until the connection exists, i.e. before and after a failed create.
    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        self.connection_info.as_deref()
    }

    pub fn connection_info_mut(&mut self) -> Option<&mut ConnectionInfo> {
        self.connection_info.as_deref_mut()
    }

    /// Hand the event store on to the "after" half.
    pub fn into_value_store(self) -> ValueStore {
        self.value_store
    }
}

impl fmt::Debug for MethodExecutionInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodExecutionInfo")
            .field("method", &self.method)
            .field("args", &self.args)
            .field("thread", &self.thread)
            .field("thrown", &self.thrown.map(|e| e.to_string()))
            .field("value_store", &self.value_store)
            .field("connection_info", &self.connection_info)
            .finish()
    }
}

/// A single query text submitted to the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInfo {
    query: String,
}

impl QueryInfo {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

/// Payload for query notifications. Never outlives one execution.
pub struct QueryExecutionInfo<'a> {
    execution_type: ExecutionType,
    queries: Vec<QueryInfo>,
    thread: ThreadInfo,
    thrown: Option<&'a (dyn Error + 'a)>,
    current_result_count: usize,
    value_store: ValueStore,
    connection_info: &'a ConnectionInfo,
}

impl<'a> QueryExecutionInfo<'a> {
    pub fn new(
        execution_type: ExecutionType,
        queries: Vec<QueryInfo>,
        value_store: ValueStore,
        connection_info: &'a ConnectionInfo,
    ) -> Self {
        Self {
            execution_type,
            queries,
            thread: ThreadInfo::current(),
            thrown: None,
            current_result_count: 0,
            value_store,
            connection_info,
        }
    }

    pub fn with_thrown(mut self, thrown: Option<&'a (dyn Error + 'a)>) -> Self {
        self.thrown = thrown;
        self
    }

    pub fn with_result_count(mut self, count: usize) -> Self {
        self.current_result_count = count;
        self
    }

    pub fn execution_type(&self) -> ExecutionType {
        self.execution_type
    }

    pub fn queries(&self) -> &[QueryInfo] {
        &self.queries
    }

    /// Number of statements in the batch; `None` for single statements.
    pub fn batch_size(&self) -> Option<usize> {
        match self.execution_type {
            ExecutionType::Batch => Some(self.queries.len()),
            ExecutionType::Statement => None,
        }
    }

    pub fn thread(&self) -> &ThreadInfo {
        &self.thread
    }

    pub fn thread_id(&self) -> &str {
        &self.thread.id
    }

    pub fn thread_name(&self) -> &str {
        &self.thread.name
    }

    pub fn thrown(&self) -> Option<&'a (dyn Error + 'a)> {
        self.thrown
    }

    pub fn is_success(&self) -> bool {
        self.thrown.is_none()
    }

    /// Results mapped so far for this execution.
    pub fn current_result_count(&self) -> usize {
        self.current_result_count
    }

    pub fn value_store(&self) -> &ValueStore {
        &self.value_store
    }

    pub fn value_store_mut(&mut self) -> &mut ValueStore {
        &mut self.value_store
    }

    pub fn connection_info(&self) -> &ConnectionInfo {
        self.connection_info
    }

    pub fn into_value_store(self) -> ValueStore {
        self.value_store
    }
}

impl fmt::Debug for QueryExecutionInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryExecutionInfo")
            .field("execution_type", &self.execution_type)
            .field("queries", &self.queries)
            .field("thread", &self.thread)
            .field("thrown", &self.thrown.map(|e| e.to_string()))
            .field("current_result_count", &self.current_result_count)
            .field("connection_id", &self.connection_info.connection_id())
            .finish()
    }
}
