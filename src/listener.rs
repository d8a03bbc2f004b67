//! Observer interface for connection lifecycle notifications.

use std::fmt;
use std::sync::Arc;

use crate::info::{Method, MethodExecutionInfo, QueryExecutionInfo};

/// Receives before/after notifications for every proxied operation.
///
/// All methods default to no-ops, so implementations only override the events
/// they care about. `before_method`/`after_method` fire for every connection
/// factory, connection and transaction operation, ahead of the specific callback.
/// Notifications are delivered synchronously on the thread that drives the
/// operation and must not block.
#[allow(unused_variables)]
pub trait LifecycleListener: Send + Sync {
    fn before_method(&self, info: &mut MethodExecutionInfo<'_>) {}
    fn after_method(&self, info: &mut MethodExecutionInfo<'_>) {}

    fn before_create_connection(&self, info: &mut MethodExecutionInfo<'_>) {}
    fn after_create_connection(&self, info: &mut MethodExecutionInfo<'_>) {}

    fn before_close_connection(&self, info: &mut MethodExecutionInfo<'_>) {}
    fn after_close_connection(&self, info: &mut MethodExecutionInfo<'_>) {}

    fn before_begin_transaction(&self, info: &mut MethodExecutionInfo<'_>) {}
    fn after_begin_transaction(&self, info: &mut MethodExecutionInfo<'_>) {}

    fn before_commit_transaction(&self, info: &mut MethodExecutionInfo<'_>) {}
    fn after_commit_transaction(&self, info: &mut MethodExecutionInfo<'_>) {}

    fn before_rollback_transaction(&self, info: &mut MethodExecutionInfo<'_>) {}
    fn after_rollback_transaction(&self, info: &mut MethodExecutionInfo<'_>) {}

    fn before_create_savepoint(&self, info: &mut MethodExecutionInfo<'_>) {}
    fn after_create_savepoint(&self, info: &mut MethodExecutionInfo<'_>) {}

    fn before_rollback_transaction_to_savepoint(&self, info: &mut MethodExecutionInfo<'_>) {}
    fn after_rollback_transaction_to_savepoint(&self, info: &mut MethodExecutionInfo<'_>) {}

    fn before_query(&self, info: &mut QueryExecutionInfo<'_>) {}
    fn after_query(&self, info: &mut QueryExecutionInfo<'_>) {}
}

/// Fans notifications out to every registered listener in registration order.
#[derive(Clone, Default)]
pub struct CompositeListener {
    listeners: Vec<Arc<dyn LifecycleListener>>,
}

impl CompositeListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener; it is notified after every listener already registered.
    pub fn push(&mut self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver the "before" half of a method notification.
    pub fn before(&self, info: &mut MethodExecutionInfo<'_>) {
        for listener in &self.listeners {
            listener.before_method(info);
            match info.method() {
                Method::CreateConnection => listener.before_create_connection(info),
                Method::CloseConnection => listener.before_close_connection(info),
                Method::BeginTransaction => listener.before_begin_transaction(info),
                Method::CommitTransaction => listener.before_commit_transaction(info),
                Method::RollbackTransaction => listener.before_rollback_transaction(info),
                Method::CreateSavepoint => listener.before_create_savepoint(info),
                Method::RollbackTransactionToSavepoint => {
                    listener.before_rollback_transaction_to_savepoint(info)
                }
            }
        }
    }

    /// Deliver the "after" half of a method notification.
    pub fn after(&self, info: &mut MethodExecutionInfo<'_>) {
        for listener in &self.listeners {
            listener.after_method(info);
            match info.method() {
                Method::CreateConnection => listener.after_create_connection(info),
                Method::CloseConnection => listener.after_close_connection(info),
                Method::BeginTransaction => listener.after_begin_transaction(info),
                Method::CommitTransaction => listener.after_commit_transaction(info),
                Method::RollbackTransaction => listener.after_rollback_transaction(info),
                Method::CreateSavepoint => listener.after_create_savepoint(info),
                Method::RollbackTransactionToSavepoint => {
                    listener.after_rollback_transaction_to_savepoint(info)
                }
            }
        }
    }

    pub fn before_query(&self, info: &mut QueryExecutionInfo<'_>) {
        for listener in &self.listeners {
            listener.before_query(info);
        }
    }

    pub fn after_query(&self, info: &mut QueryExecutionInfo<'_>) {
        for listener in &self.listeners {
            listener.after_query(info);
        }
    }
}

impl fmt::Debug for CompositeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeListener")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
