//! Lifecycle protocol violations reported by the tracer.

use thiserror::Error;

use crate::info::Method;

/// A notification arrived without the state its "before" half (or the
/// connection) should have left behind.
///
/// These never affect the database operation itself; they are handed to the
/// error handler of the [`LifecycleTracer`](crate::LifecycleTracer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("no pending connection span for {method}")]
    MissingPendingConnectionSpan { method: Method },

    #[error("no query span on connection {connection_id}")]
    MissingQuerySpan { connection_id: String },

    #[error("no connection span for {method} on connection {connection_id}")]
    MissingConnectionSpan {
        method: Method,
        connection_id: String,
    },

    #[error("{method} notified without connection info")]
    MissingConnectionInfo { method: Method },

    #[error("no transaction span for {method} on connection {connection_id}")]
    MissingTransactionSpan {
        method: Method,
        connection_id: String,
    },

    #[error("rollback to savepoint without a savepoint name on connection {connection_id}")]
    MissingSavepointName { connection_id: String },
}
