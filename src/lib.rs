//! # sea-orm-lifecycle-tracing
//!
//! Connection, transaction and query lifecycle spans for SeaORM connections.
//!
//! A [`ProxyConnectionFactory`] wraps any [`ConnectionFactory`] and notifies
//! [`LifecycleListener`]s before and after every operation. The
//! [`LifecycleTracer`] listener turns those notifications into spans:
//!
//! - one `db.connection` span per connection, from creation to close, carrying
//!   the creating/closing thread and the transaction/commit/rollback counters
//! - one `db.transaction` span per transaction, finished on commit, rollback or
//!   rollback to a savepoint
//! - one `db.query` span per statement or batch
//!
//! Spans are kept in value stores owned by the connection or by the single
//! event that needs them, never in a global registry, and each one is
//! finished exactly once, including on failure paths. Failures of the database
//! operation are recorded on the span and returned to the caller unchanged.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sea_orm::ConnectOptions;
//! use sea_orm_lifecycle_tracing::TracingExt;
//!
//! let factory = ConnectOptions::new("postgres://localhost/mydb").with_lifecycle_tracing();
//!
//! let mut connection = factory.create().await?;
//! connection.begin_transaction().await?;
//! connection.execute("UPDATE accounts SET balance = balance - 10 WHERE id = 1").await?;
//! connection.commit_transaction().await?;
//! connection.close().await?;
//! ```
//!
//! ## Custom backends
//!
//! ```rust,ignore
//! use sea_orm_lifecycle_tracing::{LifecycleTracer, ProxyConnectionFactory, RecordingTracer};
//!
//! let recording = RecordingTracer::new();
//! let factory = ProxyConnectionFactory::builder(my_factory)
//!     .listener(LifecycleTracer::new(recording.clone()))
//!     .build();
//! ```
//!
//! ## Span Attributes
//!
//! | Attribute | Span | Description |
//! |-----------|------|-------------|
//! | `db.connection.id` | all | Id assigned by the proxy factory |
//! | `thread.id.on_create` / `thread.name.on_create` | connection | Thread that created the connection |
//! | `thread.id.on_close` / `thread.name.on_close` | connection | Thread that closed the connection |
//! | `db.connection.transaction_count` | connection | Transactions begun |
//! | `db.connection.commit_count` | connection | Commits |
//! | `db.connection.rollback_count` | connection | Full rollbacks |
//! | `db.statement` | query | Comma-joined query texts (when enabled) |
//! | `db.execution_type` | query | `STATEMENT` or `BATCH` |
//! | `db.batch.size` | query | Statements in the batch |
//! | `db.success` | query | `true` or `false` |
//! | `db.mapped_result_count` | query | Results mapped (success only) |
//! | `db.operation` / `db.sql.table` | query | Parsed from the first query |
//! | `db.transaction.savepoint` | transaction | Savepoint rolled back to |
//! | `otel.status_code` | all | "OK" or "ERROR" |

mod config;
mod database;
mod error;
mod info;
mod listener;
mod parser;
mod proxy;
mod recording;
mod span;
mod store;
#[cfg(test)]
mod testing;
mod tracer;

pub use config::TracingConfig;
pub use database::{SeaOrmConnection, SeaOrmConnectionFactory, TracingExt};
pub use error::LifecycleError;
pub use info::{
    ConnectionInfo, ExecutionType, Method, MethodExecutionInfo, QueryExecutionInfo, QueryInfo,
    ThreadInfo,
};
pub use listener::{CompositeListener, LifecycleListener};
pub use parser::{ParsedSql, SqlOperation};
pub use proxy::{
    Connection, ConnectionFactory, ConnectionIdManager, ProxyConnection, ProxyConnectionFactory,
    ProxyConnectionFactoryBuilder, SequentialIdManager,
};
pub use recording::{RecordedSpan, RecordingSpan, RecordingTracer};
pub use span::{SpanName, Tag, TraceSpan, Tracer, TracingBackend, TracingSpan, EXCEPTION_BAGGAGE_KEY};
pub use store::ValueStore;
pub use tracer::{
    LifecycleTracer, CONNECTION_SPAN_KEY, PENDING_CONNECTION_SPAN_KEY, QUERY_SPAN_KEY,
    TRANSACTION_SPAN_KEY,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        LifecycleListener, LifecycleTracer, ProxyConnectionFactory, TracingBackend, TracingConfig,
        TracingExt,
    };
}
