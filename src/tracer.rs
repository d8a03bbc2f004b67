//! Lifecycle listener that turns connection, transaction and query
//! notifications into spans.
//!
//! Spans never live in a global registry. A pending connection span lives in
//! the create event's store, then moves into the connection's own store; a
//! transaction span lives in the connection store; a query span lives in the
//! query event's store. "Before" callbacks start and stash a span, "after"
//! callbacks take it out of the store, tag it and finish it. Taking the span
//! out is what makes every finish happen exactly once.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::config::TracingConfig;
use crate::error::LifecycleError;
use crate::info::{Method, MethodExecutionInfo, QueryExecutionInfo};
use crate::listener::LifecycleListener;
use crate::parser::ParsedSql;
use crate::span::{SpanName, Tag, TraceSpan, Tracer, EXCEPTION_BAGGAGE_KEY};

/// Event-store key of the connection span before the connection id exists.
pub const PENDING_CONNECTION_SPAN_KEY: &str = "pending_connection_span";
/// Connection-store key of the connection span.
pub const CONNECTION_SPAN_KEY: &str = "connection_span";
/// Connection-store key of the open transaction span.
pub const TRANSACTION_SPAN_KEY: &str = "transaction_span";
/// Event-store key of the query span.
pub const QUERY_SPAN_KEY: &str = "query_span";
const QUERY_STARTED_AT_KEY: &str = "query_started_at";
/// Connection-store marker: the transaction span was finished before the
/// transaction itself ended (savepoint rollback or a failed transaction call).
const TRANSACTION_SPAN_ENDED_KEY: &str = "transaction_span_ended";

type ErrorHandler = Arc<dyn Fn(&LifecycleError) + Send + Sync>;

/// A [`LifecycleListener`] producing connection, transaction and query spans.
///
/// # Example
///
/// ```rust,ignore
/// use sea_orm_lifecycle_tracing::{LifecycleTracer, ProxyConnectionFactory, TracingBackend};
///
/// let factory = ProxyConnectionFactory::builder(raw_factory)
///     .listener(LifecycleTracer::new(TracingBackend::new()))
///     .build();
/// ```
pub struct LifecycleTracer<T: Tracer> {
    tracer: T,
    config: Arc<TracingConfig>,
    on_error: ErrorHandler,
}

impl<T: Tracer> LifecycleTracer<T> {
    /// Create a tracer with default configuration.
    pub fn new(tracer: T) -> Self {
        Self::with_config(tracer, TracingConfig::default())
    }

    /// Create a tracer with the given configuration.
    pub fn with_config(tracer: T, config: TracingConfig) -> Self {
        Self {
            tracer,
            config: Arc::new(config),
            on_error: Arc::new(|err: &LifecycleError| {
                tracing::error!(error = %err, "Connection lifecycle protocol violation");
            }),
        }
    }

    /// Replace the handler receiving protocol violations.
    ///
    /// The default handler logs them at ERROR.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&LifecycleError) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(handler);
        self
    }

    /// The span backend.
    pub fn tracer(&self) -> &T {
        &self.tracer
    }

    /// Active configuration.
    pub fn config(&self) -> &TracingConfig {
        &self.config
    }

    fn report(&self, err: LifecycleError) {
        (self.on_error)(&err);
    }

    fn missing_connection_info(&self, method: Method) {
        self.report(LifecycleError::MissingConnectionInfo { method });
    }

    /// Finish the open transaction span after commit or a rollback variant.
    fn end_transaction(
        &self,
        info: &mut MethodExecutionInfo<'_>,
        log: &str,
        savepoint: Option<&str>,
    ) {
        let method = info.method();
        let thread = info.thread().clone();
        let thrown = info.thrown().map(|e| e.to_string());

        let Some(connection) = info.connection_info_mut() else {
            self.missing_connection_info(method);
            return;
        };
        let connection_id = connection.connection_id().to_string();
        // Whether the transaction can outlive this call.
        let still_open = method == Method::RollbackTransactionToSavepoint || thrown.is_some();
        let store = connection.value_store_mut();

        match store.remove::<T::Span>(TRANSACTION_SPAN_KEY) {
            Some(mut span) => {
                span.log(log);
                if let Some(savepoint) = savepoint {
                    span.set_tag(Tag::Savepoint, savepoint);
                }
                span.set_tag(Tag::ConnectionId, &connection_id);
                span.set_tag(Tag::ThreadId, &thread.id);
                span.set_tag(Tag::ThreadName, &thread.name);
                record_outcome(&mut span, thrown.as_deref());
                span.finish();
                if still_open {
                    store.put(TRANSACTION_SPAN_ENDED_KEY, method);
                }
            }
            None if store.contains_key(TRANSACTION_SPAN_ENDED_KEY) => {
                if !still_open {
                    store.remove::<Method>(TRANSACTION_SPAN_ENDED_KEY);
                }
                tracing::debug!(
                    connection_id = %connection_id,
                    method = %method,
                    "Transaction span already finished"
                );
            }
            None => self.report(LifecycleError::MissingTransactionSpan {
                method,
                connection_id,
            }),
        }
    }

    /// Note a transaction outcome on the still-open connection span.
    fn note_on_connection(
        &self,
        info: &mut MethodExecutionInfo<'_>,
        note: &str,
        required: bool,
    ) {
        let method = info.method();
        let Some(connection) = info.connection_info_mut() else {
            self.missing_connection_info(method);
            return;
        };
        let connection_id = connection.connection_id().to_string();

        match connection
            .value_store_mut()
            .get_mut::<T::Span>(CONNECTION_SPAN_KEY)
        {
            Some(span) => span.log(note),
            None if required => self.report(LifecycleError::MissingConnectionSpan {
                method,
                connection_id,
            }),
            None => {}
        }
    }
}

fn record_outcome<S: TraceSpan>(span: &mut S, thrown: Option<&str>) {
    match thrown {
        Some(description) => {
            span.set_baggage_item(EXCEPTION_BAGGAGE_KEY, description);
            span.set_tag(Tag::StatusCode, "ERROR");
        }
        None => span.set_tag(Tag::StatusCode, "OK"),
    }
}

impl<T: Tracer> LifecycleListener for LifecycleTracer<T> {
    fn before_create_connection(&self, info: &mut MethodExecutionInfo<'_>) {
        let span = self.tracer.start_span(SpanName::Connection);
        info.value_store_mut().put(PENDING_CONNECTION_SPAN_KEY, span);
    }

    fn after_create_connection(&self, info: &mut MethodExecutionInfo<'_>) {
        let Some(mut span) = info
            .value_store_mut()
            .remove::<T::Span>(PENDING_CONNECTION_SPAN_KEY)
        else {
            self.report(LifecycleError::MissingPendingConnectionSpan {
                method: info.method(),
            });
            return;
        };

        if let Some(thrown) = info.thrown() {
            record_outcome(&mut span, Some(&thrown.to_string()));
            span.finish();
            return;
        }

        let thread = info.thread().clone();
        let Some(connection) = info.connection_info_mut() else {
            // Nowhere to keep it; do not leave it open.
            span.finish();
            self.missing_connection_info(Method::CreateConnection);
            return;
        };

        span.set_tag(Tag::ConnectionId, connection.connection_id());
        span.set_tag(Tag::ThreadIdOnCreate, &thread.id);
        span.set_tag(Tag::ThreadNameOnCreate, &thread.name);
        if let Some(db_name) = &self.config.database_name {
            span.set_tag(Tag::DatabaseName, db_name);
        }
        span.log("Connection created");

        tracing::debug!(connection_id = %connection.connection_id(), "Connection span opened");
        connection.value_store_mut().put(CONNECTION_SPAN_KEY, span);
    }

    fn after_close_connection(&self, info: &mut MethodExecutionInfo<'_>) {
        let thread = info.thread().clone();
        let thrown = info.thrown().map(|e| e.to_string());
        let Some(connection) = info.connection_info_mut() else {
            self.missing_connection_info(Method::CloseConnection);
            return;
        };

        let Some(mut span) = connection
            .value_store_mut()
            .remove::<T::Span>(CONNECTION_SPAN_KEY)
        else {
            // already closed
            return;
        };

        if let Some(mut transaction) = connection
            .value_store_mut()
            .remove::<T::Span>(TRANSACTION_SPAN_KEY)
        {
            transaction.log("Connection closed");
            transaction.set_tag(Tag::ConnectionId, connection.connection_id());
            transaction.finish();
        }

        if let Some(description) = thrown.as_deref() {
            span.set_baggage_item(EXCEPTION_BAGGAGE_KEY, description);
        }
        span.set_tag(Tag::ConnectionId, connection.connection_id());
        span.set_tag(Tag::ThreadIdOnClose, &thread.id);
        span.set_tag(Tag::ThreadNameOnClose, &thread.name);
        span.set_tag(
            Tag::TransactionCount,
            &connection.transaction_count().to_string(),
        );
        span.set_tag(Tag::CommitCount, &connection.commit_count().to_string());
        span.set_tag(Tag::RollbackCount, &connection.rollback_count().to_string());
        span.set_tag(
            Tag::StatusCode,
            if thrown.is_some() { "ERROR" } else { "OK" },
        );
        span.finish();
    }

    fn before_query(&self, info: &mut QueryExecutionInfo<'_>) {
        let connection_id = info.connection_info().connection_id().to_string();

        let mut span = self.tracer.start_span(SpanName::Query);
        span.set_tag(Tag::ConnectionId, &connection_id);
        span.set_tag(Tag::ExecutionType, info.execution_type().as_str());
        if self.config.record_statements {
            let queries = info
                .queries()
                .iter()
                .map(|q| q.query())
                .collect::<Vec<_>>()
                .join(", ");
            span.set_tag(Tag::Queries, &queries);
        }
        if let Some(size) = info.batch_size() {
            span.set_tag(Tag::BatchSize, &size.to_string());
        }

        if let Some(first) = info.queries().first() {
            let parsed = ParsedSql::parse(first.query());
            span.set_tag(Tag::Operation, parsed.operation.as_str());
            if let Some(table) = &parsed.table {
                span.set_tag(Tag::Table, table);
            }
        }

        let store = info.value_store_mut();
        store.put(QUERY_SPAN_KEY, span);
        store.put(QUERY_STARTED_AT_KEY, Instant::now());
    }

    fn after_query(&self, info: &mut QueryExecutionInfo<'_>) {
        let Some(mut span) = info.value_store_mut().remove::<T::Span>(QUERY_SPAN_KEY) else {
            self.report(LifecycleError::MissingQuerySpan {
                connection_id: info.connection_info().connection_id().to_string(),
            });
            return;
        };

        span.set_tag(Tag::ThreadId, info.thread_id());
        span.set_tag(Tag::ThreadName, info.thread_name());
        span.set_tag(Tag::Success, if info.is_success() { "true" } else { "false" });

        if let Some(started_at) = info
            .value_store_mut()
            .remove::<Instant>(QUERY_STARTED_AT_KEY)
        {
            let elapsed = started_at.elapsed();
            let duration_ms = elapsed.as_millis() as u64;
            span.set_tag(Tag::DurationMs, &duration_ms.to_string());
            if elapsed > self.config.slow_query_threshold {
                let threshold_ms = self.config.slow_query_threshold.as_millis() as u64;
                span.set_tag(Tag::SlowQuery, "true");
                span.warn(&format!(
                    "Slow query detected: {}ms (threshold {}ms)",
                    duration_ms, threshold_ms
                ));
            }
        }

        match info.thrown() {
            Some(thrown) => {
                record_outcome(&mut span, Some(&thrown.to_string()));
            }
            None => {
                if self.config.record_row_counts {
                    span.set_tag(
                        Tag::MappedResultCount,
                        &info.current_result_count().to_string(),
                    );
                }
                record_outcome(&mut span, None);
            }
        }
        span.finish();
    }

    fn before_begin_transaction(&self, info: &mut MethodExecutionInfo<'_>) {
        let Some(connection) = info.connection_info_mut() else {
            self.missing_connection_info(Method::BeginTransaction);
            return;
        };

        let span = self.tracer.start_span(SpanName::Transaction);
        connection
            .value_store_mut()
            .remove::<Method>(TRANSACTION_SPAN_ENDED_KEY);
        if let Some(mut previous) = connection.value_store_mut().put(TRANSACTION_SPAN_KEY, span) {
            previous.log("Transaction superseded");
            previous.set_tag(Tag::ConnectionId, connection.connection_id());
            previous.finish();
        }
    }

    fn after_begin_transaction(&self, info: &mut MethodExecutionInfo<'_>) {
        let Some(thrown) = info.thrown().map(|e| e.to_string()) else {
            return;
        };
        let Some(connection) = info.connection_info_mut() else {
            self.missing_connection_info(Method::BeginTransaction);
            return;
        };

        if let Some(mut span) = connection
            .value_store_mut()
            .remove::<T::Span>(TRANSACTION_SPAN_KEY)
        {
            span.set_tag(Tag::ConnectionId, connection.connection_id());
            record_outcome(&mut span, Some(&thrown));
            span.finish();
            connection
                .value_store_mut()
                .put(TRANSACTION_SPAN_ENDED_KEY, Method::BeginTransaction);
        }
    }

    fn after_commit_transaction(&self, info: &mut MethodExecutionInfo<'_>) {
        self.end_transaction(info, "Commit", None);
        self.note_on_connection(info, "Transaction commit", false);
    }

    fn after_rollback_transaction(&self, info: &mut MethodExecutionInfo<'_>) {
        self.end_transaction(info, "Rollback", None);
        self.note_on_connection(info, "Transaction rollback", true);
    }

    fn after_rollback_transaction_to_savepoint(&self, info: &mut MethodExecutionInfo<'_>) {
        let savepoint = info.args().first().cloned();
        if savepoint.is_none() {
            self.report(LifecycleError::MissingSavepointName {
                connection_id: info
                    .connection_info()
                    .map(|c| c.connection_id().to_string())
                    .unwrap_or_default(),
            });
        }
        self.end_transaction(info, "Rollback to savepoint", savepoint.as_deref());
        self.note_on_connection(info, "Transaction rollback to savepoint", true);
    }
}

impl<T: Tracer + fmt::Debug> fmt::Debug for LifecycleTracer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleTracer")
            .field("tracer", &self.tracer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
