//! Tracer backend capability and the default `tracing`-based backend.

use std::fmt;

use tracing::{field, Span};

/// Baggage key under which the description of a failed operation is attached.
pub const EXCEPTION_BAGGAGE_KEY: &str = "exception";

/// The kinds of spans produced by the lifecycle tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpanName {
    Connection,
    Query,
    Transaction,
}

impl SpanName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanName::Connection => "db.connection",
            SpanName::Query => "db.query",
            SpanName::Transaction => "db.transaction",
        }
    }
}

impl fmt::Display for SpanName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Span attributes recorded by the lifecycle tracer.
///
/// Keys follow OpenTelemetry database conventions where one exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    ConnectionId,
    ThreadIdOnCreate,
    ThreadNameOnCreate,
    ThreadIdOnClose,
    ThreadNameOnClose,
    ThreadId,
    ThreadName,
    Queries,
    ExecutionType,
    BatchSize,
    Success,
    MappedResultCount,
    Savepoint,
    TransactionCount,
    CommitCount,
    RollbackCount,
    Operation,
    Table,
    DatabaseName,
    DurationMs,
    SlowQuery,
    StatusCode,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::ConnectionId => "db.connection.id",
            Tag::ThreadIdOnCreate => "thread.id.on_create",
            Tag::ThreadNameOnCreate => "thread.name.on_create",
            Tag::ThreadIdOnClose => "thread.id.on_close",
            Tag::ThreadNameOnClose => "thread.name.on_close",
            Tag::ThreadId => "thread.id",
            Tag::ThreadName => "thread.name",
            Tag::Queries => "db.statement",
            Tag::ExecutionType => "db.execution_type",
            Tag::BatchSize => "db.batch.size",
            Tag::Success => "db.success",
            Tag::MappedResultCount => "db.mapped_result_count",
            Tag::Savepoint => "db.transaction.savepoint",
            Tag::TransactionCount => "db.connection.transaction_count",
            Tag::CommitCount => "db.connection.commit_count",
            Tag::RollbackCount => "db.connection.rollback_count",
            Tag::Operation => "db.operation",
            Tag::Table => "db.sql.table",
            Tag::DatabaseName => "db.name",
            Tag::DurationMs => "db.duration_ms",
            Tag::SlowQuery => "slow_query",
            Tag::StatusCode => "otel.status_code",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that can start spans.
pub trait Tracer: Send + Sync + 'static {
    type Span: TraceSpan;

    fn start_span(&self, name: SpanName) -> Self::Span;
}

/// An open span.
///
/// `finish` consumes the span, so a span value can be finished at most once.
pub trait TraceSpan: Send + Sync + 'static {
    /// Record a tag, overwriting any earlier value.
    fn set_tag(&mut self, tag: Tag, value: &str);

    /// Attach a timestamped log entry.
    fn log(&mut self, message: &str);

    /// A log entry that needs attention. Backends without levels treat it as
    /// a plain [`log`](TraceSpan::log).
    fn warn(&mut self, message: &str) {
        self.log(message);
    }

    /// Attach a key/value item. The `exception` key marks the span as failed.
    fn set_baggage_item(&mut self, key: &str, value: &str);

    fn finish(self);
}

/// Backend that maps lifecycle spans onto `tracing` spans.
///
/// Spans are created as children of the current `tracing` context, so they nest
/// under HTTP request spans and export through whatever subscriber is installed
/// (for example `tracing-opentelemetry`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingBackend;

impl TracingBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Tracer for TracingBackend {
    type Span = TracingSpan;

    fn start_span(&self, name: SpanName) -> TracingSpan {
        let span = tracing::info_span!(
            "db.lifecycle",
            otel.name = %name,
            otel.kind = "client",
            db.connection.id = field::Empty,
            thread.id.on_create = field::Empty,
            thread.name.on_create = field::Empty,
            thread.id.on_close = field::Empty,
            thread.name.on_close = field::Empty,
            thread.id = field::Empty,
            thread.name = field::Empty,
            db.statement = field::Empty,
            db.execution_type = field::Empty,
            db.batch.size = field::Empty,
            db.success = field::Empty,
            db.mapped_result_count = field::Empty,
            db.transaction.savepoint = field::Empty,
            db.connection.transaction_count = field::Empty,
            db.connection.commit_count = field::Empty,
            db.connection.rollback_count = field::Empty,
            db.operation = field::Empty,
            db.sql.table = field::Empty,
            db.name = field::Empty,
            db.duration_ms = field::Empty,
            slow_query = field::Empty,
            otel.status_code = field::Empty,
            error.message = field::Empty,
        );

        TracingSpan { span }
    }
}

/// A lifecycle span backed by a `tracing::Span`. Finishing closes it.
#[derive(Debug, Clone)]
pub struct TracingSpan {
    span: Span,
}

impl TracingSpan {
    /// The underlying `tracing` span, for instrumenting work under it.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl TraceSpan for TracingSpan {
    fn set_tag(&mut self, tag: Tag, value: &str) {
        self.span.record(tag.as_str(), value);
    }

    fn log(&mut self, message: &str) {
        tracing::info!(parent: &self.span, "{}", message);
    }

    fn warn(&mut self, message: &str) {
        tracing::warn!(parent: &self.span, "{}", message);
    }

    fn set_baggage_item(&mut self, key: &str, value: &str) {
        if key == EXCEPTION_BAGGAGE_KEY {
            self.span.record("otel.status_code", "ERROR");
            self.span.record("error.message", value);
            tracing::error!(parent: &self.span, exception = %value, "Database operation failed");
        } else {
            tracing::debug!(parent: &self.span, baggage.key = %key, baggage.value = %value, "Baggage item");
        }
    }

    fn finish(self) {
        tracing::trace!(parent: &self.span, "Span finished");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing::subscriber::with_default;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::registry::LookupSpan;

    use super::*;

    /// Captures the level and parent span name of every event.
    #[derive(Clone, Default)]
    struct EventCapture(Arc<Mutex<Vec<(Level, Option<String>)>>>);

    impl<S> Layer<S> for EventCapture
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
            let parent = ctx.event_span(event).map(|span| span.name().to_string());
            self.0
                .lock()
                .unwrap()
                .push((*event.metadata().level(), parent));
        }
    }

    #[test]
    fn test_tag_keys_are_unique() {
        let tags = [
            Tag::ConnectionId,
            Tag::ThreadIdOnCreate,
            Tag::ThreadNameOnCreate,
            Tag::ThreadIdOnClose,
            Tag::ThreadNameOnClose,
            Tag::ThreadId,
            Tag::ThreadName,
            Tag::Queries,
            Tag::ExecutionType,
            Tag::BatchSize,
            Tag::Success,
            Tag::MappedResultCount,
            Tag::Savepoint,
            Tag::TransactionCount,
            Tag::CommitCount,
            Tag::RollbackCount,
            Tag::Operation,
            Tag::Table,
            Tag::DatabaseName,
            Tag::DurationMs,
            Tag::SlowQuery,
            Tag::StatusCode,
        ];
        let keys: std::collections::HashSet<_> = tags.iter().map(Tag::as_str).collect();
        assert_eq!(keys.len(), tags.len());
    }

    #[test]
    fn test_tracing_backend_without_subscriber() {
        // Spans are disabled without a subscriber; every call must still be safe.
        let mut span = TracingBackend::new().start_span(SpanName::Query);
        span.set_tag(Tag::ConnectionId, "1");
        span.log("Connection created");
        span.set_baggage_item(EXCEPTION_BAGGAGE_KEY, "boom");
        span.finish();
    }

    #[test]
    fn test_warn_is_emitted_under_the_span() {
        let capture = EventCapture::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());

        with_default(subscriber, || {
            let mut span = TracingBackend::new().start_span(SpanName::Query);
            span.warn("Slow query detected");
            span.finish();
        });

        let events = capture.0.lock().unwrap();
        let warning = events
            .iter()
            .find(|(level, _)| *level == Level::WARN)
            .expect("warning emitted");
        assert_eq!(warning.1.as_deref(), Some("db.lifecycle"));
    }

    #[test]
    fn test_span_names() {
        assert_eq!(SpanName::Connection.to_string(), "db.connection");
        assert_eq!(SpanName::Query.as_str(), "db.query");
        assert_eq!(SpanName::Transaction.as_str(), "db.transaction");
    }
}
