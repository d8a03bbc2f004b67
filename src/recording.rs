//! In-memory tracer backend that keeps every span for later inspection.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::span::{SpanName, Tag, TraceSpan, Tracer};

/// Snapshot of a span captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSpan {
    pub name: SpanName,
    pub tags: BTreeMap<Tag, String>,
    pub logs: Vec<String>,
    pub baggage: BTreeMap<String, String>,
}

impl RecordedSpan {
    fn new(name: SpanName) -> Self {
        Self {
            name,
            tags: BTreeMap::new(),
            logs: Vec::new(),
            baggage: BTreeMap::new(),
        }
    }

    /// Value recorded for `tag`, if any.
    pub fn tag(&self, tag: Tag) -> Option<&str> {
        self.tags.get(&tag).map(String::as_str)
    }

    pub fn baggage_item(&self, key: &str) -> Option<&str> {
        self.baggage.get(key).map(String::as_str)
    }

    pub fn has_log(&self, message: &str) -> bool {
        self.logs.iter().any(|log| log == message)
    }
}

#[derive(Debug, Default)]
struct Recorded {
    started: usize,
    finished: Vec<RecordedSpan>,
    abandoned: Vec<RecordedSpan>,
}

/// A [`Tracer`] that records spans in memory.
///
/// Clones share the same recording. Spans dropped without `finish` are kept
/// separately as abandoned.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spans started so far, finished or not.
    pub fn started_count(&self) -> usize {
        self.lock().started
    }

    /// All finished spans, in finishing order.
    pub fn finished_spans(&self) -> Vec<RecordedSpan> {
        self.lock().finished.clone()
    }

    /// Finished spans with the given name, in finishing order.
    pub fn finished_named(&self, name: SpanName) -> Vec<RecordedSpan> {
        self.lock()
            .finished
            .iter()
            .filter(|span| span.name == name)
            .cloned()
            .collect()
    }

    /// Spans dropped without being finished. Empty when nothing leaked.
    pub fn abandoned_spans(&self) -> Vec<RecordedSpan> {
        self.lock().abandoned.clone()
    }

    /// Spans started but neither finished nor dropped yet.
    pub fn open_count(&self) -> usize {
        let recorded = self.lock();
        recorded.started - recorded.finished.len() - recorded.abandoned.len()
    }
}

impl Tracer for RecordingTracer {
    type Span = RecordingSpan;

    fn start_span(&self, name: SpanName) -> RecordingSpan {
        self.lock().started += 1;
        RecordingSpan {
            data: Some(RecordedSpan::new(name)),
            recorded: self.recorded.clone(),
        }
    }
}

/// Open span produced by [`RecordingTracer`].
#[derive(Debug)]
pub struct RecordingSpan {
    data: Option<RecordedSpan>,
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingSpan {
    fn data_mut(&mut self) -> Option<&mut RecordedSpan> {
        self.data.as_mut()
    }
}

impl TraceSpan for RecordingSpan {
    fn set_tag(&mut self, tag: Tag, value: &str) {
        if let Some(data) = self.data_mut() {
            data.tags.insert(tag, value.to_string());
        }
    }

    fn log(&mut self, message: &str) {
        if let Some(data) = self.data_mut() {
            data.logs.push(message.to_string());
        }
    }

    fn set_baggage_item(&mut self, key: &str, value: &str) {
        if let Some(data) = self.data_mut() {
            data.baggage.insert(key.to_string(), value.to_string());
        }
    }

    fn finish(mut self) {
        if let Some(data) = self.data.take() {
            self.recorded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .finished
                .push(data);
        }
    }
}

impl Drop for RecordingSpan {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.recorded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .abandoned
                .push(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_records_span() {
        let tracer = RecordingTracer::new();
        let mut span = tracer.start_span(SpanName::Connection);
        span.set_tag(Tag::ConnectionId, "42");
        span.log("Connection created");
        assert_eq!(tracer.open_count(), 1);

        span.finish();

        let finished = tracer.finished_named(SpanName::Connection);
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].tag(Tag::ConnectionId), Some("42"));
        assert!(finished[0].has_log("Connection created"));
        assert_eq!(tracer.open_count(), 0);
        assert!(tracer.abandoned_spans().is_empty());
    }

    #[test]
    fn test_dropped_span_is_abandoned() {
        let tracer = RecordingTracer::new();
        {
            let mut span = tracer.start_span(SpanName::Query);
            span.set_baggage_item("exception", "boom");
        }

        assert!(tracer.finished_spans().is_empty());
        let abandoned = tracer.abandoned_spans();
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].baggage_item("exception"), Some("boom"));
    }

    #[test]
    fn test_clones_share_recording() {
        let tracer = RecordingTracer::new();
        let clone = tracer.clone();
        clone.start_span(SpanName::Transaction).finish();
        assert_eq!(tracer.started_count(), 1);
        assert_eq!(tracer.finished_spans().len(), 1);
    }
}
