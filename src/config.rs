//! Configuration for lifecycle tracing.

use std::time::Duration;

/// Options controlling what the [`LifecycleTracer`](crate::LifecycleTracer) records.
///
/// # Example
///
/// ```rust
/// use sea_orm_lifecycle_tracing::TracingConfig;
/// use std::time::Duration;
///
/// let config = TracingConfig::default()
///     .with_statement_recording(false)
///     .with_slow_query_threshold(Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether query spans carry the comma-joined query text.
    /// Default: `true`
    pub record_statements: bool,

    /// Whether successful query spans carry the mapped result count.
    /// Default: `true`
    pub record_row_counts: bool,

    /// Queries slower than this are tagged `slow_query` and logged at WARN.
    /// Default: 500ms
    pub slow_query_threshold: Duration,

    /// Database name recorded on connection spans.
    /// Default: `None`
    pub database_name: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            record_statements: true,
            record_row_counts: true,
            slow_query_threshold: Duration::from_millis(500),
            database_name: None,
        }
    }
}

impl TracingConfig {
    /// Same as [`TracingConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable query text on query spans.
    ///
    /// **Security Warning**: query text may contain literals with sensitive data.
    pub fn with_statement_recording(mut self, enabled: bool) -> Self {
        self.record_statements = enabled;
        self
    }

    /// Enable or disable `db.mapped_result_count` on successful query spans.
    pub fn with_row_count_recording(mut self, enabled: bool) -> Self {
        self.record_row_counts = enabled;
        self
    }

    /// Queries running longer than `threshold` are tagged and logged at WARN.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    /// Set a database name to include in connection spans.
    ///
    /// Useful when your application connects to multiple databases.
    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = Some(name.into());
        self
    }

    /// Everything recorded, with an aggressive slow query threshold.
    pub fn development() -> Self {
        Self {
            slow_query_threshold: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// No query text, relaxed slow query threshold.
    pub fn production() -> Self {
        Self {
            record_statements: false,
            slow_query_threshold: Duration::from_secs(1),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::default()
            .with_statement_recording(false)
            .with_row_count_recording(false)
            .with_database_name("accounts");

        assert!(!config.record_statements);
        assert!(!config.record_row_counts);
        assert_eq!(config.database_name, Some("accounts".to_string()));
    }

    #[test]
    fn test_development_config() {
        let config = TracingConfig::development();
        assert!(config.record_statements);
        assert_eq!(config.slow_query_threshold, Duration::from_millis(100));
    }

    #[test]
    fn test_production_config() {
        let config = TracingConfig::production();
        assert!(!config.record_statements);
        assert!(config.record_row_counts);
    }
}
