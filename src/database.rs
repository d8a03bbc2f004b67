//! SeaORM-backed connection factory.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, QueryResult, Statement,
};

use crate::config::TracingConfig;
use crate::proxy::{Connection, ConnectionFactory, ProxyConnectionFactory};
use crate::span::TracingBackend;
use crate::tracer::LifecycleTracer;

static SAVEPOINT_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

fn check_savepoint_name(name: &str) -> Result<(), DbErr> {
    if SAVEPOINT_NAME.is_match(name) {
        Ok(())
    } else {
        Err(DbErr::Custom(format!("invalid savepoint name: {:?}", name)))
    }
}

/// Opens one physical SeaORM connection per [`ConnectionFactory::create`] call.
///
/// The pool size of the given options is forced to one, so every statement of
/// a created connection (including `BEGIN`/`COMMIT`) runs on the same session.
/// Pool the resulting [`ProxyConnection`](crate::ProxyConnection)s with any
/// off-the-shelf pool.
#[derive(Debug, Clone)]
pub struct SeaOrmConnectionFactory {
    options: ConnectOptions,
}

impl SeaOrmConnectionFactory {
    /// Factory connecting with `options`.
    pub fn new(options: impl Into<ConnectOptions>) -> Self {
        Self {
            options: options.into(),
        }
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }
}

#[async_trait]
impl ConnectionFactory for SeaOrmConnectionFactory {
    type Connection = SeaOrmConnection;

    async fn create(&self) -> Result<SeaOrmConnection, DbErr> {
        let mut options = self.options.clone();
        options.max_connections(1).min_connections(1);
        let inner = Database::connect(options).await?;
        Ok(SeaOrmConnection { inner: Some(inner) })
    }
}

/// A single-session SeaORM connection.
#[derive(Debug)]
pub struct SeaOrmConnection {
    inner: Option<DatabaseConnection>,
}

impl SeaOrmConnection {
    fn connection(&self) -> Result<&DatabaseConnection, DbErr> {
        self.inner
            .as_ref()
            .ok_or_else(|| DbErr::Custom("connection already closed".to_string()))
    }

    async fn run(&self, sql: &str) -> Result<u64, DbErr> {
        let result = self.connection()?.execute_unprepared(sql).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Connection for SeaOrmConnection {
    type Row = QueryResult;

    async fn begin_transaction(&mut self) -> Result<(), DbErr> {
        self.run("BEGIN").await.map(|_| ())
    }

    async fn commit_transaction(&mut self) -> Result<(), DbErr> {
        self.run("COMMIT").await.map(|_| ())
    }

    async fn rollback_transaction(&mut self) -> Result<(), DbErr> {
        self.run("ROLLBACK").await.map(|_| ())
    }

    async fn create_savepoint(&mut self, name: &str) -> Result<(), DbErr> {
        check_savepoint_name(name)?;
        self.run(&format!("SAVEPOINT {}", name)).await.map(|_| ())
    }

    async fn rollback_transaction_to_savepoint(&mut self, name: &str) -> Result<(), DbErr> {
        check_savepoint_name(name)?;
        self.run(&format!("ROLLBACK TO SAVEPOINT {}", name))
            .await
            .map(|_| ())
    }

    async fn execute(&mut self, sql: &str) -> Result<Vec<QueryResult>, DbErr> {
        let connection = self.connection()?;
        let stmt = Statement::from_string(connection.get_database_backend(), sql);
        connection.query_all(stmt).await
    }

    async fn execute_batch(&mut self, statements: &[String]) -> Result<Vec<u64>, DbErr> {
        let mut affected = Vec::with_capacity(statements.len());
        for sql in statements {
            affected.push(self.run(sql).await?);
        }
        Ok(affected)
    }

    async fn close(&mut self) -> Result<(), DbErr> {
        match self.inner.take() {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }
}

/// Extension trait for building a traced factory straight from connect options.
pub trait TracingExt {
    /// Wrap with a [`LifecycleTracer`] on the `tracing` backend.
    fn with_lifecycle_tracing(self) -> ProxyConnectionFactory<SeaOrmConnectionFactory>;

    /// Same, with custom tracing configuration.
    fn with_lifecycle_tracing_config(
        self,
        config: TracingConfig,
    ) -> ProxyConnectionFactory<SeaOrmConnectionFactory>;
}

impl TracingExt for ConnectOptions {
    fn with_lifecycle_tracing(self) -> ProxyConnectionFactory<SeaOrmConnectionFactory> {
        self.with_lifecycle_tracing_config(TracingConfig::default())
    }

    fn with_lifecycle_tracing_config(
        self,
        config: TracingConfig,
    ) -> ProxyConnectionFactory<SeaOrmConnectionFactory> {
        ProxyConnectionFactory::builder(SeaOrmConnectionFactory::new(self))
            .listener(LifecycleTracer::with_config(TracingBackend::new(), config))
            .build()
    }
}
