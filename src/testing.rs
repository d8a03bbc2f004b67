//! In-memory connections for exercising the proxy without a database.

use async_trait::async_trait;
use sea_orm::DbErr;

use crate::proxy::{Connection, ConnectionFactory};

#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryFactory {
    rows: usize,
    fail_create: bool,
    fail_close: bool,
    fail_commit: bool,
    fail_rollback: bool,
}

impl MemoryFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Rows returned by every successful statement.
    pub(crate) fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    pub(crate) fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub(crate) fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub(crate) fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub(crate) fn failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }
}

#[async_trait]
impl ConnectionFactory for MemoryFactory {
    type Connection = MemoryConnection;

    async fn create(&self) -> Result<MemoryConnection, DbErr> {
        if self.fail_create {
            return Err(DbErr::Custom("connection refused".to_string()));
        }
        Ok(MemoryConnection {
            rows: self.rows,
            fail_close: self.fail_close,
            fail_commit: self.fail_commit,
            fail_rollback: self.fail_rollback,
            in_transaction: false,
            savepoints: Vec::new(),
            closed: false,
        })
    }
}

/// Statements starting with `FAIL` are rejected.
#[derive(Debug)]
pub(crate) struct MemoryConnection {
    rows: usize,
    fail_close: bool,
    fail_commit: bool,
    fail_rollback: bool,
    in_transaction: bool,
    savepoints: Vec<String>,
    closed: bool,
}

impl MemoryConnection {
    fn check_open(&self) -> Result<(), DbErr> {
        if self.closed {
            return Err(DbErr::Custom("connection closed".to_string()));
        }
        Ok(())
    }

    fn check_transaction(&self) -> Result<(), DbErr> {
        self.check_open()?;
        if !self.in_transaction {
            return Err(DbErr::Custom("no transaction in progress".to_string()));
        }
        Ok(())
    }

    fn run(&self, sql: &str) -> Result<(), DbErr> {
        self.check_open()?;
        if sql.starts_with("FAIL") {
            return Err(DbErr::Custom(format!("rejected: {}", sql)));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    type Row = usize;

    async fn begin_transaction(&mut self) -> Result<(), DbErr> {
        self.check_open()?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<(), DbErr> {
        self.check_transaction()?;
        if self.fail_commit {
            return Err(DbErr::Custom("serialization failure".to_string()));
        }
        self.in_transaction = false;
        self.savepoints.clear();
        Ok(())
    }

    async fn rollback_transaction(&mut self) -> Result<(), DbErr> {
        self.check_transaction()?;
        if self.fail_rollback {
            return Err(DbErr::Custom("rollback interrupted".to_string()));
        }
        self.in_transaction = false;
        self.savepoints.clear();
        Ok(())
    }

    async fn create_savepoint(&mut self, name: &str) -> Result<(), DbErr> {
        self.check_transaction()?;
        self.savepoints.push(name.to_string());
        Ok(())
    }

    async fn rollback_transaction_to_savepoint(&mut self, name: &str) -> Result<(), DbErr> {
        self.check_transaction()?;
        let Some(position) = self.savepoints.iter().position(|sp| sp == name) else {
            return Err(DbErr::Custom(format!("savepoint {} does not exist", name)));
        };
        self.savepoints.truncate(position + 1);
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<Vec<usize>, DbErr> {
        self.run(sql)?;
        Ok((0..self.rows).collect())
    }

    async fn execute_batch(&mut self, statements: &[String]) -> Result<Vec<u64>, DbErr> {
        statements
            .iter()
            .map(|sql| self.run(sql).map(|_| 1))
            .collect()
    }

    async fn close(&mut self) -> Result<(), DbErr> {
        if self.fail_close {
            return Err(DbErr::Custom("socket reset".to_string()));
        }
        self.closed = true;
        self.in_transaction = false;
        Ok(())
    }
}
