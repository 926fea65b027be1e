pub mod sqlite;

use crate::error::{RelmapError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};

/// One result row: column name → value, in select-column order.
pub type Row = serde_json::Map<String, Value>;

/// What a statement produced: a result set for reads, an affected-row count
/// for writes and DDL.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementResult {
    Rows(Vec<Row>),
    Affected(u64),
}

/// A single database connection, borrowed from the pool for the duration of
/// one statement.
///
/// `execute_statement` receives SQL text with neutral `?` placeholders and
/// the arguments to bind. Adapters whose driver uses a different bind syntax
/// must translate the placeholders, never substitute argument values into
/// the SQL text.
#[async_trait]
pub trait Connection: Send {
    async fn execute_statement(&mut self, sql: &str, args: &[Value]) -> Result<StatementResult>;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// Opens connections for the pool.
#[async_trait]
pub trait Driver: Debug + Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn Connection>>;

    /// Upper bound on pooled connections, when the driver imposes one.
    fn max_connections(&self) -> Option<usize> {
        None
    }
}

#[derive(Debug)]
struct Manager {
    driver: Box<dyn Driver>,
}

impl deadpool::managed::Manager for Manager {
    type Type = Box<dyn Connection>;
    type Error = RelmapError;

    async fn create(&self) -> std::result::Result<Self::Type, Self::Error> {
        self.driver.connect().await
    }

    async fn recycle(
        &self,
        _obj: &mut Self::Type,
        _metrics: &deadpool::managed::Metrics,
    ) -> deadpool::managed::RecycleResult<Self::Error> {
        Ok(())
    }
}

/// A process-wide pool of driver connections. Connections are created
/// lazily, handed out by [`get`](Pool::get), and returned for reuse when the
/// [`PoolConnection`] drops.
pub struct Pool {
    inner: deadpool::managed::Pool<Manager>,
}

impl Pool {
    /// Create a connection pool over the given driver.
    pub fn new(driver: impl Driver) -> Result<Pool> {
        log::info!("creating database connection pool");
        let max_connections = driver.max_connections();
        let mut builder = deadpool::managed::Pool::builder(Manager {
            driver: Box::new(driver),
        })
        .runtime(deadpool::Runtime::Tokio1);

        if let Some(max_connections) = max_connections {
            builder = builder.max_size(max_connections);
        }

        let inner = builder
            .build()
            .map_err(|e| RelmapError::Pool(e.to_string()))?;
        Ok(Pool { inner })
    }

    /// Borrow a connection, waiting for one to free up if the pool is
    /// exhausted.
    pub async fn get(&self) -> Result<PoolConnection> {
        let inner = self
            .inner
            .get()
            .await
            .map_err(|e| RelmapError::Pool(e.to_string()))?;
        Ok(PoolConnection { inner })
    }
}

/// A connection checked out of the pool. Dropping it returns the connection
/// to the pool on every exit path.
pub struct PoolConnection {
    inner: deadpool::managed::Object<Manager>,
}

impl Deref for PoolConnection {
    type Target = Box<dyn Connection>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for PoolConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
