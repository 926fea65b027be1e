use crate::driver::{Pool, Row, StatementResult};
use crate::error::{RelmapError, Result};
use serde_json::Value;
use std::sync::Arc;

/// Executes compiled SQL templates against pooled connections.
///
/// All reads flow through [`query`](Executor::query) and all mutation
/// through [`execute`](Executor::execute). Each call borrows one connection
/// for its duration; the connection returns to the pool on every exit path.
/// Cheap to clone.
#[derive(Clone)]
pub struct Executor {
    pool: Arc<Pool>,
}

impl Executor {
    pub fn new(pool: Pool) -> Executor {
        Executor {
            pool: Arc::new(pool),
        }
    }

    /// Run a read-only statement with bound `args`, returning at most
    /// `limit` rows when given, else all rows.
    pub async fn query(&self, sql: &str, args: &[Value], limit: Option<usize>) -> Result<Vec<Row>> {
        log::debug!("SQL: {sql}");
        let mut conn = self.pool.get().await?;
        match conn.execute_statement(sql, args).await? {
            StatementResult::Rows(mut rows) => {
                if let Some(limit) = limit {
                    rows.truncate(limit);
                }
                log::debug!("rows returned: {}", rows.len());
                Ok(rows)
            }
            StatementResult::Affected(_) => Err(RelmapError::Statement(
                "statement did not produce a result set".to_string(),
            )),
        }
    }

    /// Run a mutating statement with bound `args`, returning the
    /// driver-reported affected-row count.
    ///
    /// With `autocommit` the connection's ambient autocommit applies.
    /// Otherwise the statement runs inside an explicit transaction:
    /// begin, execute, commit on success; on any failure, rollback and
    /// propagate the original error.
    pub async fn execute(&self, sql: &str, args: &[Value], autocommit: bool) -> Result<u64> {
        log::debug!("SQL: {sql}");
        let mut conn = self.pool.get().await?;
        if !autocommit {
            conn.begin().await?;
        }

        let outcome = match conn.execute_statement(sql, args).await {
            Ok(StatementResult::Affected(affected)) => Ok(affected),
            Ok(StatementResult::Rows(_)) => Err(RelmapError::Statement(
                "statement produced a result set, expected an affected-row count".to_string(),
            )),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(affected) => {
                if !autocommit {
                    conn.commit().await?;
                }
                Ok(affected)
            }
            Err(e) => {
                if !autocommit {
                    if let Err(rollback_err) = conn.rollback().await {
                        log::warn!("rollback failed: {rollback_err}");
                    }
                }
                Err(e)
            }
        }
    }
}
