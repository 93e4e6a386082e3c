use libsql::{Connection, Rows, params::IntoParams};
use serde::de::DeserializeOwned;
use tracing::{trace, warn};

use super::{Pool, into_rows};
use crate::errors::Result;

/// Statement handle bound to one checked-out connection for the duration of
/// a [`Pool::with_cursor`] call.
pub struct Cursor<'c> {
    conn: &'c Connection,
}

impl<'c> Cursor<'c> {
    fn new(conn: &'c Connection) -> Self {
        trace!("cursor opened");
        Self { conn }
    }

    pub async fn execute(&self, sql: &str, params: impl IntoParams) -> Result<u64> {
        Ok(self.conn.execute(sql, params).await?)
    }

    pub async fn query(&self, sql: &str, params: impl IntoParams) -> Result<Rows> {
        Ok(self.conn.query(sql, params).await?)
    }

    /// Runs `sql` and decodes every returned row into `T`.
    pub async fn fetch_all<T>(&self, sql: &str, params: impl IntoParams) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let rows = self.query(sql, params).await?;
        into_rows(rows).await
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        trace!("cursor closed");
    }
}

impl Pool {
    /// Checks out a connection, hands `body` a cursor on it and releases
    /// everything on every exit path.
    ///
    /// With `commit` set the body runs in a transaction that is committed
    /// only if the body succeeds; otherwise it is rolled back. Without it,
    /// statements run in autocommit mode.
    pub async fn with_cursor<T, F>(&self, commit: bool, body: F) -> Result<T>
    where
        F: AsyncFnOnce(&Cursor<'_>) -> Result<T>,
    {
        let conn = self.acquire().await?;

        if !commit {
            let cursor = Cursor::new(&conn);
            return body(&cursor).await;
        }

        let tx = conn.transaction().await?;
        let outcome = {
            let cursor = Cursor::new(&tx);
            body(&cursor).await
        };
        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}
