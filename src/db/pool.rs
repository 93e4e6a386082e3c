//! Bounded pool of libsql connections.
//!
//! Checkout is gated by a semaphore holding `max_size` permits, so `acquire`
//! waits while every connection is out. Connections go back to the idle list
//! when their [`PooledConnection`] guard is dropped.

use std::{
    ops::Deref,
    sync::{Arc, Mutex},
};

use libsql::{Builder, Connection, Database};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, trace, warn};

use crate::{
    config::DatabaseUrl,
    errors::{Error, Result},
};

const BUSY_TIMEOUT_MS: u32 = 5_000;

#[derive(Clone)]
pub struct Pool {
    inner: Arc<Inner>,
}

struct Inner {
    db: Database,
    local: bool,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    max_size: usize,
}

impl Pool {
    /// Opens the database and `min_size` connections up front. Any failure
    /// here is fatal for the caller.
    pub async fn initialize(url: &DatabaseUrl, min_size: usize, max_size: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(Error::InvalidConfig {
                key: "DATABASE_POOL_MAX",
                reason: "must be at least 1".into(),
            });
        }
        if min_size > max_size {
            return Err(Error::InvalidConfig {
                key: "DATABASE_POOL_MIN",
                reason: format!("{min_size} is larger than DATABASE_POOL_MAX ({max_size})"),
            });
        }

        let (db, local) = match url {
            DatabaseUrl::Local(path) => (Builder::new_local(path).build().await?, true),
            DatabaseUrl::Remote { url, auth_token } => (
                Builder::new_remote(url.clone(), auth_token.clone())
                    .build()
                    .await?,
                false,
            ),
        };

        let inner = Arc::new(Inner {
            db,
            local,
            idle: Mutex::new(Vec::with_capacity(min_size)),
            permits: Arc::new(Semaphore::new(max_size)),
            max_size,
        });

        for _ in 0..min_size {
            let conn = inner.open().await?;
            conn.query("SELECT 1", ()).await?.next().await?;
            inner.push_idle(conn);
        }

        info!(min_size, max_size, local, "Database connection pool created");
        Ok(Self { inner })
    }

    /// Waits for a free slot, then hands out an idle connection or opens a
    /// new one.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::PoolClosed)?;

        let reused = self.inner.pop_idle();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                debug!("opening new pooled connection");
                self.inner.open().await?
            }
        };
        trace!(available = self.available(), "connection acquired");

        Ok(PooledConnection {
            conn: Some(conn),
            pool: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Returns a connection to the pool. Same as dropping the guard.
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// Slots that can be acquired without waiting.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Open connections currently parked in the pool.
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }
}

impl Inner {
    async fn open(&self) -> Result<Connection> {
        let conn = self.db.connect()?;
        if self.local {
            // Lets concurrent writers wait on the file lock instead of failing.
            conn.query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), ())
                .await?
                .next()
                .await?;
        }
        Ok(conn)
    }

    fn pop_idle(&self) -> Option<Connection> {
        self.idle.lock().ok().and_then(|mut idle| idle.pop())
    }

    fn push_idle(&self, conn: Connection) {
        match self.idle.lock() {
            Ok(mut idle) => idle.push(conn),
            Err(_) => warn!("idle list poisoned, dropping connection"),
        }
    }
}

/// A checked-out connection. Dropping it puts the connection back.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<Inner>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("connection is only taken on drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if conn.is_autocommit() {
            self.pool.push_idle(conn);
            trace!("connection released");
        } else {
            warn!("discarding connection left inside a transaction");
        }
        // The permit is released after this, once the fields drop.
    }
}
