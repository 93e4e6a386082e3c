use futures::TryStreamExt;
use libsql::de::from_row;
use serde::de::DeserializeOwned;

use crate::errors::{Error, Result};

mod cursor;
mod pool;

pub use cursor::Cursor;
pub use pool::{Pool, PooledConnection};

/// Decodes a row stream into typed records, stopping at the first bad row.
pub async fn into_rows<T>(rows: libsql::Rows) -> Result<Vec<T>>
where
    T: DeserializeOwned,
{
    let items = rows
        .into_stream()
        .map_err(Error::from)
        .and_then(|r| async move { from_row::<T>(&r).map_err(Error::from) })
        .try_collect::<Vec<_>>()
        .await?;
    Ok(items)
}
