use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{db::Pool, errors::Result};

/// One guest book entry. Entries are append-only.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Guest {
    pub firstname: String,
    pub lastname: String,
    pub phone: i64,
}

// =========================Schema=========================
/// Creates the `users` table when it does not exist yet. Deployments that
/// manage their schema elsewhere never call this.
pub async fn ensure_schema(pool: &Pool) -> Result<()> {
    pool.with_cursor(true, async |cur| {
        cur.execute(
            "CREATE TABLE IF NOT EXISTS users (
        firstname TEXT NOT NULL,
        lastname TEXT NOT NULL,
        phone INTEGER NOT NULL
        )",
            (),
        )
        .await?;
        Ok(())
    })
    .await?;
    info!("users table ready");
    Ok(())
}

// =========================Repository=========================
pub async fn add_guest(pool: &Pool, first: &str, last: &str, phone: i64) -> Result<()> {
    pool.with_cursor(true, async |cur| {
        cur.execute(
            "INSERT INTO users (firstname, lastname, phone) VALUES (?1, ?2, ?3)",
            (first, last, phone),
        )
        .await?;
        Ok(())
    })
    .await?;
    debug!(first, last, "guest added");
    Ok(())
}

/// Every guest, in whatever order the database returns them.
pub async fn list_guests(pool: &Pool) -> Result<Vec<Guest>> {
    pool.with_cursor(false, async |cur| {
        cur.fetch_all::<Guest>("SELECT firstname, lastname, phone FROM users", ())
            .await
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_pool;

    fn guest(first: &str, last: &str, phone: i64) -> Guest {
        Guest {
            firstname: first.into(),
            lastname: last.into(),
            phone,
        }
    }

    #[tokio::test]
    async fn empty_table_lists_nothing() {
        let (pool, _dir) = temp_pool(1, 4).await;
        assert!(list_guests(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn added_guest_is_listed() {
        let (pool, _dir) = temp_pool(1, 4).await;
        add_guest(&pool, "Ada", "Lovelace", 5551234).await.unwrap();
        add_guest(&pool, "Ada", "Lovelace", 5551234).await.unwrap();
        add_guest(&pool, "Grace", "Hopper", 42).await.unwrap();

        let guests = list_guests(&pool).await.unwrap();
        assert_eq!(guests.len(), 3);
        assert!(guests.contains(&guest("Grace", "Hopper", 42)));
        let ada = guest("Ada", "Lovelace", 5551234);
        assert_eq!(guests.iter().filter(|g| **g == ada).count(), 2);
    }

    #[tokio::test]
    async fn many_calls_do_not_exhaust_the_pool() {
        let (pool, _dir) = temp_pool(1, 3).await;
        for i in 0..(pool.max_size() as i64 * 4) {
            add_guest(&pool, "Loop", "Guest", i).await.unwrap();
            list_guests(&pool).await.unwrap();
        }
        assert_eq!(pool.available(), pool.max_size());
        assert_eq!(list_guests(&pool).await.unwrap().len(), 12);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_adds_are_all_kept() {
        let (pool, _dir) = temp_pool(1, 4).await;
        let first = {
            let pool = pool.clone();
            tokio::spawn(async move { add_guest(&pool, "Ada", "Lovelace", 1).await })
        };
        let second = {
            let pool = pool.clone();
            tokio::spawn(async move { add_guest(&pool, "Grace", "Hopper", 2).await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let mut guests = list_guests(&pool).await.unwrap();
        guests.sort_by_key(|g| g.phone);
        assert_eq!(
            guests,
            vec![guest("Ada", "Lovelace", 1), guest("Grace", "Hopper", 2)]
        );
    }
}
