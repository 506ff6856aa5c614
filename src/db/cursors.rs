//! Device sync cursor database operations

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{from_micros, parse_id, to_micros};
use crate::error::Result;

/// Last point in server time a device synchronized up to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceCursor {
    #[serde(skip)]
    pub owner_id: Uuid,
    pub device_id: String,
    pub last_sync_time: DateTime<Utc>,
}

/// Cursor repository over a single connection or open transaction
pub struct CursorRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> CursorRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Move the device's cursor to `now` and return the value it replaced.
    ///
    /// `None` means the device never synced before. The stored cursor never
    /// moves backwards even if `now` does.
    pub async fn advance(
        &mut self,
        owner_id: Uuid,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let (previous,): (Option<i64>,) = sqlx::query_as(
            r#"
            INSERT INTO device_sync_cursors (owner_id, device_id, last_sync_time, previous_sync_time, created_at)
            VALUES (?, ?, ?, NULL, ?)
            ON CONFLICT(owner_id, device_id) DO UPDATE SET
                previous_sync_time = device_sync_cursors.last_sync_time,
                last_sync_time = MAX(excluded.last_sync_time, device_sync_cursors.last_sync_time)
            RETURNING previous_sync_time
            "#,
        )
        .bind(owner_id.to_string())
        .bind(device_id)
        .bind(to_micros(now))
        .bind(to_micros(now))
        .fetch_one(&mut *self.conn)
        .await?;

        previous.map(from_micros).transpose()
    }

    /// All cursors of an owner, most recent first
    pub async fn for_owner(&mut self, owner_id: Uuid) -> Result<Vec<DeviceCursor>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT owner_id, device_id, last_sync_time
            FROM device_sync_cursors
            WHERE owner_id = ?
            ORDER BY last_sync_time DESC, device_id ASC
            "#,
        )
        .bind(owner_id.to_string())
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter()
            .map(|(owner_id, device_id, last_sync_time)| {
                Ok(DeviceCursor {
                    owner_id: parse_id(&owner_id)?,
                    device_id,
                    last_sync_time: from_micros(last_sync_time)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{server_now, test_pool};
    use chrono::Duration;

    #[tokio::test]
    async fn test_first_advance_has_no_previous() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = CursorRepository::new(&mut conn);

        let owner = Uuid::new_v4();
        let t1 = server_now();
        assert_eq!(repo.advance(owner, "phone", t1).await.unwrap(), None);

        let t2 = t1 + Duration::seconds(5);
        assert_eq!(repo.advance(owner, "phone", t2).await.unwrap(), Some(t1));
        assert_eq!(repo.advance(owner, "phone", t2).await.unwrap(), Some(t2));
    }

    #[tokio::test]
    async fn test_cursor_never_moves_backwards() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = CursorRepository::new(&mut conn);

        let owner = Uuid::new_v4();
        let late = server_now();
        repo.advance(owner, "desktop", late).await.unwrap();
        repo.advance(owner, "desktop", late - Duration::seconds(30))
            .await
            .unwrap();

        let cursors = repo.for_owner(owner).await.unwrap();
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors[0].last_sync_time, late);
    }

    #[tokio::test]
    async fn test_one_row_per_device() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = CursorRepository::new(&mut conn);

        let owner = Uuid::new_v4();
        let now = server_now();
        repo.advance(owner, "phone", now).await.unwrap();
        repo.advance(owner, "web", now + Duration::seconds(1)).await.unwrap();
        repo.advance(owner, "phone", now + Duration::seconds(2)).await.unwrap();
        repo.advance(Uuid::new_v4(), "phone", now).await.unwrap();

        let cursors = repo.for_owner(owner).await.unwrap();
        let devices: Vec<_> = cursors.iter().map(|c| c.device_id.as_str()).collect();
        assert_eq!(devices, vec!["phone", "web"]);
    }
}
