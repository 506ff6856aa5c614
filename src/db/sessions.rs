//! Timer session database operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{from_micros, parse_id, placeholders, to_micros, RecordMeta, MAX_IDS_PER_STATEMENT};
use crate::error::{AppError, Result};

/// A completed timer interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    #[serde(rename = "user_id")]
    pub owner_id: Uuid,
    /// Soft reference; may point at a deleted or unknown project
    pub project_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub description: String,
    #[serde(rename = "device_id")]
    pub origin_device: String,
    #[serde(rename = "is_deleted")]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Session as received from a device or the single-record API
#[derive(Debug, Clone, Deserialize)]
pub struct SessionPayload {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "device_id")]
    pub origin_device: Option<String>,
    #[serde(default, rename = "is_deleted")]
    pub deleted: Option<bool>,
}

impl SessionPayload {
    pub fn validate(&self) -> Result<()> {
        if self.end_time < self.start_time {
            return Err(AppError::bad_request(format!(
                "Session end_time {} is before start_time {}",
                self.end_time.to_rfc3339(),
                self.start_time.to_rfc3339()
            )));
        }
        Ok(())
    }

    /// Client-supplied id, treating the nil UUID as absent
    pub fn client_id(&self) -> Option<Uuid> {
        self.id.filter(|id| !id.is_nil())
    }

    /// Project reference, treating the nil UUID as "no project"
    pub fn project_ref(&self) -> Option<Uuid> {
        self.project_id.filter(|id| !id.is_nil())
    }
}

/// A validated session write bound to its owner
#[derive(Debug, Clone)]
pub struct SessionWrite {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub project_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub description: String,
    pub origin_device: String,
    pub deleted: Option<bool>,
}

impl SessionWrite {
    pub fn from_payload(id: Uuid, owner_id: Uuid, device_id: &str, payload: &SessionPayload) -> Self {
        Self {
            id,
            owner_id,
            project_id: payload.project_ref(),
            start_time: payload.start_time,
            end_time: payload.end_time,
            description: payload.description.clone(),
            origin_device: payload
                .origin_device
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| device_id.to_string()),
            deleted: payload.deleted,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    owner_id: String,
    project_id: Option<String>,
    start_time: i64,
    end_time: i64,
    description: String,
    origin_device: String,
    is_deleted: bool,
    created_at: i64,
    updated_at: i64,
}

impl SessionRow {
    fn into_session(self) -> Result<Session> {
        Ok(Session {
            id: parse_id(&self.id)?,
            owner_id: parse_id(&self.owner_id)?,
            project_id: self.project_id.as_deref().map(parse_id).transpose()?,
            start_time: from_micros(self.start_time)?,
            end_time: from_micros(self.end_time)?,
            description: self.description,
            origin_device: self.origin_device,
            deleted: self.is_deleted,
            created_at: from_micros(self.created_at)?,
            updated_at: from_micros(self.updated_at)?,
        })
    }
}

const SESSION_COLUMNS: &str = "id, owner_id, project_id, start_time, end_time, description, \
     origin_device, is_deleted, created_at, updated_at";

/// Session repository over a single connection or open transaction
pub struct SessionRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SessionRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    pub async fn meta(&mut self, id: Uuid) -> Result<Option<RecordMeta>> {
        let row: Option<(String, String, bool)> = sqlx::query_as(
            "SELECT owner_id, origin_device, is_deleted FROM timer_sessions WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&mut *self.conn)
        .await?;

        row.map(|(owner_id, origin_device, deleted)| {
            Ok(RecordMeta {
                owner_id: parse_id(&owner_id)?,
                origin_device,
                deleted,
            })
        })
        .transpose()
    }

    pub async fn insert(&mut self, write: &SessionWrite, now: DateTime<Utc>) -> Result<Session> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            INSERT INTO timer_sessions (id, owner_id, project_id, start_time, end_time, description,
                                        origin_device, is_deleted, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(write.id.to_string())
        .bind(write.owner_id.to_string())
        .bind(write.project_id.map(|id| id.to_string()))
        .bind(to_micros(write.start_time))
        .bind(to_micros(write.end_time))
        .bind(&write.description)
        .bind(&write.origin_device)
        .bind(write.deleted.unwrap_or(false))
        .bind(to_micros(now))
        .bind(to_micros(now))
        .fetch_one(&mut *self.conn)
        .await?;

        row.into_session()
    }

    /// Overwrite every mutable field of an owned session.
    ///
    /// Returns `None` when no session with this id belongs to the owner.
    pub async fn overwrite(
        &mut self,
        write: &SessionWrite,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE timer_sessions
            SET project_id = ?,
                start_time = ?,
                end_time = ?,
                description = ?,
                origin_device = ?,
                is_deleted = COALESCE(?, is_deleted),
                updated_at = MAX(?, updated_at + 1)
            WHERE id = ? AND owner_id = ?
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(write.project_id.map(|id| id.to_string()))
        .bind(to_micros(write.start_time))
        .bind(to_micros(write.end_time))
        .bind(&write.description)
        .bind(&write.origin_device)
        .bind(write.deleted)
        .bind(to_micros(now))
        .bind(write.id.to_string())
        .bind(write.owner_id.to_string())
        .fetch_optional(&mut *self.conn)
        .await?;

        row.map(SessionRow::into_session).transpose()
    }

    pub async fn tombstone(
        &mut self,
        owner_id: Uuid,
        ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let mut buried = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_STATEMENT) {
            let query = format!(
                r#"
                UPDATE timer_sessions
                SET is_deleted = 1,
                    updated_at = MAX(?, updated_at + 1)
                WHERE owner_id = ? AND id IN ({})
                RETURNING id
                "#,
                placeholders(chunk.len())
            );

            let mut q = sqlx::query_as::<_, (String,)>(&query)
                .bind(to_micros(now))
                .bind(owner_id.to_string());
            for id in chunk {
                q = q.bind(id.to_string());
            }

            for (id,) in q.fetch_all(&mut *self.conn).await? {
                buried.push(parse_id(&id)?);
            }
        }
        Ok(buried)
    }

    pub async fn list_active(&mut self, owner_id: Uuid) -> Result<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {}
            FROM timer_sessions
            WHERE owner_id = ? AND is_deleted = 0
            ORDER BY start_time DESC
            "#,
            SESSION_COLUMNS
        ))
        .bind(owner_id.to_string())
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }

    pub async fn changed_since(
        &mut self,
        owner_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {}
            FROM timer_sessions
            WHERE owner_id = ? AND updated_at > ?
            ORDER BY updated_at ASC
            "#,
            SESSION_COLUMNS
        ))
        .bind(owner_id.to_string())
        .bind(since.map(to_micros).unwrap_or(i64::MIN))
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }
}
