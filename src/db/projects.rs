//! Project database operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{from_micros, parse_id, placeholders, to_micros, RecordMeta, MAX_IDS_PER_STATEMENT};
use crate::error::{AppError, Result};

const MAX_NAME_LEN: usize = 255;
const MAX_COLOR_LEN: usize = 50;

/// Project record as stored and as sent to devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    #[serde(rename = "user_id")]
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub color: String,
    #[serde(rename = "device_id")]
    pub origin_device: String,
    #[serde(rename = "is_deleted")]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Project as received from a device or the single-record API.
///
/// Owner and timestamps are never taken from the client, so they are not
/// part of the payload; unknown fields are ignored on deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectPayload {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub color: String,
    #[serde(default, rename = "device_id")]
    pub origin_device: Option<String>,
    #[serde(default, rename = "is_deleted")]
    pub deleted: Option<bool>,
}

impl ProjectPayload {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::bad_request("Project name is required"));
        }
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::bad_request(format!(
                "Project name exceeds {} characters",
                MAX_NAME_LEN
            )));
        }
        if self.color.trim().is_empty() {
            return Err(AppError::bad_request("Project color is required"));
        }
        if self.color.chars().count() > MAX_COLOR_LEN {
            return Err(AppError::bad_request(format!(
                "Project color exceeds {} characters",
                MAX_COLOR_LEN
            )));
        }
        Ok(())
    }

    /// Client-supplied id, treating the nil UUID as absent
    pub fn client_id(&self) -> Option<Uuid> {
        self.id.filter(|id| !id.is_nil())
    }
}

/// A validated project write bound to its owner
#[derive(Debug, Clone)]
pub struct ProjectWrite {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub color: String,
    pub origin_device: String,
    /// `None` keeps the stored flag
    pub deleted: Option<bool>,
}

impl ProjectWrite {
    /// Bind a payload to its id and owner. The originating device falls back
    /// to `device_id` when the payload does not name one.
    pub fn from_payload(id: Uuid, owner_id: Uuid, device_id: &str, payload: &ProjectPayload) -> Self {
        Self {
            id,
            owner_id,
            name: payload.name.clone(),
            description: payload.description.clone(),
            color: payload.color.clone(),
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
struct ProjectRow {
    id: String,
    owner_id: String,
    name: String,
    description: String,
    color: String,
    origin_device: String,
    is_deleted: bool,
    created_at: i64,
    updated_at: i64,
}

impl ProjectRow {
    fn into_project(self) -> Result<Project> {
        Ok(Project {
            id: parse_id(&self.id)?,
            owner_id: parse_id(&self.owner_id)?,
            name: self.name,
            description: self.description,
            color: self.color,
            origin_device: self.origin_device,
            deleted: self.is_deleted,
            created_at: from_micros(self.created_at)?,
            updated_at: from_micros(self.updated_at)?,
        })
    }
}

const PROJECT_COLUMNS: &str =
    "id, owner_id, name, description, color, origin_device, is_deleted, created_at, updated_at";

/// Project repository over a single connection or open transaction
pub struct ProjectRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ProjectRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Look up who owns an id, regardless of owner
    pub async fn meta(&mut self, id: Uuid) -> Result<Option<RecordMeta>> {
        let row: Option<(String, String, bool)> = sqlx::query_as(
            "SELECT owner_id, origin_device, is_deleted FROM projects WHERE id = ?",
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

    /// Insert a new project
    pub async fn insert(&mut self, write: &ProjectWrite, now: DateTime<Utc>) -> Result<Project> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            r#"
            INSERT INTO projects (id, owner_id, name, description, color, origin_device, is_deleted, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            PROJECT_COLUMNS
        ))
        .bind(write.id.to_string())
        .bind(write.owner_id.to_string())
        .bind(&write.name)
        .bind(&write.description)
        .bind(&write.color)
        .bind(&write.origin_device)
        .bind(write.deleted.unwrap_or(false))
        .bind(to_micros(now))
        .bind(to_micros(now))
        .fetch_one(&mut *self.conn)
        .await?;

        row.into_project()
    }

    /// Overwrite every mutable field of an owned project.
    ///
    /// Returns `None` when no project with this id belongs to the owner.
    pub async fn overwrite(
        &mut self,
        write: &ProjectWrite,
        now: DateTime<Utc>,
    ) -> Result<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            r#"
            UPDATE projects
            SET name = ?,
                description = ?,
                color = ?,
                origin_device = ?,
                is_deleted = COALESCE(?, is_deleted),
                updated_at = MAX(?, updated_at + 1)
            WHERE id = ? AND owner_id = ?
            RETURNING {}
            "#,
            PROJECT_COLUMNS
        ))
        .bind(&write.name)
        .bind(&write.description)
        .bind(&write.color)
        .bind(&write.origin_device)
        .bind(write.deleted)
        .bind(to_micros(now))
        .bind(write.id.to_string())
        .bind(write.owner_id.to_string())
        .fetch_optional(&mut *self.conn)
        .await?;

        row.map(ProjectRow::into_project).transpose()
    }

    /// Mark owned projects as deleted, returning the ids that matched
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
                UPDATE projects
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

    /// Active projects for the listing endpoint
    pub async fn list_active(&mut self, owner_id: Uuid) -> Result<Vec<Project>> {
        let rows = sqlx::query_as::<_, ProjectRow>(&format!(
            r#"
            SELECT {}
            FROM projects
            WHERE owner_id = ? AND is_deleted = 0
            ORDER BY created_at DESC
            "#,
            PROJECT_COLUMNS
        ))
        .bind(owner_id.to_string())
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(ProjectRow::into_project).collect()
    }

    /// Every project of the owner updated after `since`, tombstones included.
    /// `None` returns the whole collection.
    pub async fn changed_since(
        &mut self,
        owner_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Project>> {
        let rows = sqlx::query_as::<_, ProjectRow>(&format!(
            r#"
            SELECT {}
            FROM projects
            WHERE owner_id = ? AND updated_at > ?
            ORDER BY updated_at ASC
            "#,
            PROJECT_COLUMNS
        ))
        .bind(owner_id.to_string())
        .bind(since.map(to_micros).unwrap_or(i64::MIN))
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(ProjectRow::into_project).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{server_now, test_pool};

    fn write(owner_id: Uuid, name: &str) -> ProjectWrite {
        ProjectWrite {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            description: String::new(),
            color: "#ff0000".to_string(),
            origin_device: "laptop".to_string(),
            deleted: None,
        }
    }

    #[test]
    fn test_payload_validation() {
        let mut payload = ProjectPayload {
            name: "Work".to_string(),
            color: "blue".to_string(),
            ..Default::default()
        };
        assert!(payload.validate().is_ok());

        payload.name = "   ".to_string();
        assert!(payload.validate().is_err());

        payload.name = "Work".to_string();
        payload.color = String::new();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_nil_id_is_treated_as_absent() {
        let payload = ProjectPayload {
            id: Some(Uuid::nil()),
            ..Default::default()
        };
        assert_eq!(payload.client_id(), None);
    }

    #[test]
    fn test_payload_ignores_client_owner_and_timestamps() {
        let json = serde_json::json!({
            "id": "7f1c1a8e-2b6f-4d0e-9d84-2c1c9b1e5a10",
            "user_id": "00000000-0000-0000-0000-000000000001",
            "name": "Work",
            "color": "red",
            "updated_at": "2099-01-01T00:00:00Z"
        });
        let payload: ProjectPayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.name, "Work");
        assert_eq!(payload.deleted, None);
        assert!(payload.client_id().is_some());
    }

    #[tokio::test]
    async fn test_overwrite_is_owner_scoped() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ProjectRepository::new(&mut conn);

        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let original = write(owner, "Work");
        repo.insert(&original, server_now()).await.unwrap();

        let mut hijack = original.clone();
        hijack.owner_id = intruder;
        hijack.name = "Stolen".to_string();
        assert!(repo.overwrite(&hijack, server_now()).await.unwrap().is_none());

        let stored = repo.changed_since(owner, None).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "Work");
    }

    #[tokio::test]
    async fn test_updated_at_strictly_increases() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ProjectRepository::new(&mut conn);

        let owner = Uuid::new_v4();
        let w = write(owner, "Work");
        let now = server_now();
        let created = repo.insert(&w, now).await.unwrap();

        // Same server clock reading for both mutations
        let first = repo.overwrite(&w, now).await.unwrap().unwrap();
        let second = repo.overwrite(&w, now).await.unwrap().unwrap();
        assert!(first.updated_at > created.updated_at);
        assert!(second.updated_at > first.updated_at);

        let buried = repo.tombstone(owner, &[w.id], now).await.unwrap();
        assert_eq!(buried, vec![w.id]);
        let after = repo.changed_since(owner, None).await.unwrap();
        assert!(after[0].deleted);
        assert!(after[0].updated_at > second.updated_at);
    }

    #[tokio::test]
    async fn test_list_active_hides_tombstones() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ProjectRepository::new(&mut conn);

        let owner = Uuid::new_v4();
        let keep = write(owner, "Keep");
        let gone = write(owner, "Gone");
        repo.insert(&keep, server_now()).await.unwrap();
        repo.insert(&gone, server_now()).await.unwrap();
        repo.tombstone(owner, &[gone.id], server_now()).await.unwrap();

        let active = repo.list_active(owner).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, keep.id);

        let all = repo.changed_since(owner, None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_overwrite_can_restore_tombstone_explicitly() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ProjectRepository::new(&mut conn);

        let owner = Uuid::new_v4();
        let mut w = write(owner, "Work");
        repo.insert(&w, server_now()).await.unwrap();
        repo.tombstone(owner, &[w.id], server_now()).await.unwrap();

        // Plain update leaves the tombstone in place
        let kept = repo.overwrite(&w, server_now()).await.unwrap().unwrap();
        assert!(kept.deleted);

        w.deleted = Some(false);
        let restored = repo.overwrite(&w, server_now()).await.unwrap().unwrap();
        assert!(!restored.deleted);
    }

    #[tokio::test]
    async fn test_tombstone_beyond_sqlite_variable_limit() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ProjectRepository::new(&mut conn);

        let owner = Uuid::new_v4();
        let first = write(owner, "First");
        let last = write(owner, "Last");
        repo.insert(&first, server_now()).await.unwrap();
        repo.insert(&last, server_now()).await.unwrap();

        let mut ids = vec![first.id];
        ids.extend((0..33_000).map(|_| Uuid::new_v4()));
        ids.push(last.id);

        let mut buried = repo.tombstone(owner, &ids, server_now()).await.unwrap();
        buried.sort();
        let mut expected = vec![first.id, last.id];
        expected.sort();
        assert_eq!(buried, expected);
        assert!(repo.list_active(owner).await.unwrap().is_empty());
    }
}
