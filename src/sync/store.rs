//! Record store adapter
//!
//! The sync engine reaches storage only through [`RecordStore`]. A store hands
//! out units of work ([`RecordTx`]) that either commit as a whole or are
//! rolled back when dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::db::{
    CursorRepository, DeviceCursor, Project, ProjectRepository, ProjectWrite, RecordMeta, Session,
    SessionRepository, SessionWrite,
};
use crate::error::Result;

/// Owner-scoped access to projects, sessions and device cursors
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Open an atomic unit of work
    async fn begin(&self) -> Result<Box<dyn RecordTx>>;

    /// Non-deleted projects, newest first
    async fn active_projects(&self, owner_id: Uuid) -> Result<Vec<Project>>;

    /// Non-deleted sessions, latest start first
    async fn active_sessions(&self, owner_id: Uuid) -> Result<Vec<Session>>;

    async fn device_cursors(&self, owner_id: Uuid) -> Result<Vec<DeviceCursor>>;
}

/// One open transaction. Dropping it without [`RecordTx::commit`] rolls back.
#[async_trait]
pub trait RecordTx: Send {
    async fn project_meta(&mut self, id: Uuid) -> Result<Option<RecordMeta>>;

    async fn insert_project(&mut self, write: &ProjectWrite, now: DateTime<Utc>) -> Result<Project>;

    /// `None` when the id is not owned by `write.owner_id`
    async fn overwrite_project(
        &mut self,
        write: &ProjectWrite,
        now: DateTime<Utc>,
    ) -> Result<Option<Project>>;

    async fn tombstone_projects(
        &mut self,
        owner_id: Uuid,
        ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>>;

    /// Projects updated after `since` (all when `None`), tombstones included
    async fn projects_since(
        &mut self,
        owner_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Project>>;

    async fn session_meta(&mut self, id: Uuid) -> Result<Option<RecordMeta>>;

    async fn insert_session(&mut self, write: &SessionWrite, now: DateTime<Utc>) -> Result<Session>;

    async fn overwrite_session(
        &mut self,
        write: &SessionWrite,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>>;

    async fn tombstone_sessions(
        &mut self,
        owner_id: Uuid,
        ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>>;

    async fn sessions_since(
        &mut self,
        owner_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Session>>;

    /// Move the device cursor to `now`, returning the replaced value
    async fn advance_cursor(
        &mut self,
        owner_id: Uuid,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// SQLite-backed record store
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn begin(&self) -> Result<Box<dyn RecordTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteRecordTx { tx }))
    }

    async fn active_projects(&self, owner_id: Uuid) -> Result<Vec<Project>> {
        let mut conn = self.pool.acquire().await?;
        ProjectRepository::new(&mut conn).list_active(owner_id).await
    }

    async fn active_sessions(&self, owner_id: Uuid) -> Result<Vec<Session>> {
        let mut conn = self.pool.acquire().await?;
        SessionRepository::new(&mut conn).list_active(owner_id).await
    }

    async fn device_cursors(&self, owner_id: Uuid) -> Result<Vec<DeviceCursor>> {
        let mut conn = self.pool.acquire().await?;
        CursorRepository::new(&mut conn).for_owner(owner_id).await
    }
}

struct SqliteRecordTx {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl RecordTx for SqliteRecordTx {
    async fn project_meta(&mut self, id: Uuid) -> Result<Option<RecordMeta>> {
        ProjectRepository::new(&mut self.tx).meta(id).await
    }

    async fn insert_project(&mut self, write: &ProjectWrite, now: DateTime<Utc>) -> Result<Project> {
        ProjectRepository::new(&mut self.tx).insert(write, now).await
    }

    async fn overwrite_project(
        &mut self,
        write: &ProjectWrite,
        now: DateTime<Utc>,
    ) -> Result<Option<Project>> {
        ProjectRepository::new(&mut self.tx).overwrite(write, now).await
    }

    async fn tombstone_projects(
        &mut self,
        owner_id: Uuid,
        ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        ProjectRepository::new(&mut self.tx)
            .tombstone(owner_id, ids, now)
            .await
    }

    async fn projects_since(
        &mut self,
        owner_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Project>> {
        ProjectRepository::new(&mut self.tx)
            .changed_since(owner_id, since)
            .await
    }

    async fn session_meta(&mut self, id: Uuid) -> Result<Option<RecordMeta>> {
        SessionRepository::new(&mut self.tx).meta(id).await
    }

    async fn insert_session(&mut self, write: &SessionWrite, now: DateTime<Utc>) -> Result<Session> {
        SessionRepository::new(&mut self.tx).insert(write, now).await
    }

    async fn overwrite_session(
        &mut self,
        write: &SessionWrite,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        SessionRepository::new(&mut self.tx).overwrite(write, now).await
    }

    async fn tombstone_sessions(
        &mut self,
        owner_id: Uuid,
        ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        SessionRepository::new(&mut self.tx)
            .tombstone(owner_id, ids, now)
            .await
    }

    async fn sessions_since(
        &mut self,
        owner_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Session>> {
        SessionRepository::new(&mut self.tx)
            .changed_since(owner_id, since)
            .await
    }

    async fn advance_cursor(
        &mut self,
        owner_id: Uuid,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        CursorRepository::new(&mut self.tx)
            .advance(owner_id, device_id, now)
            .await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
