//! Sync coordinator
//!
//! Runs one push/pull exchange for a device inside a single unit of work:
//! 1. Advance the device cursor (first write, so the transaction holds the
//!    store's write lock from the start)
//! 2. Merge upserted projects and sessions through the conflict resolver
//! 3. Apply tombstones
//! 4. Read back the owner's records in the configured pull scope
//! 5. Commit
//!
//! Any failure drops the transaction, which rolls the whole batch back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::conflict::{Applied, ConflictResolver};
use super::cursor::CursorTracker;
use super::store::RecordStore;
use super::tombstone::TombstoneManager;
use super::types::{validate_device_id, PullResult, PushBatch, SkippedRecord};
use crate::config::SyncConfig;
use crate::db::server_now;
use crate::error::{AppError, Result};

#[derive(Debug, Default)]
struct MergeCounts {
    created: usize,
    overwritten: usize,
}

impl MergeCounts {
    fn record(&mut self, applied: Applied, skipped: &mut Vec<SkippedRecord>) {
        match applied {
            Applied::Created(_) => self.created += 1,
            Applied::Overwritten(_) => self.overwritten += 1,
            Applied::Skipped(record) => skipped.push(record),
        }
    }
}

pub struct SyncCoordinator {
    store: Arc<dyn RecordStore>,
    config: SyncConfig,
    resolver: ConflictResolver,
    tombstones: TombstoneManager,
    cursors: CursorTracker,
}

impl SyncCoordinator {
    pub fn new(store: Arc<dyn RecordStore>, config: SyncConfig) -> Self {
        let cursors = CursorTracker::new(&config);
        Self {
            store,
            config,
            resolver: ConflictResolver::new(),
            tombstones: TombstoneManager::new(),
            cursors,
        }
    }

    /// Merge a device's push batch and return the authoritative state.
    ///
    /// Validation and authorization failures are reported before any storage
    /// work starts. A timed out exchange is rolled back and reported as
    /// retryable.
    pub async fn sync(
        &self,
        owner_id: Uuid,
        device_id: &str,
        client_cursor: Option<DateTime<Utc>>,
        batch: PushBatch,
    ) -> Result<PullResult> {
        if owner_id.is_nil() {
            return Err(AppError::unauthorized("Sync requires an authenticated owner"));
        }
        validate_device_id(device_id)?;
        batch.validate(self.config.max_batch_records)?;

        let exchange = self.exchange(owner_id, device_id, client_cursor, &batch);
        match tokio::time::timeout(self.config.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    owner = %owner_id,
                    device = %device_id,
                    records = batch.len(),
                    "Sync exchange timed out, batch rolled back"
                );
                Err(AppError::Timeout(self.config.timeout))
            }
        }
    }

    async fn exchange(
        &self,
        owner_id: Uuid,
        device_id: &str,
        client_cursor: Option<DateTime<Utc>>,
        batch: &PushBatch,
    ) -> Result<PullResult> {
        let now = server_now();
        let mut tx = self.store.begin().await?;

        let previous = self
            .cursors
            .advance(tx.as_mut(), owner_id, device_id, now)
            .await?;

        let mut counts = MergeCounts::default();
        let mut skipped = Vec::new();

        for project in &batch.projects {
            let applied = self
                .resolver
                .apply_project(tx.as_mut(), owner_id, device_id, project, now)
                .await?;
            counts.record(applied, &mut skipped);
        }

        for session in &batch.sessions {
            let applied = self
                .resolver
                .apply_session(tx.as_mut(), owner_id, device_id, session, now)
                .await?;
            counts.record(applied, &mut skipped);
        }

        let buried_projects = self
            .tombstones
            .bury_projects(tx.as_mut(), owner_id, &batch.deleted_project_ids, now)
            .await?;
        let buried_sessions = self
            .tombstones
            .bury_sessions(tx.as_mut(), owner_id, &batch.deleted_session_ids, now)
            .await?;

        let scope = self.cursors.scope(previous, client_cursor);
        let projects = tx.projects_since(owner_id, scope.since()).await?;
        let sessions = tx.sessions_since(owner_id, scope.since()).await?;

        tx.commit().await?;

        tracing::info!(
            owner = %owner_id,
            device = %device_id,
            created = counts.created,
            overwritten = counts.overwritten,
            skipped = skipped.len(),
            tombstoned = buried_projects + buried_sessions,
            pulled_projects = projects.len(),
            pulled_sessions = sessions.len(),
            delta = scope.is_delta(),
            "Sync completed"
        );

        Ok(PullResult {
            as_of: now,
            projects,
            sessions,
            skipped,
            delta: scope.is_delta(),
        })
    }
}
