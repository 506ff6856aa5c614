//! Conflict resolution
//!
//! The last write to reach the server wins. Client timestamps are never
//! compared: an incoming record either creates a row, overwrites every
//! mutable field of the owner's existing row, or is skipped when its id
//! already belongs to another owner.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::store::RecordTx;
use super::types::{EntityKind, SkipReason, SkippedRecord};
use crate::db::{ProjectPayload, ProjectWrite, RecordMeta, SessionPayload, SessionWrite};
use crate::error::{AppError, Result};

/// What happens to one incoming record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No row with this id exists yet
    Create,
    /// The owner's row is replaced in full
    Overwrite { previous_device: String },
    /// The row is left untouched
    Skip(SkipReason),
}

/// Result of applying one incoming record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Created(Uuid),
    Overwritten(Uuid),
    Skipped(SkippedRecord),
}

/// Stateless last-write-wins resolver
#[derive(Debug, Default, Clone, Copy)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Decide how a record pushed by `owner_id` interacts with the stored row
    pub fn decide(&self, owner_id: Uuid, existing: Option<&RecordMeta>) -> Resolution {
        match existing {
            None => Resolution::Create,
            Some(meta) if meta.owner_id == owner_id => Resolution::Overwrite {
                previous_device: meta.origin_device.clone(),
            },
            Some(_) => Resolution::Skip(SkipReason::OwnershipMismatch),
        }
    }

    pub async fn apply_project(
        &self,
        tx: &mut dyn RecordTx,
        owner_id: Uuid,
        device_id: &str,
        payload: &ProjectPayload,
        now: DateTime<Utc>,
    ) -> Result<Applied> {
        let id = payload.client_id().unwrap_or_else(Uuid::new_v4);
        let write = ProjectWrite::from_payload(id, owner_id, device_id, payload);
        let existing = tx.project_meta(id).await?;

        match self.decide(owner_id, existing.as_ref()) {
            Resolution::Create => {
                tx.insert_project(&write, now).await?;
                Ok(Applied::Created(id))
            }
            Resolution::Overwrite { previous_device } => {
                if previous_device != write.origin_device {
                    tracing::debug!(
                        project = %id,
                        from = %previous_device,
                        to = %write.origin_device,
                        "Project overwritten by another device"
                    );
                }
                tx.overwrite_project(&write, now)
                    .await?
                    .ok_or_else(|| AppError::internal(format!("Project {} vanished during merge", id)))?;
                Ok(Applied::Overwritten(id))
            }
            Resolution::Skip(reason) => {
                tracing::warn!(project = %id, owner = %owner_id, "Skipping project owned by another user");
                Ok(Applied::Skipped(SkippedRecord {
                    entity: EntityKind::Project,
                    id,
                    reason,
                }))
            }
        }
    }

    pub async fn apply_session(
        &self,
        tx: &mut dyn RecordTx,
        owner_id: Uuid,
        device_id: &str,
        payload: &SessionPayload,
        now: DateTime<Utc>,
    ) -> Result<Applied> {
        let id = payload.client_id().unwrap_or_else(Uuid::new_v4);
        let write = SessionWrite::from_payload(id, owner_id, device_id, payload);
        let existing = tx.session_meta(id).await?;

        match self.decide(owner_id, existing.as_ref()) {
            Resolution::Create => {
                tx.insert_session(&write, now).await?;
                Ok(Applied::Created(id))
            }
            Resolution::Overwrite { previous_device } => {
                if previous_device != write.origin_device {
                    tracing::debug!(
                        session = %id,
                        from = %previous_device,
                        to = %write.origin_device,
                        "Session overwritten by another device"
                    );
                }
                tx.overwrite_session(&write, now)
                    .await?
                    .ok_or_else(|| AppError::internal(format!("Session {} vanished during merge", id)))?;
                Ok(Applied::Overwritten(id))
            }
            Resolution::Skip(reason) => {
                tracing::warn!(session = %id, owner = %owner_id, "Skipping session owned by another user");
                Ok(Applied::Skipped(SkippedRecord {
                    entity: EntityKind::Session,
                    id,
                    reason,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{server_now, test_pool};
    use crate::sync::store::{RecordStore, SqliteRecordStore};
    use chrono::Duration;

    fn meta(owner_id: Uuid, device: &str) -> RecordMeta {
        RecordMeta {
            owner_id,
            origin_device: device.to_string(),
            deleted: false,
        }
    }

    fn project(id: Uuid, name: &str) -> ProjectPayload {
        ProjectPayload {
            id: Some(id),
            name: name.to_string(),
            color: "blue".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_decide() {
        let resolver = ConflictResolver::new();
        let owner = Uuid::new_v4();

        assert_eq!(resolver.decide(owner, None), Resolution::Create);
        assert_eq!(
            resolver.decide(owner, Some(&meta(owner, "phone"))),
            Resolution::Overwrite {
                previous_device: "phone".to_string()
            }
        );
        assert_eq!(
            resolver.decide(owner, Some(&meta(Uuid::new_v4(), "phone"))),
            Resolution::Skip(SkipReason::OwnershipMismatch)
        );
    }

    #[test]
    fn test_tombstoned_row_is_still_overwritten() {
        let owner = Uuid::new_v4();
        let mut existing = meta(owner, "web");
        existing.deleted = true;
        assert!(matches!(
            ConflictResolver::new().decide(owner, Some(&existing)),
            Resolution::Overwrite { .. }
        ));
    }

    #[tokio::test]
    async fn test_last_write_wins_across_devices() {
        let store = SqliteRecordStore::new(test_pool().await);
        let resolver = ConflictResolver::new();
        let owner = Uuid::new_v4();
        let id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        let first = resolver
            .apply_project(tx.as_mut(), owner, "device-a", &project(id, "Work"), server_now())
            .await
            .unwrap();
        let second = resolver
            .apply_project(tx.as_mut(), owner, "device-b", &project(id, "Personal"), server_now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, Applied::Created(id));
        assert_eq!(second, Applied::Overwritten(id));

        let projects = store.active_projects(owner).await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "Personal");
        assert_eq!(projects[0].origin_device, "device-b");
    }

    #[tokio::test]
    async fn test_foreign_id_is_skipped_untouched() {
        let store = SqliteRecordStore::new(test_pool().await);
        let resolver = ConflictResolver::new();
        let victim = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        resolver
            .apply_project(tx.as_mut(), victim, "phone", &project(id, "Mine"), server_now())
            .await
            .unwrap();
        let applied = resolver
            .apply_project(tx.as_mut(), intruder, "laptop", &project(id, "Yours"), server_now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            applied,
            Applied::Skipped(SkippedRecord {
                entity: EntityKind::Project,
                id,
                reason: SkipReason::OwnershipMismatch,
            })
        );
        assert_eq!(store.active_projects(victim).await.unwrap()[0].name, "Mine");
        assert!(store.active_projects(intruder).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_id_gets_server_id_and_device_default() {
        let store = SqliteRecordStore::new(test_pool().await);
        let resolver = ConflictResolver::new();
        let owner = Uuid::new_v4();
        let start = server_now();
        let payload = SessionPayload {
            id: Some(Uuid::nil()),
            project_id: None,
            start_time: start,
            end_time: start + Duration::minutes(50),
            description: "reading".to_string(),
            origin_device: None,
            deleted: None,
        };

        let mut tx = store.begin().await.unwrap();
        let applied = resolver
            .apply_session(tx.as_mut(), owner, "tablet", &payload, server_now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let id = match applied {
            Applied::Created(id) => id,
            other => panic!("expected a created session, got {:?}", other),
        };
        assert!(!id.is_nil());

        let sessions = store.active_sessions(owner).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, id);
        assert_eq!(sessions[0].origin_device, "tablet");
    }
}
