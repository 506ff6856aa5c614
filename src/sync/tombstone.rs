//! Logical deletion
//!
//! Records are never erased. A tombstone sets `deleted` and refreshes
//! `updated_at` so every device picks the deletion up on its next pull.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::store::RecordTx;
use crate::error::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct TombstoneManager;

impl TombstoneManager {
    pub fn new() -> Self {
        Self
    }

    /// Tombstone the owner's projects among `ids`; returns how many matched
    pub async fn bury_projects(
        &self,
        tx: &mut dyn RecordTx,
        owner_id: Uuid,
        ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let ids = distinct(ids);
        let buried = tx.tombstone_projects(owner_id, &ids, now).await?;
        report("projects", ids.len(), buried.len());
        Ok(buried.len())
    }

    pub async fn bury_sessions(
        &self,
        tx: &mut dyn RecordTx,
        owner_id: Uuid,
        ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let ids = distinct(ids);
        let buried = tx.tombstone_sessions(owner_id, &ids, now).await?;
        report("sessions", ids.len(), buried.len());
        Ok(buried.len())
    }
}

fn distinct(ids: &[Uuid]) -> Vec<Uuid> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

// Unknown and foreign ids are ignored
fn report(collection: &str, requested: usize, buried: usize) {
    if requested > buried {
        tracing::debug!(
            collection,
            requested,
            buried,
            ignored = requested - buried,
            "Ignored tombstones for unknown or foreign ids"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{server_now, test_pool, ProjectWrite};
    use crate::sync::store::{RecordStore, SqliteRecordStore};

    fn project(owner_id: Uuid, name: &str) -> ProjectWrite {
        ProjectWrite {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            description: String::new(),
            color: "grey".to_string(),
            origin_device: "web".to_string(),
            deleted: None,
        }
    }

    #[test]
    fn test_distinct() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(distinct(&[a, b, a, a]).len(), 2);
    }

    #[tokio::test]
    async fn test_bury_counts_only_owned_records() {
        let store = SqliteRecordStore::new(test_pool().await);
        let owner = Uuid::new_v4();
        let mine = project(owner, "Mine");
        let theirs = project(Uuid::new_v4(), "Theirs");

        let mut tx = store.begin().await.unwrap();
        tx.insert_project(&mine, server_now()).await.unwrap();
        tx.insert_project(&theirs, server_now()).await.unwrap();

        let buried = TombstoneManager::new()
            .bury_projects(
                tx.as_mut(),
                owner,
                &[mine.id, mine.id, theirs.id, Uuid::new_v4()],
                server_now(),
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(buried, 1);
        assert!(store.active_projects(owner).await.unwrap().is_empty());
        assert_eq!(store.active_projects(theirs.owner_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tombstone_stays_visible_to_pulls() {
        let store = SqliteRecordStore::new(test_pool().await);
        let owner = Uuid::new_v4();
        let write = project(owner, "Old");

        let mut tx = store.begin().await.unwrap();
        tx.insert_project(&write, server_now()).await.unwrap();
        TombstoneManager::new()
            .bury_projects(tx.as_mut(), owner, &[write.id], server_now())
            .await
            .unwrap();
        let pulled = tx.projects_since(owner, None).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(pulled.len(), 1);
        assert!(pulled[0].deleted);
    }

    #[tokio::test]
    async fn test_empty_list_is_a_no_op() {
        let store = SqliteRecordStore::new(test_pool().await);
        let mut tx = store.begin().await.unwrap();
        let buried = TombstoneManager::new()
            .bury_sessions(tx.as_mut(), Uuid::new_v4(), &[], server_now())
            .await
            .unwrap();
        assert_eq!(buried, 0);
    }
}
