//! Sync data types
//!
//! Defines the push/pull exchange between a device and the server:
//! - Push batches of upserted and deleted records
//! - Pull results carrying the authoritative post-merge state
//! - Per-record skip reports and sync status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{DeviceCursor, Project, ProjectPayload, Session, SessionPayload};
use crate::error::{AppError, Result};

const MAX_DEVICE_ID_LEN: usize = 255;

/// Locally-made changes sent by one device
#[derive(Debug, Clone, Default)]
pub struct PushBatch {
    pub projects: Vec<ProjectPayload>,
    pub sessions: Vec<SessionPayload>,
    pub deleted_project_ids: Vec<Uuid>,
    pub deleted_session_ids: Vec<Uuid>,
}

impl PushBatch {
    /// Total number of records touched by the batch
    pub fn len(&self) -> usize {
        self.projects.len()
            + self.sessions.len()
            + self.deleted_project_ids.len()
            + self.deleted_session_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject malformed batches before any storage work starts
    pub fn validate(&self, max_records: usize) -> Result<()> {
        if self.len() > max_records {
            return Err(AppError::bad_request(format!(
                "Push batch has {} records, limit is {}",
                self.len(),
                max_records
            )));
        }
        for (index, project) in self.projects.iter().enumerate() {
            project
                .validate()
                .map_err(|e| locate(e, "local_projects", index))?;
        }
        for (index, session) in self.sessions.iter().enumerate() {
            session
                .validate()
                .map_err(|e| locate(e, "local_sessions", index))?;
        }
        Ok(())
    }
}

/// Prefix a record validation error with its position in the batch
fn locate(error: AppError, field: &str, index: usize) -> AppError {
    match error {
        AppError::BadRequest(msg) => AppError::bad_request(format!("{}[{}]: {}", field, index, msg)),
        other => other,
    }
}

pub fn validate_device_id(device_id: &str) -> Result<()> {
    if device_id.trim().is_empty() {
        return Err(AppError::bad_request("device_id is required"));
    }
    if device_id.chars().count() > MAX_DEVICE_ID_LEN {
        return Err(AppError::bad_request(format!(
            "device_id exceeds {} characters",
            MAX_DEVICE_ID_LEN
        )));
    }
    Ok(())
}

/// Which collection a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Project,
    Session,
}

/// Why an incoming record was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The id already exists under another owner
    OwnershipMismatch,
}

/// An incoming record the merge left untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub entity: EntityKind,
    pub id: Uuid,
    pub reason: SkipReason,
}

/// Authoritative server state returned by one exchange
#[derive(Debug, Clone)]
pub struct PullResult {
    /// Server time the device's cursor now points at
    pub as_of: DateTime<Utc>,
    pub projects: Vec<Project>,
    pub sessions: Vec<Session>,
    pub skipped: Vec<SkippedRecord>,
    /// Whether only changes since the previous cursor were returned
    pub delta: bool,
}

/// Request body of `POST /api/sync`
#[derive(Debug, Clone, Deserialize)]
pub struct SyncRequest {
    pub device_id: String,
    /// Cursor the device believes it holds
    #[serde(default)]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub local_projects: Vec<ProjectPayload>,
    #[serde(default)]
    pub local_sessions: Vec<SessionPayload>,
    #[serde(default)]
    pub deleted_projects: Vec<Uuid>,
    #[serde(default)]
    pub deleted_sessions: Vec<Uuid>,
}

impl SyncRequest {
    pub fn into_batch(self) -> (String, Option<DateTime<Utc>>, PushBatch) {
        (
            self.device_id,
            self.last_sync_time,
            PushBatch {
                projects: self.local_projects,
                sessions: self.local_sessions,
                deleted_project_ids: self.deleted_projects,
                deleted_session_ids: self.deleted_sessions,
            },
        )
    }
}

/// Query string of the pull-only `GET /api/sync`
#[derive(Debug, Clone, Deserialize)]
pub struct PullQuery {
    pub device_id: String,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

/// Response body of both sync endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub last_sync_time: DateTime<Utc>,
    pub server_projects: Vec<Project>,
    pub server_sessions: Vec<Session>,
    pub skipped: Vec<SkippedRecord>,
    pub delta: bool,
}

impl From<PullResult> for SyncResponse {
    fn from(result: PullResult) -> Self {
        Self {
            last_sync_time: result.as_of,
            server_projects: result.projects,
            server_sessions: result.sessions,
            skipped: result.skipped,
            delta: result.delta,
        }
    }
}

/// Informational sync status for an owner
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// Most recent sync of any device; the epoch when none synced yet
    pub last_sync_time: DateTime<Utc>,
    pub devices: Vec<DeviceCursor>,
}

impl SyncStatus {
    pub fn from_cursors(devices: Vec<DeviceCursor>) -> Self {
        let last_sync_time = devices
            .iter()
            .map(|d| d.last_sync_time)
            .max()
            .unwrap_or_default();
        Self {
            last_sync_time,
            devices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(name: &str) -> ProjectPayload {
        ProjectPayload {
            name: name.to_string(),
            color: "green".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_sync_request_defaults() {
        let json = serde_json::json!({ "device_id": "phone" });
        let request: SyncRequest = serde_json::from_value(json).unwrap();
        let (device_id, cursor, batch) = request.into_batch();
        assert_eq!(device_id, "phone");
        assert!(cursor.is_none());
        assert!(batch.is_empty());
    }

    #[test]
    fn test_batch_limit() {
        let batch = PushBatch {
            projects: vec![project("a"), project("b")],
            deleted_session_ids: vec![Uuid::new_v4()],
            ..Default::default()
        };
        assert_eq!(batch.len(), 3);
        assert!(batch.validate(3).is_ok());
        assert!(batch.validate(2).is_err());
    }

    #[test]
    fn test_batch_validation_names_the_bad_record() {
        let batch = PushBatch {
            projects: vec![project("ok"), project("")],
            ..Default::default()
        };
        let err = batch.validate(10).unwrap_err();
        assert!(err.to_string().contains("local_projects[1]"));
    }

    #[test]
    fn test_device_id_validation() {
        assert!(validate_device_id("laptop").is_ok());
        assert!(validate_device_id("  ").is_err());
        assert!(validate_device_id(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_skipped_record_serialization() {
        let skipped = SkippedRecord {
            entity: EntityKind::Session,
            id: Uuid::nil(),
            reason: SkipReason::OwnershipMismatch,
        };
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["entity"], "session");
        assert_eq!(json["reason"], "ownership_mismatch");
    }

    #[test]
    fn test_status_defaults_to_epoch() {
        let status = SyncStatus::from_cursors(Vec::new());
        assert_eq!(status.last_sync_time.timestamp(), 0);
    }
}
