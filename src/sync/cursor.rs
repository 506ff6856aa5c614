//! Per-device sync cursors and pull scope

use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::store::RecordTx;
use crate::config::{PullMode, SyncConfig};
use crate::error::Result;

/// Records a pull should return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullScope {
    /// Everything the owner has, tombstones included
    Full,
    /// Records updated strictly after this instant
    Since(DateTime<Utc>),
}

impl PullScope {
    pub fn since(&self) -> Option<DateTime<Utc>> {
        match self {
            PullScope::Full => None,
            PullScope::Since(ts) => Some(*ts),
        }
    }

    pub fn is_delta(&self) -> bool {
        matches!(self, PullScope::Since(_))
    }
}

#[derive(Debug, Clone)]
pub struct CursorTracker {
    mode: PullMode,
    skew: Duration,
}

impl CursorTracker {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            mode: config.pull_mode,
            skew: config.delta_skew,
        }
    }

    /// Record that `device_id` synced at `now`. Returns the previous cursor,
    /// or the epoch when the device never synced before.
    pub async fn advance(
        &self,
        tx: &mut dyn RecordTx,
        owner_id: Uuid,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let previous = tx.advance_cursor(owner_id, device_id, now).await?;
        if previous.is_none() {
            tracing::debug!(owner = %owner_id, device = %device_id, "First sync for device");
        }
        Ok(previous.unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
    }

    /// Pull scope for an exchange, given the stored previous cursor and the
    /// cursor the device claims to hold.
    pub fn scope(
        &self,
        previous: DateTime<Utc>,
        client_cursor: Option<DateTime<Utc>>,
    ) -> PullScope {
        if self.mode == PullMode::Full {
            return PullScope::Full;
        }

        // A device that lost state must not miss anything
        let since = client_cursor.map_or(previous, |client| client.min(previous));
        if since <= DateTime::<Utc>::UNIX_EPOCH {
            return PullScope::Full;
        }

        let skew = chrono::Duration::from_std(self.skew).unwrap_or_else(|_| chrono::Duration::zero());
        match since.checked_sub_signed(skew) {
            Some(ts) if ts > DateTime::<Utc>::UNIX_EPOCH => PullScope::Since(ts),
            _ => PullScope::Full,
        }
    }
}
