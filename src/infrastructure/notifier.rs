//! In-process notification collaborator: per-table change feeds and a
//! force-logout broadcast.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::models::{ChangeEvent, ChangeOp, Table, UserId};

const FEED_CAPACITY: usize = 64;

/// Force-logout request. `user_id: None` targets every listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForceLogout {
    pub user_id: Option<UserId>,
}

/// Cheap to clone; all clones share the same feeds.
#[derive(Debug, Clone)]
pub struct ChangeHub {
    feeds: Arc<Mutex<HashMap<Table, broadcast::Sender<ChangeEvent>>>>,
    logout: broadcast::Sender<ForceLogout>,
}

impl ChangeHub {
    pub fn new() -> Self {
        let (logout, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            feeds: Arc::new(Mutex::new(HashMap::new())),
            logout,
        }
    }

    fn sender(&self, table: Table) -> broadcast::Sender<ChangeEvent> {
        let mut feeds = self.feeds.lock().unwrap_or_else(|e| e.into_inner());
        feeds
            .entry(table)
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .clone()
    }

    /// Opens a change feed scoped to one table.
    pub fn subscribe(&self, table: Table) -> broadcast::Receiver<ChangeEvent> {
        self.sender(table).subscribe()
    }

    /// Publishes a change; returns how many feeds received it.
    pub fn publish(&self, table: Table, op: ChangeOp) -> usize {
        let event = ChangeEvent {
            table,
            op,
            at: Utc::now(),
        };
        // no subscribers is not an error
        let delivered = self.sender(table).send(event).unwrap_or(0);
        debug!(table = table.as_str(), ?op, delivered, "change published");
        delivered
    }

    pub fn subscribe_force_logout(&self) -> broadcast::Receiver<ForceLogout> {
        self.logout.subscribe()
    }

    pub fn broadcast_force_logout(&self, user_id: Option<UserId>) -> usize {
        self.logout.send(ForceLogout { user_id }).unwrap_or(0)
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}
