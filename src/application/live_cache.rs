//! Time-stamped, push-invalidated cache of the volatile collections.
//!
//! Marking stale (push side) is separate from refetching (pull side): a burst
//! of change events only flips a flag, and the next reader pays for exactly
//! one remote read.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::models::{
    Collection, CollectionItems, EquipmentItem, FleetItem, ServiceFront, Table,
};
use crate::error::AppError;
use crate::infrastructure::notifier::ChangeHub;
use crate::infrastructure::repository::LiveSource;
use crate::Result;

/// Which collections an invalidation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    All,
    Only(Collection),
}

/// Snapshot of one collection plus its freshness bookkeeping.
#[derive(Debug, Clone, Default)]
struct CachedEntitySet {
    items: Option<Arc<CollectionItems>>,
    fetched_at: Option<DateTime<Utc>>,
    stale: bool,
    /// Bumped on every stale mark; a fetch only clears `stale` if no mark
    /// arrived while it was in flight.
    generation: u64,
}

/// Read-only view of a cached collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SetStatus {
    pub len: usize,
    pub stale: bool,
    pub fetched_at: Option<DateTime<Utc>>,
}

type Sets = Arc<Mutex<HashMap<Collection, CachedEntitySet>>>;

fn lock(sets: &Sets) -> MutexGuard<'_, HashMap<Collection, CachedEntitySet>> {
    sets.lock().unwrap_or_else(|e| e.into_inner())
}

fn mark_stale(sets: &Sets, collection: Collection) {
    let mut sets = lock(sets);
    let set = sets.entry(collection).or_default();
    set.stale = true;
    set.generation += 1;
}

pub struct LiveCache {
    source: Arc<dyn LiveSource>,
    hub: ChangeHub,
    sets: Sets,
    feeds: Mutex<Vec<JoinHandle<()>>>,
}

impl LiveCache {
    pub fn new(source: Arc<dyn LiveSource>, hub: ChangeHub) -> Self {
        Self {
            source,
            hub,
            sets: Arc::new(Mutex::new(HashMap::new())),
            feeds: Mutex::new(Vec::new()),
        }
    }

    /// Returns the cached items, refetching first when forced, stale or absent.
    ///
    /// A failed refetch keeps the previous snapshot and leaves the set stale
    /// so the next read retries.
    pub async fn fetch(&self, collection: Collection, force_refresh: bool) -> Result<Arc<CollectionItems>> {
        let generation = {
            let mut sets = lock(&self.sets);
            let set = sets.entry(collection).or_default();
            match &set.items {
                Some(items) if !force_refresh && !set.stale => return Ok(Arc::clone(items)),
                _ => set.generation,
            }
        };

        debug!(collection = collection.as_str(), force_refresh, "refreshing collection");
        match self.source.fetch_collection(collection).await {
            Ok(items) if items.collection() != collection => {
                mark_stale(&self.sets, collection);
                Err(AppError::remote(format!(
                    "source answered {} for {}",
                    items.collection().as_str(),
                    collection.as_str()
                )))
            }
            Ok(items) => {
                let items = Arc::new(items);
                let mut sets = lock(&self.sets);
                let set = sets.entry(collection).or_default();
                set.items = Some(Arc::clone(&items));
                set.fetched_at = Some(Utc::now());
                if set.generation == generation {
                    set.stale = false;
                } else {
                    debug!(collection = collection.as_str(), "changed during fetch, staying stale");
                }
                info!(collection = collection.as_str(), len = items.len(), "collection refreshed");
                Ok(items)
            }
            Err(e) => {
                warn!(collection = collection.as_str(), error = %e, "refresh failed, keeping previous snapshot");
                mark_stale(&self.sets, collection);
                Err(e)
            }
        }
    }

    /// Flags collections stale without fetching.
    pub fn invalidate(&self, scope: CacheScope) {
        match scope {
            CacheScope::All => {
                for collection in Collection::ALL {
                    mark_stale(&self.sets, collection);
                }
            }
            CacheScope::Only(collection) => mark_stale(&self.sets, collection),
        }
        debug!(?scope, "cache invalidated");
    }

    /// Opens one change feed per relevant table. Calling it again while the
    /// feeds are alive is a no-op.
    pub fn subscribe_to_changes(&self) {
        let mut feeds = self.feeds.lock().unwrap_or_else(|e| e.into_inner());
        if !feeds.is_empty() && feeds.iter().all(|h| !h.is_finished()) {
            return;
        }
        for handle in feeds.drain(..) {
            handle.abort();
        }

        for table in Self::watched_tables() {
            let Some(collection) = table.collection() else {
                continue;
            };
            // subscribe before spawning so no event after this call is missed
            let mut rx = self.hub.subscribe(table);
            let sets = Arc::clone(&self.sets);
            feeds.push(tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(_) => mark_stale(&sets, collection),
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(table = table.as_str(), skipped, "feed lagged");
                            mark_stale(&sets, collection);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
                debug!(table = table.as_str(), "change feed closed");
            }));
        }
        info!(feeds = feeds.len(), "subscribed to change feeds");
    }

    pub fn feed_count(&self) -> usize {
        self.feeds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    pub fn status(&self, collection: Collection) -> Option<SetStatus> {
        let sets = lock(&self.sets);
        sets.get(&collection).map(|set| SetStatus {
            len: set.items.as_ref().map_or(0, |items| items.len()),
            stale: set.stale,
            fetched_at: set.fetched_at,
        })
    }

    /// Table feeds this cache listens to.
    pub fn watched_tables() -> Vec<Table> {
        Collection::ALL
            .iter()
            .flat_map(|c| c.tables().iter().copied())
            .collect()
    }

    // --- typed accessors ---

    pub async fn fleet(&self, force_refresh: bool) -> Result<Vec<FleetItem>> {
        match &*self.fetch(Collection::Fleet, force_refresh).await? {
            CollectionItems::Fleet(items) => Ok(items.clone()),
            _ => Err(AppError::remote("fleet collection holds other items")),
        }
    }

    pub async fn equipment(&self, force_refresh: bool) -> Result<Vec<EquipmentItem>> {
        match &*self.fetch(Collection::Equipment, force_refresh).await? {
            CollectionItems::Equipment(items) => Ok(items.clone()),
            _ => Err(AppError::remote("equipment collection holds other items")),
        }
    }

    pub async fn service_fronts(&self, force_refresh: bool) -> Result<Vec<ServiceFront>> {
        match &*self.fetch(Collection::ServiceFronts, force_refresh).await? {
            CollectionItems::ServiceFronts(items) => Ok(items.clone()),
            _ => Err(AppError::remote("service front collection holds other items")),
        }
    }
}

impl Drop for LiveCache {
    fn drop(&mut self) {
        let feeds = self.feeds.get_mut().unwrap_or_else(|e| e.into_inner());
        for handle in feeds.drain(..) {
            handle.abort();
        }
    }
}
