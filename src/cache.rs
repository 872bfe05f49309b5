use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::event::ChangeEvent;
use crate::model::Record;
use crate::reconcile::{self, Applied};

/// In-memory mirror of one owner's slice of a collection, unique by id.
///
/// Rows deleted through this cache are tombstoned until the store's own
/// delete event arrives, so earlier echoes still queued on the feed cannot
/// bring them back.
#[derive(Debug, Clone)]
pub struct LocalCache<T> {
    owner_id: String,
    entries: Vec<T>,
    tombstones: HashSet<String>,
}

impl<T: Record> LocalCache<T> {
    pub fn new(owner_id: impl Into<String>) -> Self {
        LocalCache {
            owner_id: owner_id.into(),
            entries: Vec::new(),
            tombstones: HashSet::new(),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Replaces the contents with a fresh fetch, keeping the fetch order.
    /// Repeated ids keep their first occurrence.
    pub fn replace_all(&mut self, fetched: Vec<T>) {
        let mut seen = HashSet::with_capacity(fetched.len());
        let before = fetched.len();
        let entries: Vec<T> = fetched
            .into_iter()
            .filter(|e| seen.insert(e.id().to_string()))
            .collect();
        if entries.len() != before {
            warn!(
                target: "hearthkeep",
                event = "cache_fetch_duplicates",
                collection = T::COLLECTION.as_str(),
                owner_id = %self.owner_id,
                dropped = before - entries.len()
            );
        }
        self.entries = entries;
    }

    /// Applies an event delivered by the feed.
    pub fn apply(&mut self, event: &ChangeEvent<T>) -> Applied {
        let applied = match event {
            ChangeEvent::Deleted { id, .. } => {
                self.tombstones.remove(id.as_str());
                reconcile::apply(&mut self.entries, event)
            }
            _ if self.tombstones.contains(event.id()) => Applied::Unchanged,
            _ => reconcile::apply(&mut self.entries, event),
        };
        self.log_apply("feed", event, applied);
        applied
    }

    /// Applies the result of a write this cache's owner just made.
    pub fn apply_local(&mut self, event: &ChangeEvent<T>) -> Applied {
        if let ChangeEvent::Deleted { id, .. } = event {
            self.tombstones.insert(id.clone());
        }
        let applied = reconcile::apply(&mut self.entries, event);
        self.log_apply("local", event, applied);
        applied
    }

    pub fn is_tombstoned(&self, id: &str) -> bool {
        self.tombstones.contains(id)
    }

    fn log_apply(&self, source: &'static str, event: &ChangeEvent<T>, applied: Applied) {
        debug!(
            target: "hearthkeep",
            event = "cache_apply",
            collection = T::COLLECTION.as_str(),
            owner_id = %self.owner_id,
            source,
            kind = ?event.kind(),
            id = event.id(),
            outcome = applied.as_str()
        );
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.iter().find(|e| e.id() == id)
    }

    /// Like [`get`](Self::get) but reports a miss as [`SyncError::NotFound`].
    pub fn require(&self, id: &str) -> SyncResult<&T> {
        self.get(id).ok_or_else(|| SyncError::NotFound {
            collection: T::COLLECTION,
            id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
