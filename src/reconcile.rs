//! Merging one change event into a cached collection.
//!
//! Caches are new-first: rows that enter through a create, or through an
//! update for an id the cache does not hold, are prepended. Updates for held
//! ids replace in place, unless the cached row carries a newer `updated_at`.
//! Every event kind is idempotent, so an optimistic local apply followed by
//! the store's own event converges to one row.

use crate::event::ChangeEvent;
use crate::model::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Replaced,
    Removed,
    Unchanged,
}

impl Applied {
    pub fn as_str(&self) -> &'static str {
        match self {
            Applied::Inserted => "inserted",
            Applied::Replaced => "replaced",
            Applied::Removed => "removed",
            Applied::Unchanged => "unchanged",
        }
    }

    pub fn changed(&self) -> bool {
        !matches!(self, Applied::Unchanged)
    }
}

fn position<T: Record>(entries: &[T], id: &str) -> Option<usize> {
    entries.iter().position(|e| e.id() == id)
}

/// Applies `event` to `entries` in place.
pub fn apply<T: Record>(entries: &mut Vec<T>, event: &ChangeEvent<T>) -> Applied {
    match event {
        ChangeEvent::Created(entity) => {
            if position(entries, entity.id()).is_some() {
                Applied::Unchanged
            } else {
                entries.insert(0, entity.clone());
                Applied::Inserted
            }
        }
        ChangeEvent::Updated { entity, .. } => match position(entries, entity.id()) {
            Some(idx) if entries[idx] == *entity => Applied::Unchanged,
            // Echo of an earlier write landing after a newer one.
            Some(idx) if entity.updated_at() < entries[idx].updated_at() => Applied::Unchanged,
            Some(idx) => {
                entries[idx] = entity.clone();
                Applied::Replaced
            }
            None => {
                entries.insert(0, entity.clone());
                Applied::Inserted
            }
        },
        ChangeEvent::Deleted { id, .. } => match position(entries, id) {
            Some(idx) => {
                entries.remove(idx);
                Applied::Removed
            }
            None => Applied::Unchanged,
        },
    }
}

/// Pure form of [`apply`]: consumes a cache state and returns the next one.
pub fn reconcile<T: Record>(mut cache: Vec<T>, event: &ChangeEvent<T>) -> Vec<T> {
    apply(&mut cache, event);
    cache
}
