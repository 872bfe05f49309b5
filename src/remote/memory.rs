use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use super::{check_columns, check_row, decode_row, new_row, not_found, Clock, RemoteStore};
use crate::error::{AppError, AppResult, REMOTE_UNAVAILABLE};
use crate::event::{EventKind, WirePayload};
use crate::feed::ChangeFeed;
use crate::id::new_uuid_v7;
use crate::model::Record;
use crate::validation::NormalizedRecord;

/// In-process store for tests and offline use. Behaves like [`SqliteStore`](super::SqliteStore),
/// including change publication, and can be told to fail upcoming calls.
pub struct MemoryStore<T> {
    rows: Mutex<Vec<Map<String, Value>>>,
    failures: Mutex<VecDeque<AppError>>,
    feed: ChangeFeed,
    clock: Clock,
    _collection: PhantomData<fn() -> T>,
}

impl<T: Record> MemoryStore<T> {
    pub fn new(feed: ChangeFeed) -> Self {
        MemoryStore {
            rows: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            feed,
            clock: Clock::default(),
            _collection: PhantomData,
        }
    }

    /// The next call (of any kind) fails with `error` and changes nothing.
    pub fn fail_next(&self, error: AppError) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    /// Shorthand for a connectivity failure on the next call.
    pub fn fail_next_unavailable(&self) {
        self.fail_next(AppError::new(REMOTE_UNAVAILABLE, "The service could not be reached"));
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn take_failure(&self) -> AppResult<()> {
        let next = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn publish(&self, kind: EventKind, new: Option<Value>, old: Option<Value>) {
        let table = T::COLLECTION.table();
        self.feed.publish(WirePayload::new(table, kind, new, old));
    }
}

fn owned_by(row: &Map<String, Value>, column: &str, owner_id: &str) -> bool {
    row.get(column).and_then(Value::as_str) == Some(owner_id)
}

fn row_id(row: &Map<String, Value>) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn created_at(row: &Map<String, Value>) -> i64 {
    row.get("created_at").and_then(Value::as_i64).unwrap_or(0)
}

#[async_trait]
impl<T: Record> RemoteStore<T> for MemoryStore<T> {
    async fn fetch_all(&self, owner_id: &str) -> AppResult<Vec<T>> {
        self.take_failure()?;
        let column = T::COLLECTION.owner_column();
        let mut owned: Vec<Map<String, Value>> = {
            let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
            rows.iter()
                .filter(|row| owned_by(row, column, owner_id))
                .cloned()
                .collect()
        };
        owned.sort_by(|a, b| {
            created_at(b)
                .cmp(&created_at(a))
                .then_with(|| row_id(b).cmp(&row_id(a)))
        });
        owned
            .into_iter()
            .map(|row| decode_row(Value::Object(row)))
            .collect()
    }

    async fn insert(&self, owner_id: &str, fields: NormalizedRecord) -> AppResult<T> {
        self.take_failure()?;
        check_columns(T::COLLECTION, &fields)?;
        let id = new_uuid_v7();
        let row = new_row(T::COLLECTION, &id, owner_id, fields, self.clock.tick());
        let entity: T = check_row(&row)?;
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(row.clone());
        info!(
            target: "hearthkeep",
            event = "remote_insert",
            store = "memory",
            collection = T::COLLECTION.as_str(),
            id = %id
        );
        self.publish(EventKind::Created, Some(Value::Object(row)), None);
        Ok(entity)
    }

    async fn update(&self, id: &str, patch: NormalizedRecord) -> AppResult<T> {
        self.take_failure()?;
        check_columns(T::COLLECTION, &patch)?;
        let (old, new, entity) = {
            let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
            let slot = rows
                .iter_mut()
                .find(|row| row_id(row) == Some(id))
                .ok_or_else(|| not_found(T::COLLECTION, id))?;
            let mut next = slot.clone();
            for (column, value) in patch.into_map() {
                next.insert(column, value);
            }
            next.insert("updated_at".into(), Value::from(self.clock.tick()));
            let entity: T = check_row(&next)?;
            let old = std::mem::replace(slot, next.clone());
            (old, next, entity)
        };
        info!(
            target: "hearthkeep",
            event = "remote_update",
            store = "memory",
            collection = T::COLLECTION.as_str(),
            id = %id
        );
        self.publish(
            EventKind::Updated,
            Some(Value::Object(new)),
            Some(Value::Object(old)),
        );
        Ok(entity)
    }

    async fn remove(&self, id: &str) -> AppResult<()> {
        self.take_failure()?;
        let old = {
            let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
            let idx = rows
                .iter()
                .position(|row| row_id(row) == Some(id))
                .ok_or_else(|| not_found(T::COLLECTION, id))?;
            rows.remove(idx)
        };
        info!(
            target: "hearthkeep",
            event = "remote_remove",
            store = "memory",
            collection = T::COLLECTION.as_str(),
            id = %id
        );
        self.publish(EventKind::Deleted, None, Some(Value::Object(old)));
        Ok(())
    }
}
