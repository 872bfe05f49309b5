//! Owner-scoped CRUD adapters over row-oriented tables.
//!
//! Every successful mutation is published on the store's [`ChangeFeed`]
//! after it is durable, in the wire shape subscribers parse.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult, REMOTE_CONSTRAINT, REMOTE_DECODE, REMOTE_NOT_FOUND};
use crate::model::{Collection, Record};
use crate::time::now_ms;
use crate::validation::NormalizedRecord;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub const REMOTE_INVALID_COLUMN: &str = "REMOTE/INVALID_COLUMN";

#[async_trait]
pub trait RemoteStore<T: Record>: Send + Sync {
    /// All rows owned by `owner_id`, newest first.
    async fn fetch_all(&self, owner_id: &str) -> AppResult<Vec<T>>;

    /// Creates a row; the store assigns id and timestamps.
    async fn insert(&self, owner_id: &str, fields: NormalizedRecord) -> AppResult<T>;

    /// Patches the named business fields of an existing row.
    async fn update(&self, id: &str, patch: NormalizedRecord) -> AppResult<T>;

    /// Deletes a row. A missing row is an error, not a silent success.
    async fn remove(&self, id: &str) -> AppResult<()>;
}

/// Strictly increasing millisecond stamps, so `created_at DESC` is a total
/// order even for rows written within the same millisecond.
#[derive(Debug, Default)]
pub(crate) struct Clock {
    last: AtomicI64,
}

impl Clock {
    pub(crate) fn tick(&self) -> i64 {
        let now = now_ms();
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Rejects columns the collection does not let callers write.
pub(crate) fn check_columns(collection: Collection, fields: &NormalizedRecord) -> AppResult<()> {
    let allowed = collection.writable_columns();
    for (column, _) in fields.iter() {
        if !allowed.contains(&column.as_str()) {
            return Err(AppError::new(
                REMOTE_INVALID_COLUMN,
                "Field is not writable on this collection",
            )
            .with_context("collection", collection.as_str())
            .with_context("column", column.clone()));
        }
    }
    Ok(())
}

/// Full row for a new record: store-managed columns plus the given fields.
pub(crate) fn new_row(
    collection: Collection,
    id: &str,
    owner_id: &str,
    fields: NormalizedRecord,
    now: i64,
) -> Map<String, Value> {
    let mut row = fields.into_map();
    row.insert("id".into(), Value::from(id));
    row.insert(collection.owner_column().into(), Value::from(owner_id));
    row.insert("created_at".into(), Value::from(now));
    row.insert("updated_at".into(), Value::from(now));
    row
}

pub(crate) fn decode_row<T: Record>(row: Value) -> AppResult<T> {
    serde_json::from_value(row).map_err(|err| {
        AppError::new(REMOTE_DECODE, "Stored row does not match the collection shape")
            .with_context("collection", T::COLLECTION.as_str())
            .with_cause(AppError::from(err))
    })
}

/// Decodes a row that is about to be written; a mismatch means a required
/// column is missing or null.
pub(crate) fn check_row<T: Record>(row: &Map<String, Value>) -> AppResult<T> {
    serde_json::from_value(Value::Object(row.clone())).map_err(|err| {
        AppError::new(REMOTE_CONSTRAINT, "Row violates the collection's required fields")
            .with_context("collection", T::COLLECTION.as_str())
            .with_cause(AppError::from(err))
    })
}

pub(crate) fn not_found(collection: Collection, id: &str) -> AppError {
    AppError::new(REMOTE_NOT_FOUND, "Record not found")
        .with_context("collection", collection.as_str())
        .with_context("id", id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clock_is_strictly_increasing() {
        let clock = Clock::default();
        let mut prev = clock.tick();
        for _ in 0..1000 {
            let next = clock.tick();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn store_managed_columns_are_not_writable() {
        let fields: NormalizedRecord = match json!({ "home_id": "other" }) {
            Value::Object(map) => map.into(),
            _ => unreachable!(),
        };
        let err = check_columns(Collection::Paints, &fields).expect_err("owner is store-managed");
        assert_eq!(err.code(), REMOTE_INVALID_COLUMN);
        assert_eq!(err.context().get("column").map(String::as_str), Some("home_id"));
    }
}
