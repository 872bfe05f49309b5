use std::marker::PhantomData;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqliteConnection, SqlitePool, TypeInfo, ValueRef};
use tracing::info;

use super::{check_columns, check_row, decode_row, new_row, not_found, Clock, RemoteStore};
use crate::db::run_in_tx;
use crate::error::{AppError, AppResult};
use crate::event::{EventKind, WirePayload};
use crate::feed::ChangeFeed;
use crate::id::new_uuid_v7;
use crate::model::Record;
use crate::validation::NormalizedRecord;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Table adapter over the app's SQLite database.
pub struct SqliteStore<T> {
    pool: SqlitePool,
    feed: ChangeFeed,
    clock: Clock,
    _collection: PhantomData<fn() -> T>,
}

impl<T: Record> SqliteStore<T> {
    pub fn new(pool: SqlitePool, feed: ChangeFeed) -> Self {
        SqliteStore {
            pool,
            feed,
            clock: Clock::default(),
            _collection: PhantomData,
        }
    }

    fn publish(&self, kind: EventKind, new: Option<Value>, old: Option<Value>) {
        let table = T::COLLECTION.table();
        self.feed.publish(WirePayload::new(table, kind, new, old));
    }
}

/// Reads a row back into column -> value form. Every column in these tables
/// is TEXT or INTEGER, so the runtime storage class picks the decoder.
fn row_to_map(row: &SqliteRow) -> Result<Map<String, Value>, sqlx::Error> {
    let mut map = Map::new();
    for col in row.columns() {
        let idx = col.ordinal();
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else if raw.type_info().name() == "INTEGER" {
            Value::from(row.try_get::<i64, _>(idx)?)
        } else {
            Value::from(row.try_get::<String, _>(idx)?)
        };
        map.insert(col.name().to_string(), value);
    }
    Ok(map)
}

/// Binds one field of a validated row: text, a whole number, or null.
fn bind_field<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::String(text) => query.bind(text.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(whole) => query.bind(whole),
            None => query.bind(n.to_string()),
        },
        _ => query.bind(Option::<String>::None),
    }
}

async fn select_by_id(
    conn: &mut SqliteConnection,
    table: &str,
    id: &str,
) -> Result<Option<Map<String, Value>>, sqlx::Error> {
    let sql = format!("SELECT * FROM {table} WHERE id = ?");
    match sqlx::query(&sql).bind(id).fetch_optional(conn).await? {
        Some(row) => row_to_map(&row).map(Some),
        None => Ok(None),
    }
}

fn with_context(err: AppError, operation: &str, table: &str, id: Option<&str>) -> AppError {
    let err = err
        .with_context("operation", operation.to_string())
        .with_context("table", table.to_string());
    match id {
        Some(id) => err.with_context("id", id.to_string()),
        None => err,
    }
}

#[async_trait]
impl<T: Record> RemoteStore<T> for SqliteStore<T> {
    async fn fetch_all(&self, owner_id: &str) -> AppResult<Vec<T>> {
        let collection = T::COLLECTION;
        let table = collection.table();
        let sql = format!(
            "SELECT * FROM {table} WHERE {} = ? ORDER BY created_at DESC, id DESC",
            collection.owner_column()
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| {
                with_context(AppError::from(err), "fetch_all", table, None)
                    .with_context("owner_id", owner_id.to_string())
            })?;
        rows.iter()
            .map(|row| {
                let map = row_to_map(row)
                    .map_err(|err| with_context(AppError::from(err), "fetch_all", table, None))?;
                decode_row(Value::Object(map))
            })
            .collect()
    }

    async fn insert(&self, owner_id: &str, fields: NormalizedRecord) -> AppResult<T> {
        let collection = T::COLLECTION;
        let table = collection.table();
        check_columns(collection, &fields)?;
        let id = new_uuid_v7();
        let row = new_row(collection, &id, owner_id, fields, self.clock.tick());
        let entity: T = check_row(&row)?;

        let cols: Vec<String> = row.keys().cloned().collect();
        let placeholders: Vec<&str> = cols.iter().map(|_| "?").collect();
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            cols.join(","),
            placeholders.join(",")
        );
        let mut query = sqlx::query(&sql);
        for value in row.values() {
            query = bind_field(query, value);
        }
        query
            .execute(&self.pool)
            .await
            .map_err(|err| with_context(AppError::from(err), "insert", table, Some(&id)))?;

        info!(
            target: "hearthkeep",
            event = "remote_insert",
            store = "sqlite",
            collection = collection.as_str(),
            id = %id
        );
        self.publish(EventKind::Created, Some(Value::Object(row)), None);
        Ok(entity)
    }

    async fn update(&self, id: &str, patch: NormalizedRecord) -> AppResult<T> {
        let collection = T::COLLECTION;
        let table = collection.table();
        check_columns(collection, &patch)?;
        let now = self.clock.tick();
        let owned_id = id.to_string();

        let (old, new, entity) = run_in_tx(&self.pool, move |tx| {
            async move {
                let old = select_by_id(&mut **tx, table, &owned_id)
                    .await?
                    .ok_or_else(|| not_found(collection, &owned_id))?;

                let mut next = old.clone();
                let mut cols: Vec<String> = Vec::new();
                for (column, value) in patch.into_map() {
                    cols.push(column.clone());
                    next.insert(column, value);
                }
                next.insert("updated_at".into(), Value::from(now));
                cols.push("updated_at".into());
                let entity: T = check_row(&next)?;

                let set_clause: Vec<String> = cols.iter().map(|c| format!("{c} = ?")).collect();
                let sql = format!("UPDATE {table} SET {} WHERE id = ?", set_clause.join(","));
                let mut query = sqlx::query(&sql);
                for c in &cols {
                    let value = next.get(c).unwrap_or(&Value::Null);
                    query = bind_field(query, value);
                }
                query.bind(owned_id.clone()).execute(&mut **tx).await?;

                Ok::<_, AppError>((Value::Object(old), Value::Object(next), entity))
            }
            .boxed()
        })
        .await
        .map_err(|err| with_context(err, "update", table, Some(id)))?;

        info!(
            target: "hearthkeep",
            event = "remote_update",
            store = "sqlite",
            collection = collection.as_str(),
            id = %id
        );
        self.publish(EventKind::Updated, Some(new), Some(old));
        Ok(entity)
    }

    async fn remove(&self, id: &str) -> AppResult<()> {
        let collection = T::COLLECTION;
        let table = collection.table();
        let owned_id = id.to_string();

        let old = run_in_tx(&self.pool, move |tx| {
            async move {
                let old = select_by_id(&mut **tx, table, &owned_id)
                    .await?
                    .ok_or_else(|| not_found(collection, &owned_id))?;
                let sql = format!("DELETE FROM {table} WHERE id = ?");
                sqlx::query(&sql)
                    .bind(owned_id.clone())
                    .execute(&mut **tx)
                    .await?;
                Ok::<_, AppError>(Value::Object(old))
            }
            .boxed()
        })
        .await
        .map_err(|err| with_context(err, "remove", table, Some(id)))?;

        info!(
            target: "hearthkeep",
            event = "remote_remove",
            store = "sqlite",
            collection = collection.as_str(),
            id = %id
        );
        self.publish(EventKind::Deleted, None, Some(old));
        Ok(())
    }
}
