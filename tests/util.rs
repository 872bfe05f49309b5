#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use serde_json::{Map, Value};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use hearthkeep_lib::migrate;

pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect sqlite::memory:");
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await
        .unwrap();
    migrate::apply_migrations(&pool)
        .await
        .expect("apply migrations");
    pool
}

/// Builds raw form input from a `json!` object literal.
pub fn form(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("form fixture must be an object, got {other}"),
    }
}
