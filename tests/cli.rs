#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;

use anyhow::Result;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::tempdir;

use hearthkeep_lib::{Home, Paint};

fn hearthkeep(db: &Path) -> Result<Command> {
    let mut cmd = Command::cargo_bin("hearthkeep")?;
    cmd.env("HEARTHKEEP_LOG", "hearthkeep=warn")
        .env_remove("HEARTHKEEP_LOG_DIR")
        .arg("--db")
        .arg(db);
    Ok(cmd)
}

#[test]
fn db_migrate_then_status_reports_every_migration_applied() -> Result<()> {
    let tmp = tempdir()?;
    let db = tmp.path().join("nested").join("hearthkeep.sqlite3");

    let output = hearthkeep(&db)?.args(["db", "migrate"]).output()?;
    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(db.exists());

    let output = hearthkeep(&db)?.args(["db", "status", "--json"]).output()?;
    assert!(output.status.success());
    let entries: Vec<Value> = serde_json::from_slice(&output.stdout)?;
    assert_eq!(entries.len(), hearthkeep_lib::migrate::MIGRATIONS.len());
    assert!(entries.iter().all(|e| e["applied_at"].is_i64()));
    Ok(())
}

#[test]
fn add_update_list_and_remove_through_the_cli() -> Result<()> {
    let tmp = tempdir()?;
    let db = tmp.path().join("hearthkeep.sqlite3");

    let output = hearthkeep(&db)?
        .args(["add", "homes", "--owner", "u1", "--field", "name=Lake House"])
        .output()?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let home: Home = serde_json::from_slice(&output.stdout)?;
    assert_eq!(home.name, "Lake House");

    let output = hearthkeep(&db)?
        .args(["add", "paints", "--owner", home.id.as_str()])
        .args(["--field", "room=Kitchen", "--field", "color_name=Chalk"])
        .args(["--field", "hex=#F2EEE3"])
        .output()?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let paint: Paint = serde_json::from_slice(&output.stdout)?;

    let output = hearthkeep(&db)?
        .args(["update", "paints", paint.id.as_str(), "--owner", home.id.as_str()])
        .args(["--field", "finish=eggshell"])
        .output()?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let output = hearthkeep(&db)?
        .args(["list", "paints", "--owner", home.id.as_str(), "--json"])
        .output()?;
    assert!(output.status.success());
    let paints: Vec<Paint> = serde_json::from_slice(&output.stdout)?;
    assert_eq!(paints.len(), 1);
    assert_eq!(paints[0].finish.as_deref(), Some("eggshell"));

    let output = hearthkeep(&db)?
        .args(["remove", "paints", paint.id.as_str(), "--owner", home.id.as_str()])
        .output()?;
    assert!(output.status.success());

    let output = hearthkeep(&db)?
        .args(["list", "paints", "--owner", home.id.as_str(), "--json"])
        .output()?;
    let paints: Vec<Paint> = serde_json::from_slice(&output.stdout)?;
    assert!(paints.is_empty());
    Ok(())
}

#[test]
fn invalid_input_exits_with_validation_code() -> Result<()> {
    let tmp = tempdir()?;
    let db = tmp.path().join("hearthkeep.sqlite3");

    let output = hearthkeep(&db)?
        .args(["validate", "paints", "--field", "room=Hall", "--field", "color_name=Chalk"])
        .args(["--field", "hex=FFFFFF"])
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    let body: Value = serde_json::from_slice(&output.stdout)?;
    assert!(body["errors"]["hex"].is_string());
    assert!(!db.exists(), "validate must not touch the database");

    let output = hearthkeep(&db)?
        .args(["add", "homes", "--owner", "u1", "--field", "name=   "])
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    let body: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(body["error"]["code"], "VALIDATION/FIELDS");
    Ok(())
}

#[test]
fn removing_an_unknown_row_fails() -> Result<()> {
    let tmp = tempdir()?;
    let db = tmp.path().join("hearthkeep.sqlite3");

    let output = hearthkeep(&db)?
        .args(["remove", "homes", "nope", "--owner", "u1"])
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    let body: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(body["error"]["code"], "CACHE/NOT_FOUND");
    Ok(())
}
