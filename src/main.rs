use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};

use hearthkeep_lib::{
    db, logging, migrate, AppError, AppState, ChangeFeed, Collection, CollectionSession, Config,
    Record, RemoteStore, SyncError,
};

const EXIT_VALIDATION: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "hearthkeep", about = "Home catalog maintenance and inspection", version)]
struct Cli {
    /// Database file; defaults to HEARTHKEEP_DB or the per-user data directory.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance commands.
    #[command(subcommand)]
    Db(DbCommand),
    /// List an owner's rows, newest first.
    List {
        collection: Collection,
        #[arg(long)]
        owner: String,
        /// Emit JSON instead of one line per row.
        #[arg(long)]
        json: bool,
    },
    /// Validate and insert a row.
    Add {
        collection: Collection,
        #[arg(long)]
        owner: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Validate and patch the given fields of a row.
    Update {
        collection: Collection,
        id: String,
        #[arg(long)]
        owner: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Delete a row.
    Remove {
        collection: Collection,
        id: String,
        #[arg(long)]
        owner: String,
    },
    /// Validate form input without touching the database.
    Validate {
        collection: Collection,
        #[command(flatten)]
        fields: FieldArgs,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply pending migrations.
    Migrate,
    /// Show which migrations are applied.
    Status {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
struct FieldArgs {
    /// Field value as key=value; repeatable.
    #[arg(long = "field", value_name = "KEY=VALUE", value_parser = parse_field)]
    fields: Vec<(String, String)>,
}

impl FieldArgs {
    fn to_map(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }
}

fn parse_field(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing field name in {raw:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

enum Action<'a> {
    List { json: bool },
    Add(&'a FieldArgs),
    Update(&'a str, &'a FieldArgs),
    Remove(&'a str),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    };
    if let Some(path) = cli.db.clone() {
        config.db_path = path;
    }
    let guard = match logging::init(&config) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    };

    let code = match run(cli.command, &config).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            1
        }
    };
    drop(guard);
    process::exit(code);
}

async fn run(command: Commands, config: &Config) -> Result<i32> {
    match command {
        Commands::Db(db_cmd) => handle_db(db_cmd, config).await,
        Commands::Validate { collection, fields } => Ok(handle_validate(collection, &fields)),
        Commands::List {
            collection,
            owner,
            json,
        } => with_state(config, collection, &owner, Action::List { json }).await,
        Commands::Add {
            collection,
            owner,
            fields,
        } => with_state(config, collection, &owner, Action::Add(&fields)).await,
        Commands::Update {
            collection,
            id,
            owner,
            fields,
        } => with_state(config, collection, &owner, Action::Update(&id, &fields)).await,
        Commands::Remove {
            collection,
            id,
            owner,
        } => with_state(config, collection, &owner, Action::Remove(&id)).await,
    }
}

async fn handle_db(command: DbCommand, config: &Config) -> Result<i32> {
    let pool = db::open_sqlite_pool(&config.db_path).await?;
    let result = match command {
        DbCommand::Migrate => migrate::apply_migrations(&pool)
            .await
            .context("apply migrations")
            .map(|_| {
                println!("Migrations applied to {}", config.db_path.display());
                0
            }),
        DbCommand::Status { json } => migrate::status(&pool).await.and_then(|entries| {
            if json {
                let payload: Vec<Value> = entries
                    .iter()
                    .map(|m| json!({ "version": m.version, "applied_at": m.applied_at }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for m in &entries {
                    let state = if m.applied_at.is_some() { "applied" } else { "pending" };
                    println!("{:<40} {state}", m.version);
                }
            }
            Ok(0)
        }),
    };
    pool.close().await;
    result
}

fn handle_validate(collection: Collection, fields: &FieldArgs) -> i32 {
    match collection.schema().validate(&fields.to_map()) {
        Ok(record) => {
            println!("{}", Value::Object(record.into_map()));
            0
        }
        Err(errors) => {
            println!("{}", json!({ "errors": errors }));
            EXIT_VALIDATION
        }
    }
}

async fn with_state(
    config: &Config,
    collection: Collection,
    owner: &str,
    action: Action<'_>,
) -> Result<i32> {
    let pool = db::open_sqlite_pool(&config.db_path).await?;
    migrate::apply_migrations(&pool)
        .await
        .context("apply migrations")?;
    let state = AppState::sqlite(pool.clone(), ChangeFeed::new(config.feed_capacity));
    let result = match collection {
        Collection::Homes => run_action(state.homes.clone(), &state.feed, owner, action).await,
        Collection::Vendors => run_action(state.vendors.clone(), &state.feed, owner, action).await,
        Collection::Paints => run_action(state.paints.clone(), &state.feed, owner, action).await,
        Collection::Appliances => {
            run_action(state.appliances.clone(), &state.feed, owner, action).await
        }
    };
    pool.close().await;
    result
}

async fn run_action<T: Record>(
    store: Arc<dyn RemoteStore<T>>,
    feed: &ChangeFeed,
    owner: &str,
    action: Action<'_>,
) -> Result<i32> {
    let mut session = match CollectionSession::mount(store, feed, owner).await {
        Ok(session) => session,
        Err(err) => return report(err),
    };
    let outcome = match action {
        Action::List { json } => {
            print_rows(session.entries(), json)?;
            Ok(())
        }
        Action::Add(fields) => session
            .create(&fields.to_map())
            .await
            .map(|entity| print_entity(&entity)),
        Action::Update(id, fields) => session
            .update(id, &fields.to_map())
            .await
            .map(|entity| print_entity(&entity)),
        Action::Remove(id) => session.delete(id).await.map(|_| println!("Removed {id}")),
    };
    session.close();
    match outcome {
        Ok(()) => Ok(0),
        Err(err) => report(err),
    }
}

fn report(err: SyncError) -> Result<i32> {
    let code = if matches!(err, SyncError::Validation(_)) {
        EXIT_VALIDATION
    } else {
        1
    };
    let app_error = AppError::from(err);
    println!("{}", serde_json::to_string(&json!({ "error": app_error }))?);
    Ok(code)
}

fn print_entity<T: Record>(entity: &T) {
    match serde_json::to_string(entity) {
        Ok(line) => println!("{line}"),
        Err(err) => eprintln!("Error: {}", AppError::from(err)),
    }
}

fn print_rows<T: Record>(rows: &[T], as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(rows)?);
        return Ok(());
    }
    let label_column = T::COLLECTION.writable_columns()[0];
    for row in rows {
        let value = serde_json::to_value(row)?;
        let label = value
            .get(label_column)
            .and_then(Value::as_str)
            .unwrap_or_default();
        println!("{}\t{label}", row.id());
    }
    Ok(())
}
