//! Data core for cataloguing homes and what is in them: paint colors,
//! vendors, appliances and their warranties.
//!
//! Each collection is read through an owner-scoped [`CollectionSession`]
//! that mirrors the store into a [`LocalCache`] and keeps it current from the
//! [`ChangeFeed`].

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod feed;
pub mod id;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod reconcile;
pub mod remote;
pub mod session;
pub mod state;
pub mod time;
pub mod validation;

pub use cache::LocalCache;
pub use config::Config;
pub use error::{AppError, AppResult, SyncError, SyncResult};
pub use event::{ChangeEvent, EventKind, WirePayload};
pub use feed::{ChangeFeed, Subscription};
pub use model::{Appliance, Collection, Home, Paint, Record, Vendor};
pub use reconcile::{reconcile, Applied};
pub use remote::{MemoryStore, RemoteStore, SqliteStore};
pub use session::CollectionSession;
pub use state::AppState;
pub use validation::{FieldErrors, NormalizedRecord, Schema};
