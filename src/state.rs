use std::sync::Arc;

use sqlx::SqlitePool;

use crate::error::SyncResult;
use crate::feed::ChangeFeed;
use crate::model::{Appliance, Home, Paint, Record, Vendor};
use crate::remote::{MemoryStore, RemoteStore, SqliteStore};
use crate::session::CollectionSession;

/// Per-collection stores and the feed they publish to. Built once at start
/// up and passed to whatever needs it.
#[derive(Clone)]
pub struct AppState {
    pub feed: ChangeFeed,
    pub homes: Arc<dyn RemoteStore<Home>>,
    pub vendors: Arc<dyn RemoteStore<Vendor>>,
    pub paints: Arc<dyn RemoteStore<Paint>>,
    pub appliances: Arc<dyn RemoteStore<Appliance>>,
}

impl AppState {
    pub fn sqlite(pool: SqlitePool, feed: ChangeFeed) -> Self {
        AppState {
            homes: Arc::new(SqliteStore::<Home>::new(pool.clone(), feed.clone())),
            vendors: Arc::new(SqliteStore::<Vendor>::new(pool.clone(), feed.clone())),
            paints: Arc::new(SqliteStore::<Paint>::new(pool.clone(), feed.clone())),
            appliances: Arc::new(SqliteStore::<Appliance>::new(pool, feed.clone())),
            feed,
        }
    }

    pub fn in_memory() -> Self {
        let feed = ChangeFeed::default();
        AppState {
            homes: Arc::new(MemoryStore::<Home>::new(feed.clone())),
            vendors: Arc::new(MemoryStore::<Vendor>::new(feed.clone())),
            paints: Arc::new(MemoryStore::<Paint>::new(feed.clone())),
            appliances: Arc::new(MemoryStore::<Appliance>::new(feed.clone())),
            feed,
        }
    }

    async fn mount<T: Record>(
        &self,
        store: &Arc<dyn RemoteStore<T>>,
        owner_id: &str,
    ) -> SyncResult<CollectionSession<T>> {
        CollectionSession::mount(store.clone(), &self.feed, owner_id).await
    }

    pub async fn homes(&self, user_id: &str) -> SyncResult<CollectionSession<Home>> {
        self.mount(&self.homes, user_id).await
    }

    pub async fn vendors(&self, home_id: &str) -> SyncResult<CollectionSession<Vendor>> {
        self.mount(&self.vendors, home_id).await
    }

    pub async fn paints(&self, home_id: &str) -> SyncResult<CollectionSession<Paint>> {
        self.mount(&self.paints, home_id).await
    }

    pub async fn appliances(&self, home_id: &str) -> SyncResult<CollectionSession<Appliance>> {
        self.mount(&self.appliances, home_id).await
    }
}
