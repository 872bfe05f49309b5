//! One owner-scoped view of a collection, kept current by its subscription.
//!
//! A session subscribes before its first fetch so that no change landing
//! between the two is lost; events already reflected by the fetch are
//! absorbed by the reconciler. Writes go to the store first and are applied
//! locally only after the store accepted them.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::cache::LocalCache;
use crate::error::{AppError, SyncError, SyncResult};
use crate::event::ChangeEvent;
use crate::feed::{ChangeFeed, Subscription};
use crate::model::Record;
use crate::reconcile::Applied;
use crate::remote::RemoteStore;

pub struct CollectionSession<T: Record> {
    store: Arc<dyn RemoteStore<T>>,
    subscription: Subscription<T>,
    cache: LocalCache<T>,
}

fn log_remote_failure<T: Record>(operation: &'static str, owner_id: &str, err: &AppError) {
    warn!(
        target: "hearthkeep",
        event = "session_remote_error",
        collection = T::COLLECTION.as_str(),
        operation,
        owner_id = %owner_id,
        code = err.code(),
        error = %err
    );
}

impl<T: Record> CollectionSession<T> {
    /// Subscribes to `owner_id`'s rows and loads them. On a fetch failure the
    /// subscription is released and the error returned.
    pub async fn mount(
        store: Arc<dyn RemoteStore<T>>,
        feed: &ChangeFeed,
        owner_id: impl Into<String>,
    ) -> SyncResult<Self> {
        let owner_id = owner_id.into();
        let subscription = feed.subscribe::<T>(owner_id.clone());
        let mut session = CollectionSession {
            store,
            subscription,
            cache: LocalCache::new(owner_id),
        };
        session.refresh().await?;
        info!(
            target: "hearthkeep",
            event = "session_mounted",
            collection = T::COLLECTION.as_str(),
            owner_id = %session.owner_id(),
            rows = session.cache.len()
        );
        Ok(session)
    }

    pub fn owner_id(&self) -> &str {
        self.cache.owner_id()
    }

    pub fn cache(&self) -> &LocalCache<T> {
        &self.cache
    }

    pub fn entries(&self) -> &[T] {
        self.cache.entries()
    }

    pub fn get(&self, id: &str) -> SyncResult<&T> {
        self.cache.require(id)
    }

    /// Reloads from the store. The cache is only replaced on success.
    pub async fn refresh(&mut self) -> SyncResult<()> {
        match self.store.fetch_all(self.cache.owner_id()).await {
            Ok(rows) => {
                self.cache.replace_all(rows);
                Ok(())
            }
            Err(err) => {
                log_remote_failure::<T>("fetch_all", self.cache.owner_id(), &err);
                Err(SyncError::Remote(err))
            }
        }
    }

    /// Validates and inserts `raw`, then applies the new row locally.
    pub async fn create(&mut self, raw: &Map<String, Value>) -> SyncResult<T> {
        let fields = T::COLLECTION.schema().validate(raw)?;
        let entity = self
            .store
            .insert(self.cache.owner_id(), fields)
            .await
            .map_err(|err| {
                log_remote_failure::<T>("insert", self.cache.owner_id(), &err);
                SyncError::Remote(err)
            })?;
        self.cache.apply_local(&ChangeEvent::created(entity.clone()));
        Ok(entity)
    }

    /// Validates the fields present in `raw` and patches cached row `id`.
    /// Cross-field rules are checked against the cached row with the patch applied.
    pub async fn update(&mut self, id: &str, raw: &Map<String, Value>) -> SyncResult<T> {
        let current = match serde_json::to_value(self.cache.require(id)?) {
            Ok(Value::Object(row)) => row,
            Ok(_) => Map::new(),
            Err(err) => return Err(SyncError::Remote(AppError::from(err))),
        };
        let patch = T::COLLECTION.schema().validate_patch(raw, &current)?;
        let entity = self.store.update(id, patch).await.map_err(|err| {
            log_remote_failure::<T>("update", self.cache.owner_id(), &err);
            SyncError::Remote(err)
        })?;
        self.cache.apply_local(&ChangeEvent::updated(entity.clone()));
        Ok(entity)
    }

    pub async fn delete(&mut self, id: &str) -> SyncResult<()> {
        self.cache.require(id)?;
        self.store.remove(id).await.map_err(|err| {
            log_remote_failure::<T>("remove", self.cache.owner_id(), &err);
            SyncError::Remote(err)
        })?;
        self.cache.apply_local(&ChangeEvent::deleted(id));
        Ok(())
    }

    /// Applies every event already delivered. Returns how many changed the cache.
    pub fn pump(&mut self) -> usize {
        let mut changed = 0;
        while let Some(event) = self.subscription.try_recv() {
            if self.cache.apply(&event).changed() {
                changed += 1;
            }
        }
        changed
    }

    /// Waits for the next event and applies it. `None` once the feed is gone.
    pub async fn next_event(&mut self) -> Option<Applied> {
        let event = self.subscription.recv().await?;
        Some(self.cache.apply(&event))
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_active()
    }

    /// Releases the subscription and hands back the final cache.
    pub fn close(mut self) -> LocalCache<T> {
        self.subscription.unsubscribe();
        info!(
            target: "hearthkeep",
            event = "session_closed",
            collection = T::COLLECTION.as_str(),
            owner_id = %self.cache.owner_id()
        );
        self.cache
    }
}
