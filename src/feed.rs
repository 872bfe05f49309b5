//! Live change feed shared by stores and subscribers.
//!
//! Delivery is best effort: a subscriber that falls more than the feed
//! capacity behind loses the overflow, and nothing is replayed after a
//! reconnect. A full fetch is the only consistency backstop.

use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::event::{parse_wire, ChangeEvent, IgnoreReason, WireOutcome, WirePayload};
use crate::model::Record;

pub const DEFAULT_FEED_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Arc<WirePayload>>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        ChangeFeed::new(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        ChangeFeed { tx }
    }

    /// Publishes to every live subscription and returns how many received it.
    pub fn publish(&self, payload: WirePayload) -> usize {
        let table = payload.table.clone();
        let kind = payload.event_type.clone();
        match self.tx.send(Arc::new(payload)) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!(
                    target: "hearthkeep",
                    event = "feed_publish_unobserved",
                    table = %table,
                    kind = %kind
                );
                0
            }
        }
    }

    /// Subscribes to collection `T`, restricted to rows owned by `owner_id`.
    pub fn subscribe<T: Record>(&self, owner_id: impl Into<String>) -> Subscription<T> {
        self.open(Some(owner_id.into()))
    }

    /// Subscribes to every row of collection `T`.
    pub fn subscribe_all<T: Record>(&self) -> Subscription<T> {
        self.open(None)
    }

    fn open<T: Record>(&self, owner_id: Option<String>) -> Subscription<T> {
        info!(
            target: "hearthkeep",
            event = "feed_subscribe",
            collection = T::COLLECTION.as_str(),
            owner_id = owner_id.as_deref()
        );
        Subscription {
            rx: Some(self.tx.subscribe()),
            owner_id,
            _collection: PhantomData,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A scoped, typed view of the feed. Dropping it (or calling
/// [`unsubscribe`](Self::unsubscribe)) releases the receiver; no event is
/// delivered afterwards.
pub struct Subscription<T> {
    rx: Option<broadcast::Receiver<Arc<WirePayload>>>,
    owner_id: Option<String>,
    _collection: PhantomData<fn() -> T>,
}

impl<T: Record> Subscription<T> {
    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }

    /// Waits for the next event in scope. `None` once the feed is closed or
    /// the subscription was released.
    pub async fn recv(&mut self) -> Option<ChangeEvent<T>> {
        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(payload) => {
                    if let Some(event) = self.accept(&payload) {
                        return Some(event);
                    }
                }
                Err(RecvError::Lagged(missed)) => self.log_lag(missed),
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Returns the next pending event in scope without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent<T>> {
        loop {
            let rx = self.rx.as_mut()?;
            match rx.try_recv() {
                Ok(payload) => {
                    if let Some(event) = self.accept(&payload) {
                        return Some(event);
                    }
                }
                Err(TryRecvError::Lagged(missed)) => self.log_lag(missed),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    pub fn unsubscribe(&mut self) {
        if self.rx.take().is_some() {
            info!(
                target: "hearthkeep",
                event = "feed_unsubscribe",
                collection = T::COLLECTION.as_str(),
                owner_id = self.owner_id.as_deref()
            );
        }
    }

    fn accept(&self, payload: &WirePayload) -> Option<ChangeEvent<T>> {
        match parse_wire::<T>(payload, self.owner_id.as_deref()) {
            WireOutcome::Event(event) => Some(event),
            WireOutcome::Ignored(IgnoreReason::OtherTable) => None,
            WireOutcome::Ignored(IgnoreReason::OtherOwner) => {
                debug!(
                    target: "hearthkeep",
                    event = "feed_event_out_of_scope",
                    collection = T::COLLECTION.as_str(),
                    owner_id = self.owner_id.as_deref()
                );
                None
            }
            WireOutcome::Ignored(reason) => {
                let detail = match &reason {
                    IgnoreReason::UnknownKind(kind) => kind.clone(),
                    IgnoreReason::Malformed(msg) => msg.clone(),
                    _ => String::new(),
                };
                warn!(
                    target: "hearthkeep",
                    event = "feed_event_ignored",
                    collection = T::COLLECTION.as_str(),
                    reason = reason.as_str(),
                    detail = %detail
                );
                None
            }
        }
    }

    fn log_lag(&self, missed: u64) {
        warn!(
            target: "hearthkeep",
            event = "feed_lagged",
            collection = T::COLLECTION.as_str(),
            owner_id = self.owner_id.as_deref(),
            missed
        );
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if self.rx.take().is_some() {
            debug!(target: "hearthkeep", event = "feed_subscription_dropped");
        }
    }
}
