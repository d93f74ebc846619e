use crate::core::favourites::error::StoreError;
use crate::core::favourites::{FavouriteDoc, FavouriteRecord};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const USERS_COLLECTION: &str = "users";
pub const FAVOURITES_COLLECTION: &str = "favourites";

/// `users/{uid}/favourites/{key}`
pub fn favourite_path(uid: &str, key: &str) -> String {
    format!("{USERS_COLLECTION}/{uid}/{FAVOURITES_COLLECTION}/{key}")
}

/// One delivery of a live feed: the complete, newest first list of a
/// user's favourites, or the failure that interrupted it
pub type Snapshot = Result<Vec<FavouriteDoc>, StoreError>;

/// A live feed of one user's favourites. Dropping it closes the feed
/// at the store.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Snapshot>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Snapshot>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Next full snapshot, `None` once the feed has ended
    pub async fn next(&mut self) -> Option<Snapshot> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            snapshot = self.rx.recv() => snapshot,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Per-user favourites persistence. Documents are keyed by place key,
/// so writes are idempotent and a place is stored at most once.
/// Failures are returned as is, retrying is up to the caller.
#[async_trait]
pub trait FavouriteStore: Send + Sync {
    /// Writes with merge semantics, stamping the server creation time
    async fn upsert(&self, uid: &str, record: &FavouriteRecord) -> Result<(), StoreError>;

    /// Deleting a missing document is not an error
    async fn remove(&self, uid: &str, key: &str) -> Result<(), StoreError>;

    async fn exists(&self, uid: &str, key: &str) -> Result<bool, StoreError>;

    /// Opens a live feed, ordered by server creation time descending
    async fn subscribe(&self, uid: &str) -> Result<Subscription, StoreError>;
}
