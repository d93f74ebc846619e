use crate::core::favourites::FavouriteRecord;
use crate::core::favourites::error::StoreError;
use crate::core::identity::Identity;
use crate::core::places::Place;
use std::sync::Arc;
use strum::Display;
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ToggleIntent {
    Add,
    Remove,
}

impl ToggleIntent {
    pub fn favourite(&self) -> bool {
        matches!(self, ToggleIntent::Add)
    }
}

/// A change that could not be persisted and was rolled back.
/// Hand it to [`crate::core::favourites::SyncController::retry`] to try again.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedToggle {
    pub place: Place,
    pub intent: ToggleIntent,
    pub error: StoreError,
}

/// Process wide notifications from the sync controller
#[derive(Debug, Clone)]
pub enum FavouritesEvent {
    /// The current favourites, newest first
    Changed { items: Arc<Vec<FavouriteRecord>> },
    /// Identity transition, `None` means sign in is required
    Identity { identity: Option<Identity> },
    /// A heart was used while signed out
    SignInRequested,
    ToggleFailed(FailedToggle),
    /// The live feed broke or ended; local favourites were cleared
    FeedFailed(StoreError),
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FavouritesEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Fire and forget, nobody listening is fine
    pub fn publish(&self, event: FavouritesEvent) {
        if self.tx.send(event).is_err() {
            trace!("No favourites event listeners");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FavouritesEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
