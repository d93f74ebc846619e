use crate::core::favourites::error::{FavouriteError, StoreError};
use crate::core::favourites::{
    EventBus, FailedToggle, FavouriteCache, FavouriteDoc, FavouriteRecord, FavouritesEvent,
    HEART_LABEL, HEART_UNSAVEABLE_TIP, HeartControl, HeartRegistry, HeartState, KeyedLocks,
    MapSourceBinder, ToggleIntent,
};
use crate::core::identity::Identity;
use crate::core::map::MapSurface;
use crate::core::places::{Place, PlaceInput};
use crate::core::stores::{FavouriteStore, Subscription};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome {
    Added,
    Removed,
    /// Nothing changed, the user has to sign in first
    SignInRequired,
    /// The store refused the change and local state was restored
    RolledBack(FailedToggle),
    /// The store refused the change, but a newer intent for the same
    /// place or another identity owns the state now, so nothing was restored
    Superseded(FailedToggle),
}

enum Session {
    SignedOut,
    SignedIn {
        identity: Identity,
        /// Stamps the live feed and in-flight toggles of this session
        epoch: u64,
        cancel: CancellationToken,
    },
}

/// Toggles of one key still waiting on the store
struct PendingToggle {
    /// Newest op for the key
    op: u64,
    /// What the store last confirmed for the key, restored on failure
    restore: Option<FavouriteRecord>,
}

struct SyncState {
    session: Session,
    cache: FavouriteCache,
    pending: HashMap<String, PendingToggle>,
    next_op: u64,
    next_epoch: u64,
}

impl SyncState {
    fn signed_in(&self) -> Option<(String, u64)> {
        match &self.session {
            Session::SignedIn {
                identity, epoch, ..
            } => Some((identity.uid.clone(), *epoch)),
            Session::SignedOut => None,
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        matches!(&self.session, Session::SignedIn { epoch: current, .. } if *current == epoch)
    }
}

/// Keeps the local cache, the remote favourites, the map source and
/// every heart control consistent for the signed in identity.
///
/// All mutation of the cache and the hearts goes through here. Local
/// changes are applied optimistically and rolled back when the store
/// refuses them; each snapshot from the live feed replaces local state.
pub struct SyncController {
    store: Arc<dyn FavouriteStore>,
    binder: MapSourceBinder,
    hearts: HeartRegistry,
    bus: EventBus,
    locks: KeyedLocks,
    state: Mutex<SyncState>,
}

impl SyncController {
    pub fn new(store: Arc<dyn FavouriteStore>, binder: MapSourceBinder, bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            store,
            binder,
            hearts: HeartRegistry::default(),
            bus,
            locks: KeyedLocks::default(),
            state: Mutex::new(SyncState {
                session: Session::SignedOut,
                cache: FavouriteCache::default(),
                pending: HashMap::new(),
                next_op: 0,
                next_epoch: 0,
            }),
        })
    }

    pub fn events(&self) -> broadcast::Receiver<FavouritesEvent> {
        self.bus.subscribe()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn hearts(&self) -> &HeartRegistry {
        &self.hearts
    }

    pub fn identity(&self) -> Option<Identity> {
        match &self.state.lock().session {
            Session::SignedIn { identity, .. } => Some(identity.clone()),
            Session::SignedOut => None,
        }
    }

    /// Current favourites, newest first
    pub fn favourites(&self) -> Vec<FavouriteRecord> {
        self.state.lock().cache.values()
    }

    pub fn is_favourite(&self, key: &str) -> bool {
        self.state.lock().cache.has(key)
    }

    /// Follows the identity provider until its sender goes away
    pub fn bind_identity(
        self: &Arc<Self>,
        mut identities: watch::Receiver<Option<Identity>>,
    ) -> JoinHandle<()> {
        let controller = self.clone();

        tokio::spawn(async move {
            loop {
                let identity = identities.borrow_and_update().clone();
                controller.set_identity(identity).await;

                if identities.changed().await.is_err() {
                    debug!("Identity provider gone, stopping identity binding");
                    break;
                }
            }
        })
    }

    /// Moves to the given identity. A different identity always passes
    /// through signed out first so nothing leaks between accounts.
    #[instrument(skip_all, fields(uid = identity.as_ref().map(|i| i.uid.as_str())))]
    pub async fn set_identity(self: &Arc<Self>, identity: Option<Identity>) {
        let current = self.identity();
        let unchanged = match (&current, &identity) {
            (Some(a), Some(b)) => a.uid == b.uid,
            _ => false,
        };

        if unchanged {
            debug!("Identity unchanged, keeping favourites session");
            return;
        }

        self.enter_signed_out();

        if let Some(identity) = identity {
            self.enter_signed_in(identity).await;
        }
    }

    fn enter_signed_out(&self) {
        let mut state = self.state.lock();

        if let Session::SignedIn {
            identity, cancel, ..
        } = std::mem::replace(&mut state.session, Session::SignedOut)
        {
            cancel.cancel();
            info!("Closed favourites session for {}", identity.uid);
        }

        state.cache.clear();
        state.pending.clear();
        self.hearts.reset_all();
        self.push_items(&state);
        self.bus.publish(FavouritesEvent::Identity { identity: None });
    }

    async fn enter_signed_in(self: &Arc<Self>, identity: Identity) {
        let uid = identity.uid.clone();
        let (epoch, cancel) = {
            let mut state = self.state.lock();
            state.next_epoch += 1;
            let epoch = state.next_epoch;
            let cancel = CancellationToken::new();

            state.session = Session::SignedIn {
                identity: identity.clone(),
                epoch,
                cancel: cancel.clone(),
            };
            (epoch, cancel)
        };

        info!("Opened favourites session for {}", uid);
        self.bus.publish(FavouritesEvent::Identity {
            identity: Some(identity),
        });

        match self.store.subscribe(&uid).await {
            Ok(subscription) if !cancel.is_cancelled() => {
                self.spawn_feed(epoch, cancel, subscription);
            }
            Ok(_) => debug!("Session for {} closed while subscribing", uid),
            Err(err) => self.apply_feed_error(epoch, err),
        }
    }

    fn spawn_feed(self: &Arc<Self>, epoch: u64, cancel: CancellationToken, mut subscription: Subscription) {
        let controller = self.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = subscription.next() => match next {
                        Some(Ok(docs)) => controller.apply_snapshot(epoch, docs),
                        Some(Err(err)) => controller.apply_feed_error(epoch, err),
                        None => {
                            controller.apply_feed_error(epoch, StoreError::Closed);
                            break;
                        }
                    }
                }
            }
        });
    }

    fn apply_snapshot(&self, epoch: u64, docs: Vec<FavouriteDoc>) {
        let mut state = self.state.lock();
        if !state.is_current(epoch) {
            debug!("Dropping favourites snapshot of a closed session");
            return;
        }

        let total = docs.len();
        let records: Vec<FavouriteRecord> =
            docs.into_iter().filter_map(FavouriteDoc::into_record).collect();

        if records.len() < total {
            warn!(
                "Skipped {} favourites without a usable key",
                total - records.len()
            );
        }

        state.cache.replace(records);
        self.hearts.refresh(|key| state.cache.has(key));
        self.push_items(&state);
        debug!("Applied favourites snapshot with {} items", state.cache.len());
    }

    fn apply_feed_error(&self, epoch: u64, err: StoreError) {
        let mut state = self.state.lock();
        if !state.is_current(epoch) {
            return;
        }

        if err.is_permission() {
            error!("Favourites feed refused, verify you are signed in: {}", err);
        } else {
            error!("Favourites feed failed: {}", err);
        }

        state.cache.clear();
        self.hearts.reset_all();
        self.push_items(&state);
        drop(state);

        self.bus.publish(FavouritesEvent::FeedFailed(err));
    }

    /// Mirrors the cache into the map source and tells listeners
    fn push_items(&self, state: &SyncState) {
        let items = state.cache.values();
        self.binder.push(&items);
        self.bus.publish(FavouritesEvent::Changed {
            items: Arc::new(items),
        });
    }

    fn request_sign_in(&self) -> ToggleOutcome {
        info!("Sign in required to save favourites");
        self.bus.publish(FavouritesEvent::SignInRequested);
        ToggleOutcome::SignInRequired
    }

    /// Hooks a heart control up to a place. Returns the resolved place
    /// to toggle on activation, or `None` when the control was disabled
    /// because the place cannot be saved.
    pub fn mount_heart(&self, control: Arc<dyn HeartControl>, input: &PlaceInput) -> Option<Place> {
        let place = match input.resolve() {
            Some(place) if place.valid_coordinates().is_some() => place,
            _ => {
                control.disable(HEART_UNSAVEABLE_TIP);
                return None;
            }
        };

        control.set_label(HEART_LABEL);

        let state = self.state.lock();
        self.hearts.register(&place.key, control.clone());
        control.render(HeartState::new(state.cache.has(&place.key)));

        Some(place)
    }

    /// The map became ready, bring it up to date
    pub fn attach_map(&self, surface: Arc<dyn MapSurface>) {
        self.binder.slot().attach(surface);
        let state = self.state.lock();
        self.binder.push(&state.cache.values());
    }

    pub async fn toggle_input(&self, input: &PlaceInput) -> Result<ToggleOutcome, FavouriteError> {
        let place = input.resolve().ok_or(FavouriteError::MissingKey)?;
        self.toggle(&place).await
    }

    /// Heart activation: flips the favourite state of `place`
    pub async fn toggle(&self, place: &Place) -> Result<ToggleOutcome, FavouriteError> {
        let favourite = {
            let state = self.state.lock();
            if state.signed_in().is_none() {
                drop(state);
                return Ok(self.request_sign_in());
            }
            !state.cache.has(&place.key)
        };

        self.set_favourite(place, favourite).await
    }

    /// Tries a rolled back change again
    pub async fn retry(&self, failed: &FailedToggle) -> Result<ToggleOutcome, FavouriteError> {
        self.set_favourite(&failed.place, failed.intent.favourite())
            .await
    }

    #[instrument(skip_all, fields(key = %place.key, favourite = favourite))]
    pub async fn set_favourite(
        &self,
        place: &Place,
        favourite: bool,
    ) -> Result<ToggleOutcome, FavouriteError> {
        let intent = if favourite {
            ToggleIntent::Add
        } else {
            ToggleIntent::Remove
        };

        if favourite && place.valid_coordinates().is_none() {
            return Err(FavouriteError::MissingCoordinates(place.key.clone()));
        }

        let (uid, epoch, op, record) = {
            let mut state = self.state.lock();
            let Some((uid, epoch)) = state.signed_in() else {
                drop(state);
                return Ok(self.request_sign_in());
            };

            let previous = state.cache.get(&place.key).cloned();
            let record = if favourite {
                let mut record = FavouriteRecord::from_place(place);
                if let Some(prev) = &previous {
                    record.server_created_at = prev.server_created_at;
                    record.client_created_at = prev.client_created_at.or(record.client_created_at);
                }
                state.cache.set(place.key.clone(), record.clone());
                Some(record)
            } else {
                state.cache.delete(&place.key);
                None
            };

            // an earlier in-flight toggle already holds the confirmed state
            let restore = match state.pending.get(&place.key) {
                Some(pending) => pending.restore.clone(),
                None => previous,
            };

            state.next_op += 1;
            let op = state.next_op;
            state
                .pending
                .insert(place.key.clone(), PendingToggle { op, restore });

            self.hearts.set_all(&place.key, favourite);
            self.push_items(&state);

            (uid, epoch, op, record)
        };

        let result = {
            let _guard = self.locks.lock(&place.key).await;
            match &record {
                Some(record) => self.store.upsert(&uid, record).await,
                None => self.store.remove(&uid, &place.key).await,
            }
        };

        let mut state = self.state.lock();
        let current = state.is_current(epoch);
        let latest = current && state.pending.get(&place.key).is_some_and(|p| p.op == op);
        let restore = if latest {
            state.pending.remove(&place.key).and_then(|p| p.restore)
        } else {
            None
        };

        let error = match result {
            Ok(_) => {
                if current && !latest {
                    if let Some(newer) = state.pending.get_mut(&place.key) {
                        newer.restore = record.clone();
                    }
                }
                debug!("Favourite {} confirmed ({})", place.key, intent);
                return Ok(match intent {
                    ToggleIntent::Add => ToggleOutcome::Added,
                    ToggleIntent::Remove => ToggleOutcome::Removed,
                });
            }
            Err(error) => error,
        };

        if error.is_permission() {
            error!(
                "Favourite {} ({}) rejected by access rules, verify you are signed in: {}",
                place.key, intent, error
            );
        } else {
            error!("Favourite {} ({}) failed: {}", place.key, intent, error);
        }

        let failed = FailedToggle {
            place: place.clone(),
            intent,
            error,
        };

        if !latest {
            debug!("Newer state owns {}, not rolling back", place.key);
            return Ok(ToggleOutcome::Superseded(failed));
        }

        match restore {
            Some(restore) => {
                state.cache.set(place.key.clone(), restore);
            }
            None => {
                state.cache.delete(&place.key);
            }
        }

        self.hearts
            .set_all(&place.key, state.cache.has(&place.key));
        self.push_items(&state);
        drop(state);

        self.bus
            .publish(FavouritesEvent::ToggleFailed(failed.clone()));
        Ok(ToggleOutcome::RolledBack(failed))
    }

    /// Point read against the store for the signed in identity
    pub async fn is_saved_remotely(&self, key: &str) -> Result<Option<bool>, FavouriteError> {
        let Some((uid, _)) = self.state.lock().signed_in() else {
            return Ok(None);
        };

        Ok(Some(self.store.exists(&uid, key).await?))
    }

    /// Closes the live feed without touching local state
    pub fn shutdown(&self) {
        if let Session::SignedIn { cancel, .. } = &self.state.lock().session {
            cancel.cancel();
        }
    }
}
