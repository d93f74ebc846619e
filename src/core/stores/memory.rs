use crate::core::favourites::error::StoreError;
use crate::core::favourites::{FavouriteDoc, FavouriteRecord};
use crate::core::stores::{FavouriteStore, Snapshot, Subscription, favourite_path};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Feed {
    uid: String,
    tx: mpsc::UnboundedSender<Snapshot>,
    cancel: CancellationToken,
}

impl Feed {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }
}

/// In-process favourites store for development runs and tests. Behaves
/// like the document store (merge upserts, idempotent deletes, full
/// snapshots on every change) and can be told to fail or stall writes.
pub struct MemoryFavouriteStore {
    users: Mutex<HashMap<String, HashMap<String, FavouriteDoc>>>,
    feeds: Mutex<Vec<Feed>>,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
    /// Scripted results for the next writes, in order
    outcomes: Mutex<VecDeque<Result<(), StoreError>>>,
    subscribe_failure: Mutex<Option<StoreError>>,
    gate: watch::Sender<bool>,
    writes: AtomicUsize,
}

impl Default for MemoryFavouriteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFavouriteStore {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);

        Self {
            users: Mutex::new(HashMap::new()),
            feeds: Mutex::new(Vec::new()),
            last_stamp: Mutex::new(None),
            outcomes: Mutex::new(VecDeque::new()),
            subscribe_failure: Mutex::new(None),
            gate,
            writes: AtomicUsize::new(0),
        }
    }

    /// Strictly increasing server time, so ordering is stable in tests
    fn server_now(&self) -> DateTime<Utc> {
        let mut last = self.last_stamp.lock();
        let now = Utc::now();
        let stamp = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }

    /// The next write or delete fails with `err`
    pub fn fail_next(&self, err: StoreError) {
        self.outcomes.lock().push_back(Err(err));
    }

    /// Lets the next write through, so a later scripted failure skips it
    pub fn pass_next(&self) {
        self.outcomes.lock().push_back(Ok(()));
    }

    pub fn fail_subscribe(&self, err: StoreError) {
        *self.subscribe_failure.lock() = Some(err);
    }

    /// Holds every write and delete until [`Self::resume_writes`]
    pub fn pause_writes(&self) {
        self.gate.send_replace(false);
    }

    pub fn resume_writes(&self) {
        self.gate.send_replace(true);
    }

    /// Pushes a transport failure to every live feed of `uid`
    pub fn emit_error(&self, uid: &str, err: StoreError) {
        for feed in self.feeds.lock().iter().filter(|f| f.uid == uid) {
            let _ = feed.tx.send(Err(err.clone()));
        }
    }

    /// Ends every live feed of `uid` from the store side
    pub fn end_feeds(&self, uid: &str) {
        self.feeds.lock().retain(|feed| feed.uid != uid);
    }

    /// Stores a raw document, e.g. one written by an older client
    pub fn insert_doc(&self, uid: &str, id: &str, mut doc: FavouriteDoc) {
        doc.id = Some(id.to_string());
        let mut users = self.users.lock();
        users
            .entry(uid.to_string())
            .or_default()
            .insert(id.to_string(), doc);
        self.broadcast(uid, &users);
    }

    pub fn documents(&self, uid: &str) -> Vec<FavouriteDoc> {
        let users = self.users.lock();
        Self::ordered(users.get(uid))
    }

    pub fn doc(&self, uid: &str, key: &str) -> Option<FavouriteDoc> {
        self.users.lock().get(uid)?.get(key).cloned()
    }

    /// Full document paths held for `uid`
    pub fn paths(&self, uid: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .users
            .lock()
            .get(uid)
            .map(|docs| docs.keys().map(|k| favourite_path(uid, k)).collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    pub fn live_feeds(&self) -> usize {
        let mut feeds = self.feeds.lock();
        feeds.retain(Feed::is_live);
        feeds.len()
    }

    /// Writes and deletes that reached the store
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    fn ordered(docs: Option<&HashMap<String, FavouriteDoc>>) -> Vec<FavouriteDoc> {
        let mut docs: Vec<FavouriteDoc> = docs
            .map(|d| d.values().cloned().collect())
            .unwrap_or_default();
        docs.sort_by(|a, b| {
            b.server_created_at
                .cmp(&a.server_created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        docs
    }

    fn broadcast(&self, uid: &str, users: &HashMap<String, HashMap<String, FavouriteDoc>>) {
        let snapshot = Self::ordered(users.get(uid));
        let mut feeds = self.feeds.lock();
        feeds.retain(Feed::is_live);

        for feed in feeds.iter().filter(|f| f.uid == uid) {
            let _ = feed.tx.send(Ok(snapshot.clone()));
        }
    }

    async fn admit_write(&self) -> Result<(), StoreError> {
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        if let Some(Err(err)) = self.outcomes.lock().pop_front() {
            return Err(err);
        }

        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

fn merge(target: &mut FavouriteDoc, payload: FavouriteDoc) {
    if payload.key.is_some() {
        target.key = payload.key;
    }
    if payload.name.is_some() {
        target.name = payload.name;
    }
    if payload.address.is_some() {
        target.address = payload.address;
    }
    if payload.coords.is_some() {
        target.coords = payload.coords;
    }
    if payload.client_created_at.is_some() {
        target.client_created_at = payload.client_created_at;
    }
}

#[async_trait]
impl FavouriteStore for MemoryFavouriteStore {
    async fn upsert(&self, uid: &str, record: &FavouriteRecord) -> Result<(), StoreError> {
        self.admit_write().await?;

        let stamp = self.server_now();
        let mut users = self.users.lock();
        let doc = users
            .entry(uid.to_string())
            .or_default()
            .entry(record.key.clone())
            .or_insert_with(|| FavouriteDoc {
                id: Some(record.key.clone()),
                ..Default::default()
            });

        merge(doc, FavouriteDoc::from_record(record));
        doc.server_created_at = Some(stamp);

        debug!("Stored {}", favourite_path(uid, &record.key));
        self.broadcast(uid, &users);
        Ok(())
    }

    async fn remove(&self, uid: &str, key: &str) -> Result<(), StoreError> {
        self.admit_write().await?;

        let mut users = self.users.lock();
        let removed = users
            .get_mut(uid)
            .and_then(|docs| docs.remove(key))
            .is_some();

        if removed {
            debug!("Removed {}", favourite_path(uid, key));
            self.broadcast(uid, &users);
        }
        Ok(())
    }

    async fn exists(&self, uid: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .users
            .lock()
            .get(uid)
            .is_some_and(|docs| docs.contains_key(key)))
    }

    async fn subscribe(&self, uid: &str) -> Result<Subscription, StoreError> {
        if let Some(err) = self.subscribe_failure.lock().take() {
            return Err(err);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let users = self.users.lock();
        let _ = tx.send(Ok(Self::ordered(users.get(uid))));
        self.feeds.lock().push(Feed {
            uid: uid.to_string(),
            tx,
            cancel: cancel.clone(),
        });

        Ok(Subscription::new(rx, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::places::Coordinates;

    fn record(key: &str) -> FavouriteRecord {
        FavouriteRecord {
            key: key.into(),
            name: "Name".into(),
            address: "Address".into(),
            coordinates: Some(Coordinates::new(1.0, 2.0)),
            server_created_at: None,
            client_created_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryFavouriteStore::new();
        store.upsert("U1", &record("k")).await.unwrap();
        store.upsert("U1", &record("k")).await.unwrap();

        assert_eq!(store.paths("U1"), vec!["users/U1/favourites/k"]);
        assert!(store.exists("U1", "k").await.unwrap());
        assert!(!store.exists("U2", "k").await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_merges_fields() {
        let store = MemoryFavouriteStore::new();
        store.insert_doc(
            "U1",
            "k",
            FavouriteDoc {
                name: Some("Old".into()),
                lat: Some(2.0),
                lng: Some(1.0),
                ..Default::default()
            },
        );

        let mut update = record("k");
        update.name = "New".into();
        store.upsert("U1", &update).await.unwrap();

        let doc = store.doc("U1", "k").unwrap();
        assert_eq!(doc.name.as_deref(), Some("New"));
        assert_eq!(doc.lat, Some(2.0));
        assert!(doc.server_created_at.is_some());
    }

    #[tokio::test]
    async fn test_remove_missing_is_ok() {
        let store = MemoryFavouriteStore::new();
        store.remove("U1", "nothing").await.unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_applies_once() {
        let store = MemoryFavouriteStore::new();
        store.fail_next(StoreError::Unavailable("offline".into()));

        assert!(store.upsert("U1", &record("k")).await.is_err());
        assert!(store.upsert("U1", &record("k")).await.is_ok());
    }

    #[tokio::test]
    async fn test_subscription_delivers_full_snapshots() {
        let store = MemoryFavouriteStore::new();
        let mut sub = store.subscribe("U1").await.unwrap();
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        store.upsert("U1", &record("a")).await.unwrap();
        store.upsert("U1", &record("b")).await.unwrap();
        store.upsert("U2", &record("c")).await.unwrap();

        assert_eq!(sub.next().await.unwrap().unwrap().len(), 1);
        let snapshot = sub.next().await.unwrap().unwrap();
        let ids: Vec<_> = snapshot.iter().map(|d| d.id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        assert_eq!(store.live_feeds(), 1);
        drop(sub);
        assert_eq!(store.live_feeds(), 0);
    }
}
