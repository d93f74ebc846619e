use crate::app::config::SyncConfig;
use crate::core::favourites::error::StoreError;
use crate::core::favourites::{FavouriteDoc, FavouriteRecord};
use crate::core::stores::{
    FAVOURITES_COLLECTION, FavouriteStore, Snapshot, Subscription, USERS_COLLECTION,
};
use anyhow::Error;
use async_trait::async_trait;
use firestore::{
    FirestoreDb, FirestoreDocument, FirestoreListenEvent, FirestoreListener, FirestoreListenerTarget,
    FirestoreMemListenStateStorage, FirestoreQueryDirection, FirestoreTransformServerValue,
    ParentPathBuilder,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const FIELD_SERVER_CREATED: &str = "serverCreatedAt";

/// Fields an upsert touches, anything else on the document is kept
const UPSERT_MASK: [&str; 5] = ["key", "name", "address", "coords", "clientCreatedAt"];

/// Favourites in Firestore under `users/{uid}/favourites/{key}`
pub struct FirestoreFavouriteStore {
    db: Arc<FirestoreDb>,
    backoff_min: Duration,
    backoff_max: Duration,
    next_target: AtomicU32,
}

impl FirestoreFavouriteStore {
    pub fn new(db: Arc<FirestoreDb>, config: &SyncConfig) -> Self {
        Self {
            db,
            backoff_min: config.listener_backoff_min,
            backoff_max: config.listener_backoff_max,
            next_target: AtomicU32::new(1),
        }
    }

    fn parent(db: &FirestoreDb, uid: &str) -> Result<ParentPathBuilder, StoreError> {
        Ok(db.parent_path(USERS_COLLECTION, uid)?)
    }

    async fn load(db: &FirestoreDb, uid: &str) -> Result<Vec<FavouriteDoc>, StoreError> {
        let parent = Self::parent(db, uid)?;

        let docs = db
            .fluent()
            .select()
            .from(FAVOURITES_COLLECTION)
            .parent(&parent)
            .order_by([(FIELD_SERVER_CREATED, FirestoreQueryDirection::Descending)])
            .query()
            .await
            .map_err(|e| {
                error!("Favourites query failed for {}: {} ({:?})", uid, e, e);
                e
            })?;

        let docs = decode_documents(docs);
        debug!("Loaded {} favourites for {}", docs.len(), uid);
        Ok(docs)
    }

    /// Registers a listen target on the user's favourites. Every change
    /// only marks the feed dirty, the feed task reloads the full list.
    async fn create_listener(
        db: &FirestoreDb,
        uid: &str,
        target: u32,
        dirty: mpsc::UnboundedSender<()>,
    ) -> Result<FirestoreListener<FirestoreDb, FirestoreMemListenStateStorage>, Error> {
        let parent = db.parent_path(USERS_COLLECTION, uid)?;
        let mut listener = db
            .create_listener(FirestoreMemListenStateStorage::new())
            .await?;

        db.fluent()
            .select()
            .from(FAVOURITES_COLLECTION)
            .parent(&parent)
            .listen()
            .add_target(FirestoreListenerTarget::new(target), &mut listener)?;

        listener
            .start(move |event| {
                let dirty = dirty.clone();
                async move {
                    match event {
                        FirestoreListenEvent::DocumentChange(_)
                        | FirestoreListenEvent::DocumentDelete(_)
                        | FirestoreListenEvent::DocumentRemove(_)
                        | FirestoreListenEvent::TargetChange(_) => {
                            let _ = dirty.send(());
                        }
                        _ => {}
                    }
                    Ok(())
                }
            })
            .await?;

        Ok(listener)
    }

    fn spawn_feed(
        &self,
        uid: String,
        tx: mpsc::UnboundedSender<Snapshot>,
        cancel: CancellationToken,
    ) {
        let db = self.db.clone();
        let target = self.next_target.fetch_add(1, Ordering::Relaxed);
        let min_backoff = self.backoff_min;
        let max_backoff = self.backoff_max;

        tokio::spawn(async move {
            let mut backoff = min_backoff;

            loop {
                let (dirty_tx, mut dirty_rx) = mpsc::unbounded_channel();

                let mut listener =
                    match Self::create_listener(&db, &uid, target, dirty_tx).await {
                        Ok(listener) => {
                            debug!("Favourites listener for {} is running", uid);
                            backoff = min_backoff;
                            listener
                        }
                        Err(err) => {
                            error!(
                                "Failed to start favourites listener for {}: {}, retrying in {:?}",
                                uid, err, backoff
                            );
                            let _ = tx.send(Err(StoreError::Unavailable(err.to_string())));

                            tokio::select! {
                                _ = cancel.cancelled() => return,
                                _ = tokio::time::sleep(backoff) => {}
                            }
                            backoff = (backoff * 2).min(max_backoff);
                            continue;
                        }
                    };

                // initial snapshot, the listener may stay quiet on an empty collection
                let mut refresh = true;

                loop {
                    if refresh {
                        // coalesce bursts of change events into one reload
                        while dirty_rx.try_recv().is_ok() {}

                        let snapshot = Self::load(&db, &uid).await;
                        if tx.send(snapshot).is_err() {
                            cancel.cancel();
                        }
                    }

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            if let Err(err) = listener.shutdown().await {
                                warn!("Favourites listener for {} did not shut down cleanly: {}", uid, err);
                            }
                            info!("Closed favourites feed for {}", uid);
                            return;
                        }
                        signal = dirty_rx.recv() => {
                            refresh = signal.is_some();
                            if !refresh {
                                break;
                            }
                        }
                    }
                }

                warn!("Favourites listener for {} stopped, restarting", uid);
                let _ = listener.shutdown().await;
            }
        });
    }
}

/// Decodes a query result one document at a time, so a single bad
/// document is skipped instead of failing the whole snapshot
fn decode_documents(docs: Vec<FirestoreDocument>) -> Vec<FavouriteDoc> {
    let mut results = Vec::with_capacity(docs.len());

    for doc in docs {
        match FirestoreDb::deserialize_doc_to::<FavouriteDoc>(&doc) {
            Ok(favourite) => results.push(favourite),
            Err(err) => warn!("Skipping malformed favourite {}: {}", doc.name, err),
        }
    }

    results
}

#[async_trait]
impl FavouriteStore for FirestoreFavouriteStore {
    #[instrument(skip_all, fields(uid = uid, key = %record.key))]
    async fn upsert(&self, uid: &str, record: &FavouriteRecord) -> Result<(), StoreError> {
        let parent = Self::parent(&self.db, uid)?;
        let doc = FavouriteDoc::from_record(record);

        // transforms are only kept when written through a batch
        let writer = self.db.create_simple_batch_writer().await?;
        let mut batch = writer.new_batch();

        self.db
            .fluent()
            .update()
            .fields(UPSERT_MASK)
            .in_col(FAVOURITES_COLLECTION)
            .document_id(&record.key)
            .parent(&parent)
            .object(&doc)
            .transforms(|t| {
                t.fields([t
                    .field(FIELD_SERVER_CREATED)
                    .server_value(FirestoreTransformServerValue::RequestTime)])
            })
            .add_to_batch(&mut batch)?;

        let response = batch.write().await?;

        if let Some(status) = response.statuses.iter().find(|s| s.code != 0) {
            // 7 is grpc PERMISSION_DENIED
            return Err(if status.code == 7 {
                StoreError::PermissionDenied(status.message.clone())
            } else {
                StoreError::Unavailable(format!(
                    "write rejected: code={} message={}",
                    status.code, status.message
                ))
            });
        }

        debug!("Upserted favourite {}", record.key);
        Ok(())
    }

    #[instrument(skip_all, fields(uid = uid, key = key))]
    async fn remove(&self, uid: &str, key: &str) -> Result<(), StoreError> {
        let parent = Self::parent(&self.db, uid)?;

        self.db
            .fluent()
            .delete()
            .from(FAVOURITES_COLLECTION)
            .document_id(key)
            .parent(&parent)
            .execute()
            .await?;

        debug!("Removed favourite {}", key);
        Ok(())
    }

    async fn exists(&self, uid: &str, key: &str) -> Result<bool, StoreError> {
        let parent = Self::parent(&self.db, uid)?;

        let doc = self
            .db
            .fluent()
            .select()
            .by_id_in(FAVOURITES_COLLECTION)
            .parent(&parent)
            .one(key)
            .await?;

        Ok(doc.is_some())
    }

    async fn subscribe(&self, uid: &str) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        info!("Opening favourites feed for {}", uid);
        self.spawn_feed(uid.to_string(), tx, cancel.clone());

        Ok(Subscription::new(rx, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::places::Coordinates;
    use serde_json::json;

    fn path(key: &str) -> String {
        format!("projects/circeco/databases/(default)/documents/users/U1/favourites/{key}")
    }

    fn valid(key: &str) -> FirestoreDocument {
        let doc = FavouriteDoc {
            key: Some(key.into()),
            name: Some("Café Nord".into()),
            address: Some("Sveavägen 1".into()),
            coords: Some(Coordinates::new(18.07, 59.33)),
            ..Default::default()
        };
        FirestoreDb::serialize_to_doc(path(key), &doc).unwrap()
    }

    fn raw(key: &str, fields: serde_json::Value) -> FirestoreDocument {
        FirestoreDb::serialize_to_doc(path(key), &fields).unwrap()
    }

    #[test]
    fn test_malformed_documents_are_skipped() {
        let docs = vec![
            valid("a"),
            raw("b", json!({ "key": "b", "lat": "59.33", "lng": 18.07 })),
            raw("c", json!({ "key": "c", "name": 42 })),
            valid("d"),
            raw("e", json!({ "key": "e", "clientCreatedAt": "yesterday" })),
        ];

        let decoded = decode_documents(docs);
        let keys: Vec<_> = decoded.iter().filter_map(|d| d.key.as_deref()).collect();

        assert_eq!(keys, vec!["a", "d"]);
        assert_eq!(decoded[0].coords, Some(Coordinates::new(18.07, 59.33)));
    }

    #[test]
    fn test_legacy_documents_decode() {
        let decoded = decode_documents(vec![raw(
            "legacy",
            json!({ "name": "Old", "address": "Street 2", "lat": 59.0, "lng": 18.0 }),
        )]);

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].lat, Some(59.0));
        assert_eq!(decoded[0].key, None);
    }
}
