use crate::app::config::CircecoConfig;
use crate::core::favourites::SyncController;
use crate::core::identity::IdentityProvider;
use crate::core::map::{FavouritesLayerToggle, GeoJsonFileMap};
use crate::core::observability::Observability;
use firestore::FirestoreDb;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct StartupContext {
    pub config: OnceLock<CircecoConfig>,

    /// Taken by the shutdown pipeline to flush
    pub observability: Mutex<Option<Observability>>,

    /// `None` when running against the in-memory store
    pub firestore: OnceLock<Option<Arc<FirestoreDb>>>,

    pub identity: OnceLock<Arc<dyn IdentityProvider>>,

    /// Owner of favourites state, hearts and the map source
    pub controller: OnceLock<Arc<SyncController>>,

    pub layer_toggle: OnceLock<Arc<FavouritesLayerToggle>>,

    /// Set when the favourites source is mirrored to disk, flushed on shutdown
    pub map_file: OnceLock<Arc<GeoJsonFileMap>>,

    /// Background loops aborted on shutdown
    pub tasks: Mutex<Vec<JoinHandle<()>>>,
}
