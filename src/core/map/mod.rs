mod file;
pub mod geojson;
mod layer;
mod memory;

pub use file::GeoJsonFileMap;
pub use geojson::{Feature, FeatureCollection};
pub use layer::{FavouritesLayerToggle, LayerToggleOutcome, SIGN_IN_TIP};
pub use memory::MemoryMap;

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("map source {0} does not exist")]
    SourceMissing(String),

    #[error("map layer {0} does not exist")]
    LayerMissing(String),

    #[error("map surface failed: {0}")]
    Surface(#[from] anyhow::Error),
}

/// The interactive map as seen by the favourites engine: named data
/// sources that accept full replacement, and toggleable layers
pub trait MapSurface: Send + Sync {
    fn replace_source(&self, source_id: &str, data: &FeatureCollection) -> Result<(), MapError>;

    fn set_layer_visible(&self, layer_id: &str, visible: bool) -> Result<(), MapError>;

    /// `None` while the layer does not exist
    fn layer_visible(&self, layer_id: &str) -> Option<bool>;
}

pub struct MapHandle(pub Arc<dyn MapSurface>);

/// Where the map lands once it is ready. Empty until then, consumers
/// treat an empty slot as nothing to do.
#[derive(Default)]
pub struct MapSlot {
    surface: ArcSwapOption<MapHandle>,
}

impl MapSlot {
    pub fn attach(&self, surface: Arc<dyn MapSurface>) {
        self.surface.store(Some(Arc::new(MapHandle(surface))));
    }

    pub fn get(&self) -> Option<Arc<dyn MapSurface>> {
        self.surface.load_full().map(|handle| handle.0.clone())
    }
}
