use crate::core::map::{FeatureCollection, MapError, MapSurface};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// A map that only remembers what was pushed to it. Sources and layers
/// must be declared first, like on the real widget.
#[derive(Default)]
pub struct MemoryMap {
    sources: Mutex<HashMap<String, FeatureCollection>>,
    layers: Mutex<HashMap<String, bool>>,
}

impl MemoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(self, source_id: &str) -> Self {
        self.sources
            .lock()
            .insert(source_id.to_string(), FeatureCollection::empty());
        self
    }

    pub fn with_layer(self, layer_id: &str, visible: bool) -> Self {
        self.layers.lock().insert(layer_id.to_string(), visible);
        self
    }

    pub fn source(&self, source_id: &str) -> Option<FeatureCollection> {
        self.sources.lock().get(source_id).cloned()
    }
}

impl MapSurface for MemoryMap {
    fn replace_source(&self, source_id: &str, data: &FeatureCollection) -> Result<(), MapError> {
        let mut sources = self.sources.lock();
        let source = sources
            .get_mut(source_id)
            .ok_or_else(|| MapError::SourceMissing(source_id.to_string()))?;

        *source = data.clone();
        debug!("Map source {} now holds {} features", source_id, data.len());
        Ok(())
    }

    fn set_layer_visible(&self, layer_id: &str, visible: bool) -> Result<(), MapError> {
        let mut layers = self.layers.lock();
        let layer = layers
            .get_mut(layer_id)
            .ok_or_else(|| MapError::LayerMissing(layer_id.to_string()))?;

        *layer = visible;
        Ok(())
    }

    fn layer_visible(&self, layer_id: &str) -> Option<bool> {
        self.layers.lock().get(layer_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undeclared_source_is_reported() {
        let map = MemoryMap::new();
        let result = map.replace_source("favorites", &FeatureCollection::empty());
        assert!(matches!(result, Err(MapError::SourceMissing(_))));
    }

    #[test]
    fn test_layer_visibility() {
        let map = MemoryMap::new().with_layer("favorites", false);
        assert_eq!(map.layer_visible("favorites"), Some(false));
        map.set_layer_visible("favorites", true).unwrap();
        assert_eq!(map.layer_visible("favorites"), Some(true));
        assert_eq!(map.layer_visible("apparel"), None);
    }
}
