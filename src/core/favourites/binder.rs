use crate::core::favourites::FavouriteRecord;
use crate::core::map::geojson::{FAVOURITE_STORE_TYPE, FeatureProperties};
use crate::core::map::{Feature, FeatureCollection, MapError, MapSlot};
use crate::core::places::UNKNOWN_PLACE_NAME;
use std::sync::Arc;
use tracing::{debug, warn};

/// Map feature for a favourite, `None` when it cannot be placed
pub fn to_feature(record: &FavouriteRecord) -> Option<Feature> {
    let coords = record.valid_coordinates()?;
    let name = if record.name.is_empty() {
        UNKNOWN_PLACE_NAME.to_string()
    } else {
        record.name.clone()
    };

    Some(Feature::point(
        record.key.clone(),
        coords,
        FeatureProperties {
            store_name: name,
            address_line1: record.address.clone(),
            description: String::new(),
            store_type: FAVOURITE_STORE_TYPE.to_string(),
            web: String::new(),
        },
    ))
}

pub fn to_collection(records: &[FavouriteRecord]) -> FeatureCollection {
    FeatureCollection {
        features: records.iter().filter_map(to_feature).collect(),
    }
}

/// Mirrors the favourites into the map's favourites source. Safe to
/// call before the map exists, the next push after it attaches wins.
pub struct MapSourceBinder {
    slot: Arc<MapSlot>,
    source_id: String,
}

impl MapSourceBinder {
    pub fn new(slot: Arc<MapSlot>, source_id: impl Into<String>) -> Self {
        Self {
            slot,
            source_id: source_id.into(),
        }
    }

    pub fn slot(&self) -> &Arc<MapSlot> {
        &self.slot
    }

    pub fn push(&self, records: &[FavouriteRecord]) {
        let Some(map) = self.slot.get() else {
            debug!("Map not ready, skipping favourites source update");
            return;
        };

        let collection = to_collection(records);
        match map.replace_source(&self.source_id, &collection) {
            Ok(_) => debug!(
                "Pushed {} favourites to map source {}",
                collection.len(),
                self.source_id
            ),
            Err(MapError::SourceMissing(_)) => {
                debug!("Map source {} not created yet", self.source_id)
            }
            Err(err) => warn!("Favourites map source update failed: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::map::MemoryMap;
    use crate::core::places::Coordinates;

    fn record(key: &str, coords: Option<(f64, f64)>) -> FavouriteRecord {
        FavouriteRecord {
            key: key.into(),
            name: String::new(),
            address: "Street 1".into(),
            coordinates: coords.map(|(lng, lat)| Coordinates::new(lng, lat)),
            server_created_at: None,
            client_created_at: None,
        }
    }

    #[test]
    fn test_records_without_coordinates_are_skipped() {
        let collection = to_collection(&[
            record("a", Some((18.07, 59.33))),
            record("b", None),
            record("c", Some((f64::NAN, 1.0))),
        ]);

        assert_eq!(collection.len(), 1);
        let feature = &collection.features[0];
        assert_eq!(feature.id, "a");
        assert_eq!(feature.coordinates(), [18.07, 59.33]);
        assert_eq!(feature.properties.store_name, UNKNOWN_PLACE_NAME);
        assert_eq!(feature.properties.address_line1, "Street 1");
        assert_eq!(feature.properties.store_type, FAVOURITE_STORE_TYPE);
    }

    #[test]
    fn test_push_without_map_is_noop() {
        let binder = MapSourceBinder::new(Arc::new(MapSlot::default()), "favorites");
        binder.push(&[record("a", Some((1.0, 2.0)))]);
    }

    #[test]
    fn test_push_without_source_is_noop() {
        let slot = Arc::new(MapSlot::default());
        slot.attach(Arc::new(MemoryMap::new()));
        let binder = MapSourceBinder::new(slot, "favorites");
        binder.push(&[record("a", Some((1.0, 2.0)))]);
    }

    #[test]
    fn test_push_replaces_source() {
        let slot = Arc::new(MapSlot::default());
        let map = Arc::new(MemoryMap::new().with_source("favorites"));
        slot.attach(map.clone());
        let binder = MapSourceBinder::new(slot, "favorites");

        binder.push(&[record("a", Some((1.0, 2.0))), record("b", Some((3.0, 4.0)))]);
        assert_eq!(map.source("favorites").unwrap().len(), 2);

        binder.push(&[]);
        assert!(map.source("favorites").unwrap().is_empty());
    }
}
