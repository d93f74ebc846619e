//! The small subset of GeoJSON the favourites source needs. Property
//! names match the store layers so popups and the list render
//! favourites like any other place.

use crate::core::places::Coordinates;
use serde::{Deserialize, Serialize};

pub const FAVOURITE_STORE_TYPE: &str = "Favorite";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: [f64; 2] },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    #[serde(rename = "STORE_NAME")]
    pub store_name: String,
    #[serde(rename = "ADDRESS_LINE1")]
    pub address_line1: String,
    #[serde(rename = "DESCRIPTION")]
    pub description: String,
    #[serde(rename = "STORE_TYPE")]
    pub store_type: String,
    #[serde(rename = "WEB")]
    pub web: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    pub id: String,
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

impl Feature {
    pub fn point(id: String, coords: Coordinates, properties: FeatureProperties) -> Self {
        Self {
            id,
            geometry: Geometry::Point {
                coordinates: [coords.lng, coords.lat],
            },
            properties,
        }
    }

    pub fn coordinates(&self) -> [f64; 2] {
        match self.geometry {
            Geometry::Point { coordinates } => coordinates,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_wire_shape() {
        let collection = FeatureCollection {
            features: vec![Feature::point(
                "k".into(),
                Coordinates::new(18.07, 59.33),
                FeatureProperties {
                    store_name: "X".into(),
                    address_line1: String::new(),
                    description: String::new(),
                    store_type: FAVOURITE_STORE_TYPE.into(),
                    web: String::new(),
                },
            )],
        };

        let value = serde_json::to_value(&collection).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "id": "k",
                    "geometry": { "type": "Point", "coordinates": [18.07, 59.33] },
                    "properties": {
                        "STORE_NAME": "X",
                        "ADDRESS_LINE1": "",
                        "DESCRIPTION": "",
                        "STORE_TYPE": "Favorite",
                        "WEB": ""
                    }
                }]
            })
        );
    }
}
