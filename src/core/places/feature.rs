use crate::core::places::{Coordinates, Place, PlaceDraft, UNKNOWN_PLACE_NAME, derive_key};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const NAME_PROPERTIES: [&str; 2] = ["STORE_NAME", "NAME"];
const ADDRESS_PROPERTIES: [&str; 2] = ["ADDRESS_LINE1", "ADDRESS"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawGeometry {
    #[serde(default)]
    pub coordinates: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawLayer {
    pub id: String,
}

/// A feature as handed out by the map widget on click/hover queries,
/// or a geocoder result. Shapes differ between layers, so every field
/// is optional and read leniently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFeature {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub geometry: Option<RawGeometry>,
    /// Geocoder results carry `center` instead of a geometry
    #[serde(default)]
    pub center: Option<Vec<f64>>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub place_name: Option<String>,
    #[serde(default)]
    pub layer: Option<RawLayer>,
}

/// Non-empty string form of a json value, numbers included
fn value_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn pair(values: &[f64]) -> Coordinates {
    Coordinates::new(
        values.first().copied().unwrap_or(f64::NAN),
        values.get(1).copied().unwrap_or(f64::NAN),
    )
}

impl RawFeature {
    fn property(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .find_map(|name| self.properties.get(*name).and_then(value_str))
    }

    /// Point geometry first, geocoder center second. Unusable shapes
    /// yield NaN components so the source id fallback still renders
    /// them the same way every time.
    pub fn coordinates(&self) -> Coordinates {
        match self.geometry.as_ref().and_then(|g| g.coordinates.as_deref()) {
            Some(coords) => pair(coords),
            None => pair(self.center.as_deref().unwrap_or_default()),
        }
    }

    pub fn name(&self) -> String {
        self.property(&NAME_PROPERTIES)
            .or_else(|| self.text.clone().filter(|t| !t.is_empty()))
            .unwrap_or_else(|| UNKNOWN_PLACE_NAME.to_string())
    }

    pub fn address(&self) -> String {
        self.property(&ADDRESS_PROPERTIES)
            .or_else(|| self.place_name.clone().filter(|p| !p.is_empty()))
            .unwrap_or_default()
    }

    /// Feature id, then `properties.id`, then a composite of
    /// layer, name and raw coordinates
    pub fn source_id(&self, name: &str, coords: Coordinates) -> String {
        self.id
            .as_ref()
            .and_then(value_str)
            .or_else(|| self.properties.get("id").and_then(value_str))
            .unwrap_or_else(|| {
                let layer = self
                    .layer
                    .as_ref()
                    .map(|l| l.id.as_str())
                    .filter(|id| !id.is_empty())
                    .unwrap_or("feat");
                format!("{}:{}:{},{}", layer, name, coords.lng, coords.lat)
            })
    }

    pub fn to_draft(&self) -> PlaceDraft {
        let coords = self.coordinates();
        let name = self.name();
        let source_id = self.source_id(&name, coords);

        PlaceDraft {
            key: None,
            address: Some(self.address()),
            coordinates: Some(coords),
            source_id: Some(source_id),
            name: Some(name),
        }
    }

    pub fn to_place(&self) -> Option<Place> {
        let draft = self.to_draft();
        let key = derive_key(&draft)?;

        Some(Place {
            key,
            name: draft.name.unwrap_or_default(),
            address: draft.address.unwrap_or_default(),
            coordinates: draft.coordinates,
            source_id: draft.source_id,
        })
    }
}
