mod feature;
mod key;

pub use feature::RawFeature;
pub use key::derive_key;

use serde::{Deserialize, Serialize};

pub const UNKNOWN_PLACE_NAME: &str = "Unknown place";

/// A longitude/latitude pair as the map widget reports it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lng: f64,
    pub lat: f64,
}

impl Coordinates {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Both components are finite numbers, required for rendering and saving
    pub fn is_finite(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite()
    }

    /// Returns self only when usable
    pub fn valid(self) -> Option<Self> {
        self.is_finite().then_some(self)
    }
}

/// A partial description of a place as seen by some call site,
/// e.g. a list row built by hand. Missing fields are tolerated,
/// key derivation decides whether it is enough to favourite.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceDraft {
    /// Precomputed key, wins over derivation when present
    pub key: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub source_id: Option<String>,
}

/// A point of interest with a resolved, stable key
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub key: String,
    pub name: String,
    pub address: String,
    pub coordinates: Option<Coordinates>,
    pub source_id: Option<String>,
}

impl Place {
    /// Coordinates that can actually be rendered or persisted
    pub fn valid_coordinates(&self) -> Option<Coordinates> {
        self.coordinates.and_then(Coordinates::valid)
    }
}

/// Whatever a heart control was mounted with. Resolved once at the
/// boundary through [`PlaceInput::resolve`].
#[derive(Debug, Clone)]
pub enum PlaceInput {
    Feature(RawFeature),
    Draft(PlaceDraft),
}

impl PlaceInput {
    /// Converts the input into a keyed [`Place`], or `None` when no key
    /// can be derived and the place cannot be favourited
    pub fn resolve(&self) -> Option<Place> {
        match self {
            PlaceInput::Feature(feature) => feature.to_place(),
            PlaceInput::Draft(draft) => draft.resolve(),
        }
    }
}

impl From<RawFeature> for PlaceInput {
    fn from(feature: RawFeature) -> Self {
        PlaceInput::Feature(feature)
    }
}

impl From<PlaceDraft> for PlaceInput {
    fn from(draft: PlaceDraft) -> Self {
        PlaceInput::Draft(draft)
    }
}

impl PlaceDraft {
    pub fn resolve(&self) -> Option<Place> {
        let key = self
            .key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| derive_key(self))?;

        Some(Place {
            key,
            name: self
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNKNOWN_PLACE_NAME.to_string()),
            address: self.address.clone().unwrap_or_default(),
            coordinates: self.coordinates,
            source_id: self.source_id.clone(),
        })
    }
}
