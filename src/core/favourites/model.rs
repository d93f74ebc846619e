use crate::core::places::{Coordinates, Place, PlaceDraft, UNKNOWN_PLACE_NAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A favourite as the engine holds it, one per (user, key)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavouriteRecord {
    pub key: String,
    pub name: String,
    pub address: String,
    pub coordinates: Option<Coordinates>,
    /// Assigned by the store, absent until the write round-trips
    pub server_created_at: Option<DateTime<Utc>>,
    pub client_created_at: Option<DateTime<Utc>>,
}

impl FavouriteRecord {
    /// Builds the optimistic record for a place about to be saved
    pub fn from_place(place: &Place) -> Self {
        Self {
            key: place.key.clone(),
            name: place.name.clone(),
            address: place.address.clone(),
            coordinates: place.coordinates,
            server_created_at: None,
            client_created_at: Some(Utc::now()),
        }
    }

    /// Server time when known, client time otherwise
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.server_created_at.or(self.client_created_at)
    }

    pub fn valid_coordinates(&self) -> Option<Coordinates> {
        self.coordinates.and_then(Coordinates::valid)
    }

    /// Newest first. Records still waiting on a server timestamp sort
    /// by their client time, undated records go last.
    pub fn newest_first(a: &FavouriteRecord, b: &FavouriteRecord) -> Ordering {
        match (a.created_at(), b.created_at()) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.key.cmp(&b.key))
    }
}

/// Stored shape of `users/{uid}/favourites/{key}`.
///
/// Older documents were written with top level `lat`/`lng`, and some
/// lack a `key`; both are accepted on read and resolved by
/// [`FavouriteDoc::into_record`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavouriteDoc {
    #[serde(alias = "_firestore_id", skip_serializing, default)]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "firestore::serialize_as_optional_timestamp::serialize",
        deserialize_with = "firestore::serialize_as_optional_timestamp::deserialize"
    )]
    pub server_created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "firestore::serialize_as_optional_timestamp::serialize",
        deserialize_with = "firestore::serialize_as_optional_timestamp::deserialize"
    )]
    pub client_created_at: Option<DateTime<Utc>>,
}

impl FavouriteDoc {
    /// Write payload for a record. The server timestamp is left to the
    /// store, which sets it at write time.
    pub fn from_record(record: &FavouriteRecord) -> Self {
        Self {
            id: Some(record.key.clone()),
            key: Some(record.key.clone()),
            name: Some(record.name.clone()),
            address: Some(record.address.clone()),
            coords: record.coordinates,
            lat: None,
            lng: None,
            server_created_at: None,
            client_created_at: record.client_created_at,
        }
    }

    fn coordinates(&self) -> Option<Coordinates> {
        self.coords.and_then(Coordinates::valid).or_else(|| {
            self.lng
                .zip(self.lat)
                .and_then(|(lng, lat)| Coordinates::new(lng, lat).valid())
        })
    }

    /// Resolves a stored document into a cache record, deriving the key
    /// when the document does not carry one. `None` when nothing usable
    /// is left to key it by.
    pub fn into_record(self) -> Option<FavouriteRecord> {
        let coordinates = self.coordinates();
        let name = self
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNKNOWN_PLACE_NAME.to_string());
        let address = self.address.unwrap_or_default();

        let place = PlaceDraft {
            key: self.key,
            name: Some(name),
            address: Some(address),
            coordinates,
            source_id: self.id,
        }
        .resolve()?;

        Some(FavouriteRecord {
            key: place.key,
            name: place.name,
            address: place.address,
            coordinates: place.coordinates,
            server_created_at: self.server_created_at,
            client_created_at: self.client_created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_doc_with_key() {
        let doc = FavouriteDoc {
            id: Some("coords|18.070000,59.330000".into()),
            key: Some("coords|18.070000,59.330000".into()),
            name: Some("X".into()),
            coords: Some(Coordinates::new(18.07, 59.33)),
            ..Default::default()
        };

        let record = doc.into_record().unwrap();
        assert_eq!(record.key, "coords|18.070000,59.330000");
        assert_eq!(record.address, "");
        assert_eq!(record.coordinates, Some(Coordinates::new(18.07, 59.33)));
    }

    #[test]
    fn test_legacy_doc_derives_key() {
        let doc = FavouriteDoc {
            id: Some("auto-id-123".into()),
            lat: Some(59.33),
            lng: Some(18.07),
            ..Default::default()
        };

        let record = doc.into_record().unwrap();
        assert_eq!(record.name, UNKNOWN_PLACE_NAME);
        assert_eq!(record.key, "coords|18.070000,59.330000");
        assert_eq!(record.valid_coordinates(), Some(Coordinates::new(18.07, 59.33)));
    }

    #[test]
    fn test_legacy_doc_without_coords_uses_doc_id() {
        let doc = FavouriteDoc {
            id: Some("auto-id-123".into()),
            name: Some("Loppis".into()),
            ..Default::default()
        };

        assert_eq!(doc.into_record().unwrap().key, "id|auto-id-123");
    }

    #[test]
    fn test_newest_first_prefers_server_time() {
        let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let a = FavouriteRecord {
            key: "a".into(),
            name: "A".into(),
            address: String::new(),
            coordinates: None,
            server_created_at: Some(older),
            client_created_at: Some(newer),
        };
        let b = FavouriteRecord {
            key: "b".into(),
            server_created_at: None,
            client_created_at: Some(newer),
            ..a.clone()
        };

        assert_eq!(FavouriteRecord::newest_first(&b, &a), Ordering::Less);
        let mut items = vec![a.clone(), b.clone()];
        items.sort_by(FavouriteRecord::newest_first);
        assert_eq!(items[0].key, "b");
    }
}
