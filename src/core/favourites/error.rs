use thiserror::Error;

/// Failures reported by a [`crate::core::stores::FavouriteStore`]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// Network or service trouble, safe to try again later
    #[error("favourites store unavailable: {0}")]
    Unavailable(String),

    /// Rejected by the store's access rules
    #[error("permission denied by favourites store: {0}")]
    PermissionDenied(String),

    #[error("malformed favourites document: {0}")]
    Malformed(String),

    #[error("favourites subscription closed")]
    Closed,
}

impl StoreError {
    pub fn is_permission(&self) -> bool {
        matches!(self, StoreError::PermissionDenied(_))
    }
}

impl From<firestore::errors::FirestoreError> for StoreError {
    fn from(err: firestore::errors::FirestoreError) -> Self {
        use firestore::errors::FirestoreError;

        // the grpc status code only survives in the debug form
        let detail = format!("{:?}", err);
        if detail.contains("PermissionDenied") || detail.contains("PERMISSION_DENIED") {
            return StoreError::PermissionDenied(err.to_string());
        }

        match err {
            FirestoreError::DeserializeError(_) | FirestoreError::SerializeError(_) => {
                StoreError::Malformed(err.to_string())
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

/// Errors surfaced synchronously to whoever asked for a favourite change.
/// Store trouble is absorbed by the controller and reported through
/// [`crate::core::favourites::ToggleOutcome`] instead.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FavouriteError {
    #[error("place has no usable name, address, coordinates or id")]
    MissingKey,

    #[error("place {0} has no valid coordinates")]
    MissingCoordinates(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
