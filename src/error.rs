// Error taxonomy for the travel engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TravelError {
    /// The bot store could not be opened or queried.
    #[error("bot store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    /// Transport failure (or non-success status) talking to the POI service.
    #[error("POI provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The POI service answered, but not with an element list we understand.
    #[error("malformed POI provider response: {0}")]
    ProviderMalformedResponse(String),

    #[error("invalid coordinate: lat {latitude}, lon {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
}

impl TravelError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TravelError::StoreUnavailable(_) => "store_unavailable",
            TravelError::ProviderUnavailable(_) => "provider_unavailable",
            TravelError::ProviderMalformedResponse(_) => "provider_malformed_response",
            TravelError::InvalidCoordinate { .. } => "invalid_coordinate",
        }
    }
}

impl From<reqwest::Error> for TravelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TravelError::ProviderMalformedResponse(e.to_string())
        } else {
            TravelError::ProviderUnavailable(e.to_string())
        }
    }
}
