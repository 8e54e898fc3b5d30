use thiserror::Error;

/// Errors from a geolocation lookup.
#[derive(Debug, Error)]
pub enum GeoError {
    /// HTTP transport error (DNS, TLS, timeout, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The lookup service answered with a non-success status.
    #[error("geolocation service returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body was not the expected JSON.
    #[error("cannot parse geolocation response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The response carried no city, region or country.
    #[error("geolocation response has no address")]
    Incomplete,
}
