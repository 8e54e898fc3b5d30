//! IP geolocation against an ipinfo-compatible JSON endpoint.

use crate::{GeoError, Location, Locator};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://ipinfo.io/json";

/// Looks up the machine's public IP address and its registered location.
#[derive(Debug, Clone)]
pub struct IpLocator {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl IpLocator {
    pub fn new(endpoint: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self, GeoError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("attend/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
        })
    }

    fn url(&self) -> String {
        match &self.token {
            Some(token) => {
                let sep = if self.endpoint.contains('?') { '&' } else { '?' };
                format!("{}{sep}token={token}", self.endpoint)
            }
            None => self.endpoint.clone(),
        }
    }
}

impl Locator for IpLocator {
    async fn locate(&self) -> Result<Location, GeoError> {
        let resp = self.client.get(self.url()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GeoError::Api {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }

        let body = resp.text().await?;
        let location = parse_response(&body)?;
        tracing::debug!(address = %location.address, ip = ?location.ip, "geolocated");
        Ok(location)
    }
}

/// Response body of an ipinfo-style lookup. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct IpInfo {
    ip: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
    /// "lat,lon"
    loc: Option<String>,
}

fn parse_response(body: &str) -> Result<Location, GeoError> {
    let info: IpInfo = serde_json::from_str(body)?;

    let address = [&info.city, &info.region, &info.country]
        .into_iter()
        .filter_map(|p| p.as_deref().map(str::trim).filter(|s| !s.is_empty()))
        .collect::<Vec<_>>()
        .join(", ");
    if address.is_empty() {
        return Err(GeoError::Incomplete);
    }

    Ok(Location {
        address,
        ip: info.ip,
        coordinates: info.loc.as_deref().and_then(parse_coordinates),
    })
}

fn parse_coordinates(loc: &str) -> Option<(f64, f64)> {
    let (lat, lon) = loc.split_once(',')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}
