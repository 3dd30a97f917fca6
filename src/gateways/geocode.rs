use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::{Geocoder, USER_AGENT};
use crate::error::AppError;
use crate::geo::GeoPoint;

const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const GEOCODE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct GoogleGeocoder {
    client: reqwest::Client,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(api_key: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self { client, api_key })
    }
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    location: GeoPoint,
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Option<GeoPoint> {
        let response = self
            .client
            .get(GEOCODE_URL)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .timeout(GEOCODE_TIMEOUT)
            .send()
            .await;

        let body: GeocodeResponse = match response {
            Ok(response) => match response.json().await {
                Ok(body) => body,
                Err(err) => {
                    warn!(error = %err, "geocoding response unreadable");
                    return None;
                }
            },
            Err(err) => {
                warn!(error = %err, "geocoding request failed");
                return None;
            }
        };

        if body.status != "OK" {
            warn!(status = %body.status, "geocoding returned no match");
            return None;
        }

        body.results.into_iter().next().map(|r| r.geometry.location)
    }
}

/// Used when no maps key is configured.
pub struct DisabledGeocoder;

#[async_trait]
impl Geocoder for DisabledGeocoder {
    async fn geocode(&self, _address: &str) -> Option<GeoPoint> {
        None
    }
}
