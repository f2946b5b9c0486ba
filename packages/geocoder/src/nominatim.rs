//! Nominatim / OpenStreetMap reverse geocoder.
//!
//! The public instance allows **1 request per second** at most; requests
//! made through one [`NominatimReverse`] are spaced by `rate_limit_ms`.
//!
//! See <https://nominatim.org/release-docs/develop/api/Reverse/>

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use traffic_map_geography_models::GeoPoint;

use crate::{GeocodeError, GeocoderConfig, ReverseGeocoder};

/// Street-level detail.
const ZOOM: &str = "17";

/// Reverse geocoder backed by a Nominatim instance.
#[derive(Debug)]
pub struct NominatimReverse {
    client: reqwest::Client,
    base_url: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl NominatimReverse {
    /// Creates a client from the geocoder settings.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            min_interval: Duration::from_millis(config.rate_limit_ms),
            last_request: Mutex::new(None),
        })
    }

    /// Waits until `min_interval` has passed since the previous request.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            tokio::time::sleep_until(previous + self.min_interval).await;
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimReverse {
    async fn reverse(&self, point: GeoPoint) -> Result<Option<String>, GeocodeError> {
        self.throttle().await;

        let lat = point.lat.to_string();
        let lon = point.lng.to_string();
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("format", "jsonv2"),
                ("zoom", ZOOM),
            ])
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            log::warn!("Nominatim rate limit hit");
            return Err(GeocodeError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(GeocodeError::Status {
                status: resp.status().as_u16(),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)
    }
}

/// Builds a label from a Nominatim reverse response.
///
/// Prefers `"<house number> <road>, <locality>"` from the address
/// breakdown and falls back to `display_name`. An `error` field (nothing
/// found) yields `None`.
fn parse_response(body: &serde_json::Value) -> Result<Option<String>, GeocodeError> {
    if !body.is_object() {
        return Err(GeocodeError::Parse {
            message: "Nominatim response is not an object".to_string(),
        });
    }
    if let Some(error) = body.get("error") {
        log::debug!("Nominatim found nothing: {error}");
        return Ok(None);
    }

    let address = &body["address"];
    let field = |name: &str| address[name].as_str().filter(|s| !s.is_empty());

    if let Some(road) = field("road") {
        let street = field("house_number").map_or_else(|| road.to_string(), |n| format!("{n} {road}"));
        let locality = ["city", "town", "village", "suburb", "county"]
            .into_iter()
            .find_map(field);
        return Ok(Some(match locality {
            Some(locality) => format!("{street}, {locality}"),
            None => street,
        }));
    }

    Ok(body["display_name"].as_str().map(String::from))
}
