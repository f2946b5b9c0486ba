//! HERE Routing API v8 client.
//!
//! See <https://www.here.com/docs/bundle/routing-api-v8-api-reference/page/index.html>

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use traffic_map_geography_models::GeoPoint;

use crate::{Maneuver, RouteError, RouteProvider, RouteResponse};

const METERS_PER_MILE: f64 = 1_609.344;

/// Routing provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Routes endpoint URL.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: Option<String>,
    /// Query parameter the API key is sent in.
    pub api_key_param: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            base_url: "https://router.hereapi.com/v8/routes".to_string(),
            api_key_env: Some("HERE_API_KEY".to_string()),
            api_key_param: "apiKey".to_string(),
            timeout_secs: 15,
        }
    }
}

/// [`RouteProvider`] backed by the HERE Routing API.
#[derive(Debug, Clone)]
pub struct HereRouter {
    client: reqwest::Client,
    config: RouterConfig,
    api_key: Option<String>,
}

impl HereRouter {
    /// Creates a router, reading the API key from the configured
    /// environment variable.
    ///
    /// # Errors
    ///
    /// * [`RouteError::MissingApiKey`] if the key variable is not set
    /// * [`RouteError::Http`] if the HTTP client cannot be built
    pub fn new(config: RouterConfig) -> Result<Self, RouteError> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| RouteError::MissingApiKey { var: var.clone() })?,
            ),
            None => None,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }
}

#[async_trait]
impl RouteProvider for HereRouter {
    fn id(&self) -> &str {
        "here"
    }

    async fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<RouteResponse, RouteError> {
        let mut params = vec![
            ("transportMode".to_string(), "car".to_string()),
            ("origin".to_string(), from.to_string()),
            ("destination".to_string(), to.to_string()),
            ("return".to_string(), "polyline,summary,actions".to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push((self.config.api_key_param.clone(), key.clone()));
        }

        let resp = self
            .client
            .get(&self.config.base_url)
            .query(&params)
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RouteError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(RouteError::Status {
                status: resp.status().as_u16(),
            });
        }

        let body: Value = resp.json().await?;
        parse_response(&body)
    }
}

/// Parses a HERE v8 routes response into a [`RouteResponse`].
///
/// Sections of the first route are concatenated; their action offsets are
/// shifted to index into the combined shape, which is re-encoded when there
/// is more than one section.
///
/// # Errors
///
/// * [`RouteError::NoRoute`] if the response has no route sections
/// * [`RouteError::Decode`] if a section polyline is malformed
/// * [`RouteError::UnexpectedResponse`] if a section has no polyline
pub fn parse_response(body: &Value) -> Result<RouteResponse, RouteError> {
    let sections = body
        .get("routes")
        .and_then(Value::as_array)
        .and_then(|routes| routes.first())
        .and_then(|route| route.get("sections"))
        .and_then(Value::as_array)
        .filter(|sections| !sections.is_empty())
        .ok_or(RouteError::NoRoute)?;

    let mut points = Vec::new();
    let mut maneuvers = Vec::new();
    let mut precision = None;
    let mut duration_secs = 0.0;
    let mut realtime_duration_secs = 0.0;
    let mut encoded_sections = Vec::with_capacity(sections.len());

    for section in sections {
        let encoded = section
            .get("polyline")
            .and_then(Value::as_str)
            .ok_or_else(|| RouteError::UnexpectedResponse {
                message: "route section has no polyline".to_string(),
            })?;
        let decoded = traffic_map_polyline::decode_with_header(encoded)?;
        precision.get_or_insert(decoded.header.precision);
        encoded_sections.push(encoded);

        let base = points.len();
        for action in section
            .get("actions")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            maneuvers.push(Maneuver {
                distance_miles: number(action, "length") / METERS_PER_MILE,
                time_seconds: number(action, "duration"),
                offset: action
                    .get("offset")
                    .and_then(Value::as_u64)
                    .and_then(|offset| usize::try_from(offset).ok())
                    .map(|offset| offset + base),
            });
        }

        if let Some(summary) = section.get("summary") {
            let realtime = number(summary, "duration");
            realtime_duration_secs += realtime;
            duration_secs += summary
                .get("baseDuration")
                .and_then(Value::as_f64)
                .unwrap_or(realtime);
        }

        points.extend(decoded.points);
    }

    let polyline = match encoded_sections.as_slice() {
        [single] => (*single).to_string(),
        _ => traffic_map_polyline::encode(&points, precision.unwrap_or(5))?,
    };

    log::debug!(
        "HERE route: {} section(s), {} points, {} actions",
        sections.len(),
        points.len(),
        maneuvers.len()
    );

    Ok(RouteResponse {
        polyline,
        maneuvers,
        duration_secs,
        realtime_duration_secs,
    })
}

fn number(value: &Value, field: &str) -> f64 {
    value.get(field).and_then(Value::as_f64).unwrap_or(0.0)
}
