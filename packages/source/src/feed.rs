//! HTTP incident feed.

use std::time::Duration;

use async_trait::async_trait;
use traffic_map_geography_models::BoundingBox;
use traffic_map_source_models::{FeedConfig, RawIncidentRecord, resolve_path};

use crate::{IncidentFeed, SourceError, retry};

/// User agent sent with every feed request.
const USER_AGENT: &str = concat!("traffic-map/", env!("CARGO_PKG_VERSION"));

/// An [`IncidentFeed`] backed by a JSON-over-HTTP traffic incidents API.
///
/// Requests are `GET {api_url}?bbox=west,south,east,north[&filters=a,b][&apiKey=...]`
/// with parameter names taken from the [`FeedConfig`].
#[derive(Debug, Clone)]
pub struct HttpIncidentFeed {
    client: reqwest::Client,
    config: FeedConfig,
    api_key: Option<String>,
}

impl HttpIncidentFeed {
    /// Creates a feed, reading the API key from the configured environment
    /// variable.
    ///
    /// # Errors
    ///
    /// * [`SourceError::MissingApiKey`] if `api_key_env` is set but the
    ///   variable is not
    /// * [`SourceError::Http`] if the HTTP client cannot be built
    pub fn new(config: FeedConfig) -> Result<Self, SourceError> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| SourceError::MissingApiKey { var: var.clone() })?,
            ),
            None => None,
        };

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// The feed configuration.
    #[must_use]
    pub const fn config(&self) -> &FeedConfig {
        &self.config
    }

    fn query_params(&self, bbox: BoundingBox, filters: &[String]) -> Vec<(String, String)> {
        let mut params = vec![(self.config.bbox_param.clone(), bbox.to_wsen_string())];
        if !filters.is_empty() {
            params.push((self.config.filters_param.clone(), filters.join(",")));
        }
        if let Some(key) = &self.api_key {
            params.push((self.config.api_key_param.clone(), key.clone()));
        }
        params
    }
}

#[async_trait]
impl IncidentFeed for HttpIncidentFeed {
    fn id(&self) -> &str {
        &self.config.api_url
    }

    async fn fetch(
        &self,
        bbox: BoundingBox,
        filters: &[String],
    ) -> Result<Vec<RawIncidentRecord>, SourceError> {
        let params = self.query_params(bbox, filters);
        log::debug!(
            "fetching incidents from {} for bbox {}",
            self.config.api_url,
            bbox.to_wsen_string()
        );
        let body = retry::send_json(|| self.client.get(&self.config.api_url).query(&params)).await?;
        let records = extract_records(&body, &self.config.records_path)?;
        log::debug!("feed returned {} raw records", records.len());
        Ok(records)
    }
}

/// Pulls the records array out of a response body.
///
/// An explicit `null` at the path is an empty result; anything else that
/// is not an array is an unexpected response.
///
/// # Errors
///
/// Returns [`SourceError::UnexpectedResponse`] if the path is missing or
/// does not hold an array.
pub fn extract_records(
    body: &serde_json::Value,
    records_path: &str,
) -> Result<Vec<RawIncidentRecord>, SourceError> {
    match resolve_path(body, records_path) {
        Some(serde_json::Value::Array(items)) => {
            Ok(items.iter().cloned().map(RawIncidentRecord::new).collect())
        }
        Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(_) => Err(SourceError::UnexpectedResponse {
            message: format!("'{records_path}' is not an array"),
        }),
        None => Err(SourceError::UnexpectedResponse {
            message: format!("response has no '{records_path}' field"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn feed(config: FeedConfig) -> HttpIncidentFeed {
        HttpIncidentFeed::new(config).unwrap()
    }

    #[test]
    fn extracts_records_at_path() {
        let body = json!({ "results": [ { "id": 1 }, { "id": 2 } ] });
        let records = extract_records(&body, "results").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get_path("id"), Some(&json!(2)));
    }

    #[test]
    fn extracts_bare_array_and_nested_path() {
        let body = json!([ { "id": 1 } ]);
        assert_eq!(extract_records(&body, "").unwrap().len(), 1);

        let body = json!({ "data": { "incidents": [] } });
        assert!(extract_records(&body, "data.incidents").unwrap().is_empty());
    }

    #[test]
    fn null_records_are_empty() {
        let body = json!({ "results": null });
        assert!(extract_records(&body, "results").unwrap().is_empty());
    }

    #[test]
    fn rejects_missing_or_non_array_records() {
        let body = json!({ "error": "bad key" });
        assert!(matches!(
            extract_records(&body, "results"),
            Err(SourceError::UnexpectedResponse { .. })
        ));
        let body = json!({ "results": { "id": 1 } });
        assert!(matches!(
            extract_records(&body, "results"),
            Err(SourceError::UnexpectedResponse { .. })
        ));
    }

    #[test]
    fn builds_query_params() {
        let feed = feed(FeedConfig {
            api_url: "https://example.test/incidents".to_string(),
            ..FeedConfig::default()
        });
        let bbox = BoundingBox::new(34.0, -118.5, 34.2, -118.1);
        let params = feed.query_params(bbox, &["incidents".to_string(), "construction".to_string()]);
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].0, "bbox");
        assert_eq!(params[0].1, bbox.to_wsen_string());
        assert_eq!(
            params[1],
            ("filters".to_string(), "incidents,construction".to_string())
        );

        assert_eq!(feed.query_params(bbox, &[]).len(), 1);
    }

    #[test]
    fn missing_api_key_env_is_an_error() {
        let result = HttpIncidentFeed::new(FeedConfig {
            api_key_env: Some("TRAFFIC_MAP_TEST_KEY_THAT_IS_NEVER_SET".to_string()),
            ..FeedConfig::default()
        });
        assert!(matches!(
            result,
            Err(SourceError::MissingApiKey { var }) if var == "TRAFFIC_MAP_TEST_KEY_THAT_IS_NEVER_SET"
        ));
    }
}
