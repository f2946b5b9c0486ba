//! HTTP send helpers with retry for transient connection errors.
//!
//! Every upstream call (incident feed, router, reverse geocoder) goes
//! through [`send_json`] rather than `reqwest::RequestBuilder::send()`
//! directly.
//!
//! Only connection-level failures (timeouts, refused or reset
//! connections) are retried here, a couple of times with a short
//! exponential backoff. HTTP 429 and 5xx are returned immediately: a
//! polling map refreshes again on its next tick anyway, and retrying a
//! struggling upstream from inside a refresh only amplifies the load.
//!
//! ```ignore
//! let body = retry::send_json(|| client.get(&url).query(&params)).await?;
//! ```

use std::time::Duration;

use crate::SourceError;

/// Maximum number of retries for transient connection errors.
const MAX_RETRIES: u32 = 2;

/// Backoff before the first retry; doubled for each subsequent one.
const BASE_BACKOFF: Duration = Duration::from_millis(250);

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// # Errors
///
/// * [`SourceError::Http`] if the request still fails after retries or
///   the body cannot be read
/// * [`SourceError::RateLimited`] on HTTP 429
/// * [`SourceError::Status`] on any other non-success status
/// * [`SourceError::UnexpectedResponse`] if the body is not valid JSON
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(build_request: F) -> Result<serde_json::Value, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(&build_request, MAX_RETRIES).await?;

    let url = response.url().to_string();
    let status = response.status();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|json_err| {
        log::warn!(
            "JSON parse failed\n  \
             url: {url}\n  \
             status: {status}\n  \
             content-type: {content_type:?}\n  \
             received: {} bytes\n  \
             parse error: {json_err}\n  \
             body preview: {}",
            text.len(),
            body_preview(&text),
        );
        SourceError::UnexpectedResponse {
            message: format!(
                "JSON parse failed: {json_err} (status={status}, received {} bytes)",
                text.len()
            ),
        }
    })
}

/// Retry loop for connection-level failures. Returns the response once
/// it has a success status.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    max_retries: u32,
) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    attempt += 1;
                    let delay = backoff(attempt);
                    log::warn!("transient error: {e}; retry {attempt}/{max_retries} in {delay:?}");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(SourceError::Http(e));
            }
            Ok(response) => {
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    log::warn!("HTTP 429 (rate limited) from {}", response.url());
                    return Err(SourceError::RateLimited);
                }

                if !status.is_success() {
                    log::warn!("HTTP {status} from {}", response.url());
                    return Err(SourceError::Status {
                        status: status.as_u16(),
                    });
                }

                return Ok(response);
            }
        }
    }
}

/// Delay before retry number `attempt` (1-based).
fn backoff(attempt: u32) -> Duration {
    BASE_BACKOFF * (1 << attempt.saturating_sub(1).min(8))
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

/// Truncates `text` for logging without splitting a character.
fn body_preview(text: &str) -> String {
    if text.len() <= BODY_PREVIEW_LEN {
        return text.to_string();
    }
    let mut end = BODY_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_millis(250));
        assert_eq!(backoff(2), Duration::from_millis(500));
        assert_eq!(backoff(3), Duration::from_secs(1));
    }

    #[test]
    fn preview_keeps_short_bodies() {
        assert_eq!(body_preview("{\"ok\":"), "{\"ok\":");
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let text = format!("{}\u{e9}tail", "a".repeat(BODY_PREVIEW_LEN - 1));
        let preview = body_preview(&text);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.len(), BODY_PREVIEW_LEN - 1 + 3);
    }
}
