//! HTTP retry helper for context-broker requests.
//!
//! Broker calls go through [`send_json`] (reads) or [`send`] (writes)
//! instead of calling `reqwest::RequestBuilder::send()` directly, so every
//! request gets exponential backoff on transient failures (timeouts, connection resets,
//! server errors, rate limiting).

use std::time::Duration;

use crate::NgsiError;

/// Maximum number of retry attempts for transient HTTP errors.
///
/// With exponential backoff (1s, 2s, 4s) the total wait before giving up
/// is 7 seconds.
const MAX_RETRIES: u32 = 3;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (builders are consumed by `.send()`).
///
/// Retries connection errors, timeouts, HTTP 429, and HTTP 5xx. HTTP 4xx
/// (except 429) is permanent and returned as [`NgsiError::Broker`].
///
/// # Errors
///
/// Returns [`NgsiError`] if the request fails after all retries, the
/// server returns a non-retryable status, or the body is not JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(build_request: F) -> Result<serde_json::Value, NgsiError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(&build_request, MAX_RETRIES).await?;
    let url = response.url().to_string();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        log::error!(
            "JSON parse failed for {url} ({} bytes): {e}\n  body preview: {}",
            text.len(),
            preview(&text)
        );
        NgsiError::Json(e)
    })
}

/// Sends an HTTP request with the same retry policy as [`send_json`] and
/// returns the successful response without reading its body. Used for
/// writes, where the broker answers `201`/`204` with no JSON.
///
/// # Errors
///
/// Returns [`NgsiError`] if the request fails after all retries or the
/// server returns a non-retryable status.
#[allow(clippy::future_not_send)]
pub async fn send<F>(build_request: F) -> Result<reqwest::Response, NgsiError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    send_inner(&build_request, MAX_RETRIES).await
}

/// Core retry loop. Returns the first successful (2xx/3xx) response.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(build_request: &F, max_retries: u32) -> Result<reqwest::Response, NgsiError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = backoff(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }
        let can_retry = attempt < max_retries;
        attempt += 1;

        let response = match build_request().send().await {
            Ok(response) => response,
            Err(e) if is_transient(&e) && can_retry => {
                log::warn!("  transient error: {e}");
                continue;
            }
            Err(e) => return Err(NgsiError::Http(e)),
        };

        let status = response.status();

        // 429 Too Many Requests and 5xx — retry
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            if can_retry {
                log::warn!("  HTTP {status} from {}", response.url());
                continue;
            }
            return Err(NgsiError::Broker {
                message: format!("HTTP {status} after {max_retries} retries"),
            });
        }

        // 4xx Client Error (not 429) — permanent, don't retry
        if status.is_client_error() {
            let url = response.url().to_string();
            let body = response.text().await.unwrap_or_default();
            return Err(NgsiError::Broker {
                message: format!("HTTP {status} for {url}: {}", preview(&body)),
            });
        }

        return Ok(response);
    }
}

/// Delay before retry number `attempt` (1-based): 1s, 2s, 4s, ...
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.saturating_sub(1).min(6))
}

fn preview(text: &str) -> &str {
    if text.len() <= BODY_PREVIEW_LEN {
        return text;
    }
    let mut end = BODY_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}
