use reqwest::{header::HeaderMap, Client, RequestBuilder, Response};
use std::time::Duration;
use tokio::time::sleep;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

#[derive(Debug)]
pub(crate) enum SendError {
    RateLimited,
    Transport(String),
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::RateLimited => write!(f, "rate limited"),
            SendError::Transport(e) => write!(f, "{}", e),
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503 | 504)
}

/// Client with the per-request timeout applied to every provider call.
pub(crate) fn build_client(headers: HeaderMap, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5).min(timeout))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
}

/// Sends the request built by `make`, retrying transport errors and 5xx
/// responses with exponential backoff. The last 5xx response is returned
/// as-is so the caller can report its body.
pub(crate) async fn send_with_retry<F>(mut make: F) -> Result<Response, SendError>
where
    F: FnMut() -> RequestBuilder,
{
    let mut last_error: Option<String> = None;

    for attempt in 0..MAX_RETRIES {
        match make().send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if status == 429 {
                    return Err(SendError::RateLimited);
                }
                if is_retryable_status(status) && attempt < MAX_RETRIES - 1 {
                    sleep(backoff(attempt)).await;
                    continue;
                }
                return Ok(resp);
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Outbound request failed");
                last_error = Some(e.to_string());
                if attempt < MAX_RETRIES - 1 {
                    sleep(backoff(attempt)).await;
                }
            }
        }
    }

    Err(SendError::Transport(
        last_error.unwrap_or_else(|| "Max retries exceeded".to_string()),
    ))
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2_u64.pow(attempt))
}

/// Reads the body of a failed response for error messages.
pub(crate) async fn error_body(resp: Response) -> String {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    format!("{}: {}", status, text)
}
