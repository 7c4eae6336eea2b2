//! Mapping of HTTP-level failures onto transient/terminal generation errors.

use medrag_core::AppError;
use reqwest::StatusCode;

/// Classify a failure to obtain any response at all.
pub(crate) fn classify_send_error(provider: &str, err: &reqwest::Error) -> AppError {
    let message = format!("Failed to send request to {}: {}", provider, err);
    if err.is_timeout() || err.is_connect() || err.is_request() {
        AppError::transient(message)
    } else {
        AppError::terminal(message)
    }
}

/// Classify a non-success HTTP status.
///
/// 408, 429 and 5xx may succeed on a later attempt; every other status
/// (bad request, auth, not found) will not.
pub(crate) fn classify_status(provider: &str, status: StatusCode, body: &str) -> AppError {
    let message = format!("{} API error ({}): {}", provider, status, body.trim());
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        AppError::transient(message)
    } else {
        AppError::terminal(message)
    }
}

/// Build a reqwest client with a per-request timeout.
pub(crate) fn build_http_client(timeout: std::time::Duration) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        for code in [408u16, 429, 500, 502, 503] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(
                classify_status("gemini", status, "").is_retryable(),
                "{} should be transient",
                code
            );
        }
        for code in [400u16, 401, 403, 404, 422] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(
                !classify_status("gemini", status, "").is_retryable(),
                "{} should be terminal",
                code
            );
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        // Bind then drop to obtain a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = build_http_client(std::time::Duration::from_secs(2)).unwrap();
        let err = client
            .get(format!("http://{}/", addr))
            .send()
            .await
            .unwrap_err();
        assert!(classify_send_error("ollama", &err).is_retryable());
    }
}
