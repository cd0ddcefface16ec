use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Default reader gateway that converts an article URL into readable
/// markdown. Overridable through config for self-hosted gateways and tests.
pub const DEFAULT_GATEWAY: &str = "https://r.jina.ai";

static GATEWAY_API_KEY: OnceLock<Option<SecretString>> = OnceLock::new();

fn gateway_api_key() -> Option<&'static SecretString> {
    GATEWAY_API_KEY
        .get_or_init(|| std::env::var("LECTERN_GATEWAY_KEY").ok().map(SecretString::from))
        .as_ref()
}

const MAX_CONTENT_SIZE: usize = 5 * 1024 * 1024; // 5MB
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Request timed out after 20s")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Invalid article URL")]
    InvalidUrl,
    #[error("Insecure gateway URL: HTTPS required (except localhost for testing)")]
    InsecureGateway,
}

impl ExtractError {
    /// True when the failure is transient and the request may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExtractError::Timeout | ExtractError::Network(_) => true,
            ExtractError::HttpStatus(status) => *status >= 500,
            ExtractError::ResponseTooLarge(_)
            | ExtractError::InvalidUtf8
            | ExtractError::InvalidUrl
            | ExtractError::InsecureGateway => false,
        }
    }
}

/// Fetch readable full text for an article URL through the reader gateway.
///
/// The article URL must be a well-formed http(s) URL. The gateway must be
/// HTTPS; plain HTTP is accepted only for localhost so tests can run
/// against a local mock. The response body is streamed with a hard size
/// cap, and transient failures are retried with exponential backoff.
pub async fn fetch_full_text(
    client: &reqwest::Client,
    article_url: &str,
    gateway: &str,
) -> Result<String, ExtractError> {
    let parsed = url::Url::parse(article_url).map_err(|_| ExtractError::InvalidUrl)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ExtractError::InvalidUrl);
    }

    if !gateway.starts_with("https://") {
        let is_localhost =
            gateway.starts_with("http://127.0.0.1") || gateway.starts_with("http://localhost");
        if !is_localhost {
            tracing::error!(gateway = %gateway, "rejecting non-HTTPS gateway URL");
            return Err(ExtractError::InsecureGateway);
        }
        tracing::warn!(gateway = %gateway, "using non-HTTPS gateway (localhost only)");
    }

    let request_url = format!("{}/{}", gateway.trim_end_matches('/'), parsed.as_str());
    fetch_with_retry(client, &request_url, gateway).await
}

/// Retry transient failures with exponential backoff: 1s, 2s, 4s.
async fn fetch_with_retry(
    client: &reqwest::Client,
    request_url: &str,
    gateway: &str,
) -> Result<String, ExtractError> {
    const MAX_RETRIES: u32 = 3;
    let mut retry_count = 0;

    loop {
        match fetch_once(client, request_url, gateway).await {
            Ok(content) => return Ok(content),
            Err(e) if e.is_retryable() && retry_count < MAX_RETRIES => {
                let delay = 1u64 << retry_count;
                tracing::debug!(
                    error = %e,
                    retry = retry_count + 1,
                    delay_secs = delay,
                    "retrying full-text fetch after transient error"
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
                retry_count += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn fetch_once(
    client: &reqwest::Client,
    request_url: &str,
    gateway: &str,
) -> Result<String, ExtractError> {
    let mut request = client.get(request_url);

    // The API key is only ever sent to the official gateway; custom
    // gateways (self-hosted, tests) never see the credential.
    if let Some(key) = gateway_api_key() {
        if gateway == DEFAULT_GATEWAY {
            request = request.header("Authorization", format!("Bearer {}", key.expose_secret()));
        } else {
            tracing::debug!("skipping API key for custom gateway");
        }
    }

    let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
        .await
        .map_err(|_| ExtractError::Timeout)?
        .map_err(ExtractError::Network)?;

    if !response.status().is_success() {
        return Err(ExtractError::HttpStatus(response.status().as_u16()));
    }

    read_limited_text(response, MAX_CONTENT_SIZE).await
}

/// Stream the body with a hard size cap, rejecting oversized responses
/// before they are buffered in full.
async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ExtractError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ExtractError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ExtractError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ExtractError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ExtractError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_success_returns_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(".*"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# Full Text\n\nBody"))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_full_text(
            &client,
            "https://example.com/article",
            &mock_server.uri(),
        )
        .await
        .unwrap();

        assert!(result.contains("Full Text"));
    }

    #[tokio::test]
    async fn malformed_article_url_rejected() {
        let client = reqwest::Client::new();
        let result = fetch_full_text(&client, "not-a-url", DEFAULT_GATEWAY).await;
        assert!(matches!(result, Err(ExtractError::InvalidUrl)));
    }

    #[tokio::test]
    async fn non_http_scheme_rejected() {
        let client = reqwest::Client::new();
        let result = fetch_full_text(&client, "file:///etc/passwd", DEFAULT_GATEWAY).await;
        assert!(matches!(result, Err(ExtractError::InvalidUrl)));
    }

    #[tokio::test]
    async fn plain_http_gateway_rejected() {
        let client = reqwest::Client::new();
        let result = fetch_full_text(
            &client,
            "https://example.com/article",
            "http://evil.example.com",
        )
        .await;
        assert!(matches!(result, Err(ExtractError::InsecureGateway)));
    }

    #[tokio::test]
    async fn localhost_gateway_allowed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(".*"))
            .respond_with(ResponseTemplate::new(200).set_body_string("content"))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        // MockServer binds 127.0.0.1, which is exempt from the HTTPS rule.
        let result =
            fetch_full_text(&client, "https://example.com/article", &mock_server.uri()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn http_404_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result =
            fetch_full_text(&client, "https://example.com/article", &mock_server.uri()).await;
        assert!(matches!(result, Err(ExtractError::HttpStatus(404))));
    }

    #[tokio::test]
    async fn http_500_retries_then_succeeds() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result =
            fetch_full_text(&client, "https://example.com/article", &mock_server.uri()).await;
        assert_eq!(result.unwrap(), "recovered");
    }

    #[tokio::test]
    async fn oversized_content_length_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'a'; MAX_CONTENT_SIZE + 1]))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result =
            fetch_full_text(&client, "https://example.com/article", &mock_server.uri()).await;
        assert!(matches!(result, Err(ExtractError::ResponseTooLarge(_))));
    }

    #[test]
    fn retryability_taxonomy() {
        assert!(ExtractError::Timeout.is_retryable());
        assert!(ExtractError::HttpStatus(503).is_retryable());
        assert!(!ExtractError::HttpStatus(404).is_retryable());
        assert!(!ExtractError::InvalidUrl.is_retryable());
        assert!(!ExtractError::ResponseTooLarge(1).is_retryable());
    }
}
