use crate::error::{ClientError, Result};
use crate::model::ApiErrors;
use chrono::{DateTime, Local};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.twitter.com/";
pub const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";
/// Added to the advertised reset time to absorb clock skew.
pub const RESET_MARGIN_SECS: i64 = 5;

/// Invoked with every computed rate-limit wait, before sleeping.
pub type WaitCallback = Arc<dyn Fn(Duration) + Send + Sync>;

/// Application-only OAuth2 bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BearerToken {
    pub token_type: String,
    pub access_token: String,
}

/// Sends one request at a time, attaching the bearer token and waiting out
/// 429/503 responses until the advertised reset.
pub struct RateLimitedTransport {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
    wait_callback: Option<WaitCallback>,
}

impl RateLimitedTransport {
    pub fn new(base_url: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("nucoll/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(15))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: normalize_base(base_url),
            access_token: None,
            wait_callback: None,
        })
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_wait_callback(mut self, callback: WaitCallback) -> Self {
        self.wait_callback = Some(callback);
        self
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Plain HTTP client, for requests that must not carry the bearer token.
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Resolve `path` against the API base and append query parameters in order.
    pub fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base_url.join(path)?;
        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Exchange consumer credentials for a bearer token and keep it for every
    /// later call made through this transport.
    pub async fn authenticate(
        &mut self,
        consumer_key: &str,
        consumer_secret: &str,
    ) -> Result<BearerToken> {
        let url = self.endpoint("oauth2/token", &[])?;
        let request = self
            .client
            .post(url)
            .basic_auth(consumer_key, Some(consumer_secret))
            .form(&[("grant_type", "client_credentials")])
            .build()?;

        let token: BearerToken = self.decode("oauth2/token", self.execute(request).await?).await?;
        if token.token_type != "bearer" {
            return Err(ClientError::InvalidToken(format!(
                "unexpected token type '{}'",
                token.token_type
            )));
        }

        self.access_token = Some(token.access_token.clone());
        Ok(token)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let endpoint = url.path().to_string();
        let request = self.client.get(url).build()?;
        let response = self.execute(request).await?;
        self.decode(&endpoint, response).await
    }

    async fn decode<T: DeserializeOwned>(&self, endpoint: &str, response: Response) -> Result<T> {
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| ClientError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    /// Send `request`, retrying it unchanged for as long as the server keeps
    /// throttling. Only a 200 is returned as success.
    pub async fn execute(&self, mut request: Request) -> Result<Response> {
        if let Some(ref token) = self.access_token
            && !request.headers().contains_key(AUTHORIZATION)
        {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ClientError::InvalidToken("token is not a valid header value".into()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        loop {
            let attempt = request
                .try_clone()
                .ok_or_else(|| ClientError::NotRetryable(request.url().to_string()))?;
            debug!("{} {}", attempt.method(), attempt.url());

            let response = self.client.execute(attempt).await?;
            let status = response.status();

            match status {
                StatusCode::OK => return Ok(response),
                StatusCode::UNAUTHORIZED => {
                    warn!("{} returned {}", request.url().path(), status);
                    return Err(ClientError::Unauthorized(status));
                }
                StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                    let reset = rate_limit_reset(response.headers())
                        .ok_or(ClientError::Throttled { status })?;
                    let wait = throttle_delay(reset, SystemTime::now());
                    warn!(
                        "response code {} received; waiting until {} to resume",
                        status.as_u16(),
                        resume_time(reset)
                    );
                    if let Some(ref callback) = self.wait_callback {
                        callback(wait);
                    }
                    tokio::time::sleep(wait).await;
                }
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    let message = serde_json::from_str::<ApiErrors>(&body)
                        .ok()
                        .and_then(|errors| errors.summary());
                    return Err(ClientError::Status { status, message });
                }
            }
        }
    }
}

/// Time left until `reset + RESET_MARGIN_SECS`, or zero if already past.
pub fn throttle_delay(reset: i64, now: SystemTime) -> Duration {
    let resume = reset.saturating_add(RESET_MARGIN_SECS);
    if resume <= 0 {
        return Duration::ZERO;
    }
    let resume_at = UNIX_EPOCH + Duration::from_secs(resume as u64);
    resume_at.duration_since(now).unwrap_or(Duration::ZERO)
}

fn rate_limit_reset(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(RATE_LIMIT_RESET_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn resume_time(reset: i64) -> String {
    DateTime::from_timestamp(reset.saturating_add(RESET_MARGIN_SECS), 0)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| reset.to_string())
}

// Url::join drops the last path segment unless the base ends with '/'.
fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, header, header_exists, method, path},
    };

    fn unix_now() -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
    }

    async fn transport_for(server: &MockServer) -> RateLimitedTransport {
        RateLimitedTransport::new(Url::parse(&server.uri()).unwrap())
            .unwrap()
            .with_access_token("secret-token")
    }

    #[test]
    fn test_throttle_delay_adds_margin() {
        let now = UNIX_EPOCH + Duration::from_secs(1_000);
        assert_eq!(throttle_delay(1_000, now), Duration::from_secs(5));
        assert_eq!(throttle_delay(1_060, now), Duration::from_secs(65));
    }

    #[test]
    fn test_throttle_delay_never_negative() {
        let now = UNIX_EPOCH + Duration::from_secs(1_000);
        assert_eq!(throttle_delay(900, now), Duration::ZERO);
        assert_eq!(throttle_delay(995, now), Duration::ZERO);
        assert_eq!(throttle_delay(-10, now), Duration::ZERO);
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let transport =
            RateLimitedTransport::new(Url::parse("http://localhost:8080/api").unwrap()).unwrap();
        let url = transport
            .endpoint("1.1/friends/ids.json", &[("screen_name", "jdevoo".to_string())])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/1.1/friends/ids.json?screen_name=jdevoo"
        );
    }

    #[tokio::test]
    async fn test_bearer_token_attached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let url = transport.endpoint("ping", &[]).unwrap();
        let value: serde_json::Value = transport.get_json(url).await.unwrap();
        assert!(value.is_object());
    }

    #[tokio::test]
    async fn test_throttled_once_then_succeeds() {
        let server = MockServer::start().await;
        // Reset already in the past: the computed wait must clamp to zero.
        let reset = unix_now() - 60;

        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(
                ResponseTemplate::new(429).insert_header(RATE_LIMIT_RESET_HEADER, reset.to_string()),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let waits: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));
        let waits_clone = waits.clone();
        let transport = transport_for(&server)
            .await
            .with_wait_callback(Arc::new(move |wait| waits_clone.lock().unwrap().push(wait)));

        let url = transport.endpoint("limited", &[]).unwrap();
        let value: serde_json::Value = transport.get_json(url).await.unwrap();

        assert_eq!(value["ok"], true);
        assert_eq!(*waits.lock().unwrap(), vec![Duration::ZERO]);
    }

    #[tokio::test]
    async fn test_service_unavailable_waits_until_reset() {
        let server = MockServer::start().await;
        let reset = unix_now() - 4;

        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(
                ResponseTemplate::new(503).insert_header(RATE_LIMIT_RESET_HEADER, reset.to_string()),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let waits: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));
        let waits_clone = waits.clone();
        let transport = transport_for(&server)
            .await
            .with_wait_callback(Arc::new(move |wait| waits_clone.lock().unwrap().push(wait)));

        let url = transport.endpoint("busy", &[]).unwrap();
        let value: Vec<u64> = transport.get_json(url).await.unwrap();
        assert!(value.is_empty());

        let waits = waits.lock().unwrap();
        assert_eq!(waits.len(), 1);
        assert!(waits[0] <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_throttled_without_reset_header_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let url = transport.endpoint("limited", &[]).unwrap();
        let err = transport.get_json::<serde_json::Value>(url).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Throttled {
                status: StatusCode::TOO_MANY_REQUESTS
            }
        ));
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/private"))
            .respond_with(
                ResponseTemplate::new(401)
                    .insert_header(RATE_LIMIT_RESET_HEADER, (unix_now() + 900).to_string()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let waits: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));
        let waits_clone = waits.clone();
        let transport = transport_for(&server)
            .await
            .with_wait_callback(Arc::new(move |wait| waits_clone.lock().unwrap().push(wait)));

        let url = transport.endpoint("private", &[]).unwrap();
        let err = transport.get_json::<serde_json::Value>(url).await.unwrap_err();

        assert!(matches!(err, ClientError::Unauthorized(StatusCode::UNAUTHORIZED)));
        assert!(waits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_status_carries_api_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                r#"{"errors":[{"message":"Sorry, that page does not exist.","code":34}]}"#,
            ))
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let url = transport.endpoint("missing", &[]).unwrap();
        let err = transport.get_json::<serde_json::Value>(url).await.unwrap_err();

        match err {
            ClientError::Status { status, message } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(message.as_deref(), Some("Sorry, that page does not exist. (34)"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let url = transport.endpoint("garbage", &[]).unwrap();
        let err = transport.get_json::<serde_json::Value>(url).await.unwrap_err();
        assert!(matches!(err, ClientError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_authenticate_stores_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"token_type":"bearer","access_token":"AAAA"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/after"))
            .and(header("authorization", "Bearer AAAA"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let mut transport = RateLimitedTransport::new(Url::parse(&server.uri()).unwrap()).unwrap();
        assert!(!transport.has_access_token());

        let token = transport.authenticate("key", "secret").await.unwrap();
        assert_eq!(token.access_token, "AAAA");
        assert!(transport.has_access_token());

        let url = transport.endpoint("after", &[]).unwrap();
        let _: serde_json::Value = transport.get_json(url).await.unwrap();
    }

    #[tokio::test]
    async fn test_authenticate_rejects_other_token_types() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"token_type":"mac","access_token":"AAAA"}"#),
            )
            .mount(&server)
            .await;

        let mut transport = RateLimitedTransport::new(Url::parse(&server.uri()).unwrap()).unwrap();
        let err = transport.authenticate("key", "secret").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidToken(_)));
        assert!(!transport.has_access_token());
    }
}
