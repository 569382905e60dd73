//! Credential-holding proxy in front of the generation API.
//!
//! The gateway is stateless: every request is checked, forwarded and relayed
//! on its own. The upstream key is read once at startup and never leaves the
//! process. All responses, failures included, carry permissive CORS headers
//! so a client on another origin can read them.

mod error;
mod upstream;

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::extract::{DefaultBodyLimit, Path, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::Instrument;
use uuid::Uuid;

pub use error::GatewayError;
pub use upstream::{FalUpstream, Upstream, UpstreamPayload, UpstreamReply};

use crate::config::GatewayConfig;
use crate::core::is_valid_request_id;

/// Name reported by the health endpoint
pub const SERVICE_NAME: &str = "AI Picture Magic API";

const CORS_HEADERS: [(header::HeaderName, &str); 4] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
    (header::ACCESS_CONTROL_MAX_AGE, "86400"),
];

/// Shared state for the gateway routes.
#[derive(Clone)]
pub struct GatewayState {
    pub upstream: Arc<dyn Upstream>,
    /// `None` when the hosting environment did not provide a key
    pub api_key: Option<Arc<SecretString>>,
    pub max_body_bytes: usize,
}

impl GatewayState {
    pub fn new(upstream: Arc<dyn Upstream>, api_key: Option<SecretString>) -> Self {
        Self {
            upstream,
            api_key: api_key.map(Arc::new),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }

    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    fn api_key(&self) -> Result<&SecretString, GatewayError> {
        self.api_key.as_deref().ok_or(GatewayError::MissingApiKey)
    }
}

/// Build the gateway router.
pub fn router(state: GatewayState) -> Router {
    let body_limit = state.max_body_bytes;

    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/generate", post(generate))
        .route("/status/{request_id}", get(status))
        .route("/result/{request_id}", get(result))
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(cors_and_trace))
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: &GatewayConfig, api_key: Option<SecretString>) -> anyhow::Result<()> {
    if api_key.is_none() {
        tracing::warn!(
            "{} is not set; proxied routes will answer 500 until it is",
            crate::config::API_KEY_ENV
        );
    }

    let upstream = Arc::new(FalUpstream::new(&config.submit_url, &config.requests_url));
    let state = GatewayState::new(upstream, api_key).with_max_body_bytes(config.max_body_bytes);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    tracing::info!("Gateway listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down gateway");
        })
        .await?;

    Ok(())
}

// -- Middleware --

/// Answer preflights directly, stamp CORS headers on everything else, and
/// log one line per request.
async fn cors_and_trace(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return with_cors(StatusCode::NO_CONTENT.into_response());
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let span = tracing::info_span!("request", id = %Uuid::new_v4(), %method, %path);

    async move {
        let started = Instant::now();
        let response = next.run(req).await;
        tracing::info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Handled request"
        );
        with_cors(response)
    }
    .instrument(span)
    .await
}

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    for (name, value) in CORS_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}

// -- Handlers --

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

async fn not_found() -> GatewayError {
    GatewayError::NotFound
}

/// Fields accepted on `/generate`; everything is optional so that missing
/// fields become a 400 rather than a parse failure.
#[derive(Debug, Deserialize)]
struct GenerateBody {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    image_urls: Option<Vec<String>>,
    #[serde(default)]
    num_images: Option<u32>,
    #[serde(default)]
    output_format: Option<String>,
}

impl GenerateBody {
    fn into_payload(self) -> Result<UpstreamPayload, GatewayError> {
        let prompt = self.prompt.filter(|p| !p.trim().is_empty());
        let image_urls = self.image_urls.filter(|urls| !urls.is_empty());

        let (Some(prompt), Some(image_urls)) = (prompt, image_urls) else {
            return Err(GatewayError::Validation(
                "Missing required fields: prompt and image_urls".to_string(),
            ));
        };

        Ok(UpstreamPayload {
            prompt,
            image_urls,
            num_images: self.num_images.filter(|n| *n > 0).unwrap_or(1),
            output_format: self
                .output_format
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| "png".to_string()),
        })
    }
}

async fn generate(
    State(state): State<GatewayState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, GatewayError> {
    let api_key = state.api_key()?;

    let body = body.map_err(|rejection| GatewayError::Rejected {
        status: rejection.status(),
        message: rejection.body_text(),
    })?;

    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::Internal(format!("Invalid JSON body: {}", e)))?;
    let payload = serde_json::from_value::<GenerateBody>(value)
        .map_err(|e| GatewayError::Validation(format!("Invalid request body: {}", e)))?
        .into_payload()?;

    let reply = state.upstream.submit(api_key, &payload).await?;
    relay(reply, "Generation request failed")
}

async fn status(
    State(state): State<GatewayState>,
    request_id: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, GatewayError> {
    let api_key = state.api_key()?;
    let request_id = checked_request_id(request_id)?;

    let reply = state.upstream.status(api_key, &request_id).await?;
    relay(reply, "Status check failed")
}

async fn result(
    State(state): State<GatewayState>,
    request_id: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, GatewayError> {
    let api_key = state.api_key()?;
    let request_id = checked_request_id(request_id)?;

    let reply = state.upstream.result(api_key, &request_id).await?;
    relay(reply, "Result fetch failed")
}

/// Undecodable path segments are refused the same way as bad characters.
fn checked_request_id(
    request_id: Result<Path<String>, PathRejection>,
) -> Result<String, GatewayError> {
    let Path(request_id) = request_id.map_err(|rejection| {
        tracing::warn!("Rejected undecodable request id: {}", rejection.body_text());
        GatewayError::InvalidRequestId
    })?;

    if is_valid_request_id(&request_id) {
        Ok(request_id)
    } else {
        tracing::warn!(request_id = %request_id, "Rejected malformed request id");
        Err(GatewayError::InvalidRequestId)
    }
}

/// Pass a 2xx body through untouched; turn anything else into an envelope
/// carrying the upstream status.
fn relay(reply: UpstreamReply, fallback: &str) -> Result<Json<Value>, GatewayError> {
    if reply.status.is_success() {
        return Ok(Json(reply.body));
    }

    Err(GatewayError::Upstream {
        status: reply.status,
        message: reply.error_detail().unwrap_or_else(|| fallback.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::HeaderMap;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Scripted upstream that records every call it receives.
    #[derive(Default)]
    struct MockUpstream {
        calls: Mutex<Vec<String>>,
        submitted: Mutex<Vec<UpstreamPayload>>,
        submit_reply: Mutex<Option<UpstreamReply>>,
        status_reply: Mutex<Option<UpstreamReply>>,
        result_reply: Mutex<Option<UpstreamReply>>,
    }

    impl MockUpstream {
        fn take(slot: &Mutex<Option<UpstreamReply>>) -> UpstreamReply {
            slot.lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| UpstreamReply::ok(json!({})))
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Upstream for MockUpstream {
        async fn submit(
            &self,
            _api_key: &SecretString,
            payload: &UpstreamPayload,
        ) -> Result<UpstreamReply, GatewayError> {
            self.calls.lock().unwrap().push("submit".to_string());
            self.submitted.lock().unwrap().push(payload.clone());
            Ok(Self::take(&self.submit_reply))
        }

        async fn status(
            &self,
            _api_key: &SecretString,
            request_id: &str,
        ) -> Result<UpstreamReply, GatewayError> {
            self.calls.lock().unwrap().push(format!("status:{}", request_id));
            Ok(Self::take(&self.status_reply))
        }

        async fn result(
            &self,
            _api_key: &SecretString,
            request_id: &str,
        ) -> Result<UpstreamReply, GatewayError> {
            self.calls.lock().unwrap().push(format!("result:{}", request_id));
            Ok(Self::take(&self.result_reply))
        }
    }

    fn test_state(mock: Arc<MockUpstream>, with_key: bool) -> GatewayState {
        let key = with_key.then(|| SecretString::from("test-key".to_string()));
        GatewayState::new(mock, key)
    }

    async fn send(
        state: GatewayState,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        let resp = router(state)
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, json)
    }

    fn assert_cors(headers: &HeaderMap) {
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
        assert_eq!(headers["access-control-allow-headers"], "Content-Type");
        assert_eq!(headers["access-control-max-age"], "86400");
    }

    #[tokio::test]
    async fn health_needs_no_key_or_upstream() {
        let mock = Arc::new(MockUpstream::default());
        for path in ["/", "/health"] {
            let (status, headers, body) = send(test_state(mock.clone(), false), "GET", path, None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({"status": "ok", "service": SERVICE_NAME}));
            assert_cors(&headers);
        }
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn preflight_returns_empty_with_cors() {
        let mock = Arc::new(MockUpstream::default());
        let (status, headers, body) =
            send(test_state(mock.clone(), true), "OPTIONS", "/generate", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);
        assert_cors(&headers);

        let (status, _, _) = send(test_state(mock.clone(), true), "OPTIONS", "/anything/else", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_routes_and_methods_are_404() {
        let mock = Arc::new(MockUpstream::default());
        for (method, path) in [("GET", "/nope"), ("GET", "/generate"), ("POST", "/health"), ("DELETE", "/status/abc")] {
            let (status, headers, body) = send(test_state(mock.clone(), true), method, path, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, path);
            assert_eq!(body, json!({"error": "Not found"}));
            assert_cors(&headers);
        }
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_key_is_500_without_upstream_calls() {
        let mock = Arc::new(MockUpstream::default());
        let cases = [
            ("POST", "/generate", Some(json!({"prompt": "x", "image_urls": ["data:"]}))),
            ("GET", "/status/abc", None),
            ("GET", "/result/abc", None),
        ];
        for (method, path, body) in cases {
            let (status, headers, json) = send(test_state(mock.clone(), false), method, path, body).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(json, json!({"error": "API key not configured"}));
            assert_cors(&headers);
        }
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn generate_without_image_urls_is_400() {
        let mock = Arc::new(MockUpstream::default());
        let bodies = [
            json!({"prompt": "make it pop"}),
            json!({"prompt": "make it pop", "image_urls": []}),
            json!({"prompt": "   ", "image_urls": ["data:image/png;base64,AA=="]}),
            json!({"image_urls": ["data:image/png;base64,AA=="]}),
        ];
        for body in bodies {
            let (status, headers, json) =
                send(test_state(mock.clone(), true), "POST", "/generate", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["error"], "Missing required fields: prompt and image_urls");
            assert_cors(&headers);
        }
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn generate_with_wrong_field_types_is_400() {
        let mock = Arc::new(MockUpstream::default());
        let (status, _, json) = send(
            test_state(mock.clone(), true),
            "POST",
            "/generate",
            Some(json!({"prompt": 5, "image_urls": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().starts_with("Invalid request body"));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn malformed_json_is_500_with_message() {
        let mock = Arc::new(MockUpstream::default());
        let req = Request::builder()
            .method("POST")
            .uri("/generate")
            .header("Content-Type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = router(test_state(mock.clone(), true)).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_cors(resp.headers());

        let bytes = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json["error"].as_str().unwrap().starts_with("Invalid JSON body"));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn oversized_body_is_413_envelope() {
        let mock = Arc::new(MockUpstream::default());
        let state = test_state(mock.clone(), true).with_max_body_bytes(64);
        let big = json!({"prompt": "x", "image_urls": ["a".repeat(200)]});
        let (status, headers, json) = send(state, "POST", "/generate", Some(big)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(json["error"].is_string());
        assert_cors(&headers);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn generate_normalizes_payload_and_relays_body() {
        let mock = Arc::new(MockUpstream::default());
        *mock.submit_reply.lock().unwrap() = Some(UpstreamReply::ok(
            json!({"request_id": "req-9", "status": "IN_QUEUE", "queue_position": 2}),
        ));

        let (status, headers, json) = send(
            test_state(mock.clone(), true),
            "POST",
            "/generate",
            Some(json!({"prompt": "add a hat", "image_urls": ["data:image/png;base64,AA=="], "num_images": 0})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({"request_id": "req-9", "status": "IN_QUEUE", "queue_position": 2}));
        assert_cors(&headers);

        let submitted = mock.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].prompt, "add a hat");
        assert_eq!(submitted[0].num_images, 1);
        assert_eq!(submitted[0].output_format, "png");
    }

    #[tokio::test]
    async fn upstream_failure_relays_status_and_detail() {
        let mock = Arc::new(MockUpstream::default());
        *mock.submit_reply.lock().unwrap() = Some(UpstreamReply {
            status: StatusCode::UNAUTHORIZED,
            body: json!({"detail": "Invalid key"}),
        });
        *mock.status_reply.lock().unwrap() = Some(UpstreamReply {
            status: StatusCode::NOT_FOUND,
            body: Value::Null,
        });

        let (status, _, json) = send(
            test_state(mock.clone(), true),
            "POST",
            "/generate",
            Some(json!({"prompt": "p", "image_urls": ["u"]})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json, json!({"error": "Invalid key"}));

        let (status, _, json) = send(test_state(mock.clone(), true), "GET", "/status/abc", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json, json!({"error": "Status check failed"}));
    }

    #[tokio::test]
    async fn status_and_result_forward_the_id() {
        let mock = Arc::new(MockUpstream::default());
        *mock.status_reply.lock().unwrap() = Some(UpstreamReply::ok(json!({"status": "COMPLETED"})));
        *mock.result_reply.lock().unwrap() =
            Some(UpstreamReply::ok(json!({"images": [{"url": "https://cdn/x.png"}]})));

        let (status, _, json) = send(test_state(mock.clone(), true), "GET", "/status/req-9", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "COMPLETED");

        let (_, _, json) = send(test_state(mock.clone(), true), "GET", "/result/req-9", None).await;
        assert_eq!(json["images"][0]["url"], "https://cdn/x.png");

        assert_eq!(
            *mock.calls.lock().unwrap(),
            vec!["status:req-9".to_string(), "result:req-9".to_string()]
        );
    }

    #[tokio::test]
    async fn malformed_request_id_never_reaches_upstream() {
        let mock = Arc::new(MockUpstream::default());
        for path in [
            "/status/..%2F..%2Fadmin",
            "/result/abc%3Fx%3D1",
            "/status/a.b",
            "/status/%FF",
            "/result/%C3%28",
        ] {
            let (status, headers, json) = send(test_state(mock.clone(), true), "GET", path, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", path);
            assert_eq!(json, json!({"error": "Invalid request id"}));
            assert_cors(&headers);
        }
        assert_eq!(mock.call_count(), 0);
    }
}
