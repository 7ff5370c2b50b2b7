//! End-to-end browser flows against the router, with the identity provider
//! and downstream API mocked by wiremock.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use oidc_gate_access::{MemorySessionStore, SessionStore};
use oidc_gate_server::{app, auth::AppState, config::ServerConfig};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{header as header_is, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLIENT_ID: &str = "cid";
const CLIENT_SECRET: &str = "client-secret-for-hs256-signing";
const APP_SECRET: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

struct Harness {
    provider: MockServer,
    downstream: MockServer,
    router: Router,
    sessions: Arc<MemorySessionStore>,
    cookies: HashMap<String, String>,
}

impl Harness {
    async fn start() -> Self {
        Self::configured(Vec::new()).await
    }

    /// Starts against a healthy provider with extra configuration overrides.
    async fn configured(overrides: Vec<(&'static str, config::Value)>) -> Self {
        let provider = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": format!("{}/", provider.uri()),
                "authorization_endpoint": format!("{}/authorize", provider.uri()),
                "token_endpoint": format!("{}/oauth/token", provider.uri()),
                "jwks_uri": format!("{}/.well-known/jwks.json", provider.uri()),
                "response_types_supported": ["code"],
                "subject_types_supported": ["public"],
                "id_token_signing_alg_values_supported": ["RS256", "HS256"],
            })))
            .mount(&provider)
            .await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": [] })))
            .mount(&provider)
            .await;
        Self::with_provider(provider, overrides).await
    }

    async fn with_provider(
        provider: MockServer,
        overrides: Vec<(&'static str, config::Value)>,
    ) -> Self {
        let downstream = MockServer::start().await;
        let mut builder = config::Config::builder()
            .set_override("app_secret_key", APP_SECRET)
            .and_then(|b| b.set_override("app_base_url", "http://localhost:8080"))
            .and_then(|b| b.set_override("session.secure_cookies", false))
            .and_then(|b| b.set_override("downstream.base_url", downstream.uri()))
            .and_then(|b| b.set_override("oidc.domain", provider.uri()))
            .and_then(|b| b.set_override("oidc.client_id", CLIENT_ID))
            .and_then(|b| b.set_override("oidc.client_secret", CLIENT_SECRET))
            .and_then(|b| {
                b.set_override("oidc.redirect_uri", "http://localhost:8080/auth/callback")
            })
            .expect("overrides");
        for (key, value) in overrides {
            builder = builder.set_override(key, value).expect("override");
        }
        let config = ServerConfig::from_config(builder.build().expect("config"))
            .expect("server config");
        let sessions = Arc::new(MemorySessionStore::new());
        let store: Arc<dyn SessionStore> = sessions.clone();
        let state = AppState::new(config, reqwest::Client::new(), store).expect("state");

        Self {
            provider,
            downstream,
            router: app::router(state),
            sessions,
            cookies: HashMap::new(),
        }
    }

    /// Sends a GET with the stored cookies and records any cookie changes.
    async fn get(&mut self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri), Body::empty()).await
    }

    /// Sends a urlencoded form POST with the stored cookies.
    async fn post_form(&mut self, uri: &str, form: &str) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        self.send(request, Body::from(form.to_string())).await
    }

    async fn send(&mut self, mut request: axum::http::request::Builder, body: Body) -> Response {
        let cookie_header = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        if !cookie_header.is_empty() {
            request = request.header(header::COOKIE, cookie_header);
        }
        let response = self
            .router
            .clone()
            .oneshot(request.body(body).expect("request"))
            .await
            .expect("response");

        for set_cookie in response.headers().get_all(header::SET_COOKIE) {
            let set_cookie = set_cookie.to_str().expect("ascii cookie");
            let pair = set_cookie.split(';').next().unwrap_or_default();
            let (name, value) = pair.split_once('=').expect("name=value");
            let removed = value.is_empty() || set_cookie.contains("Max-Age=0");
            if removed {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }
        response
    }

    /// Runs `/auth/login` and returns the authorization URL query.
    async fn start_login(&mut self) -> HashMap<String, String> {
        let response = self.get("/auth/login").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        let url = Url::parse(location(&response)).expect("authorize url");
        assert_eq!(url.path(), "/authorize");
        url.query_pairs().into_owned().collect()
    }

    async fn mount_token_endpoint(&self, nonce: &str) {
        let issuer = format!("{}/", self.provider.uri());
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "abc123",
                "token_type": "Bearer",
                "id_token": id_token(&issuer, nonce),
                "expires_in": 86400,
            })))
            .mount(&self.provider)
            .await;
    }

    /// Completes a full login as Alice.
    async fn log_in(&mut self) {
        let query = self.start_login().await;
        self.mount_token_endpoint(&query["nonce"]).await;
        let response = self
            .get(&format!(
                "/auth/callback?code=valid-code&state={}",
                query["state"]
            ))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
    }
}

fn id_token(issuer: &str, nonce: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    encode(
        &Header::new(Algorithm::HS256),
        &json!({
            "iss": issuer,
            "aud": CLIENT_ID,
            "sub": "auth0|alice",
            "name": "Alice",
            "email": "alice@example.com",
            "iat": now,
            "exp": now + 600,
            "nonce": nonce,
        }),
        &EncodingKey::from_secret(CLIENT_SECRET.as_bytes()),
    )
    .expect("encode")
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("location")
        .to_str()
        .expect("ascii location")
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8")
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).expect("json")
}

#[tokio::test]
async fn fresh_browser_is_sent_to_login() {
    let mut harness = Harness::start().await;

    let response = harness.get("/private").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/auth/login");
    assert!(!harness.cookies.contains_key("session"));
}

#[tokio::test]
async fn cookieless_requests_store_no_sessions() {
    let mut harness = Harness::start().await;

    for _ in 0..50 {
        harness.cookies.clear();
        for uri in ["/", "/public", "/private", "/api/private"] {
            let response = harness.get(uri).await;
            assert!(response.headers().get(header::SET_COOKIE).is_none());
        }
    }

    assert!(harness.sessions.is_empty());
}

#[tokio::test]
async fn gated_api_does_not_call_downstream_when_unauthenticated() {
    let mut harness = Harness::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.downstream)
        .await;

    let response = harness.get("/api/private").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/auth/login");
}

#[tokio::test]
async fn home_reports_unauthenticated_session() {
    let mut harness = Harness::start().await;

    let body = body_json(harness.get("/").await).await;

    assert_eq!(body, json!({ "authenticated": false, "user": null }));
}

#[tokio::test]
async fn health_bypasses_session_layer() {
    let mut harness = Harness::start().await;

    let response = harness.get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn public_content_needs_no_login() {
    let mut harness = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/api/public"))
        .respond_with(ResponseTemplate::new(200).set_body_string("public data"))
        .mount(&harness.downstream)
        .await;

    assert_eq!(harness.get("/public").await.status(), StatusCode::OK);
    let response = harness.get("/api/public").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "public data");
}

#[tokio::test]
async fn login_redirects_with_complete_authorization_query() {
    let mut harness = Harness::start().await;

    let query = harness.start_login().await;

    assert_eq!(query["client_id"], CLIENT_ID);
    assert_eq!(query["redirect_uri"], "http://localhost:8080/auth/callback");
    assert_eq!(query["response_type"], "code");
    assert_eq!(query["scope"], "openid profile email");
    assert_eq!(query["code_challenge_method"], "S256");
    assert!(!query["state"].is_empty());
    assert!(!query["nonce"].is_empty());
    assert!(harness.cookies.contains_key("auth_state"));
}

#[tokio::test]
async fn full_login_downstream_and_logout_flow() {
    let mut harness = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/api/private"))
        .and(header_is("authorization", "Bearer abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("private data"))
        .expect(1)
        .mount(&harness.downstream)
        .await;

    let _ = harness.get("/").await;
    assert!(!harness.cookies.contains_key("session"));

    harness.log_in().await;

    assert!(harness.cookies.contains_key("session"));
    assert!(!harness.cookies.contains_key("auth_state"));
    assert_eq!(harness.sessions.len(), 1);

    let home = body_json(harness.get("/").await).await;
    assert_eq!(home["authenticated"], json!(true));
    assert_eq!(home["user"]["name"], json!("Alice"));
    assert_eq!(home["user"]["email"], json!("alice@example.com"));
    assert!(!home.to_string().contains("abc123"));

    let private = harness.get("/private").await;
    assert_eq!(private.status(), StatusCode::OK);
    assert!(body_text(private).await.contains("Alice"));

    let api = harness.get("/api/private").await;
    assert_eq!(api.status(), StatusCode::OK);
    assert_eq!(body_text(api).await, "private data");

    let authenticated_cookie = harness.cookies["session"].clone();
    let logout = harness.get("/auth/logout").await;
    assert_eq!(logout.status(), StatusCode::FOUND);
    assert_eq!(
        location(&logout),
        format!(
            "{}/v2/logout?returnTo=http%3A%2F%2Flocalhost%3A8080%2F&client_id=cid",
            harness.provider.uri()
        )
    );
    assert!(!harness.cookies.contains_key("session"));
    assert!(harness.sessions.is_empty());

    // Replaying the old cookie after logout must not resurrect the login.
    harness
        .cookies
        .insert("session".to_string(), authenticated_cookie);
    let home = body_json(harness.get("/").await).await;
    assert_eq!(home["authenticated"], json!(false));
    assert!(!harness.cookies.contains_key("session"));
    assert!(harness.sessions.is_empty());
}

#[tokio::test]
async fn form_post_callback_completes_login_over_https() {
    let mut harness = Harness::configured(vec![
        ("session.secure_cookies", true.into()),
        ("oidc.response_mode", "form_post".into()),
    ])
    .await;

    let login = harness.get("/auth/login").await;
    assert_eq!(login.status(), StatusCode::FOUND);
    let auth_state = login
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("auth_state="))
        .expect("auth_state cookie")
        .to_string();
    assert!(auth_state.contains("SameSite=None"));
    assert!(auth_state.contains("Secure"));

    let url = Url::parse(location(&login)).expect("authorize url");
    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
    assert_eq!(query["response_mode"], "form_post");
    harness.mount_token_endpoint(&query["nonce"]).await;

    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("code", "valid-code")
        .append_pair("state", &query["state"])
        .finish();
    let response = harness.post_form("/auth/callback", &form).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(!harness.cookies.contains_key("auth_state"));
    let home = body_json(harness.get("/").await).await;
    assert_eq!(home["authenticated"], json!(true));
    assert_eq!(home["user"]["name"], json!("Alice"));
}

#[tokio::test]
async fn form_post_callback_with_forged_state_is_rejected() {
    let mut harness = Harness::start().await;
    let query = harness.start_login().await;
    harness.mount_token_endpoint(&query["nonce"]).await;

    let response = harness
        .post_form("/auth/callback", "code=valid-code&state=forged")
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(harness.sessions.is_empty());
}

#[tokio::test]
async fn callback_with_mismatched_state_is_rejected() {
    let mut harness = Harness::start().await;
    let query = harness.start_login().await;
    harness.mount_token_endpoint(&query["nonce"]).await;

    let response = harness
        .get("/auth/callback?code=valid-code&state=forged")
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!harness.cookies.contains_key("auth_state"));
    let home = body_json(harness.get("/").await).await;
    assert_eq!(home["authenticated"], json!(false));
}

#[tokio::test]
async fn callback_without_pending_login_is_rejected() {
    let mut harness = Harness::start().await;

    let response = harness
        .get("/auth/callback?code=valid-code&state=anything")
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn provider_error_on_callback_is_login_failed() {
    let mut harness = Harness::start().await;
    let query = harness.start_login().await;

    let response = harness
        .get(&format!(
            "/auth/callback?error=access_denied&error_description=User%20cancelled&state={}",
            query["state"]
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!body_text(response).await.contains("cancelled"));
}

#[tokio::test]
async fn rejected_code_leaves_session_unauthenticated() {
    let mut harness = Harness::start().await;
    let query = harness.start_login().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid authorization code",
        })))
        .mount(&harness.provider)
        .await;

    let response = harness
        .get(&format!(
            "/auth/callback?code=already-used-code&state={}",
            query["state"]
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let home = body_json(harness.get("/").await).await;
    assert_eq!(home["authenticated"], json!(false));
}

#[tokio::test]
async fn login_is_unavailable_when_discovery_fails() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&provider)
        .await;
    let mut harness = Harness::with_provider(provider, Vec::new()).await;

    let response = harness.get("/auth/login").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn logout_without_login_still_redirects_to_provider() {
    let mut harness = Harness::start().await;

    let first = harness.get("/auth/logout").await;
    let second = harness.get("/auth/logout").await;

    assert_eq!(first.status(), StatusCode::FOUND);
    assert_eq!(location(&first), location(&second));
}
