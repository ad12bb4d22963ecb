//! End-to-end tests driving the full router.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::{Engine, engine::general_purpose::STANDARD};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;
use tollgate_core::{RecordStore, Role, SigningSecret};
use tollgate_gateway::auth::{Claims, TokenCodec};
use tollgate_gateway::{GatewayBuilder, GatewayConfig, MemoryCredentialStore};
use tower::ServiceExt;

struct TestGateway {
    router: Router,
    secret_hex: String,
    _dir: TempDir,
}

fn gateway_with(configure: impl FnOnce(&mut GatewayConfig)) -> TestGateway {
    let dir = TempDir::new().unwrap();
    let secret_hex = SigningSecret::generate_hex().to_string();

    let mut config = GatewayConfig {
        data_dir: dir.path().to_path_buf(),
        ..GatewayConfig::default()
    };
    config.auth.signing_secret = Some(secret_hex.clone());
    configure(&mut config);

    let gateway = GatewayBuilder::new()
        .with_config(config)
        .with_credential_store(Arc::new(MemoryCredentialStore::new()))
        .with_record_store(RecordStore::open(&dir.path().join("records")).unwrap())
        .build()
        .unwrap();

    TestGateway {
        router: gateway.router(),
        secret_hex,
        _dir: dir,
    }
}

fn gateway() -> TestGateway {
    gateway_with(|_| {})
}

impl TestGateway {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn sign_up(&self, username: &str, password: &str, role: &str) -> (StatusCode, Value) {
        let body = json!({"username": username, "password": password, "role": role});
        self.send(json_request("POST", "/signup", None, &body)).await
    }

    async fn sign_in(&self, username: &str, password: &str) -> (StatusCode, Value) {
        let credentials = STANDARD.encode(format!("{username}:{password}"));
        let request = Request::builder()
            .method("POST")
            .uri("/signin")
            .header(header::AUTHORIZATION, format!("Basic {credentials}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => json_request(method, uri, token, &body),
            None => {
                let mut builder = Request::builder().method(method).uri(uri);
                if let Some(token) = token {
                    builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
                }
                builder.body(Body::empty()).unwrap()
            }
        };
        self.send(request).await
    }

    fn codec(&self) -> TokenCodec {
        TokenCodec::new(&SigningSecret::from_hex(&self.secret_hex).unwrap(), None).unwrap()
    }
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn token(body: &Value) -> String {
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_editor_and_admin_scenario() {
    let gw = gateway();

    let (status, body) = gw.sign_up("editor", "editorpw", "editor").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["role"], "editor");
    assert!(body["user"].get("password_hash").is_none());
    let token_a = token(&body);

    let (status, body) = gw.sign_in("editor", "editorpw").await;
    assert_eq!(status, StatusCode::OK);
    let token_b = token(&body);

    let codec = gw.codec();
    assert_eq!(codec.decode(&token_a).unwrap().role, Role::Editor);
    assert_eq!(codec.decode(&token_b).unwrap().role, Role::Editor);

    let (status, record) = gw
        .call("POST", "/api/v2/clothes", Some(&token_b), Some(json!({"name": "test-dress"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/v2/clothes/{}", record["id"]);

    let (status, body) = gw.call("DELETE", &uri, Some(&token_b), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);

    let (status, body) = gw.sign_up("admin", "admin", "admin").await;
    assert_eq!(status, StatusCode::CREATED);
    let token_c = token(&body);

    let (status, body) = gw.call("DELETE", &uri, Some(&token_c), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "test-dress");

    let (status, _) = gw.call("GET", &uri, Some(&token_c), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_role_gates_on_v2() {
    let gw = gateway();
    let (_, body) = gw.sign_up("reader", "pw", "user").await;
    let reader = token(&body);
    let (_, body) = gw.sign_up("writer", "pw", "writer").await;
    let writer = token(&body);

    let (status, _) = gw
        .call("POST", "/api/v2/food", Some(&reader), Some(json!({"name": "apple"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, record) = gw
        .call("POST", "/api/v2/food", Some(&writer), Some(json!({"name": "apple"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/v2/food/{}", record["id"]);

    let (status, list) = gw.call("GET", "/api/v2/food", Some(&reader), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = gw
        .call("PATCH", &uri, Some(&writer), Some(json!({"name": "pear"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_v2_requires_bearer() {
    let gw = gateway();

    let (status, body) = gw.call("GET", "/api/v2/clothes", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);

    let (status, _) = gw.call("GET", "/api/v2/clothes", Some("not.a.token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Missing bearer on a gated write is a 401, never a 403 or 500
    let (status, _) = gw
        .call("DELETE", "/api/v2/clothes/1", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Token signed by someone else
    let foreign = TokenCodec::new(&SigningSecret::generate(), None)
        .unwrap()
        .encode(&Claims {
            sub: "user_x".to_string(),
            username: "mallory".to_string(),
            role: Role::Admin,
            iat: 0,
            exp: None,
        })
        .unwrap();
    let (status, _) = gw.call("DELETE", "/api/v2/clothes/1", Some(&foreign), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unrecognized_role_delete_is_forbidden_not_server_error() {
    let gw = gateway();
    let (_, body) = gw.sign_up("admin", "admin", "admin").await;
    let admin = token(&body);
    let (_, record) = gw
        .call("POST", "/api/v2/clothes", Some(&admin), Some(json!({"name": "hat"})))
        .await;

    // A validly signed token whose role this build does not know
    let ghost = gw
        .codec()
        .encode(&Claims {
            sub: "user_ghost".to_string(),
            username: "ghost".to_string(),
            role: Role::Unrecognized,
            iat: chrono::Utc::now().timestamp(),
            exp: None,
        })
        .unwrap();

    let uri = format!("/api/v2/clothes/{}", record["id"]);
    let (status, body) = gw.call("DELETE", &uri, Some(&ghost), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let gw = gateway_with(|config| config.auth.token_expiry_secs = 60);
    let (status, body) = gw.sign_up("editor", "editorpw", "editor").await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["expires_at"].is_string());

    let codec = TokenCodec::new(
        &SigningSecret::from_hex(&gw.secret_hex).unwrap(),
        Some(std::time::Duration::from_secs(60)),
    )
    .unwrap();
    let now = chrono::Utc::now().timestamp();
    let expired = codec
        .encode(&Claims {
            sub: "user_1".to_string(),
            username: "editor".to_string(),
            role: Role::Editor,
            iat: now - 120,
            exp: Some(now - 60),
        })
        .unwrap();

    let (status, body) = gw.call("GET", "/api/v2/clothes", Some(&expired), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token expired");

    let (_, fresh) = gw.sign_in("editor", "editorpw").await;
    let (status, _) = gw.call("GET", "/api/v2/clothes", Some(&token(&fresh)), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_sign_up_failures() {
    let gw = gateway();
    assert_eq!(gw.sign_up("editor", "editorpw", "editor").await.0, StatusCode::CREATED);

    let (status, body) = gw.sign_up("editor", "different", "admin").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], 409);

    let (status, body) = gw.sign_up("someone", "pw", "superuser").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("Unknown role: superuser"));

    let (status, body) = gw.sign_up("someone", "pw", "unrecognized").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("Unknown role: unrecognized"));

    let (status, _) = gw.sign_up("", "pw", "user").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = gw
        .send(json_request("POST", "/signup", None, &json!({"username": "x"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_default_role_applies() {
    let gw = gateway_with(|config| config.auth.default_role = Role::Writer);
    let body = json!({"username": "newbie", "password": "pw"});
    let (status, body) = gw.send(json_request("POST", "/signup", None, &body)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["role"], "writer");
}

#[tokio::test]
async fn test_sign_in_failures_are_uniform() {
    let gw = gateway();
    gw.sign_up("editor", "editorpw", "editor").await;

    let (wrong_status, wrong_body) = gw.sign_in("editor", "nope").await;
    let (unknown_status, unknown_body) = gw.sign_in("nobody", "editorpw").await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, unknown_body);

    let request = Request::builder()
        .method("POST")
        .uri("/signin")
        .body(Body::empty())
        .unwrap();
    let (status, _) = gw.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sign_in_rate_limited() {
    let gw = gateway_with(|config| config.auth.sign_in_per_minute = 2);
    gw.sign_up("editor", "editorpw", "editor").await;

    assert_eq!(gw.sign_in("editor", "wrong").await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(gw.sign_in("editor", "wrong").await.0, StatusCode::UNAUTHORIZED);

    let (status, body) = gw.sign_in("editor", "editorpw").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["status"], 429);
}

#[tokio::test]
async fn test_v1_is_open() {
    let gw = gateway();

    let (status, record) = gw
        .call("POST", "/api/v1/food", None, Some(json!({"name": "bread"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/v1/food/{}", record["id"]);

    let (status, _) = gw.call("PUT", &uri, None, Some(json!({"name": "rye"}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = gw.call("DELETE", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "rye");
}

#[tokio::test]
async fn test_whoami_and_health() {
    let gw = gateway();
    let (_, body) = gw.sign_up("editor", "editorpw", "editor").await;

    let (status, me) = gw.call("GET", "/whoami", Some(&token(&body)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "editor");
    assert_eq!(me["role"], "editor");

    let (status, _) = gw.call("GET", "/whoami", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, health) = gw.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
}

#[tokio::test]
async fn test_unknown_routes_are_404() {
    let gw = gateway();
    let (_, body) = gw.sign_up("admin", "admin", "admin").await;
    let admin = token(&body);

    for uri in ["/nowhere", "/api/v1/weapons", "/api/v2/weapons"] {
        let (status, body) = gw.call("GET", uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["status"], 404);
    }
}
