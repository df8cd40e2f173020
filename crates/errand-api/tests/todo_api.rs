//! End-to-end tests of the todo service.
//!
//! Requests are built as plain `http::Request` values and fed to
//! [`App::handle`]; no listener is involved.

use bytes::Bytes;
use errand_api::{App, InMemoryTodoRepository, TOKEN_PATH};
use errand_auth::{Credentials, InMemoryUserDirectory, TokenSigner};
use errand_config::{ErrandConfig, RateLimitRule};
use errand_middleware::stages::{rate_limit::headers, REQUEST_ID_HEADER};
use errand_middleware::{body_bytes, Request, Response};
use errand_ratelimit::InMemoryCounterStore;
use http::{header, Method, StatusCode};
use http_body_util::Full;
use serde_json::{json, Value};
use std::sync::Arc;

const NOW: u64 = 1_700_000_000;
const SECRET: &str = "top-secret";
const USERNAME: &str = "mamad";
const PASSWORD: &str = "jafar";
const TODOS: &str = "/api/v1.0/todos/";

struct TestClient {
    app: App,
    directory: Arc<InMemoryUserDirectory>,
    authorization: String,
}

impl TestClient {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(configure: impl FnOnce(&mut ErrandConfig)) -> Self {
        let mut config = ErrandConfig::default();
        config.auth.secret_key = SECRET.to_string();
        configure(&mut config);

        let directory = Arc::new(InMemoryUserDirectory::new());
        let principal = directory.add_user(USERNAME, PASSWORD).unwrap();
        let token = TokenSigner::new(SECRET).issue(&principal.id).unwrap().token;

        let app = App::builder(config)
            .user_directory(directory.clone())
            .repository(Arc::new(InMemoryTodoRepository::new()))
            .counter_store(Arc::new(InMemoryCounterStore::with_clock(|| NOW)))
            .rate_limit_clock(|| NOW)
            .build()
            .unwrap();

        Self {
            app,
            directory,
            authorization: Credentials::new(token, "").to_basic_header(),
        }
    }

    fn as_user(mut self, username: &str, password: &str) -> Self {
        self.authorization = Credentials::new(username, password).to_basic_header();
        self
    }

    async fn send(&self, method: Method, uri: &str, extra: &[(&str, &str)], body: Option<Value>) -> (Response, Value) {
        let mut builder = http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, self.authorization.as_str());
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        let body = body.map_or_else(Bytes::new, |value| Bytes::from(value.to_string()));
        let request: Request = builder.body(Full::new(body)).unwrap();

        let response = self.app.handle(request).await;
        let (parts, body) = response.into_parts();
        let bytes = body_bytes(body).await;
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (Response::from_parts(parts, Full::new(bytes)), json)
    }

    async fn get(&self, uri: &str) -> (Response, Value) {
        self.send(Method::GET, uri, &[], None).await
    }

    async fn get_with(&self, uri: &str, name: &str, value: &str) -> (Response, Value) {
        self.send(Method::GET, uri, &[(name, value)], None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (Response, Value) {
        self.send(Method::POST, uri, &[], Some(body)).await
    }

    async fn put(&self, uri: &str, body: Value) -> (Response, Value) {
        self.send(Method::PUT, uri, &[], Some(body)).await
    }

    async fn delete(&self, uri: &str) -> (Response, Value) {
        self.send(Method::DELETE, uri, &[], None).await
    }

    /// Creates a todo and returns the path part of its `Location`.
    async fn create(&self, name: &str) -> String {
        let (response, _) = self.post(TODOS, json!({"name": name, "task": "sth"})).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        local(header_str(&response, header::LOCATION.as_str()))
    }
}

fn header_str<'r>(response: &'r Response, name: &str) -> &'r str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

fn local(url: &str) -> String {
    url.replace("http://localhost", "")
}

fn absolute(path: &str) -> String {
    format!("http://localhost{path}")
}

// ============================================================================
// CRUD
// ============================================================================

#[tokio::test]
async fn test_todos() {
    let client = TestClient::new();

    let (response, json) = client.get(TODOS).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json["urls"], json!([]));

    let buy_url = client.create("buy").await;
    let (response, json) = client.get(&buy_url).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json["name"], "buy");
    assert_eq!(json["task"], "sth");
    assert_eq!(json["url"], absolute(&buy_url));
    assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));

    let clean_url = client.create("clean").await;
    let (_, json) = client.get(TODOS).await;
    assert_eq!(json["urls"], json!([absolute(&buy_url), absolute(&clean_url)]));

    let (response, json) = client.post(TODOS, json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({"error": "Invalid todo: missing name"}));

    let (response, json) = client
        .put(&clean_url, json!({"name": "clean", "task": "kitchen"}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json, json!({}));
    let (_, json) = client.get(&clean_url).await;
    assert_eq!(json["task"], "kitchen");

    let (response, _) = client.delete(&buy_url).await;
    assert_eq!(response.status(), StatusCode::OK);
    let (_, json) = client.get(TODOS).await;
    assert_eq!(json["urls"], json!([absolute(&clean_url)]));

    let (response, json) = client.get(&buy_url).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json, json!({"error": "item not found"}));
    let (response, _) = client.delete(&buy_url).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_body() {
    let client = TestClient::new();
    let mut builder = http::Request::builder()
        .method(Method::POST)
        .uri(TODOS)
        .header(header::AUTHORIZATION, client.authorization.as_str());
    builder = builder.header(header::CONTENT_TYPE, "application/json");
    let request = builder.body(Full::new(Bytes::from_static(b"{not json"))).unwrap();

    let response = client.app.handle(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body_bytes(response.into_body()).await).unwrap();
    assert_eq!(body, json!({"error": "invalid request"}));
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_unknown_route_and_method() {
    let client = TestClient::new();

    let (response, json) = client.get("/api/v1.0/nothing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json, json!({"error": "not found"}));
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    let (response, json) = client.send(Method::PATCH, "/api/v1.0/todos/1", &[], None).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(json, json!({"error": "method not allowed"}));
    assert_eq!(header_str(&response, header::ALLOW.as_str()), "GET, PUT, DELETE");
}

#[tokio::test]
async fn test_request_id_propagated() {
    let client = TestClient::new();
    let id = "01890a5d-ac96-774b-bcce-b302099a8057";

    let (response, _) = client.get_with(TODOS, REQUEST_ID_HEADER, id).await;
    assert_eq!(header_str(&response, REQUEST_ID_HEADER), id);

    let (response, _) = client.get(TODOS).await;
    assert_ne!(header_str(&response, REQUEST_ID_HEADER), id);
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_password_auth() {
    let client = TestClient::new().as_user(USERNAME, PASSWORD);
    let (response, _) = client.get(TODOS).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_password_only() {
    let client = TestClient::with_config(|config| {
        config.auth.methods = vec![errand_auth::CredentialKind::Password];
    });
    let (response, _) = client.get(TODOS).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bad_auth() {
    for (username, password) in [("abc", "def"), ("bad_token", ""), (USERNAME, "wrong")] {
        let client = TestClient::new().as_user(username, password);
        let (response, json) = client.get(TODOS).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{username}");
        assert_eq!(json, json!({"error": "unauthorized"}));
        assert_eq!(
            header_str(&response, header::WWW_AUTHENTICATE.as_str()),
            r#"Basic realm="Authentication Required""#
        );
    }
}

#[tokio::test]
async fn test_token_for_removed_user() {
    let client = TestClient::new();
    assert!(client.directory.remove_user("1"));
    let (response, _) = client.get(TODOS).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_request_token() {
    let client = TestClient::new().as_user(USERNAME, PASSWORD);
    let (response, json) = client.get(TOKEN_PATH).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json["expiration"], 3600);

    let cache: Vec<&str> = header_str(&response, header::CACHE_CONTROL.as_str())
        .split(',')
        .map(str::trim)
        .collect();
    assert_eq!(cache.len(), 3);
    assert!(cache.contains(&"no-cache"));
    assert!(cache.contains(&"no-store"));
    assert!(cache.contains(&"max-age=0"));

    let token = json["token"].as_str().unwrap();
    let token_client = TestClient {
        authorization: Credentials::new(token, "").to_basic_header(),
        ..client
    };
    let (response, _) = token_client.get(TODOS).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_request_token_rejects_token_credentials() {
    let client = TestClient::new();
    let (response, _) = client.get(TOKEN_PATH).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test]
async fn test_rate_limits() {
    let client = TestClient::with_config(|config| config.rate_limit.enabled = true);

    let (mut response, _) = client.get(TODOS).await;
    assert_eq!(response.status(), StatusCode::OK);
    let limit: u64 = header_str(&response, headers::LIMIT).parse().unwrap();
    let remaining: u64 = header_str(&response, headers::REMAINING).parse().unwrap();
    assert_eq!(limit, 5);
    assert_eq!(limit, remaining + 1);
    assert!(response.headers().contains_key(headers::RESET));

    let mut json = Value::Null;
    while header_str(&response, headers::REMAINING) != "0" {
        (response, json) = client.get(TODOS).await;
    }

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json, json!({"error": "too many requests"}));
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn test_route_limit_is_tighter() {
    let client = TestClient::with_config(|config| {
        config.rate_limit.enabled = true;
        config
            .rate_limit
            .routes
            .insert("new_todo".to_string(), RateLimitRule::new(2, 60));
    });

    let (response, _) = client.post(TODOS, json!({"name": "a", "task": "b"})).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(header_str(&response, headers::LIMIT), "2");
    assert_eq!(header_str(&response, headers::REMAINING), "1");

    let (response, _) = client.post(TODOS, json!({"name": "a", "task": "b"})).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_str(&response, headers::LIMIT), "2");
    assert_eq!(header_str(&response, headers::REMAINING), "0");

    let (response, _) = client.get(TODOS).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limits_disabled() {
    let client = TestClient::new();
    for _ in 0..8 {
        let (response, _) = client.get(TODOS).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(headers::LIMIT));
    }
}

// ============================================================================
// Conditional requests
// ============================================================================

#[tokio::test]
async fn test_etag() {
    let client = TestClient::new();
    let one_url = client.create("one").await;
    let two_url = client.create("two").await;

    let (response, _) = client.get(&one_url).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CACHE_CONTROL.as_str()), "max-age=86400");
    let one_etag = header_str(&response, header::ETAG.as_str()).to_string();
    let (response, _) = client.get(&two_url).await;
    let two_etag = header_str(&response, header::ETAG.as_str()).to_string();
    assert_ne!(one_etag, two_etag);

    let status = |(response, _): (Response, Value)| response.status();
    let inm = "if-none-match";
    assert_eq!(status(client.get_with(&one_url, inm, &one_etag).await), StatusCode::NOT_MODIFIED);
    assert_eq!(
        status(client.get_with(&one_url, inm, &format!("{one_etag}, {two_etag}")).await),
        StatusCode::NOT_MODIFIED
    );
    assert_eq!(status(client.get_with(&one_url, inm, &two_etag).await), StatusCode::OK);
    assert_eq!(
        status(client.get_with(&one_url, inm, &format!("{two_etag}, *")).await),
        StatusCode::NOT_MODIFIED
    );

    let im = "if-match";
    assert_eq!(status(client.get_with(&one_url, im, &one_etag).await), StatusCode::OK);
    assert_eq!(
        status(client.get_with(&one_url, im, &format!("{one_etag}, {two_etag}")).await),
        StatusCode::OK
    );
    assert_eq!(
        status(client.get_with(&one_url, im, &two_etag).await),
        StatusCode::PRECONDITION_FAILED
    );
    assert_eq!(status(client.get_with(&one_url, im, "*").await), StatusCode::OK);

    let (response, _) = client.put(&one_url, json!({"name": "not-one", "task": "sth"})).await;
    assert_eq!(response.status(), StatusCode::OK);

    let (response, _) = client.get_with(&one_url, inm, &one_etag).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_ne!(header_str(&response, header::ETAG.as_str()), one_etag);
}

#[tokio::test]
async fn test_not_modified_has_no_body() {
    let client = TestClient::new();
    let url = client.create("one").await;
    let (response, _) = client.get(&url).await;
    let etag = header_str(&response, header::ETAG.as_str()).to_string();

    let (response, json) = client.get_with(&url, "if-none-match", &etag).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(header_str(&response, header::ETAG.as_str()), etag);
    assert_eq!(json, Value::Null);
}

#[tokio::test]
async fn test_stale_if_match_blocks_mutation() {
    let client = TestClient::new();
    let url = client.create("one").await;
    let (response, _) = client.get(&url).await;
    let etag = header_str(&response, header::ETAG.as_str()).to_string();

    let update = json!({"name": "two", "task": "sth"});
    let (response, _) = client
        .send(Method::PUT, &url, &[("if-match", etag.as_str())], Some(update.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (response, json) = client
        .send(Method::PUT, &url, &[("if-match", etag.as_str())], Some(update))
        .await;
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    assert_eq!(json, json!({"error": "precondition failed"}));

    let (response, _) = client.send(Method::DELETE, &url, &[("if-match", etag.as_str())], None).await;
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    let (response, _) = client.send(Method::DELETE, &url, &[("if-match", "*")], None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_collection_etag() {
    let client = TestClient::new();
    client.create("one").await;

    let (response, _) = client.get(TODOS).await;
    let etag = header_str(&response, header::ETAG.as_str()).to_string();
    let (response, _) = client.get_with(TODOS, "if-none-match", &etag).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

    client.create("two").await;
    let (response, _) = client.get_with(TODOS, "if-none-match", &etag).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_pagination() {
    let client = TestClient::new();
    let mut urls = Vec::new();
    for name in ["one", "two", "three", "four", "five"] {
        urls.push(absolute(&client.create(name).await));
    }

    let (response, json) = client.get("/api/v1.0/todos/?page=1&per_page=2").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json["urls"], json!([urls[0], urls[1]]));
    assert_eq!(json["meta"]["total"], 5);
    assert_eq!(json["meta"]["pages"], 3);
    assert_eq!(json["meta"]["prev"], Value::Null);
    let first_url = local(json["meta"]["first"].as_str().unwrap());
    let last_url = local(json["meta"]["last"].as_str().unwrap());
    let next_url = local(json["meta"]["next"].as_str().unwrap());

    let (_, json) = client.get(&first_url).await;
    assert_eq!(json["urls"], json!([urls[0], urls[1]]));

    let (_, json) = client.get(&next_url).await;
    assert_eq!(json["urls"], json!([urls[2], urls[3]]));
    assert_eq!(json["meta"]["total"], 5);
    let next_url = local(json["meta"]["next"].as_str().unwrap());

    let (_, json) = client.get(&next_url).await;
    assert_eq!(json["urls"], json!([urls[4]]));
    assert_eq!(json["meta"]["next"], Value::Null);

    let (_, json) = client.get(&last_url).await;
    assert_eq!(json["urls"], json!([urls[4]]));
}
