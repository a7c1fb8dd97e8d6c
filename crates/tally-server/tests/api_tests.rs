//! End-to-end tests for the HTTP surface, driven through the router with an
//! in-memory credential store.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode, header};
use chrono::Duration;
use serde_json::{Value, json};
use tower::ServiceExt;

use tally_core::token::TokenConfig;
use tally_server::routes::build_router;
use tally_server::state::AppState;
use tally_storage::MemoryBackend;

const PASSWORD: &str = "Str0ng!pass";

fn app_with_ttl(ttl: Duration) -> Router {
    let tokens = TokenConfig {
        access_secret: b"integration-access-secret".to_vec(),
        refresh_secret: b"integration-refresh-secret".to_vec(),
        access_ttl: ttl,
    };
    let state = AppState::new(Arc::new(MemoryBackend::new()), &tokens, false);
    build_router(Arc::new(state))
}

fn app() -> Router {
    app_with_ttl(Duration::minutes(15))
}

/// An app whose access tokens are already expired when issued, so every
/// protected request goes through refresh-token rotation.
fn expiring_app() -> Router {
    app_with_ttl(Duration::seconds(-60))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    cookies: &HashMap<String, String>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if !cookies.is_empty() {
        let header_value = cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        builder = builder.header(header::COOKIE, header_value);
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

/// Send a body verbatim, for payloads that are not valid JSON.
async fn send_raw(
    app: &Router,
    uri: &str,
    raw: &'static str,
    cookies: &HashMap<String, String>,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    for (k, v) in cookies {
        builder = builder.header(header::COOKIE, format!("{k}={v}"));
    }
    let request = builder.body(Body::from(raw)).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn set_cookies(response: &Response<Body>) -> HashMap<String, String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .collect()
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn signup(app: &Router, username: &str) {
    let response = send(
        app,
        Method::POST,
        "/signup",
        Some(json!({ "username": username, "password": PASSWORD })),
        &HashMap::new(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

async fn login(app: &Router, username: &str) -> HashMap<String, String> {
    let response = send(
        app,
        Method::POST,
        "/login",
        Some(json!({ "username": username, "password": PASSWORD })),
        &HashMap::new(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert!(cookies.contains_key("authToken"));
    assert!(cookies.contains_key("refreshToken"));
    cookies
}

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let response = send(&app, Method::GET, "/health", None, &HashMap::new()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn signup_conflicts_and_validation() {
    let app = app();
    signup(&app, "alice").await;

    let duplicate = send(
        &app,
        Method::POST,
        "/signup",
        Some(json!({ "username": "ALICE", "password": PASSWORD })),
        &HashMap::new(),
    )
    .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(duplicate).await["error"], "conflict");

    let weak = send(
        &app,
        Method::POST,
        "/signup",
        Some(json!({ "username": "bob", "password": "password" })),
        &HashMap::new(),
    )
    .await;
    assert_eq!(weak.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(weak).await["error"], "validation");

    let missing = send(
        &app,
        Method::POST,
        "/signup",
        Some(json!({ "password": PASSWORD })),
        &HashMap::new(),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_failures() {
    let app = app();
    signup(&app, "alice").await;

    let unknown = send(
        &app,
        Method::POST,
        "/login",
        Some(json!({ "username": "bob", "password": PASSWORD })),
        &HashMap::new(),
    )
    .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let wrong = send(
        &app,
        Method::POST,
        "/login",
        Some(json!({ "username": "alice", "password": "Wr0ng!pass" })),
        &HashMap::new(),
    )
    .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&wrong).is_empty());
}

#[tokio::test]
async fn protected_routes_redirect_without_session() {
    let app = app();
    let response = send(&app, Method::GET, "/get-user-data", None, &HashMap::new()).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let garbage = HashMap::from([("authToken".to_owned(), "garbage".to_owned())]);
    let response = send(&app, Method::GET, "/get-user-data", None, &garbage).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn ledger_walkthrough() {
    let app = app();
    signup(&app, "alice").await;
    let cookies = login(&app, "Alice").await;

    let empty = send(&app, Method::GET, "/get-user-data", None, &cookies).await;
    assert_eq!(empty.status(), StatusCode::OK);
    assert_eq!(
        json_body(empty).await["data"],
        json!({ "incomes": [], "expenses": [] })
    );

    let add = |name: &'static str, amount: f64| {
        let app = app.clone();
        let cookies = cookies.clone();
        async move {
            send(
                &app,
                Method::POST,
                "/add-expense",
                Some(json!({ "expenseName": name, "expenseAmount": amount })),
                &cookies,
            )
            .await
        }
    };

    let body = json_body(add("Rent", 1200.0).await).await;
    assert_eq!(body["data"]["expenses"], json!([{ "name": "Rent", "amount": 1200.0 }]));

    let body = json_body(add("rent", 1200.0).await).await;
    assert_eq!(body["data"]["expenses"], json!([{ "name": "Rent", "amount": 1200.0 }]));

    let body = json_body(add("RENT", 1500.0).await).await;
    assert_eq!(body["data"]["expenses"], json!([{ "name": "Rent", "amount": 1500.0 }]));

    let income = send(
        &app,
        Method::POST,
        "/add-income",
        Some(json!({ "incomeName": "Salary", "incomeAmount": "3000" })),
        &cookies,
    )
    .await;
    assert_eq!(income.status(), StatusCode::OK);
    let body = json_body(income).await;
    assert_eq!(body["totals"]["totalIncome"], 3000.0);
    assert_eq!(body["totals"]["totalExpenses"], 1500.0);
    assert_eq!(body["totals"]["netBalance"], 1500.0);

    let deleted = send(
        &app,
        Method::DELETE,
        "/delete-expense",
        Some(json!({ "expenseName": "rent" })),
        &cookies,
    )
    .await;
    assert_eq!(deleted.status(), StatusCode::OK);
    assert_eq!(json_body(deleted).await["data"]["expenses"], json!([]));

    let missing = send(
        &app,
        Method::DELETE,
        "/delete-expense",
        Some(json!({ "expenseName": "rent" })),
        &cookies,
    )
    .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(missing).await["error"], "not_found");

    let income_gone = send(
        &app,
        Method::DELETE,
        "/delete-income",
        Some(json!({ "incomeName": "SALARY" })),
        &cookies,
    )
    .await;
    assert_eq!(json_body(income_gone).await["data"]["incomes"], json!([]));
}

#[tokio::test]
async fn invalid_amounts_leave_ledger_unchanged() {
    let app = app();
    signup(&app, "alice").await;
    let cookies = login(&app, "alice").await;

    for amount in [json!(0), json!(-5), json!("abc"), Value::Null] {
        let response = send(
            &app,
            Method::POST,
            "/add-expense",
            Some(json!({ "expenseName": "Rent", "expenseAmount": amount })),
            &cookies,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{amount}");
    }

    let response = send(&app, Method::GET, "/get-user-data", None, &cookies).await;
    assert_eq!(json_body(response).await["data"]["expenses"], json!([]));
}

#[tokio::test]
async fn expired_access_token_is_rotated() {
    let app = expiring_app();
    signup(&app, "alice").await;
    let cookies = login(&app, "alice").await;

    let response = send(&app, Method::GET, "/get-user-data", None, &cookies).await;
    assert_eq!(response.status(), StatusCode::OK);
    let refreshed = set_cookies(&response);
    assert!(refreshed.get("authToken").is_some_and(|v| !v.is_empty()));
}

#[tokio::test]
async fn new_login_revokes_old_refresh_token() {
    let app = expiring_app();
    signup(&app, "alice").await;
    let first = login(&app, "alice").await;
    let second = login(&app, "alice").await;

    let stale = send(&app, Method::GET, "/get-user-data", None, &first).await;
    assert_eq!(stale.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&stale), "/login");

    let fresh = send(&app, Method::GET, "/get-user-data", None, &second).await;
    assert_eq!(fresh.status(), StatusCode::OK);
}

#[tokio::test]
async fn logout_clears_cookies_and_revokes_session() {
    let app = expiring_app();
    signup(&app, "alice").await;
    let cookies = login(&app, "alice").await;

    let response = send(&app, Method::GET, "/logout", None, &cookies).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    let cleared = set_cookies(&response);
    assert_eq!(cleared.get("authToken").map(String::as_str), Some(""));
    assert_eq!(cleared.get("refreshToken").map(String::as_str), Some(""));

    let after = send(&app, Method::GET, "/get-user-data", None, &cookies).await;
    assert_eq!(after.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn mistyped_and_malformed_bodies_are_validation_errors() {
    let app = app();
    signup(&app, "alice").await;
    let cookies = login(&app, "alice").await;

    let bodies = [
        json!({ "expenseName": "Rent", "expenseAmount": true }),
        json!({ "expenseName": "Rent", "expenseAmount": [1] }),
        json!({ "expenseName": 5, "expenseAmount": 10 }),
    ];
    for body in bodies {
        let response = send(&app, Method::POST, "/add-expense", Some(body.clone()), &cookies).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(json_body(response).await["error"], "validation", "{body}");
    }

    let truncated = send_raw(&app, "/add-expense", r#"{"expenseName":"Rent""#, &cookies).await;
    assert_eq!(truncated.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(truncated).await["error"], "validation");

    let response = send(&app, Method::GET, "/get-user-data", None, &cookies).await;
    assert_eq!(json_body(response).await["data"]["expenses"], json!([]));
}

#[tokio::test]
async fn non_string_credentials_are_validation_errors() {
    let app = app();
    for uri in ["/signup", "/login"] {
        let response = send(
            &app,
            Method::POST,
            uri,
            Some(json!({ "username": "alice", "password": 12_345_678 })),
            &HashMap::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json_body(response).await["error"], "validation", "{uri}");
    }
}
