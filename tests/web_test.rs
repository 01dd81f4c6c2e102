#![cfg(feature = "web")]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode, header};
use axum_extra::extract::cookie::Key;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use stepwise::app::{AppState, MISSING_TITLE, NOTHING_TO_SAVE, SAVED_NOTICE, router};
use stepwise::error::SolverError;
use stepwise::login::UserDirectory;
use stepwise::store::FileStore;

fn stub_solver(equation: &str) -> Result<Value, SolverError> {
    if equation == "bad" {
        return Err(SolverError::Rejected("cannot parse".into()));
    }
    Ok(json!([{
        "changeType": "SOLVE_EQUATION",
        "oldEquation": equation,
        "newEquation": { "leftNode": { "name": "x" }, "rightNode": { "value": 1 } },
        "substeps": [],
    }]))
}

fn test_app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let users = UserDirectory::open(dir.path()).unwrap();
    let state = AppState::new(Arc::new(stub_solver), Arc::new(store), users, Key::generate()).unwrap();
    (router(state), dir)
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn post_json(uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// Register Ada and return the cookie header that identifies her.
async fn register(app: &Router) -> String {
    let response = send(
        app,
        post_form(
            "/register",
            "first_name=Ada&last_name=Lovelace&email=ada%40example.com&password=pw&confirm_password=pw",
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");

    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn anonymous_visitors_are_sent_to_login() {
    let (app, _dir) = test_app();

    let response = send(&app, get("/study-guide/3", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?redirect=%2Fstudy-guide%2F3");

    let response = send(&app, get("/", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn signed_in_users_skip_the_login_page() {
    let (app, _dir) = test_app();
    let cookie = register(&app).await;

    let response = send(&app, get("/login", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn tampered_cookie_is_anonymous() {
    let (app, _dir) = test_app();
    let forged = r#"user-data={"id":"x","email":"eve@example.com"}"#;

    let response = send(&app, get("/profile", Some(forged))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = send(&app, post_json("/api/solve", json!({"equation": "x = 1"}), Some(forged))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_checks_credentials() {
    let (app, _dir) = test_app();
    register(&app).await;

    let response = send(
        &app,
        post_form("/login", "email=ada%40example.com&password=nope&redirect=", None),
    )
    .await;
    assert_eq!(location(&response), "/login?error=Invalid%20email%20or%20password");

    let response = send(
        &app,
        post_form(
            "/login",
            "email=ADA%40example.com&password=pw&redirect=%2Fstudy-guide",
            None,
        ),
    )
    .await;
    assert_eq!(location(&response), "/study-guide");
    assert!(response.headers().contains_key(header::SET_COOKIE));
}

#[tokio::test]
async fn mismatched_passwords_are_rejected() {
    let (app, _dir) = test_app();
    let response = send(
        &app,
        post_form(
            "/register",
            "email=ada%40example.com&password=pw&confirm_password=other",
            None,
        ),
    )
    .await;
    assert_eq!(location(&response), "/register?error=Passwords%20do%20not%20match");
}

#[tokio::test]
async fn solve_save_and_read_back() {
    let (app, _dir) = test_app();
    let cookie = register(&app).await;

    let outcome = body_json(
        send(&app, post_json("/api/solve", json!({"equation": "x + 1 = 2"}), Some(&cookie))).await,
    )
    .await;
    assert_eq!(outcome["status"], "solved");
    assert_eq!(outcome["finalText"], "x = 1");
    assert_eq!(outcome["steps"][0]["label"], "Solve Equation");

    let saved = body_json(
        send(&app, post_json("/api/study-guides/entries", json!({"title": "Linear"}), Some(&cookie))).await,
    )
    .await;
    let entry_id = saved["id"].as_i64().unwrap();

    let guides = body_json(send(&app, get("/api/study-guides", Some(&cookie))).await).await;
    assert_eq!(guides, json!([{ "id": entry_id, "title": "Linear" }]));

    let entries = body_json(
        send(&app, get(&format!("/api/study-guides/{}/entries", entry_id), Some(&cookie))).await,
    )
    .await;
    assert_eq!(entries[0]["equation"], "x + 1 = 2");
    assert_eq!(entries[0]["solution"], "x = 1");
    assert_eq!(entries[0]["steps"][0]["label"], "Solve Equation");
    assert_eq!(entries[0]["steps"][0]["newEquation"], "x = 1");

    let page = send(&app, get(&format!("/study-guide/{}", entry_id), Some(&cookie))).await;
    assert_eq!(page.status(), StatusCode::OK);
    let html = body_text(page).await;
    assert!(html.contains("Linear"));
    assert!(html.contains("Solve Equation"));
}

#[tokio::test]
async fn failed_solve_cannot_be_saved() {
    let (app, _dir) = test_app();
    let cookie = register(&app).await;

    let outcome = body_json(
        send(&app, post_json("/api/solve", json!({"equation": "bad"}), Some(&cookie))).await,
    )
    .await;
    assert_eq!(outcome, json!({ "status": "failed", "reason": "Invalid equation" }));

    let response = send(
        &app,
        post_json("/api/study-guides/entries", json!({"title": "Linear"}), Some(&cookie)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["message"], NOTHING_TO_SAVE);
}

#[tokio::test]
async fn dashboard_solves_and_saves() {
    let (app, _dir) = test_app();
    let cookie = register(&app).await;

    let page = send(&app, get("/dashboard?equation=x%20%2B%201%20%3D%202", Some(&cookie))).await;
    assert_eq!(page.status(), StatusCode::OK);
    let html = body_text(page).await;
    assert!(html.contains("Hello Ada!"));
    assert!(html.contains("Solve Equation"));
    assert!(html.contains("Add to Study Guide"));

    let response = send(&app, post_form("/study-guide/save", "title=&existing_title=", Some(&cookie))).await;
    assert_eq!(
        location(&response),
        format!("/dashboard?error={}", urlencoding::encode(MISSING_TITLE))
    );

    let response = send(
        &app,
        post_form("/study-guide/save", "title=Linear&existing_title=Old", Some(&cookie)),
    )
    .await;
    assert_eq!(
        location(&response),
        format!("/dashboard?notice={}", urlencoding::encode(SAVED_NOTICE))
    );

    let guides = body_json(send(&app, get("/api/study-guides", Some(&cookie))).await).await;
    assert_eq!(guides[0]["title"], "Linear");
}

#[tokio::test]
async fn unknown_guide_is_not_found() {
    let (app, _dir) = test_app();
    let cookie = register(&app).await;

    let response = send(&app, get("/study-guide/999", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn logout_clears_the_cookie() {
    let (app, _dir) = test_app();
    let cookie = register(&app).await;

    let response = send(&app, post_form("/logout", "", Some(&cookie))).await;
    assert_eq!(location(&response), "/login");
    let cleared = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cleared.starts_with("user-data="));
}
