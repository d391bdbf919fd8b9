mod common;

use axum::http::StatusCode;
use tower::ServiceExt;

#[tokio::test]
async fn health_check_returns_ok() {
    let (app, _tmp) = common::test_app();
    let response = app.oneshot(common::get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = common::body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn health_check_bypasses_same_origin_check() {
    let (app, _tmp) = common::test_app();
    let response = app.oneshot(common::get_cross_origin("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn security_headers_are_set_on_every_response() {
    let (app, _tmp) = common::test_app();
    let response = app.oneshot(common::get("/health")).await.unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("referrer-policy").unwrap(), "strict-origin-when-cross-origin");
    assert!(headers.get("content-security-policy").is_some());
}
