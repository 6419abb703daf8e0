//! Validation and generation failures

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::util::ServiceExt;

use crate::api::test_helpers::{
    create_test_app, post_inference, CannedGenerator, FailingGenerator, PanickingGenerator,
    RecordingGenerator,
};
use crate::api::{create_router, AppState};

#[tokio::test]
async fn test_generation_error_returns_500_with_detail() {
    let app = create_test_app(FailingGenerator);
    let (status, body) = post_inference(app, r#"{"prompt": "p"}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("CUDA out of memory"));
    assert!(body.get("result").is_none());
}

#[tokio::test]
async fn test_worker_panic_returns_500() {
    let app = create_test_app(PanickingGenerator);
    let (status, body) = post_inference(app, r#"{"prompt": "p"}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body["detail"].as_str().unwrap().is_empty());
    assert!(body.get("result").is_none());
}

#[tokio::test]
async fn test_empty_prompt_is_rejected() {
    let generator = Arc::new(RecordingGenerator::default());
    let app = create_router(AppState::new(generator.clone()));
    let (status, body) = post_inference(app, r#"{"prompt": ""}"#).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("prompt"));
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn test_zero_max_new_tokens_is_rejected() {
    let app = create_test_app(CannedGenerator::new("x"));
    let (status, body) = post_inference(app, r#"{"prompt": "p", "max_new_tokens": 0}"#).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("max_new_tokens"));
}

#[tokio::test]
async fn test_negative_temperature_is_rejected() {
    let app = create_test_app(CannedGenerator::new("x"));
    let (status, body) = post_inference(app, r#"{"prompt": "p", "temperature": -0.5}"#).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("temperature"));
}

#[tokio::test]
async fn test_missing_prompt_is_rejected() {
    let app = create_test_app(CannedGenerator::new("x"));
    let (status, body) = post_inference(app, r#"{"resource": {"id": 1}}"#).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(!body["detail"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_wrong_resource_type_is_rejected() {
    let app = create_test_app(CannedGenerator::new("x"));
    let (status, _) = post_inference(app, r#"{"prompt": "p", "resource": "id=1"}"#).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let app = create_test_app(CannedGenerator::new("x"));
    let (status, body) = post_inference(app, "{not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body["detail"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_content_type_is_rejected() {
    let app = create_test_app(CannedGenerator::new("x"));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/inference")
                .body(Body::from(r#"{"prompt": "p"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_failures_are_counted() {
    let state = AppState::new(Arc::new(FailingGenerator));
    post_inference(create_router(state.clone()), r#"{"prompt": "p"}"#).await;
    post_inference(create_router(state.clone()), "{not json").await;

    let snapshot = state.metrics().snapshot();
    assert_eq!(snapshot.failed_requests, 2);
    assert_eq!(snapshot.successful_requests, 0);
}
