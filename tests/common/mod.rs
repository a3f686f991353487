#![allow(dead_code)]

//! Test infrastructure for the HTTP façade tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use fpbridge::common::Config;
use fpbridge::service::{build_router, FingerprintService};
use http_body_util::BodyExt;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

/// Router over a service whose helper does not exist, so it runs simulated.
pub fn create_simulated_app() -> Router {
    let service = FingerprintService::from_config(
        &Config::default(),
        PathBuf::from("/nonexistent/fpbridge-helper"),
        None,
        false,
    );
    build_router(Arc::new(service), &[])
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    post_raw(uri, body.to_string())
}

pub fn post_raw(uri: &str, body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.into()))
        .unwrap()
}

/// Send one request through a clone of `app` and decode the JSON reply.
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    (status, json)
}
