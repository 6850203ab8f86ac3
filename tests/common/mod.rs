#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use axum::Router;
use flashcard_srs::api::{app_router, ApiState};
use flashcard_srs::Db;
use std::path::Path;

pub async fn create_test_app() -> (Router, Db) {
    let db = Db::in_memory().await.expect("failed to open in-memory db");
    (app_router(ApiState { db: db.clone() }), db)
}

/// A WAL-mode database file inside `dir`, with a multi-connection pool.
pub async fn file_db(dir: &Path) -> Db {
    let url = format!("sqlite://{}?mode=rwc", dir.join("flashcards.db").display());
    Db::connect(&url).await.expect("failed to open file db")
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
