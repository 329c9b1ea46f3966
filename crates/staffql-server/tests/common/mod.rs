#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use staffql_duck::{DuckEngine, EngineOptions};
use staffql_server::{router, AppState, SqlTranslator, TranslateError};
use tower::ServiceExt;

pub fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../staffql-duck/tests/fixtures/employee.csv")
}

pub fn engine() -> Arc<DuckEngine> {
    let engine = DuckEngine::load(&fixture(), &EngineOptions::default()).expect("load fixture");
    Arc::new(engine)
}

pub fn app(translator: Arc<dyn SqlTranslator>) -> (Router, AppState) {
    let state = AppState::new(engine(), translator).expect("app state");
    (router(state.clone()), state)
}

/// Translator returning a canned completion and recording what it was asked
pub struct FixedTranslator {
    sql: String,
    pub calls: Mutex<Vec<(String, Option<i64>)>>,
}

impl FixedTranslator {
    pub fn new(sql: &str) -> Arc<Self> {
        Arc::new(Self {
            sql: sql.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SqlTranslator for FixedTranslator {
    async fn translate(&self, question: &str, limit: Option<i64>) -> Result<String, TranslateError> {
        self.calls.lock().unwrap().push((question.to_string(), limit));
        Ok(self.sql.clone())
    }
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Status and body; non-JSON bodies come back as a JSON string
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

/// Row count of the dataset table, through the public endpoint
pub async fn count_rows(app: &Router) -> i64 {
    let (status, body) = send(app, post_json("/query/", serde_json::json!({"sql": "SELECT COUNT(*) AS n FROM data"}))).await;
    assert_eq!(status, StatusCode::OK);
    body[0]["n"].as_i64().unwrap()
}
