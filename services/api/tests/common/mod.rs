//! Shared fixtures for the HTTP integration tests: deterministic stand-ins for
//! the model and PDF services, and helpers to drive the router in-process.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use api_lib::adapters::JsonAccountStore;
use api_lib::config::Config;
use api_lib::library::{LibraryRegistry, PipelineServices};
use api_lib::sessions::SessionManager;
use api_lib::web::{self, state::AppState};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use study_assistant_core::domain::PageText;
use study_assistant_core::ports::{
    AccountStore, EmbeddingService, PdfTextExtractor, PortError, PortResult, QuestionAnsweringService,
};
use tower::ServiceExt;

pub const BOUNDARY: &str = "----study-assistant-test-boundary";

/// Bag-of-letters embedding over a-z.
pub struct LetterEmbedder;

fn embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; 26];
    for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
        v[(c as u8 - b'a') as usize] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingService for LetterEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> PortResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> PortResult<Vec<f32>> {
        Ok(embed(text))
    }
}

/// Answers with the context it was given.
pub struct EchoAnswerer;

#[async_trait]
impl QuestionAnsweringService for EchoAnswerer {
    async fn answer_question(&self, _question: &str, context: &str) -> PortResult<String> {
        Ok(context.to_string())
    }
}

/// Reads uploads as UTF-8 text with form feeds between pages.
/// Content starting with `BROKEN` fails like an unparseable PDF.
pub struct TextPages;

#[async_trait]
impl PdfTextExtractor for TextPages {
    async fn extract_pages(&self, path: &Path) -> PortResult<Vec<PageText>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let text = String::from_utf8(bytes).map_err(|e| PortError::Unexpected(e.to_string()))?;
        if text.starts_with("BROKEN") {
            return Err(PortError::Unexpected("Failed to parse PDF".to_string()));
        }
        Ok(text
            .split('\u{c}')
            .filter(|p| !p.is_empty())
            .enumerate()
            .map(|(i, p)| PageText {
                page_number: i as u32 + 1,
                text: p.to_string(),
            })
            .collect())
    }
}

/// Test configuration; `overrides` win over the built-in values.
pub fn test_config(data_dir: &Path, overrides: &[(&str, &str)]) -> Config {
    let data_dir = data_dir.display().to_string();
    Config::from_lookup(|key| {
        if let Some((_, value)) = overrides.iter().find(|(k, _)| *k == key) {
            return Some(value.to_string());
        }
        match key {
            "OPENROUTER_API_KEY" => Some("test-key".to_string()),
            "DATA_DIR" => Some(data_dir.clone()),
            "BIND_ADDRESS" => Some("127.0.0.1:0".to_string()),
            _ => None,
        }
    })
    .expect("test config")
}

/// Builds the app over `data_dir` the same way the binary does at startup.
pub async fn build_app(data_dir: &Path) -> (Router, Arc<AppState>) {
    build_app_with(data_dir, &[]).await
}

pub async fn build_app_with(data_dir: &Path, overrides: &[(&str, &str)]) -> (Router, Arc<AppState>) {
    let config = Arc::new(test_config(data_dir, overrides));
    let accounts = Arc::new(
        JsonAccountStore::open(data_dir.join("users.json"))
            .await
            .expect("open account store"),
    );

    let libraries = Arc::new(LibraryRegistry::new(
        data_dir,
        PipelineServices {
            embedder: Arc::new(LetterEmbedder),
            answerer: Arc::new(EchoAnswerer),
            extractor: Arc::new(TextPages),
        },
    ));
    let usernames = accounts.list_usernames().await.expect("list users");
    libraries.load_users(&usernames).await.expect("load libraries");

    let sessions = Arc::new(SessionManager::new(
        accounts,
        config.session_timeout,
    ));
    let state = Arc::new(AppState {
        config,
        sessions,
        libraries,
    });
    (web::router(state.clone()), state)
}

/// Sends one request and returns the status and raw body.
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.expect("infallible router");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    (status, body.to_vec())
}

pub async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn bare_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn upload_request(token: Option<&str>, filename: &str, contents: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n").as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri("/upload_pdf")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"));
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

/// Registers `username` and returns its access token.
pub async fn register(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = send_json(
        app,
        json_request(
            "POST",
            "/register",
            None,
            serde_json::json!({ "username": username, "password": password }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "register {username}: {body}");
    body["access_token"].as_str().expect("access_token").to_string()
}

pub async fn login(app: &Router, username: &str, password: &str) -> (StatusCode, Value) {
    send_json(
        app,
        json_request(
            "POST",
            "/login",
            None,
            serde_json::json!({ "username": username, "password": password }),
        ),
    )
    .await
}

pub async fn upload(app: &Router, token: &str, filename: &str, contents: &str) -> (StatusCode, Value) {
    send_json(app, upload_request(Some(token), filename, contents.as_bytes())).await
}

pub async fn chat(app: &Router, token: &str, query: &str) -> (StatusCode, Value) {
    send_json(
        app,
        json_request("POST", "/chat", Some(token), serde_json::json!({ "query": query })),
    )
    .await
}

pub async fn list_pdfs(app: &Router, token: &str) -> Vec<String> {
    let (status, body) = send_json(app, bare_request("GET", "/list_pdfs", Some(token))).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_value(body).expect("list of filenames")
}

pub fn sources(body: &Value) -> Vec<String> {
    serde_json::from_value(body["sources"].clone()).expect("sources array")
}
