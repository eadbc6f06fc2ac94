#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use examprep_analytics::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    models::{CategoryRef, ProgressRecord, Question},
    services::{cache::MemoryCacheStore, progress_store::MemoryProgressStore, AppState},
};
use std::sync::Arc;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryProgressStore>,
    pub cache: Arc<MemoryCacheStore>,
    pub config: Config,
}

pub fn create_test_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let config = Config::for_tests();
    let store = Arc::new(MemoryProgressStore::new());
    let cache = Arc::new(MemoryCacheStore::new());
    let state = Arc::new(AppState::with_backends(
        config.clone(),
        store.clone(),
        cache.clone(),
    ));

    TestApp {
        router: create_router(state),
        store,
        cache,
        config,
    }
}

impl TestApp {
    pub fn token_for(&self, uid: &str) -> String {
        JwtService::new(&self.config.jwt_secret)
            .generate_token(JwtClaims::for_user(uid, 3600))
            .unwrap()
    }

    pub fn seed_questions(&self, questions: &[(&str, &str, &str)]) {
        for (id, code, name) in questions {
            self.store.add_question(question(id, code, name));
        }
    }

    /// Stores a progress record as if `uid` answered `question_id` at `at`.
    pub fn seed_answer(
        &self,
        uid: &str,
        question_id: &str,
        code: &str,
        is_correct: bool,
        at: DateTime<Utc>,
        answer_time: f64,
    ) {
        let id = ProgressRecord::composite_id(uid, question_id);
        let mut record = self.store.record(&id).unwrap_or_else(|| {
            ProgressRecord::new(uid, &question(question_id, code, &format!("Category {}", code)))
        });
        record.record_attempt(is_correct, answer_time, at, 30);
        self.store.add_progress(record);
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body)
                .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&body).into()))
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, uid: &str) -> (StatusCode, serde_json::Value) {
        self.send(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header("authorization", format!("Bearer {}", self.token_for(uid)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        uid: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("authorization", format!("Bearer {}", self.token_for(uid)))
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
    }

    pub async fn request(&self, method: &str, uri: &str, uid: &str) -> (StatusCode, serde_json::Value) {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("authorization", format!("Bearer {}", self.token_for(uid)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

pub fn question(id: &str, code: &str, name: &str) -> Question {
    Question {
        id: id.to_string(),
        category: CategoryRef::new(code, name),
        subcategories: Vec::new(),
        question: format!("Question {}", id),
        options: vec!["A".to_string(), "B".to_string(), "C".to_string()],
        correct_answer: "A".to_string(),
        explanation: None,
    }
}
