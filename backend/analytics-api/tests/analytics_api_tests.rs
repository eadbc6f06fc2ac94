mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use serde_json::json;

fn minutes(study_time: &serde_json::Value) -> u64 {
    study_time["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_u64().unwrap())
        .sum()
}

#[tokio::test]
async fn test_analytics_requires_bearer_token() {
    let app = common::create_test_app();

    let (status, _) = app
        .send(
            Request::builder()
                .uri("/api/v1/analytics/dashboard")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(
            Request::builder()
                .uri("/api/v1/analytics/basic")
                .header("authorization", "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_dashboard_for_new_user_is_zeroed() {
    let app = common::create_test_app();

    let (status, dashboard) = app.get("/api/v1/analytics/dashboard", "fresh-user").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["basicStats"]["totalQuestions"], 0);
    assert_eq!(dashboard["basicStats"]["totalAttempted"], 0);
    assert_eq!(dashboard["monthlyProgress"]["months"], json!([]));
    assert_eq!(
        dashboard["studyTime"]["labels"],
        json!(["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"])
    );
    assert_eq!(dashboard["studyTime"]["data"], json!([0, 0, 0, 0, 0, 0, 0]));
}

#[tokio::test]
async fn test_basic_stats_per_category() {
    let app = common::create_test_app();
    app.seed_questions(&[
        ("q1", "021", "Airframes"),
        ("q2", "021", "Airframes"),
        ("q3", "021", "Airframes"),
        ("q4", "050", "Meteorology"),
    ]);
    let now = Utc::now();
    app.seed_answer("pilot", "q1", "021", true, now, 20.0);
    app.seed_answer("pilot", "q2", "021", true, now, 20.0);
    app.seed_answer("pilot", "q3", "021", false, now, 20.0);
    app.seed_answer("someone-else", "q4", "050", true, now, 20.0);

    let (status, stats) = app.get("/api/v1/analytics/basic", "pilot").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalQuestions"], 4);
    assert_eq!(stats["totalAttempted"], 3);
    assert_eq!(stats["correctAnswers"], 2);
    assert_eq!(stats["incorrectAnswers"], 1);
    assert_eq!(
        stats["byCategory"]["021"],
        json!({ "name": "Airframes", "total": 3, "attempted": 3, "correct": 2 })
    );
    assert_eq!(stats["byCategory"]["050"]["attempted"], 0);
    assert!(app.cache.contains("basicStats-pilot"));
}

#[tokio::test]
async fn test_store_outage_degrades_to_defaults() {
    let app = common::create_test_app();
    app.seed_questions(&[("q1", "021", "Airframes")]);
    app.store.set_fail_reads(true);

    let (status, stats) = app.get("/api/v1/analytics/basic", "pilot").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalQuestions"], 0);

    let (status, skills) = app.get("/api/v1/analytics/skills", "pilot").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(skills, json!([]));
    assert!(app.cache.is_empty());
}

#[tokio::test]
async fn test_reset_study_time_batches_recent_records() {
    let app = common::create_test_app();
    let now = Utc::now();
    app.seed_answer("pilot", "q1", "021", true, now - Duration::days(1), 120.0);
    app.seed_answer("pilot", "q2", "021", false, now - Duration::days(2), 300.0);
    app.seed_answer("pilot", "q3", "021", true, now - Duration::days(20), 60.0);

    let (_, before) = app.get("/api/v1/analytics/study-time", "pilot").await;
    assert_eq!(minutes(&before), 7);

    let (status, body) = app
        .post_json("/api/v1/analytics/study-time/reset", "pilot", json!({}))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "updated": 2 }));
    assert_eq!(app.store.batch_calls(), 1);
    assert_eq!(app.store.record("pilot_q1").unwrap().answer_time, 0.0);
    assert_eq!(app.store.record("pilot_q2").unwrap().answer_time, 0.0);
    assert_eq!(app.store.record("pilot_q3").unwrap().answer_time, 60.0);

    let (_, after) = app.get("/api/v1/analytics/study-time", "pilot").await;
    assert_eq!(minutes(&after), 0);
}

#[tokio::test]
async fn test_reset_study_time_keeps_history_outside_window() {
    let app = common::create_test_app();
    let now = Utc::now();
    app.seed_answer("pilot", "q1", "021", false, now - Duration::days(20), 200.0);
    app.seed_answer("pilot", "q1", "021", true, now - Duration::days(1), 200.0);

    let (_, before) = app.get("/api/v1/analytics/skills", "pilot").await;
    let (status, body) = app
        .post_json("/api/v1/analytics/study-time/reset", "pilot", json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "updated": 1 }));

    let history = app.store.record("pilot_q1").unwrap().attempt_history;
    assert_eq!(history[0].answer_time, 200.0);
    assert_eq!(history[1].answer_time, 0.0);

    let (_, after) = app.get("/api/v1/analytics/skills", "pilot").await;
    let speed = |skills: &serde_json::Value| skills[0]["components"]["speed"].as_f64().unwrap();
    assert!((speed(&after) - speed(&before)).abs() < 1e-9);
}

#[tokio::test]
async fn test_dashboard_masks_a_single_failing_branch() {
    let app = common::create_test_app();
    app.seed_questions(&[("q1", "021", "Airframes")]);
    app.seed_answer("pilot", "q1", "021", true, Utc::now(), 90.0);
    app.store.fail_read_of("recent progress", true);

    let (status, dashboard) = app.get("/api/v1/analytics/dashboard", "pilot").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["basicStats"]["totalAttempted"], 1);
    assert_eq!(dashboard["monthlyProgress"]["months"], json!([]));
    assert_eq!(dashboard["studyTime"]["data"], json!([0, 0, 0, 0, 0, 0, 0]));
    assert!(app.cache.contains("basicStats-pilot"));
    assert!(!app.cache.contains("recentStudyTime-pilot"));
}

#[tokio::test]
async fn test_reset_study_time_reports_write_failure() {
    let app = common::create_test_app();
    app.seed_answer("pilot", "q1", "021", true, Utc::now(), 120.0);
    app.store.set_fail_writes(true);

    let (status, _) = app
        .post_json("/api/v1/analytics/study-time/reset", "pilot", json!({}))
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(app.store.record("pilot_q1").unwrap().answer_time, 120.0);
}

#[tokio::test]
async fn test_record_answer_updates_stats() {
    let app = common::create_test_app();
    app.seed_questions(&[("q1", "021", "Airframes"), ("q2", "021", "Airframes")]);

    let (_, before) = app.get("/api/v1/analytics/basic", "pilot").await;
    assert_eq!(before["totalAttempted"], 0);

    let (status, record) = app
        .post_json(
            "/api/v1/analytics/answers",
            "pilot",
            json!({ "questionId": "q1", "isCorrect": true, "answerTime": 42.0 }),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["_id"], "pilot_q1");
    assert_eq!(record["attempts"], 1);
    assert_eq!(record["category"]["code"], "021");

    let (_, after) = app.get("/api/v1/analytics/basic", "pilot").await;
    assert_eq!(after["totalAttempted"], 1);
    assert_eq!(after["correctAnswers"], 1);

    let (_, skills) = app.get("/api/v1/analytics/skills", "pilot").await;
    assert_eq!(skills[0]["code"], "021");
    assert_eq!(skills[0]["attempts"], 1);
    assert_eq!(skills[0]["accuracy"], 100.0);
}

#[tokio::test]
async fn test_record_answer_rejects_bad_input() {
    let app = common::create_test_app();
    app.seed_questions(&[("q1", "021", "Airframes")]);

    let (status, _) = app
        .post_json(
            "/api/v1/analytics/answers",
            "pilot",
            json!({ "questionId": "", "isCorrect": true, "answerTime": 1.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post_json(
            "/api/v1/analytics/answers",
            "pilot",
            json!({ "questionId": "q1" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, message) = app
        .post_json(
            "/api/v1/analytics/answers",
            "pilot",
            json!({ "questionId": "missing", "isCorrect": false, "answerTime": 3.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(message, "Question not found: missing");
    assert_eq!(app.store.progress_count(), 0);
}

#[tokio::test]
async fn test_user_progress_refresh() {
    let app = common::create_test_app();
    app.seed_questions(&[("q1", "021", "Airframes"), ("q2", "050", "Meteorology")]);
    let now = Utc::now();
    app.seed_answer("pilot", "q1", "021", true, now, 25.0);

    let (status, progress) = app.get("/api/v1/analytics/progress", "pilot").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["basicStats"]["totalAttempted"], 1);
    assert_eq!(progress["skills"].as_array().unwrap().len(), 1);

    app.seed_answer("pilot", "q2", "050", false, now, 25.0);

    let (_, cached) = app.get("/api/v1/analytics/progress", "pilot").await;
    assert_eq!(cached["basicStats"]["totalAttempted"], 1);

    let (status, refreshed) = app
        .post_json("/api/v1/analytics/progress/refresh", "pilot", json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["basicStats"]["totalAttempted"], 2);
    assert_eq!(refreshed["skills"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_reset_progress_removes_only_caller_records() {
    let app = common::create_test_app();
    let now = Utc::now();
    app.seed_answer("pilot", "q1", "021", true, now, 25.0);
    app.seed_answer("pilot", "q2", "021", true, now, 25.0);
    app.seed_answer("someone-else", "q1", "021", true, now, 25.0);

    let (status, body) = app
        .request("DELETE", "/api/v1/analytics/progress", "pilot")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "updated": 2 }));
    assert_eq!(app.store.progress_count(), 1);
}

#[tokio::test]
async fn test_monthly_progress_endpoint() {
    let app = common::create_test_app();
    let now = Utc::now();
    app.seed_answer("pilot", "q1", "021", true, now, 25.0);
    app.seed_answer("pilot", "q2", "050", false, now, 25.0);

    let (status, monthly) = app.get("/api/v1/analytics/monthly", "pilot").await;

    assert_eq!(status, StatusCode::OK);
    let months = monthly["months"].as_array().unwrap();
    assert_eq!(months.len(), 1);
    assert_eq!(months[0]["correct"], 1);
    assert_eq!(months[0]["incorrect"], 1);
    assert_eq!(months[0]["total"], 2);
    assert_eq!(monthly["categories"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_health_reports_backend_state() {
    let app = common::create_test_app();

    let (status, health) = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");

    app.store.set_fail_reads(true);
    let (status, health) = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["dependencies"]["mongodb"]["status"], "unhealthy");
    assert_eq!(health["dependencies"]["redis"]["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_requires_basic_auth() {
    let app = common::create_test_app();

    let (status, _) = app
        .send(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let basic = |credentials: &str| {
        Request::builder()
            .uri("/metrics")
            .header(
                "authorization",
                format!("Basic {}", general_purpose::STANDARD.encode(credentials)),
            )
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = app.send(basic("admin:changeme")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(basic(&app.config.metrics_auth)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_trace_id_is_echoed() {
    let app = common::create_test_app();

    let response = tower::ServiceExt::oneshot(
        app.router.clone(),
        Request::builder()
            .uri("/health")
            .header("x-trace-id", "trace-123")
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(
        response.headers().get("x-trace-id").unwrap(),
        "trace-123"
    );

    let response = tower::ServiceExt::oneshot(
        app.router.clone(),
        Request::builder()
            .uri("/health")
            .header("x-trace-id", "not a trace id")
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    let minted = response.headers().get("x-trace-id").unwrap().to_str().unwrap();
    assert_ne!(minted, "not a trace id");
    assert!(uuid::Uuid::parse_str(minted).is_ok());
}
