use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::AnalyticsError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::{
        analytics::{BasicStats, DashboardStats, MonthlyProgress, SkillScore, StudyTime, UserProgress},
        ProgressRecord,
    },
    services::AppState,
};

pub(crate) async fn get_basic_stats(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Json<BasicStats> {
    Json(state.analytics_for(&claims).get_basic_stats().await)
}

pub(crate) async fn get_monthly_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Json<MonthlyProgress> {
    Json(state.analytics_for(&claims).get_monthly_progress().await)
}

pub(crate) async fn get_study_time(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Json<StudyTime> {
    Json(state.analytics_for(&claims).get_recent_study_time().await)
}

pub(crate) async fn get_skill_scores(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Json<Vec<SkillScore>> {
    Json(state.analytics_for(&claims).get_skill_scores().await)
}

pub(crate) async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Json<DashboardStats> {
    Json(state.analytics_for(&claims).get_dashboard_stats().await)
}

pub(crate) async fn get_user_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Json<UserProgress> {
    Json(state.analytics_for(&claims).get_user_progress().await)
}

pub(crate) async fn refresh_user_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Json<UserProgress> {
    Json(state.analytics_for(&claims).refresh_user_progress().await)
}

pub(crate) async fn reset_study_time(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<ResetResponse>, ApiError> {
    let updated = state.analytics_for(&claims).reset_study_time().await?;
    Ok(Json(ResetResponse {
        updated: updated as u64,
    }))
}

pub(crate) async fn record_answer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<RecordAnswerRequest>,
) -> Result<(StatusCode, Json<ProgressRecord>), ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Invalid answer payload: {}", e)))?;

    let record = state
        .analytics_for(&claims)
        .record_answer(&req.question_id, req.is_correct, req.answer_time)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn reset_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<ResetResponse>, ApiError> {
    let deleted = state.analytics_for(&claims).reset_progress().await?;
    Ok(Json(ResetResponse { updated: deleted }))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RecordAnswerRequest {
    #[validate(length(min = 1, max = 128))]
    pub question_id: String,
    pub is_correct: bool,
    /// Seconds spent on the question.
    #[validate(range(min = 0.0, max = 86400.0))]
    pub answer_time: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResetResponse {
    pub updated: u64,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        match err {
            AnalyticsError::NotAuthenticated => ApiError::Unauthorized(err.to_string()),
            AnalyticsError::QuestionNotFound(_) => ApiError::NotFound(err.to_string()),
            AnalyticsError::RemoteRead { .. }
            | AnalyticsError::RemoteWrite { .. }
            | AnalyticsError::Cache(_) => {
                tracing::error!(error = %err, "Analytics backend failure");
                ApiError::ServiceUnavailable("Analytics storage is unavailable".to_string())
            }
            AnalyticsError::InvalidCacheType(_) | AnalyticsError::Serialization(_) => {
                tracing::error!(error = %err, "Analytics internal error");
                ApiError::Internal("Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::ServiceUnavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        (status, Json(message)).into_response()
    }
}
