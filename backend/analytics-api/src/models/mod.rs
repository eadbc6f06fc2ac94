use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::days_ago;

pub mod analytics;
pub mod user;

/// Category code used when a progress record carries no usable category.
pub const UNKNOWN_CATEGORY_CODE: &str = "UNKNOWN";
pub const UNKNOWN_CATEGORY_NAME: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryRef {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
}

impl CategoryRef {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN_CATEGORY_CODE, UNKNOWN_CATEGORY_NAME)
    }

    pub fn is_valid(&self) -> bool {
        !self.code.trim().is_empty()
    }
}

/// Exam question as stored in the "questions" collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: String,
    pub category: CategoryRef,
    #[serde(default)]
    pub subcategories: Vec<CategoryRef>,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Single answer event kept in a progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptEntry {
    pub is_correct: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Seconds spent answering.
    #[serde(default)]
    pub answer_time: f64,
}

/// Per-user, per-question attempt ledger ("user_progress" collection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub question_id: String,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub is_seen: bool,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_attempted: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: Option<CategoryRef>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub answer_time: f64,
    #[serde(default)]
    pub attempt_history: Vec<AttemptEntry>,
}

impl ProgressRecord {
    pub fn composite_id(user_id: &str, question_id: &str) -> String {
        format!("{}_{}", user_id, question_id)
    }

    /// Empty ledger for a question the user has not answered yet.
    pub fn new(user_id: &str, question: &Question) -> Self {
        Self {
            id: Self::composite_id(user_id, &question.id),
            user_id: user_id.to_string(),
            question_id: question.id.clone(),
            is_correct: false,
            is_seen: false,
            last_attempted: None,
            category: Some(question.category.clone()),
            attempts: 0,
            answer_time: 0.0,
            attempt_history: Vec::new(),
        }
    }

    /// Applies a new answer and drops history entries older than the
    /// retention window.
    pub fn record_attempt(
        &mut self,
        is_correct: bool,
        answer_time: f64,
        now: DateTime<Utc>,
        retention_days: i64,
    ) {
        let answer_time = answer_time.max(0.0);

        self.is_correct = is_correct;
        self.is_seen = true;
        self.last_attempted = Some(now);
        self.attempts = self.attempts.saturating_add(1);
        self.answer_time = answer_time;
        self.attempt_history.push(AttemptEntry {
            is_correct,
            timestamp: now,
            answer_time,
        });
        self.prune_history(now, retention_days);
    }

    pub fn prune_history(&mut self, now: DateTime<Utc>, retention_days: i64) {
        let cutoff = days_ago(now, retention_days);
        self.attempt_history.retain(|entry| entry.timestamp >= cutoff);
    }

    /// Category snapshot, or `None` when it is missing or has no code.
    pub fn valid_category(&self) -> Option<&CategoryRef> {
        self.category.as_ref().filter(|c| c.is_valid())
    }
}

/// Field update applied by the study-time batch write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyTimeUpdate {
    pub id: String,
    pub answer_time: f64,
}
