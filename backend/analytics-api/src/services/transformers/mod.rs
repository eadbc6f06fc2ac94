//! Pure folds from progress records to aggregate statistics.
//!
//! Every function here is deterministic and independent of input order, so a
//! cached result and a fresh recomputation over the same records agree.

use std::collections::HashMap;

use crate::models::{CategoryRef, ProgressRecord};

pub mod basic_stats;
pub mod skills;
pub mod time_series;

/// Latest record per question. Records without `last_attempted` are ignored;
/// on equal timestamps the larger record id wins.
pub(crate) fn latest_per_question<'a, I>(records: I) -> HashMap<&'a str, &'a ProgressRecord>
where
    I: IntoIterator<Item = &'a ProgressRecord>,
{
    let mut latest: HashMap<&str, &ProgressRecord> = HashMap::new();
    for record in records {
        let Some(at) = record.last_attempted else {
            continue;
        };
        latest
            .entry(record.question_id.as_str())
            .and_modify(|current| {
                let current_key = (current.last_attempted, current.id.as_str());
                if (Some(at), record.id.as_str()) > current_key {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    latest
}

/// Category of a record, or the "Uncategorized" sentinel.
pub(crate) fn category_or_unknown(record: &ProgressRecord) -> (CategoryRef, bool) {
    match record.valid_category() {
        Some(category) => (category.clone(), false),
        None => (CategoryRef::unknown(), true),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, Utc};

    use crate::models::{AttemptEntry, CategoryRef, ProgressRecord, Question};

    pub fn question(id: &str, code: &str, name: &str) -> Question {
        Question {
            id: id.to_string(),
            category: CategoryRef::new(code, name),
            subcategories: vec![],
            question: format!("Question {}", id),
            options: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            correct_answer: "A".to_string(),
            explanation: None,
        }
    }

    pub fn record(
        question_id: &str,
        code: &str,
        is_correct: bool,
        at: DateTime<Utc>,
    ) -> ProgressRecord {
        ProgressRecord {
            id: ProgressRecord::composite_id("user1", question_id),
            user_id: "user1".to_string(),
            question_id: question_id.to_string(),
            is_correct,
            is_seen: true,
            last_attempted: Some(at),
            category: Some(CategoryRef::new(code, format!("Category {}", code))),
            attempts: 1,
            answer_time: 0.0,
            attempt_history: vec![AttemptEntry {
                is_correct,
                timestamp: at,
                answer_time: 30.0,
            }],
        }
    }

    pub fn attempt(is_correct: bool, at: DateTime<Utc>, answer_time: f64) -> AttemptEntry {
        AttemptEntry {
            is_correct,
            timestamp: at,
            answer_time,
        }
    }
}
