use std::collections::HashMap;

use crate::models::{
    analytics::{BasicStats, CategoryStats},
    CategoryRef, ProgressRecord, Question,
};

use super::latest_per_question;

/// Corpus totals per category plus attempted/correct counts, where each
/// question counts once using its most recent record.
///
/// Attempts only land in `by_category` when their category exists in the
/// corpus; the question's own category takes precedence over the record's
/// snapshot.
pub fn transform(questions: &[Question], progress: &[ProgressRecord]) -> BasicStats {
    let mut stats = BasicStats {
        total_questions: questions.len() as u32,
        ..BasicStats::default()
    };

    let mut question_categories: HashMap<&str, String> = HashMap::with_capacity(questions.len());
    for question in questions {
        let category = if question.category.is_valid() {
            question.category.clone()
        } else {
            CategoryRef::unknown()
        };

        let entry = stats
            .by_category
            .entry(category.code.clone())
            .or_insert_with(|| CategoryStats {
                name: category.name.clone(),
                ..CategoryStats::default()
            });
        entry.total += 1;

        question_categories.insert(question.id.as_str(), category.code);
    }

    for (question_id, record) in latest_per_question(progress) {
        stats.total_attempted += 1;
        if record.is_correct {
            stats.correct_answers += 1;
        } else {
            stats.incorrect_answers += 1;
        }

        let code = question_categories
            .get(question_id)
            .map(String::as_str)
            .or_else(|| record.valid_category().map(|c| c.code.as_str()));

        if let Some(category) = code.and_then(|c| stats.by_category.get_mut(c)) {
            category.attempted += 1;
            if record.is_correct {
                category.correct += 1;
            }
        }
    }

    stats
}
