use std::{cmp::Ordering, collections::BTreeMap};

use chrono::{DateTime, Utc};

use crate::{
    models::{
        analytics::{SkillComponents, SkillScore},
        AttemptEntry, ProgressRecord,
    },
    utils::time::days_between,
};

use super::category_or_unknown;

pub const ACCURACY_WEIGHT: f64 = 0.40;
pub const SPEED_WEIGHT: f64 = 0.15;
pub const CONSISTENCY_WEIGHT: f64 = 0.30;
pub const RETENTION_WEIGHT: f64 = 0.15;

/// Seconds per answer before the speed score starts to decay.
pub const SPEED_GRACE_SECS: f64 = 30.0;
pub const SPEED_DECAY_SECS: f64 = 60.0;
pub const CONSISTENCY_SAMPLE: usize = 5;
pub const RETENTION_DECAY_DAYS: f64 = 45.0;
pub const RETENTION_FLOOR: f64 = 5.0;

pub fn speed_score(avg_answer_secs: f64) -> f64 {
    100.0 * (-(avg_answer_secs - SPEED_GRACE_SECS).max(0.0) / SPEED_DECAY_SECS).exp()
}

/// Speed over the attempts that carry a timing. Attempts with no recorded
/// time (cleared by a study-time reset) are left out, and a category without
/// any timed attempt scores 0.
pub fn average_speed(timed_secs: &[f64]) -> f64 {
    if timed_secs.is_empty() {
        return 0.0;
    }
    speed_score(timed_secs.iter().sum::<f64>() / timed_secs.len() as f64)
}

/// Correct answers among the most recent attempts, over *all* attempts.
///
/// The denominator is the full attempt count, not the sample size, so
/// categories with long histories score low here. This matches the scores
/// users have already seen; changing it needs a product decision.
pub fn consistency_score(recent_correct: u32, attempts: u32) -> f64 {
    if attempts == 0 {
        return 0.0;
    }
    recent_correct as f64 / attempts as f64 * 100.0
}

pub fn retention_score(days_since_last_attempt: f64) -> f64 {
    (100.0 * (-days_since_last_attempt / RETENTION_DECAY_DAYS).exp()).max(RETENTION_FLOOR)
}

pub fn weighted_score(components: &SkillComponents) -> f64 {
    let score = components.accuracy * ACCURACY_WEIGHT
        + components.speed * SPEED_WEIGHT
        + components.consistency * CONSISTENCY_WEIGHT
        + components.retention * RETENTION_WEIGHT;
    score.clamp(0.0, 100.0)
}

#[derive(Default)]
struct CategoryBucket<'a> {
    name: Option<String>,
    is_default: bool,
    attempts: Vec<&'a AttemptEntry>,
    last_attempted: Option<DateTime<Utc>>,
}

/// Skill score per category from every attempt in the records' histories.
///
/// Records without a usable category are pooled under "Uncategorized" and
/// sorted after real categories; the rest are ordered by descending score.
/// Categories with no attempts are left out.
pub fn transform(progress: &[ProgressRecord], now: DateTime<Utc>) -> Vec<SkillScore> {
    let mut buckets: BTreeMap<String, CategoryBucket> = BTreeMap::new();

    for record in progress {
        let (category, is_default) = category_or_unknown(record);
        let bucket = buckets.entry(category.code).or_default();
        bucket.is_default |= is_default;
        if prefer_name(bucket.name.as_deref(), &category.name) {
            bucket.name = Some(category.name);
        }

        bucket.attempts.extend(record.attempt_history.iter());

        let latest = record
            .last_attempted
            .or_else(|| record.attempt_history.iter().map(|a| a.timestamp).max());
        bucket.last_attempted = bucket.last_attempted.max(latest);
    }

    let mut scores: Vec<SkillScore> = buckets
        .into_iter()
        .filter(|(_, bucket)| !bucket.attempts.is_empty())
        .map(|(code, bucket)| score_bucket(code, bucket, now))
        .collect();

    scores.sort_by(|a, b| {
        a.is_default
            .cmp(&b.is_default)
            .then_with(|| {
                b.skill_score
                    .partial_cmp(&a.skill_score)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.code.cmp(&b.code))
    });
    scores
}

fn score_bucket(code: String, mut bucket: CategoryBucket, now: DateTime<Utc>) -> SkillScore {
    // Newest first; ties broken on outcome and time so the fold is order independent.
    bucket.attempts.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.is_correct.cmp(&b.is_correct))
            .then_with(|| a.answer_time.total_cmp(&b.answer_time))
    });

    let attempts = bucket.attempts.len() as u32;
    let correct = bucket.attempts.iter().filter(|a| a.is_correct).count() as u32;
    let timed: Vec<f64> = bucket
        .attempts
        .iter()
        .map(|a| a.answer_time)
        .filter(|secs| *secs > 0.0)
        .collect();
    let recent_correct = bucket
        .attempts
        .iter()
        .take(CONSISTENCY_SAMPLE)
        .filter(|a| a.is_correct)
        .count() as u32;
    let days_since = bucket
        .last_attempted
        .map(|last| days_between(last, now))
        .unwrap_or(0.0);

    let accuracy = correct as f64 / attempts as f64 * 100.0;
    let components = SkillComponents {
        accuracy,
        speed: average_speed(&timed),
        consistency: consistency_score(recent_correct, attempts),
        retention: retention_score(days_since),
    };

    SkillScore {
        name: bucket.name.unwrap_or_default(),
        code,
        is_default: bucket.is_default,
        skill_score: weighted_score(&components),
        attempts,
        accuracy,
        components,
    }
}

/// Keeps the lexicographically smallest non-empty name seen for a category.
fn prefer_name(current: Option<&str>, candidate: &str) -> bool {
    match current {
        None => true,
        Some(_) if candidate.is_empty() => false,
        Some(current) => current.is_empty() || candidate < current,
    }
}
