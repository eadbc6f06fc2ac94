use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};

use crate::{
    models::{
        analytics::{MonthlyCategoryStat, MonthlyProgress, MonthlyStat, StudyTime},
        CategoryRef, ProgressRecord,
    },
    utils::time::weekday_index,
};

use super::{category_or_unknown, latest_per_question};

pub const DEFAULT_MONTH_WINDOW: usize = 6;

/// Correct/incorrect totals per calendar month, oldest first, limited to the
/// last `window` months that have any activity. Within a month each question
/// counts once, using its latest record of that month.
pub fn transform_monthly_progress(progress: &[ProgressRecord], window: usize) -> MonthlyProgress {
    let mut by_month: BTreeMap<(i32, u32), Vec<&ProgressRecord>> = BTreeMap::new();
    for record in progress {
        if let Some(at) = record.last_attempted {
            by_month
                .entry((at.year(), at.month()))
                .or_default()
                .push(record);
        }
    }

    let skip = by_month.len().saturating_sub(window);
    let mut categories: BTreeMap<String, String> = BTreeMap::new();
    let mut months = Vec::with_capacity(by_month.len() - skip);

    for ((year, month), records) in by_month.into_iter().skip(skip) {
        let mut stat = MonthlyStat {
            month: format!("{}-{}", year, month),
            ..MonthlyStat::default()
        };

        for record in latest_per_question(records).into_values() {
            let (category, _) = category_or_unknown(record);
            let entry = stat
                .by_category
                .entry(category.code.clone())
                .or_insert_with(|| MonthlyCategoryStat {
                    name: category.name.clone(),
                    ..MonthlyCategoryStat::default()
                });

            if record.is_correct {
                stat.correct += 1;
                entry.correct += 1;
            } else {
                stat.incorrect += 1;
                entry.incorrect += 1;
            }
            stat.total += 1;

            categories
                .entry(category.code)
                .and_modify(|name| {
                    if category.name < *name {
                        *name = category.name.clone();
                    }
                })
                .or_insert(category.name);
        }

        months.push(stat);
    }

    MonthlyProgress {
        months,
        categories: categories
            .into_iter()
            .map(|(code, name)| CategoryRef { code, name })
            .collect(),
    }
}

/// Minutes shown for one attempt: rounded to the nearest minute, but any
/// positive duration shows at least one.
pub fn attempt_minutes(answer_time_secs: f64) -> u32 {
    if answer_time_secs.is_nan() || answer_time_secs <= 0.0 {
        return 0;
    }
    ((answer_time_secs / 60.0).round() as u32).max(1)
}

/// Study minutes per weekday (0 = Sunday) from every attempt in the records'
/// histories. Attempts before `since` are skipped.
pub fn transform_study_time(progress: &[ProgressRecord], since: Option<DateTime<Utc>>) -> StudyTime {
    let mut study_time = StudyTime::default();

    let attempts = progress
        .iter()
        .flat_map(|record| record.attempt_history.iter())
        .filter(|attempt| since.map_or(true, |start| attempt.timestamp >= start));

    for attempt in attempts {
        study_time.data[weekday_index(attempt.timestamp)] += attempt_minutes(attempt.answer_time);
    }

    study_time
}
