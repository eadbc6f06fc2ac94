use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::CategoryRef;

pub const WEEKDAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub name: String,
    pub total: u32,
    pub attempted: u32,
    pub correct: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicStats {
    pub total_questions: u32,
    pub total_attempted: u32,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
    pub by_category: BTreeMap<String, CategoryStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyCategoryStat {
    pub name: String,
    pub correct: u32,
    pub incorrect: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStat {
    /// `YYYY-M`, month not zero padded.
    pub month: String,
    pub correct: u32,
    pub incorrect: u32,
    pub total: u32,
    pub by_category: BTreeMap<String, MonthlyCategoryStat>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyProgress {
    pub months: Vec<MonthlyStat>,
    pub categories: Vec<CategoryRef>,
}

/// Minutes studied per weekday, Sunday first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyTime {
    pub labels: Vec<String>,
    pub data: Vec<u32>,
}

impl Default for StudyTime {
    fn default() -> Self {
        Self {
            labels: WEEKDAY_LABELS.iter().map(|l| l.to_string()).collect(),
            data: vec![0; WEEKDAY_LABELS.len()],
        }
    }
}

impl StudyTime {
    pub fn total_minutes(&self) -> u32 {
        self.data.iter().sum()
    }
}

/// Raw 0..=100 component scores before weighting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillComponents {
    pub accuracy: f64,
    pub speed: f64,
    pub consistency: f64,
    pub retention: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillScore {
    pub name: String,
    pub code: String,
    pub is_default: bool,
    pub skill_score: f64,
    pub attempts: u32,
    pub accuracy: f64,
    pub components: SkillComponents,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub basic_stats: BasicStats,
    pub monthly_progress: MonthlyProgress,
    pub study_time: StudyTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub basic_stats: BasicStats,
    pub skills: Vec<SkillScore>,
}
