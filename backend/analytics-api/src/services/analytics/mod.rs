mod base;

pub use base::{AnalyticsBase, AuthProvider, SessionAuth};

use std::{future::Future, sync::Arc};

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::{
    config::AnalyticsConfig,
    error::{AnalyticsError, AnalyticsResult},
    metrics::{ANALYTICS_REQUESTS_TOTAL, PROGRESS_UPDATES_TOTAL},
    models::{
        analytics::{BasicStats, DashboardStats, MonthlyProgress, SkillScore, StudyTime, UserProgress},
        ProgressRecord, StudyTimeUpdate,
    },
    services::{
        cache::{CacheManager, CacheType},
        progress_store::ProgressStore,
        transformers::{basic_stats, skills, time_series},
    },
    utils::time::{days_ago, months_ago, Clock, SystemClock},
};

/// Cache entries touched by a change to the user's answers.
const ANSWER_DEPENDENT: [CacheType; 4] = CacheType::ALL;

/// Per-user learning analytics.
///
/// Read operations never fail: store errors, missing auth and the like are
/// logged and answered with zeroed stats. Mutations return their errors.
#[derive(Clone)]
pub struct AnalyticsService {
    base: AnalyticsBase,
    store: Arc<dyn ProgressStore>,
    clock: Arc<dyn Clock>,
    config: AnalyticsConfig,
}

impl AnalyticsService {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        cache: CacheManager,
        auth: Arc<dyn AuthProvider>,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            base: AnalyticsBase::new(cache, auth),
            store,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn or_default<T, Fut>(&self, operation: &'static str, fut: Fut) -> T
    where
        T: Default,
        Fut: Future<Output = AnalyticsResult<T>>,
    {
        ANALYTICS_REQUESTS_TOTAL
            .with_label_values(&[operation])
            .inc();
        match fut.await {
            Ok(value) => value,
            Err(e) => self.base.error_response(operation, &e, T::default()),
        }
    }

    fn study_window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        days_ago(now, self.config.study_time_window_days)
    }

    pub async fn get_basic_stats(&self) -> BasicStats {
        self.or_default("getBasicStats", self.try_basic_stats()).await
    }

    async fn try_basic_stats(&self) -> AnalyticsResult<BasicStats> {
        let user = self.base.ensure_authenticated()?;
        self.base
            .get_with_cache(&user.uid, CacheType::BasicStats, || async {
                let (questions, progress) = tokio::try_join!(
                    self.store.get_all_questions(),
                    self.store.get_user_progress(&user.uid)
                )?;
                Ok(basic_stats::transform(&questions, &progress))
            })
            .await
    }

    pub async fn get_monthly_progress(&self) -> MonthlyProgress {
        self.or_default("getMonthlyProgress", self.try_monthly_progress())
            .await
    }

    async fn try_monthly_progress(&self) -> AnalyticsResult<MonthlyProgress> {
        let user = self.base.ensure_authenticated()?;
        let window = self.config.monthly_window_months;
        self.base
            .get_with_cache(&user.uid, CacheType::MonthlyProgress, || async {
                let since = months_ago(self.clock.now(), window as u32);
                let progress = self.store.get_recent_progress(&user.uid, since).await?;
                Ok(time_series::transform_monthly_progress(&progress, window))
            })
            .await
    }

    pub async fn get_recent_study_time(&self) -> StudyTime {
        self.or_default("getRecentStudyTime", self.try_recent_study_time())
            .await
    }

    async fn try_recent_study_time(&self) -> AnalyticsResult<StudyTime> {
        let user = self.base.ensure_authenticated()?;
        self.base
            .get_with_cache(&user.uid, CacheType::RecentStudyTime, || async {
                let since = self.study_window_start(self.clock.now());
                let progress = self.store.get_recent_progress(&user.uid, since).await?;
                Ok(time_series::transform_study_time(&progress, Some(since)))
            })
            .await
    }

    /// Zeroes the answer time of every record attempted inside the study
    /// window in a single batch write. Returns how many records changed.
    #[instrument(skip(self))]
    pub async fn reset_study_time(&self) -> AnalyticsResult<usize> {
        let user = self.base.ensure_authenticated()?;
        let since = self.study_window_start(self.clock.now());
        let recent = self.store.get_recent_progress(&user.uid, since).await?;

        if recent.is_empty() {
            return Ok(0);
        }

        let updates: Vec<StudyTimeUpdate> = recent
            .into_iter()
            .map(|record| StudyTimeUpdate {
                id: record.id,
                answer_time: 0.0,
            })
            .collect();

        self.store
            .batch_update_study_time(&user.uid, since, &updates)
            .await?;
        self.base
            .invalidate(
                &user.uid,
                &[CacheType::RecentStudyTime, CacheType::UserProgress],
            )
            .await;

        info!(user_id = %user.uid, updated = updates.len(), "Study time reset");
        Ok(updates.len())
    }

    pub async fn get_skill_scores(&self) -> Vec<SkillScore> {
        self.or_default("getSkillScores", self.try_skill_scores())
            .await
    }

    async fn try_skill_scores(&self) -> AnalyticsResult<Vec<SkillScore>> {
        let user = self.base.ensure_authenticated()?;
        let progress = self.store.get_user_progress(&user.uid).await?;
        Ok(skills::transform(&progress, self.clock.now()))
    }

    /// Basic stats, monthly progress and study time fetched concurrently.
    /// Each part falls back to its own default independently.
    pub async fn get_dashboard_stats(&self) -> DashboardStats {
        let (basic_stats, monthly_progress, study_time) = tokio::join!(
            self.get_basic_stats(),
            self.get_monthly_progress(),
            self.get_recent_study_time()
        );

        DashboardStats {
            basic_stats,
            monthly_progress,
            study_time,
        }
    }

    pub async fn get_user_progress(&self) -> UserProgress {
        self.or_default("getUserProgress", self.try_user_progress(false))
            .await
    }

    /// Drops the cached summaries and recomputes the user progress overview.
    pub async fn refresh_user_progress(&self) -> UserProgress {
        self.or_default("refreshUserProgress", async {
            let user = self.base.ensure_authenticated()?;
            self.base.invalidate(&user.uid, &CacheType::ALL).await;
            self.try_user_progress(true).await
        })
        .await
    }

    /// Serves the cached overview unless `refresh` is set. Only a complete
    /// overview is cached; when one branch fails the other is still served
    /// next to that branch's default.
    async fn try_user_progress(&self, refresh: bool) -> AnalyticsResult<UserProgress> {
        let user = self.base.ensure_authenticated()?;

        let complete = if refresh {
            self.base
                .refresh_cache(&user.uid, CacheType::UserProgress, || {
                    self.complete_user_progress()
                })
                .await
        } else {
            self.base
                .get_with_cache(&user.uid, CacheType::UserProgress, || {
                    self.complete_user_progress()
                })
                .await
        };

        match complete {
            Ok(progress) => Ok(progress),
            Err(e) => {
                warn!(user_id = %user.uid, error = %e, "User progress incomplete, serving partial result");
                Ok(self.partial_user_progress().await)
            }
        }
    }

    async fn complete_user_progress(&self) -> AnalyticsResult<UserProgress> {
        let (basic_stats, skills) =
            tokio::try_join!(self.try_basic_stats(), self.try_skill_scores())?;
        Ok(UserProgress {
            basic_stats,
            skills,
        })
    }

    async fn partial_user_progress(&self) -> UserProgress {
        let (basic_stats, skills) = tokio::join!(self.get_basic_stats(), self.get_skill_scores());
        UserProgress {
            basic_stats,
            skills,
        }
    }

    /// Records one answer to a question and invalidates every summary that
    /// depends on it.
    #[instrument(skip(self))]
    pub async fn record_answer(
        &self,
        question_id: &str,
        is_correct: bool,
        answer_time: f64,
    ) -> AnalyticsResult<ProgressRecord> {
        let user = self.base.ensure_authenticated()?;

        let mut record = match self.store.get_progress(&user.uid, question_id).await? {
            Some(record) => record,
            None => {
                let question = self
                    .store
                    .get_question(question_id)
                    .await?
                    .ok_or_else(|| AnalyticsError::QuestionNotFound(question_id.to_string()))?;
                ProgressRecord::new(&user.uid, &question)
            }
        };

        record.record_attempt(
            is_correct,
            answer_time,
            self.clock.now(),
            self.config.history_retention_days,
        );
        self.store.save_progress(&record).await?;
        self.base.invalidate(&user.uid, &ANSWER_DEPENDENT).await;

        PROGRESS_UPDATES_TOTAL
            .with_label_values(&[if is_correct { "true" } else { "false" }])
            .inc();
        Ok(record)
    }

    /// Deletes every progress record of the user. Returns the deleted count.
    #[instrument(skip(self))]
    pub async fn reset_progress(&self) -> AnalyticsResult<u64> {
        let user = self.base.ensure_authenticated()?;
        let deleted = self.store.delete_user_progress(&user.uid).await?;
        self.base.invalidate(&user.uid, &ANSWER_DEPENDENT).await;

        info!(user_id = %user.uid, deleted, "User progress reset");
        Ok(deleted)
    }
}
