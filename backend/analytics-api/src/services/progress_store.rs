use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    Client, Collection, Database,
};
use tracing::{debug, error, info};

use crate::{
    error::{AnalyticsError, AnalyticsResult},
    metrics::track_db_operation,
    models::{ProgressRecord, Question, StudyTimeUpdate},
};

pub const QUESTIONS_COLLECTION: &str = "questions";
pub const PROGRESS_COLLECTION: &str = "user_progress";

/// Read/write gateway to the document store holding questions and progress
/// records. Errors are logged with context and returned; nothing is retried.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get_all_questions(&self) -> AnalyticsResult<Vec<Question>>;

    async fn get_question(&self, question_id: &str) -> AnalyticsResult<Option<Question>>;

    async fn get_user_progress(&self, user_id: &str) -> AnalyticsResult<Vec<ProgressRecord>>;

    /// Records with `last_attempted >= start`, newest first.
    async fn get_recent_progress(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
    ) -> AnalyticsResult<Vec<ProgressRecord>>;

    async fn get_progress(
        &self,
        user_id: &str,
        question_id: &str,
    ) -> AnalyticsResult<Option<ProgressRecord>>;

    async fn save_progress(&self, record: &ProgressRecord) -> AnalyticsResult<()>;

    /// Sets `answer_time` on every listed record and on the history entries
    /// attempted at or after `since`. Older entries keep their timing. Either
    /// all updates land or none do.
    async fn batch_update_study_time(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        updates: &[StudyTimeUpdate],
    ) -> AnalyticsResult<()>;

    async fn delete_user_progress(&self, user_id: &str) -> AnalyticsResult<u64>;

    async fn ping(&self) -> AnalyticsResult<()>;
}

pub struct MongoProgressStore {
    client: Client,
    db: Database,
}

impl MongoProgressStore {
    pub fn new(client: Client, database: &str) -> Self {
        let db = client.database(database);
        Self { client, db }
    }

    fn questions(&self) -> Collection<Question> {
        self.db.collection(QUESTIONS_COLLECTION)
    }

    fn progress(&self) -> Collection<ProgressRecord> {
        self.db.collection(PROGRESS_COLLECTION)
    }

    async fn collect_progress(
        &self,
        operation: &str,
        filter: Document,
    ) -> AnalyticsResult<Vec<ProgressRecord>> {
        let cursor = self
            .progress()
            .find(filter)
            .sort(doc! { "lastAttempted": -1 })
            .await
            .map_err(|e| AnalyticsError::read(operation, e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| AnalyticsError::read(operation, e))
    }
}

#[async_trait]
impl ProgressStore for MongoProgressStore {
    async fn get_all_questions(&self) -> AnalyticsResult<Vec<Question>> {
        track_db_operation("find", QUESTIONS_COLLECTION, async {
            let cursor = self
                .questions()
                .find(doc! {})
                .await
                .map_err(|e| AnalyticsError::read("questions", e))?;
            cursor
                .try_collect()
                .await
                .map_err(|e| AnalyticsError::read("questions", e))
        })
        .await
        .inspect_err(|e| error!(error = %e, "Failed to load question corpus"))
    }

    async fn get_question(&self, question_id: &str) -> AnalyticsResult<Option<Question>> {
        track_db_operation("find_one", QUESTIONS_COLLECTION, async {
            self.questions()
                .find_one(doc! { "_id": question_id })
                .await
                .map_err(|e| AnalyticsError::read("question", e))
        })
        .await
        .inspect_err(|e| error!(question_id, error = %e, "Failed to load question"))
    }

    async fn get_user_progress(&self, user_id: &str) -> AnalyticsResult<Vec<ProgressRecord>> {
        track_db_operation(
            "find",
            PROGRESS_COLLECTION,
            self.collect_progress("user progress", doc! { "userId": user_id }),
        )
        .await
        .inspect_err(|e| error!(user_id, error = %e, "Failed to load user progress"))
    }

    async fn get_recent_progress(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
    ) -> AnalyticsResult<Vec<ProgressRecord>> {
        let filter = doc! {
            "userId": user_id,
            "lastAttempted": { "$gte": start.timestamp_millis() }
        };
        track_db_operation(
            "find",
            PROGRESS_COLLECTION,
            self.collect_progress("recent progress", filter),
        )
        .await
        .inspect_err(|e| {
            error!(user_id, start = %start, error = %e, "Failed to load recent progress")
        })
    }

    async fn get_progress(
        &self,
        user_id: &str,
        question_id: &str,
    ) -> AnalyticsResult<Option<ProgressRecord>> {
        let id = ProgressRecord::composite_id(user_id, question_id);
        track_db_operation("find_one", PROGRESS_COLLECTION, async {
            self.progress()
                .find_one(doc! { "_id": id.as_str() })
                .await
                .map_err(|e| AnalyticsError::read("progress record", e))
        })
        .await
        .inspect_err(|e| error!(progress_id = %id, error = %e, "Failed to load progress record"))
    }

    async fn save_progress(&self, record: &ProgressRecord) -> AnalyticsResult<()> {
        track_db_operation("replace_one", PROGRESS_COLLECTION, async {
            self.progress()
                .replace_one(doc! { "_id": record.id.as_str() }, record)
                .upsert(true)
                .await
                .map(|_| ())
                .map_err(|e| AnalyticsError::write("progress record", e))
        })
        .await
        .inspect_err(|e| error!(progress_id = %record.id, error = %e, "Failed to save progress"))
    }

    async fn batch_update_study_time(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        updates: &[StudyTimeUpdate],
    ) -> AnalyticsResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let result = track_db_operation("batch_update", PROGRESS_COLLECTION, async {
            let mut session = self
                .client
                .start_session()
                .await
                .map_err(|e| AnalyticsError::write("study time batch", e))?;
            session
                .start_transaction()
                .await
                .map_err(|e| AnalyticsError::write("study time batch", e))?;

            for update in updates {
                let outcome = self
                    .progress()
                    .update_one(
                        doc! { "_id": update.id.as_str(), "userId": user_id },
                        doc! {
                            "$set": {
                                "answerTime": update.answer_time,
                                "attemptHistory.$[recent].answerTime": update.answer_time
                            }
                        },
                    )
                    .array_filters(vec![
                        doc! { "recent.timestamp": { "$gte": since.timestamp_millis() } },
                    ])
                    .session(&mut session)
                    .await;

                let failure = match outcome {
                    Ok(res) if res.matched_count == 0 => Some(format!(
                        "progress record {} not found for user {}",
                        update.id, user_id
                    )),
                    Ok(_) => None,
                    Err(e) => Some(e.to_string()),
                };

                if let Some(message) = failure {
                    // Abort failures are superseded by the original error.
                    let _ = session.abort_transaction().await;
                    return Err(AnalyticsError::write("study time batch", message));
                }
            }

            session
                .commit_transaction()
                .await
                .map_err(|e| AnalyticsError::write("study time batch", e))
        })
        .await;

        match &result {
            Ok(()) => info!(user_id, count = updates.len(), "Study time batch committed"),
            Err(e) => error!(user_id, error = %e, "Study time batch failed"),
        }
        result
    }

    async fn delete_user_progress(&self, user_id: &str) -> AnalyticsResult<u64> {
        track_db_operation("delete_many", PROGRESS_COLLECTION, async {
            self.progress()
                .delete_many(doc! { "userId": user_id })
                .await
                .map(|res| res.deleted_count)
                .map_err(|e| AnalyticsError::write("user progress reset", e))
        })
        .await
        .inspect_err(|e| error!(user_id, error = %e, "Failed to reset user progress"))
    }

    async fn ping(&self) -> AnalyticsResult<()> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| AnalyticsError::read("ping", e))
    }
}

/// In-memory store with failure injection, used by tests and local demos.
#[derive(Default)]
pub struct MemoryProgressStore {
    questions: Mutex<Vec<Question>>,
    progress: Mutex<BTreeMap<String, ProgressRecord>>,
    fail_reads: AtomicBool,
    failing_reads: Mutex<BTreeSet<String>>,
    fail_writes: AtomicBool,
    read_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_question(&self, question: Question) {
        lock(&self.questions).push(question);
    }

    pub fn add_progress(&self, record: ProgressRecord) {
        lock(&self.progress).insert(record.id.clone(), record);
    }

    pub fn record(&self, id: &str) -> Option<ProgressRecord> {
        lock(&self.progress).get(id).cloned()
    }

    pub fn progress_count(&self) -> usize {
        lock(&self.progress).len()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fails only the named read, e.g. `"recent progress"` or `"questions"`.
    pub fn fail_read_of(&self, operation: &str, fail: bool) {
        let mut failing = lock(&self.failing_reads);
        if fail {
            failing.insert(operation.to_string());
        } else {
            failing.remove(operation);
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of read operations served (or refused) so far.
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn check_read(&self, operation: &str) -> AnalyticsResult<()> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) || lock(&self.failing_reads).contains(operation)
        {
            return Err(AnalyticsError::read(operation, "store unavailable"));
        }
        Ok(())
    }

    fn check_write(&self, operation: &str) -> AnalyticsResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AnalyticsError::write(operation, "store unavailable"));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn get_all_questions(&self) -> AnalyticsResult<Vec<Question>> {
        self.check_read("questions")?;
        Ok(lock(&self.questions).clone())
    }

    async fn get_question(&self, question_id: &str) -> AnalyticsResult<Option<Question>> {
        self.check_read("question")?;
        Ok(lock(&self.questions)
            .iter()
            .find(|q| q.id == question_id)
            .cloned())
    }

    async fn get_user_progress(&self, user_id: &str) -> AnalyticsResult<Vec<ProgressRecord>> {
        self.check_read("user progress")?;
        let mut records: Vec<ProgressRecord> = lock(&self.progress)
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.last_attempted.cmp(&a.last_attempted));
        Ok(records)
    }

    async fn get_recent_progress(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
    ) -> AnalyticsResult<Vec<ProgressRecord>> {
        self.check_read("recent progress")?;
        let mut records: Vec<ProgressRecord> = lock(&self.progress)
            .values()
            .filter(|r| r.user_id == user_id && r.last_attempted.is_some_and(|at| at >= start))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.last_attempted.cmp(&a.last_attempted));
        Ok(records)
    }

    async fn get_progress(
        &self,
        user_id: &str,
        question_id: &str,
    ) -> AnalyticsResult<Option<ProgressRecord>> {
        self.check_read("progress record")?;
        Ok(self.record(&ProgressRecord::composite_id(user_id, question_id)))
    }

    async fn save_progress(&self, record: &ProgressRecord) -> AnalyticsResult<()> {
        self.check_write("progress record")?;
        self.add_progress(record.clone());
        Ok(())
    }

    async fn batch_update_study_time(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        updates: &[StudyTimeUpdate],
    ) -> AnalyticsResult<()> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write("study time batch")?;

        let mut progress = lock(&self.progress);
        if let Some(missing) = updates.iter().find(|u| {
            !progress
                .get(&u.id)
                .is_some_and(|record| record.user_id == user_id)
        }) {
            return Err(AnalyticsError::write(
                "study time batch",
                format!("progress record {} not found for user {}", missing.id, user_id),
            ));
        }

        for update in updates {
            if let Some(record) = progress.get_mut(&update.id) {
                record.answer_time = update.answer_time;
                for entry in record
                    .attempt_history
                    .iter_mut()
                    .filter(|entry| entry.timestamp >= since)
                {
                    entry.answer_time = update.answer_time;
                }
            }
        }
        debug!(user_id, count = updates.len(), "Applied in-memory study time batch");
        Ok(())
    }

    async fn delete_user_progress(&self, user_id: &str) -> AnalyticsResult<u64> {
        self.check_write("user progress reset")?;
        let mut progress = lock(&self.progress);
        let before = progress.len();
        progress.retain(|_, record| record.user_id != user_id);
        Ok((before - progress.len()) as u64)
    }

    async fn ping(&self) -> AnalyticsResult<()> {
        self.check_read("ping")
    }
}
