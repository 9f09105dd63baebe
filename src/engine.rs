use std::sync::Arc;

use moka::future::Cache;
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    artifact::{LocalArtifactStore, NewArtifact},
    enrollment,
    error::EngineError,
    progress::{self, ProgressRecord, ProgressStatus, StepState},
    step::{self, Step, StepKind},
    utils::now_local,
};

/// Identity of the caller, as established by the session layer. The engine
/// trusts it as given and holds no identity state of its own.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub student_id: i64,
    pub is_admin: bool,
}

impl Identity {
    pub fn student(student_id: i64) -> Self {
        Self {
            student_id,
            is_admin: false,
        }
    }

    pub fn admin(student_id: i64) -> Self {
        Self {
            student_id,
            is_admin: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

type StudentCourseId = (i64, i64);

/// The sequential step-gating engine.
///
/// Enforces the linear-prefix invariant: within one course, for one student,
/// completed and non-locked steps form a prefix of the position ordering, with
/// at most one task step (the frontier) open, pending or rejected immediately
/// after the completed prefix. Every call for a given (student, course) pair
/// is serialized through a per-pair mutex; distinct pairs run in parallel.
#[derive(Clone)]
pub struct GatingEngine {
    database: SqlitePool,
    artifacts: LocalArtifactStore,
    locks: Cache<StudentCourseId, Arc<Mutex<()>>>,
}

impl GatingEngine {
    pub fn new(database: SqlitePool, artifacts: LocalArtifactStore) -> Self {
        Self {
            database,
            artifacts,
            locks: Cache::new(10_000),
        }
    }

    async fn key_lock(&self, key: StudentCourseId) -> Arc<Mutex<()>> {
        self.locks
            .get_with(key, async { Arc::new(Mutex::new(())) })
            .await
    }

    /// Admin-only direct grant: create the enrollment, then open the course's
    /// first actionable step through reconciliation.
    #[instrument(skip(self, identity))]
    pub async fn enroll(
        &self,
        identity: Identity,
        student_id: i64,
        course_id: i64,
    ) -> Result<(), EngineError> {
        if !identity.is_admin {
            return Err(EngineError::Unauthorized(
                "only an administrator can enroll a student".to_string(),
            ));
        }
        let lock = self.key_lock((student_id, course_id)).await;
        let _guard = lock.lock().await;
        if enrollment::exists(&self.database, student_id, course_id).await? {
            return Err(EngineError::Conflict(format!(
                "student {student_id} is already enrolled in course {course_id}"
            )));
        }
        enrollment::create(&self.database, student_id, course_id).await?;
        info!(student_id, course_id, "enrollment created");
        self.reconcile_inner(student_id, course_id).await
    }

    /// Bring the progress rows of (student, course) into a consistent frontier
    /// state. Idempotent; re-entrant after any enrollment, submission or
    /// review. Self-healing against out-of-band data corrections because it
    /// always rescans all steps instead of tracking a cursor.
    #[instrument(skip(self, identity), fields(student_id = identity.student_id))]
    pub async fn reconcile(&self, identity: Identity, course_id: i64) -> Result<(), EngineError> {
        let lock = self.key_lock((identity.student_id, course_id)).await;
        let _guard = lock.lock().await;
        self.reconcile_inner(identity.student_id, course_id).await
    }

    /// One left-to-right pass over the course's steps, inside a transaction.
    /// Caller must hold the (student, course) lock.
    async fn reconcile_inner(&self, student_id: i64, course_id: i64) -> Result<(), EngineError> {
        if !enrollment::exists(&self.database, student_id, course_id).await? {
            return Err(EngineError::Integrity(format!(
                "no enrollment for student {student_id} in course {course_id}"
            )));
        }
        let mut tx = self.database.begin().await?;
        let steps = step::list_steps(&mut *tx, course_id).await?;
        for s in steps {
            let record = progress::fetch_for_step(&mut *tx, student_id, s.id).await?;
            match s.kind {
                // Info steps complete as soon as they are reached and never
                // halt the scan.
                StepKind::Info => match record {
                    None => {
                        progress::insert(&mut *tx, student_id, s.id, ProgressStatus::Completed)
                            .await?;
                    }
                    Some(r) if r.status == ProgressStatus::Locked => {
                        progress::set_status(&mut *tx, r.id, ProgressStatus::Completed).await?;
                    }
                    Some(_) => {}
                },
                StepKind::Task => match record {
                    None => {
                        progress::insert(&mut *tx, student_id, s.id, ProgressStatus::Open).await?;
                        info!(student_id, step_id = s.id, "opened frontier step");
                        break;
                    }
                    Some(r) if r.status == ProgressStatus::Locked => {
                        progress::set_status(&mut *tx, r.id, ProgressStatus::Open).await?;
                        info!(student_id, step_id = s.id, "opened frontier step");
                        break;
                    }
                    Some(r) if r.status == ProgressStatus::Completed => {}
                    // Open, pending or rejected: this is the frontier. Stop
                    // without touching anything beyond it.
                    Some(_) => break,
                },
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Record a learner submission on an actionable step. The new artifact is
    /// stored before the progress row is touched; a storage failure aborts
    /// the whole submission as retryable. Replacing a previous artifact
    /// deletes the old reference best-effort after commit.
    #[instrument(skip(self, identity, text, file), fields(student_id = identity.student_id))]
    pub async fn submit_answer(
        &self,
        identity: Identity,
        step_id: i64,
        text: Option<String>,
        file: Option<NewArtifact>,
    ) -> Result<ProgressRecord, EngineError> {
        let student_id = identity.student_id;
        let step = step::fetch_step(&self.database, step_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("step {step_id}")))?;
        let lock = self.key_lock((student_id, step.course_id)).await;
        let _guard = lock.lock().await;

        let record = match progress::fetch_for_step(&self.database, student_id, step_id).await? {
            None => {
                return Err(EngineError::Unauthorized(
                    "this step is locked".to_string(),
                ));
            }
            Some(r) => match r.status {
                ProgressStatus::Locked => {
                    return Err(EngineError::Unauthorized(
                        "this step is locked".to_string(),
                    ));
                }
                ProgressStatus::Pending => {
                    return Err(EngineError::Unauthorized(
                        "this step is already awaiting review".to_string(),
                    ));
                }
                ProgressStatus::Completed => {
                    return Err(EngineError::Unauthorized(
                        "this step is already completed".to_string(),
                    ));
                }
                ProgressStatus::Open | ProgressStatus::Rejected => r,
            },
        };

        let text = text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        validate_submission(&step, text.as_deref(), file.as_ref())?;

        let new_ref = match file {
            Some(artifact) => Some(
                self.artifacts
                    .store(&artifact.bytes, artifact.content_type.as_deref())
                    .await
                    .map_err(EngineError::Storage)?,
            ),
            None => None,
        };

        let old_ref = record.file_ref.clone();
        sqlx::query(
            "UPDATE step_progress SET status = ?, text_answer = ?, file_ref = ?, \
             admin_comment = NULL, submitted_at = ? WHERE id = ?",
        )
        .bind(ProgressStatus::Pending)
        .bind(&text)
        .bind(&new_ref)
        .bind(now_local())
        .bind(record.id)
        .execute(&self.database)
        .await?;
        info!(student_id, step_id, "submission recorded");

        // Artifact deletion never blocks the submission; failures are left
        // for out-of-band cleanup.
        if let Some(old) = old_ref {
            if let Err(e) = self.artifacts.delete(&old).await {
                warn!(reference = %old, error = %e, "failed to delete replaced artifact");
            }
        }

        progress::fetch_for_step(&self.database, student_id, step_id)
            .await?
            .ok_or_else(|| {
                EngineError::Integrity(format!("progress row vanished for step {step_id}"))
            })
    }

    /// Admin review of a pending submission. Rejection requires a comment and
    /// waits for a resubmission; approval completes the step and re-enters
    /// reconciliation, the only path by which a task step completes.
    #[instrument(skip(self, identity, comment))]
    pub async fn review(
        &self,
        identity: Identity,
        progress_id: i64,
        decision: ReviewDecision,
        comment: Option<String>,
    ) -> Result<(), EngineError> {
        if !identity.is_admin {
            return Err(EngineError::Unauthorized(
                "only an administrator can review a submission".to_string(),
            ));
        }
        let record = progress::fetch_by_id(&self.database, progress_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("progress record {progress_id}")))?;
        let step = step::fetch_step(&self.database, record.step_id)
            .await?
            .ok_or_else(|| {
                EngineError::Integrity(format!("step {} missing for record", record.step_id))
            })?;

        let lock = self.key_lock((record.student_id, step.course_id)).await;
        let _guard = lock.lock().await;
        // Re-read under the lock; the record may have moved on meanwhile.
        let record = progress::fetch_by_id(&self.database, progress_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("progress record {progress_id}")))?;
        if record.status != ProgressStatus::Pending {
            return Err(EngineError::Unauthorized(
                "only a pending submission can be reviewed".to_string(),
            ));
        }

        match decision {
            ReviewDecision::Reject => {
                let comment = comment
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        EngineError::Validation("a rejection requires a comment".to_string())
                    })?;
                sqlx::query(
                    "UPDATE step_progress SET status = ?, admin_comment = ?, reviewed_at = ? \
                     WHERE id = ?",
                )
                .bind(ProgressStatus::Rejected)
                .bind(&comment)
                .bind(now_local())
                .bind(progress_id)
                .execute(&self.database)
                .await?;
                info!(progress_id, "submission rejected");
                Ok(())
            }
            ReviewDecision::Approve => {
                sqlx::query(
                    "UPDATE step_progress SET status = ?, admin_comment = NULL, reviewed_at = ? \
                     WHERE id = ?",
                )
                .bind(ProgressStatus::Completed)
                .bind(now_local())
                .bind(progress_id)
                .execute(&self.database)
                .await?;
                info!(progress_id, "submission approved");
                self.reconcile_inner(record.student_id, step.course_id).await
            }
        }
    }

    /// Administrative override: open an arbitrary step for a student without
    /// reconciling. This deliberately bypasses the single-frontier invariant
    /// and can leave multiple task steps actionable at once.
    #[instrument(skip(self, identity))]
    pub async fn force_open(
        &self,
        identity: Identity,
        student_id: i64,
        step_id: i64,
    ) -> Result<(), EngineError> {
        if !identity.is_admin {
            return Err(EngineError::Unauthorized(
                "only an administrator can force-open a step".to_string(),
            ));
        }
        let step = step::fetch_step(&self.database, step_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("step {step_id}")))?;
        if !enrollment::exists(&self.database, student_id, step.course_id).await? {
            return Err(EngineError::Validation(format!(
                "student {student_id} is not enrolled in course {}",
                step.course_id
            )));
        }
        let lock = self.key_lock((student_id, step.course_id)).await;
        let _guard = lock.lock().await;
        sqlx::query(
            "INSERT INTO step_progress (student_id, step_id, status) VALUES (?, ?, ?) \
             ON CONFLICT (student_id, step_id) DO UPDATE SET status = excluded.status",
        )
        .bind(student_id)
        .bind(step_id)
        .bind(ProgressStatus::Open)
        .execute(&self.database)
        .await?;
        warn!(student_id, step_id, "step force-opened by administrator");
        Ok(())
    }

    /// All steps of a course with the student's progress, absent rows
    /// reported as locked.
    pub async fn course_state(
        &self,
        identity: Identity,
        course_id: i64,
    ) -> Result<Vec<StepState>, EngineError> {
        let student_id = identity.student_id;
        if !enrollment::exists(&self.database, student_id, course_id).await? {
            return Err(EngineError::Unauthorized(format!(
                "student {student_id} is not enrolled in course {course_id}"
            )));
        }
        let steps = step::list_steps(&self.database, course_id).await?;
        let mut states = Vec::with_capacity(steps.len());
        for s in steps {
            let state = match progress::fetch_for_step(&self.database, student_id, s.id).await? {
                Some(record) => StepState::from_record(s, record),
                None => StepState::locked(s),
            };
            states.push(state);
        }
        Ok(states)
    }
}

/// Structural completeness check against the step's declared requirement.
/// Content is never validated.
fn validate_submission(
    step: &Step,
    text: Option<&str>,
    file: Option<&NewArtifact>,
) -> Result<(), EngineError> {
    match (step.needs_text, step.needs_file) {
        (true, true) if text.is_none() && file.is_none() => Err(EngineError::Validation(
            "this step requires a text answer or a file attachment".to_string(),
        )),
        (true, false) if text.is_none() => Err(EngineError::Validation(
            "this step requires a text answer".to_string(),
        )),
        (false, true) if file.is_none() => Err(EngineError::Validation(
            "this step requires a file attachment".to_string(),
        )),
        (false, false) => Err(EngineError::Integrity(format!(
            "task step {} declares no answer requirement",
            step.id
        ))),
        _ => Ok(()),
    }
}
