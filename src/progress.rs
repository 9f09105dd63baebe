use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::step::Step;

/// Status of a progress record. Stored as an integer; the absence of a row is
/// reported as `Locked` (rows are normally never persisted in that state, but
/// the engine tolerates one appearing through manual data correction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[repr(i64)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Locked = 0,
    Open = 1,
    Pending = 2,
    Completed = 3,
    Rejected = 4,
}

impl From<i64> for ProgressStatus {
    fn from(value: i64) -> Self {
        match value {
            1 => ProgressStatus::Open,
            2 => ProgressStatus::Pending,
            3 => ProgressStatus::Completed,
            4 => ProgressStatus::Rejected,
            _ => ProgressStatus::Locked,
        }
    }
}

/// One (student, step) progress row, the mutable heart of the model.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct ProgressRecord {
    pub id: i64,
    pub student_id: i64,
    pub step_id: i64,
    pub status: ProgressStatus,
    pub text_answer: Option<String>,
    pub file_ref: Option<String>,
    pub admin_comment: Option<String>,
    pub submitted_at: Option<OffsetDateTime>,
    pub reviewed_at: Option<OffsetDateTime>,
}

/// Externally observable state of one step for one student. Steps without a
/// progress row are reported as `Locked`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StepState {
    pub step: Step,
    pub status: ProgressStatus,
    pub progress_id: Option<i64>,
    pub text_answer: Option<String>,
    pub file_ref: Option<String>,
    pub admin_comment: Option<String>,
    pub submitted_at: Option<OffsetDateTime>,
    pub reviewed_at: Option<OffsetDateTime>,
}

impl StepState {
    pub fn locked(step: Step) -> Self {
        Self {
            step,
            status: ProgressStatus::Locked,
            progress_id: None,
            text_answer: None,
            file_ref: None,
            admin_comment: None,
            submitted_at: None,
            reviewed_at: None,
        }
    }

    pub fn from_record(step: Step, record: ProgressRecord) -> Self {
        Self {
            step,
            status: record.status,
            progress_id: Some(record.id),
            text_answer: record.text_answer,
            file_ref: record.file_ref,
            admin_comment: record.admin_comment,
            submitted_at: record.submitted_at,
            reviewed_at: record.reviewed_at,
        }
    }
}

/// A submission awaiting review, joined with its step, course and student.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct PendingSubmission {
    pub progress_id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub course_id: i64,
    pub course_title: String,
    pub step_id: i64,
    pub step_title: String,
    pub text_answer: Option<String>,
    pub file_ref: Option<String>,
    pub submitted_at: Option<OffsetDateTime>,
}

pub async fn fetch_for_step<'e, E>(
    db: E,
    student_id: i64,
    step_id: i64,
) -> sqlx::Result<Option<ProgressRecord>>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query_as::<_, ProgressRecord>(
        "SELECT id, student_id, step_id, status, text_answer, file_ref, admin_comment, \
         submitted_at, reviewed_at FROM step_progress WHERE student_id = ? AND step_id = ?",
    )
    .bind(student_id)
    .bind(step_id)
    .fetch_optional(db)
    .await
}

pub async fn fetch_by_id<'e, E>(db: E, progress_id: i64) -> sqlx::Result<Option<ProgressRecord>>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query_as::<_, ProgressRecord>(
        "SELECT id, student_id, step_id, status, text_answer, file_ref, admin_comment, \
         submitted_at, reviewed_at FROM step_progress WHERE id = ?",
    )
    .bind(progress_id)
    .fetch_optional(db)
    .await
}

pub async fn insert<'e, E>(
    db: E,
    student_id: i64,
    step_id: i64,
    status: ProgressStatus,
) -> sqlx::Result<i64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query("INSERT INTO step_progress (student_id, step_id, status) VALUES (?, ?, ?)")
        .bind(student_id)
        .bind(step_id)
        .bind(status)
        .execute(db)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn set_status<'e, E>(db: E, progress_id: i64, status: ProgressStatus) -> sqlx::Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query("UPDATE step_progress SET status = ? WHERE id = ?")
        .bind(status)
        .bind(progress_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn list_pending(database: &SqlitePool) -> sqlx::Result<Vec<PendingSubmission>> {
    sqlx::query_as::<_, PendingSubmission>(
        "SELECT p.id AS progress_id, p.student_id, s.name AS student_name, \
         c.id AS course_id, c.title AS course_title, \
         st.id AS step_id, st.title AS step_title, \
         p.text_answer, p.file_ref, p.submitted_at \
         FROM step_progress p \
         JOIN student s ON s.id = p.student_id \
         JOIN step st ON st.id = p.step_id \
         JOIN course c ON c.id = st.course_id \
         WHERE p.status = ? \
         ORDER BY p.submitted_at",
    )
    .bind(ProgressStatus::Pending)
    .fetch_all(database)
    .await
}

/// Artifact references held by progress rows of one course and student set.
/// Used for best-effort cleanup when steps, courses or students are removed.
pub async fn file_refs_for_step<'e, E>(db: E, step_id: i64) -> sqlx::Result<Vec<String>>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query_scalar::<_, String>(
        "SELECT file_ref FROM step_progress WHERE step_id = ? AND file_ref IS NOT NULL",
    )
    .bind(step_id)
    .fetch_all(db)
    .await
}
