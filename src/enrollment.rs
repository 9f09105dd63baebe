use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::{course::CourseMeta, utils::now_local};

/// A (student, course) pair, unique per pair. Its existence is the
/// precondition for any progress of that student in that course.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub created_at: OffsetDateTime,
}

pub async fn create(database: &SqlitePool, student_id: i64, course_id: i64) -> sqlx::Result<i64> {
    let result =
        sqlx::query("INSERT INTO enrollment (student_id, course_id, created_at) VALUES (?, ?, ?)")
            .bind(student_id)
            .bind(course_id)
            .bind(now_local())
            .execute(database)
            .await?;
    Ok(result.last_insert_rowid())
}

pub async fn exists(database: &SqlitePool, student_id: i64, course_id: i64) -> sqlx::Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM enrollment WHERE student_id = ? AND course_id = ?",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_one(database)
    .await?;
    Ok(count > 0)
}

pub async fn courses_for_student(
    database: &SqlitePool,
    student_id: i64,
) -> sqlx::Result<Vec<CourseMeta>> {
    sqlx::query_as::<_, CourseMeta>(
        "SELECT course.id, course.title, course.description, course.media_url \
         FROM course INNER JOIN enrollment ON course.id = enrollment.course_id \
         WHERE enrollment.student_id = ? ORDER BY course.id",
    )
    .bind(student_id)
    .fetch_all(database)
    .await
}

pub async fn list_for_course(
    database: &SqlitePool,
    course_id: i64,
) -> sqlx::Result<Vec<Enrollment>> {
    sqlx::query_as::<_, Enrollment>(
        "SELECT id, student_id, course_id, created_at FROM enrollment \
         WHERE course_id = ? ORDER BY created_at",
    )
    .bind(course_id)
    .fetch_all(database)
    .await
}
