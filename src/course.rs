use anyhow::bail;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::{progress, step};

/// Descriptive course attributes. None of these influence gating.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct CourseMeta {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub media_url: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewCourse {
    pub title: String,
    pub description: Option<String>,
    pub media_url: Option<String>,
}

pub async fn create_course(database: &SqlitePool, new: NewCourse) -> anyhow::Result<i64> {
    let result = sqlx::query("INSERT INTO course (title, description, media_url) VALUES (?, ?, ?)")
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.media_url)
        .execute(database)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn list_courses(database: &SqlitePool) -> anyhow::Result<Vec<CourseMeta>> {
    let courses = sqlx::query_as::<_, CourseMeta>(
        "SELECT id, title, description, media_url FROM course ORDER BY id",
    )
    .fetch_all(database)
    .await?;
    Ok(courses)
}

pub async fn fetch_course(database: &SqlitePool, course_id: i64) -> anyhow::Result<Option<CourseMeta>> {
    let course = sqlx::query_as::<_, CourseMeta>(
        "SELECT id, title, description, media_url FROM course WHERE id = ?",
    )
    .bind(course_id)
    .fetch_optional(database)
    .await?;
    Ok(course)
}

pub async fn update_course(database: &SqlitePool, meta: CourseMeta) -> anyhow::Result<()> {
    let result = sqlx::query("UPDATE course SET title = ?, description = ?, media_url = ? WHERE id = ?")
        .bind(&meta.title)
        .bind(&meta.description)
        .bind(&meta.media_url)
        .bind(meta.id)
        .execute(database)
        .await?;
    if result.rows_affected() == 0 {
        bail!("course {} not found", meta.id);
    }
    Ok(())
}

/// Delete a course with its steps, enrollments and progress. Returns the
/// orphaned artifact references for best-effort cleanup by the caller.
pub async fn delete_course(database: &SqlitePool, course_id: i64) -> anyhow::Result<Vec<String>> {
    let mut tx = database.begin().await?;
    let steps = step::list_steps(&mut *tx, course_id).await?;
    let mut orphaned = Vec::new();
    for s in &steps {
        orphaned.extend(progress::file_refs_for_step(&mut *tx, s.id).await?);
        sqlx::query("DELETE FROM step_progress WHERE step_id = ?")
            .bind(s.id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("DELETE FROM enrollment WHERE course_id = ?")
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM step WHERE course_id = ?")
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM course WHERE id = ?")
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        bail!("course {course_id} not found");
    }
    tx.commit().await?;
    Ok(orphaned)
}
