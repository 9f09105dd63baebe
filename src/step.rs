use anyhow::bail;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::progress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[repr(i64)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Info = 0,
    Task = 1,
}

/// One ordered unit of course content. `position` is 1-based and contiguous
/// within a course. Task steps declare their answer requirement through
/// `needs_text` / `needs_file` (at least one); info steps declare neither.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Step {
    pub id: i64,
    pub course_id: i64,
    pub position: i64,
    pub kind: StepKind,
    pub needs_text: bool,
    pub needs_file: bool,
    pub title: String,
    pub body: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewStep {
    pub course_id: i64,
    pub kind: StepKind,
    #[serde(default)]
    pub needs_text: bool,
    #[serde(default)]
    pub needs_file: bool,
    pub title: String,
    pub body: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStep {
    pub step_id: i64,
    #[serde(default)]
    pub needs_text: bool,
    #[serde(default)]
    pub needs_file: bool,
    pub title: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Up,
    Down,
}

fn check_requirement(kind: StepKind, needs_text: bool, needs_file: bool) -> anyhow::Result<()> {
    match kind {
        StepKind::Info => {
            if needs_text || needs_file {
                bail!("an info step carries no answer requirement");
            }
        }
        StepKind::Task => {
            if !needs_text && !needs_file {
                bail!("a task step must require a text answer, a file, or both");
            }
        }
    }
    Ok(())
}

pub async fn list_steps<'e, E>(db: E, course_id: i64) -> sqlx::Result<Vec<Step>>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query_as::<_, Step>(
        "SELECT id, course_id, position, kind, needs_text, needs_file, title, body \
         FROM step WHERE course_id = ? ORDER BY position",
    )
    .bind(course_id)
    .fetch_all(db)
    .await
}

pub async fn fetch_step<'e, E>(db: E, step_id: i64) -> sqlx::Result<Option<Step>>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query_as::<_, Step>(
        "SELECT id, course_id, position, kind, needs_text, needs_file, title, body \
         FROM step WHERE id = ?",
    )
    .bind(step_id)
    .fetch_optional(db)
    .await
}

/// Append a step at the end of its course.
pub async fn create_step(database: &SqlitePool, new: NewStep) -> anyhow::Result<i64> {
    check_requirement(new.kind, new.needs_text, new.needs_file)?;
    let mut tx = database.begin().await?;
    let position: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(position), 0) + 1 FROM step WHERE course_id = ?")
            .bind(new.course_id)
            .fetch_one(&mut *tx)
            .await?;
    let result = sqlx::query(
        "INSERT INTO step (course_id, position, kind, needs_text, needs_file, title, body) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new.course_id)
    .bind(position)
    .bind(new.kind)
    .bind(new.needs_text)
    .bind(new.needs_file)
    .bind(&new.title)
    .bind(&new.body)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(result.last_insert_rowid())
}

/// Edit descriptive fields and the answer requirement. Kind and position are
/// not editable here; reordering goes through [`move_step`].
pub async fn update_step(database: &SqlitePool, update: UpdateStep) -> anyhow::Result<()> {
    let Some(step) = fetch_step(database, update.step_id).await? else {
        bail!("step {} not found", update.step_id);
    };
    check_requirement(step.kind, update.needs_text, update.needs_file)?;
    sqlx::query("UPDATE step SET needs_text = ?, needs_file = ?, title = ?, body = ? WHERE id = ?")
        .bind(update.needs_text)
        .bind(update.needs_file)
        .bind(&update.title)
        .bind(&update.body)
        .bind(update.step_id)
        .execute(database)
        .await?;
    Ok(())
}

/// Swap a step with its adjacent neighbour, preserving position uniqueness
/// and contiguity. The swap goes through a parked position because SQLite
/// enforces UNIQUE(course_id, position) per row during UPDATE.
pub async fn move_step(
    database: &SqlitePool,
    step_id: i64,
    direction: MoveDirection,
) -> anyhow::Result<()> {
    let mut tx = database.begin().await?;
    let Some(step) = fetch_step(&mut *tx, step_id).await? else {
        bail!("step {step_id} not found");
    };
    let neighbour_position = match direction {
        MoveDirection::Up => step.position - 1,
        MoveDirection::Down => step.position + 1,
    };
    let neighbour: Option<i64> =
        sqlx::query_scalar("SELECT id FROM step WHERE course_id = ? AND position = ?")
            .bind(step.course_id)
            .bind(neighbour_position)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(neighbour_id) = neighbour else {
        bail!("step {step_id} is already at the edge of its course");
    };
    sqlx::query("UPDATE step SET position = -1 WHERE id = ?")
        .bind(step_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE step SET position = ? WHERE id = ?")
        .bind(step.position)
        .bind(neighbour_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE step SET position = ? WHERE id = ?")
        .bind(neighbour_position)
        .bind(step_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Delete a step and close the position gap. Returns the artifact references
/// orphaned by the deleted progress rows, for best-effort cleanup by the
/// caller; the database state never depends on that cleanup succeeding.
pub async fn delete_step(database: &SqlitePool, step_id: i64) -> anyhow::Result<Vec<String>> {
    let mut tx = database.begin().await?;
    let Some(step) = fetch_step(&mut *tx, step_id).await? else {
        bail!("step {step_id} not found");
    };
    let orphaned = progress::file_refs_for_step(&mut *tx, step_id).await?;
    sqlx::query("DELETE FROM step_progress WHERE step_id = ?")
        .bind(step_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM step WHERE id = ?")
        .bind(step_id)
        .execute(&mut *tx)
        .await?;
    // Shift the tail down through negated positions to dodge the UNIQUE check.
    sqlx::query("UPDATE step SET position = -position WHERE course_id = ? AND position > ?")
        .bind(step.course_id)
        .bind(step.position)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE step SET position = -position - 1 WHERE course_id = ? AND position < 0")
        .bind(step.course_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(orphaned)
}
