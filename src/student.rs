use argon2::{
    Argon2, PasswordVerifier,
    password_hash::{PasswordHash, PasswordHasher, SaltString, rand_core::OsRng},
};
use anyhow::bail;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct StudentInfo {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct AuthRow {
    id: i64,
    name: String,
    email: String,
    password: String,
    is_admin: bool,
}

pub async fn get_student_list(database: &SqlitePool) -> anyhow::Result<Vec<StudentInfo>> {
    let students =
        sqlx::query_as::<_, StudentInfo>("SELECT id, name, email, is_admin FROM student ORDER BY id")
            .fetch_all(database)
            .await?;
    Ok(students)
}

pub async fn get_student_info(database: &SqlitePool, id: i64) -> anyhow::Result<StudentInfo> {
    let student =
        sqlx::query_as::<_, StudentInfo>("SELECT id, name, email, is_admin FROM student WHERE id = ?")
            .bind(id)
            .fetch_optional(database)
            .await?;
    match student {
        Some(student) => Ok(student),
        None => bail!("student {id} not found"),
    }
}

pub async fn create_student(
    database: &SqlitePool,
    name: String,
    email: String,
    password: String,
    is_admin: bool,
) -> anyhow::Result<i64> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    let student = sqlx::query("INSERT INTO student (name, email, password, is_admin) VALUES (?, ?, ?, ?)")
        .bind(&name)
        .bind(&email)
        .bind(&password_hash)
        .bind(is_admin)
        .execute(database)
        .await?;
    Ok(student.last_insert_rowid())
}

/// Remove a student with all enrollments and progress. Returns the orphaned
/// artifact references for best-effort cleanup by the caller.
pub async fn delete_student(database: &SqlitePool, id: i64) -> anyhow::Result<Vec<String>> {
    let mut tx = database.begin().await?;
    let orphaned = sqlx::query_scalar::<_, String>(
        "SELECT file_ref FROM step_progress WHERE student_id = ? AND file_ref IS NOT NULL",
    )
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM step_progress WHERE student_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM enrollment WHERE student_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM student WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(orphaned)
}

pub async fn login(
    database: &SqlitePool,
    email: String,
    password: String,
) -> anyhow::Result<StudentInfo> {
    let row = sqlx::query_as::<_, AuthRow>(
        "SELECT id, name, email, password, is_admin FROM student WHERE email = ?",
    )
    .bind(&email)
    .fetch_optional(database)
    .await?;
    let Some(row) = row else {
        bail!("unknown email");
    };
    let parsed_hash = PasswordHash::new(&row.password)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|e| anyhow::anyhow!("Failed to verify password: {}", e))?;
    Ok(StudentInfo {
        id: row.id,
        name: row.name,
        email: row.email,
        is_admin: row.is_admin,
    })
}
