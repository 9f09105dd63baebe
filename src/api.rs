pub mod manager;
pub mod public;
pub mod user;

use axum::extract::Multipart;
use sqlx::SqlitePool;
use tower_sessions::Session;
use utoipa::OpenApi;

use crate::{
    artifact::{LocalArtifactStore, NewArtifact},
    engine::{GatingEngine, Identity},
};

#[derive(Clone)]
pub struct AppState {
    pub database: SqlitePool,
    pub engine: GatingEngine,
    pub artifacts: LocalArtifactStore,
}

pub(crate) const STUDENT_SESSION_KEY: &str = "student_id";
pub(crate) const MANAGER_SESSION_KEY: &str = "manager_id";

/// Learner identity from the session, if logged in.
pub(crate) async fn student_identity(session: &Session) -> Option<Identity> {
    let student_id = session.get::<i64>(STUDENT_SESSION_KEY).await.ok()??;
    Some(Identity::student(student_id))
}

/// Admin identity from the session, if logged in as a manager.
pub(crate) async fn manager_identity(session: &Session) -> Option<Identity> {
    let manager_id = session.get::<i64>(MANAGER_SESSION_KEY).await.ok()??;
    Some(Identity::admin(manager_id))
}

pub(crate) struct SubmissionParts {
    pub text: Option<String>,
    pub file: Option<NewArtifact>,
}

/// Pull the `text` and `file` parts out of a submission form. Unknown parts
/// are ignored.
pub(crate) async fn read_submission(mut multipart: Multipart) -> anyhow::Result<SubmissionParts> {
    let mut text = None;
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read multipart field: {}", e))?
    {
        match field.name() {
            Some("text") => {
                text = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| anyhow::anyhow!("Failed to read text field: {}", e))?,
                );
            }
            Some("file") => {
                let content_type = field.content_type().map(|ct| ct.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to read file field: {}", e))?
                    .to_vec();
                file = Some(NewArtifact {
                    bytes,
                    content_type,
                });
            }
            _ => {}
        }
    }
    Ok(SubmissionParts { text, file })
}

#[derive(OpenApi)]
#[openapi(paths(
    user::create_user,
    user::login,
    user::logout,
    user::user_info,
    user::list_courses,
    user::course_state,
    user::submit_answer,
    manager::login,
    manager::logout,
    manager::list_students,
    manager::delete_student,
    manager::list_courses,
    manager::create_course,
    manager::update_course,
    manager::delete_course,
    manager::course_steps,
    manager::create_step,
    manager::update_step,
    manager::move_step,
    manager::delete_step,
    manager::enroll,
    manager::pending_submissions,
    manager::review,
    manager::force_open,
    manager::student_course_state,
    public::get_public_courses,
))]
pub struct ApiDoc;

pub fn get_openapi_json() -> String {
    serde_json::to_string_pretty(&ApiDoc::openapi()).expect("serialize openapi document")
}
