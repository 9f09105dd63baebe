use axum::{
    Router,
    extract::{Json, Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use utoipa::ToSchema;

use crate::{enrollment, student};

use super::{AppState, STUDENT_SESSION_KEY, read_submission, student_identity};

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/create_user",
    method(post),
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User created"),
        (status = 400, description = "Email already taken or invalid")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> impl IntoResponse {
    match student::create_student(&state.database, req.name, req.email, req.password, false).await
    {
        Ok(_) => "User created successfully".into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/login",
    method(post),
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful"),
        (status = 400, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    match student::login(&state.database, req.email, req.password).await {
        Ok(info) => match session.insert(STUDENT_SESSION_KEY, info.id).await {
            Ok(_) => "Login successful".into_response(),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        },
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/logout",
    method(post),
    responses((status = 200, description = "Logout successful"))
)]
pub async fn logout(session: Session) -> impl IntoResponse {
    let _ = session.delete().await;
    "Logout successful".into_response()
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/user_info",
    method(get),
    responses(
        (status = 200, description = "Current user", body = student::StudentInfo),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn user_info(State(state): State<AppState>, session: Session) -> impl IntoResponse {
    let Some(identity) = student_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match student::get_student_info(&state.database, identity.student_id).await {
        Ok(info) => Json(info).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/list_courses",
    method(get),
    responses(
        (status = 200, description = "Enrolled courses", body = Vec<crate::course::CourseMeta>),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_courses(State(state): State<AppState>, session: Session) -> impl IntoResponse {
    let Some(identity) = student_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match enrollment::courses_for_student(&state.database, identity.student_id).await {
        Ok(courses) => Json(courses).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
pub struct CourseIdQuery {
    pub course_id: i64,
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/course_state",
    method(get),
    params(("course_id" = i64, Query, description = "Course to inspect")),
    responses(
        (status = 200, description = "Per-step gating state", body = Vec<crate::progress::StepState>),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Not enrolled")
    )
)]
pub async fn course_state(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<CourseIdQuery>,
) -> impl IntoResponse {
    let Some(identity) = student_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match state.engine.course_state(identity, q.course_id).await {
        Ok(steps) => Json(steps).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct StepIdQuery {
    pub step_id: i64,
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/submit_answer",
    method(post),
    params(("step_id" = i64, Query, description = "Step being answered")),
    responses(
        (status = 200, description = "Submission recorded", body = crate::progress::ProgressRecord),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Step is not actionable"),
        (status = 422, description = "Answer requirement not met"),
        (status = 503, description = "Artifact store unavailable, retry")
    )
)]
pub async fn submit_answer(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<StepIdQuery>,
    multipart: Multipart,
) -> impl IntoResponse {
    let Some(identity) = student_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let parts = match read_submission(multipart).await {
        Ok(parts) => parts,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    match state
        .engine
        .submit_answer(identity, q.step_id, parts.text, parts.file)
        .await
    {
        Ok(record) => Json(record).into_response(),
        Err(e) => e.into_response(),
    }
}

pub fn get_user_scope() -> Router<AppState> {
    Router::new().nest(
        "/user",
        Router::new()
            .route("/create_user", post(create_user))
            .route("/login", post(login))
            .route("/logout", post(logout))
            .route("/user_info", get(user_info))
            .route("/list_courses", get(list_courses))
            .route("/course_state", get(course_state))
            .route("/submit_answer", post(submit_answer)),
    )
}
