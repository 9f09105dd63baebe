use axum::{
    Router,
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::warn;
use utoipa::ToSchema;

use crate::{
    course::{self, CourseMeta, NewCourse},
    engine::ReviewDecision,
    progress, step, student,
};

use super::{AppState, MANAGER_SESSION_KEY, manager_identity};

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/login",
    method(post),
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful"),
        (status = 400, description = "Invalid credentials or not an administrator")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    match student::login(&state.database, req.email, req.password).await {
        Ok(info) if info.is_admin => match session.insert(MANAGER_SESSION_KEY, info.id).await {
            Ok(_) => "Login successful".into_response(),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        },
        Ok(_) => (
            StatusCode::BAD_REQUEST,
            "account is not an administrator".to_string(),
        )
            .into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/logout",
    method(post),
    responses((status = 200, description = "Logout successful"))
)]
pub async fn logout(session: Session) -> impl IntoResponse {
    let _ = session.delete().await;
    "Logout successful".into_response()
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/list_students",
    method(get),
    responses(
        (status = 200, description = "All accounts", body = Vec<student::StudentInfo>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_students(State(state): State<AppState>, session: Session) -> impl IntoResponse {
    let Some(_) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match student::get_student_list(&state.database).await {
        Ok(students) => Json(students).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
pub struct StudentIdQuery {
    pub student_id: i64,
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/delete_student",
    method(post),
    params(("student_id" = i64, Query, description = "Account to remove")),
    responses(
        (status = 200, description = "Student removed"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn delete_student(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<StudentIdQuery>,
) -> impl IntoResponse {
    let Some(_) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match student::delete_student(&state.database, q.student_id).await {
        Ok(orphaned) => {
            delete_artifacts(&state, orphaned).await;
            "Student removed".into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/list_courses",
    method(get),
    responses(
        (status = 200, description = "All courses", body = Vec<CourseMeta>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_courses(State(state): State<AppState>, session: Session) -> impl IntoResponse {
    let Some(_) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match course::list_courses(&state.database).await {
        Ok(courses) => Json(courses).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/create_course",
    method(post),
    request_body = NewCourse,
    responses(
        (status = 200, description = "Course id", body = i64),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn create_course(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<NewCourse>,
) -> impl IntoResponse {
    let Some(_) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match course::create_course(&state.database, req).await {
        Ok(id) => Json(id).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/update_course",
    method(post),
    request_body = CourseMeta,
    responses(
        (status = 200, description = "Course updated"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn update_course(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CourseMeta>,
) -> impl IntoResponse {
    let Some(_) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match course::update_course(&state.database, req).await {
        Ok(_) => "Course updated".into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
pub struct CourseIdQuery {
    pub course_id: i64,
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/delete_course",
    method(post),
    params(("course_id" = i64, Query, description = "Course to remove")),
    responses(
        (status = 200, description = "Course removed"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn delete_course(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<CourseIdQuery>,
) -> impl IntoResponse {
    let Some(_) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match course::delete_course(&state.database, q.course_id).await {
        Ok(orphaned) => {
            delete_artifacts(&state, orphaned).await;
            "Course removed".into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/course_steps",
    method(get),
    params(("course_id" = i64, Query, description = "Course to list")),
    responses(
        (status = 200, description = "Steps in position order", body = Vec<step::Step>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn course_steps(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<CourseIdQuery>,
) -> impl IntoResponse {
    let Some(_) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match step::list_steps(&state.database, q.course_id).await {
        Ok(steps) => Json(steps).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/create_step",
    method(post),
    request_body = step::NewStep,
    responses(
        (status = 200, description = "Step id", body = i64),
        (status = 400, description = "Invalid kind/requirement combination"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn create_step(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<step::NewStep>,
) -> impl IntoResponse {
    let Some(_) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match step::create_step(&state.database, req).await {
        Ok(id) => Json(id).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/update_step",
    method(post),
    request_body = step::UpdateStep,
    responses(
        (status = 200, description = "Step updated"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn update_step(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<step::UpdateStep>,
) -> impl IntoResponse {
    let Some(_) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match step::update_step(&state.database, req).await {
        Ok(_) => "Step updated".into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
pub struct MoveStepQuery {
    pub step_id: i64,
    pub direction: step::MoveDirection,
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/move_step",
    method(post),
    params(
        ("step_id" = i64, Query, description = "Step to move"),
        ("direction" = String, Query, description = "\"up\" or \"down\"")
    ),
    responses(
        (status = 200, description = "Step moved"),
        (status = 400, description = "Already at the edge"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn move_step(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<MoveStepQuery>,
) -> impl IntoResponse {
    let Some(_) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match step::move_step(&state.database, q.step_id, q.direction).await {
        Ok(_) => "Step moved".into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
pub struct StepIdQuery {
    pub step_id: i64,
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/delete_step",
    method(post),
    params(("step_id" = i64, Query, description = "Step to remove")),
    responses(
        (status = 200, description = "Step removed"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn delete_step(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<StepIdQuery>,
) -> impl IntoResponse {
    let Some(_) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match step::delete_step(&state.database, q.step_id).await {
        Ok(orphaned) => {
            delete_artifacts(&state, orphaned).await;
            "Step removed".into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
pub struct EnrollQuery {
    pub student_id: i64,
    pub course_id: i64,
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/enroll",
    method(post),
    params(
        ("student_id" = i64, Query, description = "Student to enroll"),
        ("course_id" = i64, Query, description = "Course to enroll into")
    ),
    responses(
        (status = 200, description = "Enrolled; first step opened"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Already enrolled")
    )
)]
pub async fn enroll(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<EnrollQuery>,
) -> impl IntoResponse {
    let Some(identity) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match state.engine.enroll(identity, q.student_id, q.course_id).await {
        Ok(_) => "Enrolled".into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/pending_submissions",
    method(get),
    responses(
        (status = 200, description = "Submissions awaiting review", body = Vec<progress::PendingSubmission>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn pending_submissions(
    State(state): State<AppState>,
    session: Session,
) -> impl IntoResponse {
    let Some(_) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match progress::list_pending(&state.database).await {
        Ok(pending) => Json(pending).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub progress_id: i64,
    pub decision: ReviewDecision,
    pub comment: Option<String>,
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/review",
    method(post),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Review recorded"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Record is not pending"),
        (status = 422, description = "Rejection without a comment")
    )
)]
pub async fn review(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<ReviewRequest>,
) -> impl IntoResponse {
    let Some(identity) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match state
        .engine
        .review(identity, req.progress_id, req.decision, req.comment)
        .await
    {
        Ok(_) => "Review recorded".into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct ForceOpenQuery {
    pub student_id: i64,
    pub step_id: i64,
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/force_open",
    method(post),
    params(
        ("student_id" = i64, Query, description = "Student to open the step for"),
        ("step_id" = i64, Query, description = "Step to open")
    ),
    responses(
        (status = 200, description = "Step opened, bypassing gating"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn force_open(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<ForceOpenQuery>,
) -> impl IntoResponse {
    let Some(identity) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match state
        .engine
        .force_open(identity, q.student_id, q.step_id)
        .await
    {
        Ok(_) => "Step opened".into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct StudentCourseQuery {
    pub student_id: i64,
    pub course_id: i64,
}

#[utoipa::path(
    context_path = "/api/manager",
    path = "/student_course_state",
    method(get),
    params(
        ("student_id" = i64, Query, description = "Student to inspect"),
        ("course_id" = i64, Query, description = "Course to inspect")
    ),
    responses(
        (status = 200, description = "Per-step gating state", body = Vec<progress::StepState>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn student_course_state(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<StudentCourseQuery>,
) -> impl IntoResponse {
    let Some(_) = manager_identity(&session).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let viewed = crate::engine::Identity::admin(q.student_id);
    match state.engine.course_state(viewed, q.course_id).await {
        Ok(steps) => Json(steps).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn delete_artifacts(state: &AppState, orphaned: Vec<String>) {
    for reference in orphaned {
        if let Err(e) = state.artifacts.delete(&reference).await {
            warn!(reference = %reference, error = %e, "failed to delete orphaned artifact");
        }
    }
}

pub fn get_manager_scope() -> Router<AppState> {
    Router::new().nest(
        "/manager",
        Router::new()
            .route("/login", post(login))
            .route("/logout", post(logout))
            .route("/list_students", get(list_students))
            .route("/delete_student", post(delete_student))
            .route("/list_courses", get(list_courses))
            .route("/create_course", post(create_course))
            .route("/update_course", post(update_course))
            .route("/delete_course", post(delete_course))
            .route("/course_steps", get(course_steps))
            .route("/create_step", post(create_step))
            .route("/update_step", post(update_step))
            .route("/move_step", post(move_step))
            .route("/delete_step", post(delete_step))
            .route("/enroll", post(enroll))
            .route("/pending_submissions", get(pending_submissions))
            .route("/review", post(review))
            .route("/force_open", post(force_open))
            .route("/student_course_state", get(student_course_state)),
    )
}
