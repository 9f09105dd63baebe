use axum::{
    Router,
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use crate::course;

use super::AppState;

#[utoipa::path(
    context_path = "/api/public",
    path = "/courses",
    method(get),
    responses((status = 200, description = "Course catalogue", body = Vec<course::CourseMeta>))
)]
pub async fn get_public_courses(State(state): State<AppState>) -> impl IntoResponse {
    match course::list_courses(&state.database).await {
        Ok(courses) => Json(courses).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub fn get_public_scope() -> Router<AppState> {
    Router::new().nest("/public", Router::new().route("/courses", get(get_public_courses)))
}
