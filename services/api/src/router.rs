//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, the streaming chat endpoint, and OpenAPI
//! documentation.

use crate::{
    handlers,
    models::{
        ChatRequest, ChatResponse, DepartmentBreakdownResponse, ErrorResponse, HealthResponse,
        MessageResponse, StreamErrorFrame, StreamFrame, StudentCreatedResponse,
        StudentListResponse, StudentResponse, TotalStudentsResponse,
    },
    state::AppState,
    stream,
};

use axum::{
    Router,
    routing::{get, post},
};
use campus_core::student::{NewStudent, Student, StudentUpdate};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::chat,
        stream::chat_stream,
        handlers::create_student,
        handlers::list_students,
        handlers::get_student,
        handlers::update_student,
        handlers::delete_student,
        handlers::total_students,
        handlers::students_by_department,
        handlers::run_tool,
    ),
    components(
        schemas(
            Student, NewStudent, StudentUpdate, ChatRequest, ChatResponse, StreamFrame,
            StreamErrorFrame, StudentCreatedResponse, StudentResponse, StudentListResponse,
            MessageResponse, TotalStudentsResponse, DepartmentBreakdownResponse,
            HealthResponse, ErrorResponse
        )
    ),
    tags(
        (name = "Campus Admin API", description = "Student roster, analytics, and the campus admin assistant")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/chat", post(handlers::chat))
        .route("/chat/stream", post(stream::chat_stream))
        .route(
            "/students",
            get(handlers::list_students).post(handlers::create_student),
        )
        .route(
            "/students/{student_id}",
            get(handlers::get_student)
                .put(handlers::update_student)
                .delete(handlers::delete_student),
        )
        .route("/analytics/total-students", get(handlers::total_students))
        .route(
            "/analytics/students-by-department",
            get(handlers::students_by_department),
        )
        .route("/tools/{name}", post(handlers::run_tool))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
