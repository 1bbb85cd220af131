//! Axum Handlers for the REST API
//!
//! Thin request/response mapping over the roster tools and the conversation
//! agent. It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use campus_core::{
    student::{NewStudent, StudentUpdate},
    tools::{TOOL_NAMES, ToolError},
};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::error;

use crate::{
    models::{
        ChatRequest, ChatResponse, DepartmentBreakdownResponse, ErrorResponse, HealthResponse,
        MessageResponse, StudentCreatedResponse, StudentListResponse, StudentResponse,
        TotalStudentsResponse,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl From<ToolError> for ApiError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::AlreadyExists(_)
            | ToolError::NoFieldsProvided
            | ToolError::InvalidArguments { .. } => Self::BadRequest(err.to_string()),
            ToolError::NotFound(_) => Self::NotFound(err.to_string()),
            ToolError::UnknownTool(_) | ToolError::Store(_) => {
                Self::InternalServerError(err.into())
            }
        }
    }
}

/// Service name, version, and the main endpoints.
pub async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "message": "Campus Admin Agent API",
        "version": env!("CARGO_PKG_VERSION"),
        "remote_model": state.agent.has_remote_model(),
        "endpoints": {
            "chat": "/chat",
            "chat_stream": "/chat/stream",
            "students": "/students",
            "analytics": "/analytics",
            "tools": "/tools/{name}",
        }
    }))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Send a message to the assistant and wait for the whole reply.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses((status = 200, description = "Assistant reply", body = ChatResponse))
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let response = state
        .agent
        .handle_message(&payload.session_id, &payload.message)
        .await;
    Json(ChatResponse {
        response,
        session_id: payload.session_id,
    })
}

/// Add a student to the roster.
#[utoipa::path(
    post,
    path = "/students",
    request_body = NewStudent,
    responses(
        (status = 201, description = "Student created", body = StudentCreatedResponse),
        (status = 400, description = "Student ID already taken", body = ErrorResponse)
    )
)]
pub async fn create_student(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewStudent>,
) -> Result<impl IntoResponse, ApiError> {
    let student = state.tools.add_student(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(StudentCreatedResponse {
            message: "Student created successfully".to_string(),
            student,
        }),
    ))
}

/// List every student.
#[utoipa::path(
    get,
    path = "/students",
    responses(
        (status = 200, description = "All students", body = StudentListResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_students(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StudentListResponse>, ApiError> {
    let students = state.tools.list_students().await?;
    Ok(Json(StudentListResponse {
        success: true,
        students,
    }))
}

/// Get a student by their student ID.
#[utoipa::path(
    get,
    path = "/students/{student_id}",
    responses(
        (status = 200, description = "Student details", body = StudentResponse),
        (status = 404, description = "Student not found", body = ErrorResponse)
    ),
    params(("student_id" = String, Path, description = "Student ID"))
)]
pub async fn get_student(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<String>,
) -> Result<Json<StudentResponse>, ApiError> {
    let student = state.tools.get_student(&student_id).await?;
    Ok(Json(StudentResponse {
        success: true,
        message: None,
        student,
    }))
}

/// Update some of a student's fields.
///
/// Only `name`, `email`, `department`, and `active` can be changed; any other
/// field makes the body unprocessable.
#[utoipa::path(
    put,
    path = "/students/{student_id}",
    request_body = StudentUpdate,
    responses(
        (status = 200, description = "Student updated", body = StudentResponse),
        (status = 400, description = "No fields to update", body = ErrorResponse),
        (status = 404, description = "Student not found", body = ErrorResponse),
        (status = 422, description = "Unknown field in body")
    ),
    params(("student_id" = String, Path, description = "Student ID"))
)]
pub async fn update_student(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<String>,
    Json(payload): Json<StudentUpdate>,
) -> Result<Json<StudentResponse>, ApiError> {
    if payload.is_empty() {
        return Err(ApiError::BadRequest(
            "No valid fields provided for update. Allowed fields: name, email, department, active"
                .to_string(),
        ));
    }
    let student = state.tools.update_student(&student_id, &payload).await?;
    Ok(Json(StudentResponse {
        success: true,
        message: Some(format!("Student {} updated", student_id)),
        student,
    }))
}

/// Remove a student from the roster.
#[utoipa::path(
    delete,
    path = "/students/{student_id}",
    responses(
        (status = 200, description = "Student deleted", body = MessageResponse),
        (status = 404, description = "Student not found", body = ErrorResponse)
    ),
    params(("student_id" = String, Path, description = "Student ID"))
)]
pub async fn delete_student(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.tools.delete_student(&student_id).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: format!("Student {} deleted", student_id),
    }))
}

/// Total number of students.
#[utoipa::path(
    get,
    path = "/analytics/total-students",
    responses((status = 200, description = "Student count", body = TotalStudentsResponse))
)]
pub async fn total_students(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TotalStudentsResponse>, ApiError> {
    let total_students = state.tools.get_total_students().await?;
    Ok(Json(TotalStudentsResponse { total_students }))
}

/// Number of students in each department.
#[utoipa::path(
    get,
    path = "/analytics/students-by-department",
    responses((status = 200, description = "Counts per department", body = DepartmentBreakdownResponse))
)]
pub async fn students_by_department(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DepartmentBreakdownResponse>, ApiError> {
    let students_by_department = state.tools.get_students_by_department().await?;
    Ok(Json(DepartmentBreakdownResponse {
        students_by_department,
    }))
}

/// Run a roster tool by name with a JSON object of arguments. Tools that take
/// no arguments can be called without a body.
#[utoipa::path(
    post,
    path = "/tools/{name}",
    request_body = Object,
    responses(
        (status = 200, description = "Tool result payload"),
        (status = 400, description = "Tool reported an error"),
        (status = 404, description = "No such tool", body = ErrorResponse)
    ),
    params(("name" = String, Path, description = "Tool name"))
)]
pub async fn run_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    args: Option<Json<Value>>,
) -> Result<Response, ApiError> {
    let args = args.map_or(Value::Null, |Json(args)| args);
    if !TOOL_NAMES.contains(&name.as_str()) {
        return Err(ApiError::NotFound(
            ToolError::UnknownTool(name).to_string(),
        ));
    }
    let payload = state.tools.execute(&name, args).await;
    let status = if payload.get("error").is_some() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    Ok((status, Json(payload)).into_response())
}
