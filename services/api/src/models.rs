//! API Models
//!
//! Request and response bodies of the HTTP API. Every type here derives
//! `ToSchema` so it appears in the generated OpenAPI document; the roster
//! types themselves come from `campus-core`.

use campus_core::student::Student;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Deserialize, Serialize, ToSchema, Debug, Clone)]
pub struct ChatRequest {
    #[schema(example = "session-42")]
    pub session_id: String,
    #[schema(example = "How many students are there?")]
    pub message: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
}

/// One server-sent event of a streamed chat reply.
#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct StreamFrame {
    pub content: String,
    pub complete: bool,
}

impl StreamFrame {
    pub fn chunk(content: String) -> Self {
        Self {
            content,
            complete: false,
        }
    }

    /// The frame that closes every stream.
    pub fn done() -> Self {
        Self {
            content: String::new(),
            complete: true,
        }
    }
}

/// Sent in place of a frame when the stream cannot continue.
#[derive(Serialize, ToSchema, Debug)]
pub struct StreamErrorFrame {
    pub error: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct StudentCreatedResponse {
    #[schema(example = "Student created successfully")]
    pub message: String,
    pub student: Student,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct StudentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub student: Student,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct StudentListResponse {
    pub success: bool,
    pub students: Vec<Student>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct TotalStudentsResponse {
    pub total_students: i64,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct DepartmentBreakdownResponse {
    pub students_by_department: BTreeMap<String, i64>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    pub timestamp: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
