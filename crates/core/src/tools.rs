//! Student Management Tools
//!
//! A fixed table of roster operations shared by the rule-based responder and
//! the HTTP layer. Each tool is available as a typed method and, for callers
//! that only know a tool by name, through [`ToolRegistry::execute`], which
//! takes JSON keyword arguments and answers with a JSON payload or
//! `{"error": message}`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::store::{StoreError, StudentStore};
use crate::student::{NewStudent, Student, StudentUpdate};

pub const TOOL_NAMES: [&str; 7] = [
    "add_student",
    "get_student",
    "update_student",
    "list_students",
    "delete_student",
    "get_total_students",
    "get_students_by_department",
];

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Student with ID {0} already exists")]
    AlreadyExists(String),
    #[error("Student with ID {0} not found")]
    NotFound(String),
    #[error("No valid fields provided")]
    NoFieldsProvided,
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("Tool {0} not found")]
    UnknownTool(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ToolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(student_id) => ToolError::AlreadyExists(student_id),
            other => ToolError::Store(other),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StudentIdArgs {
    student_id: String,
}

/// Name-addressable roster operations over a [`StudentStore`].
#[derive(Clone)]
pub struct ToolRegistry {
    students: Arc<dyn StudentStore>,
}

impl ToolRegistry {
    pub fn new(students: Arc<dyn StudentStore>) -> Self {
        Self { students }
    }

    /// Adds a student after checking the `student_id` is free. The store's
    /// own uniqueness constraint catches writers that race past the check.
    pub async fn add_student(&self, new: NewStudent) -> Result<Student, ToolError> {
        if self
            .students
            .read_by_student_id(&new.student_id)
            .await?
            .is_some()
        {
            return Err(ToolError::AlreadyExists(new.student_id));
        }
        let student = self.students.create(&new).await?;
        info!(student_id = %student.student_id, "Student added");
        Ok(student)
    }

    pub async fn get_student(&self, student_id: &str) -> Result<Student, ToolError> {
        self.students
            .read_by_student_id(student_id)
            .await?
            .ok_or_else(|| ToolError::NotFound(student_id.to_string()))
    }

    pub async fn update_student(
        &self,
        student_id: &str,
        update: &StudentUpdate,
    ) -> Result<Student, ToolError> {
        if update.is_empty() {
            return Err(ToolError::NoFieldsProvided);
        }
        let student = self
            .students
            .update_fields(student_id, update)
            .await?
            .ok_or_else(|| ToolError::NotFound(student_id.to_string()))?;
        info!(student_id, "Student updated");
        Ok(student)
    }

    pub async fn list_students(&self) -> Result<Vec<Student>, ToolError> {
        Ok(self.students.list_all().await?)
    }

    pub async fn delete_student(&self, student_id: &str) -> Result<(), ToolError> {
        if !self.students.delete_by_student_id(student_id).await? {
            return Err(ToolError::NotFound(student_id.to_string()));
        }
        info!(student_id, "Student deleted");
        Ok(())
    }

    pub async fn get_total_students(&self) -> Result<i64, ToolError> {
        Ok(self.students.count().await?)
    }

    pub async fn get_students_by_department(&self) -> Result<BTreeMap<String, i64>, ToolError> {
        Ok(self.students.count_by_department().await?)
    }

    /// Runs the tool called `name` with a JSON object of keyword arguments.
    pub async fn execute(&self, name: &str, args: Value) -> Value {
        info!(tool = name, "Executing tool");
        match self.dispatch(name, args).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(tool = name, error = %e, "Tool call failed");
                json!({ "error": e.to_string() })
            }
        }
    }

    async fn dispatch(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        match name {
            "add_student" => {
                let new: NewStudent = parse_args(name, args)?;
                let student = self.add_student(new).await?;
                Ok(json!({ "success": true, "student": student }))
            }
            "get_student" => {
                let StudentIdArgs { student_id } = parse_args(name, args)?;
                let student = self.get_student(&student_id).await?;
                Ok(json!({ "success": true, "student": student }))
            }
            "update_student" => {
                let (student_id, rest) = split_student_id(name, args)?;
                let update: StudentUpdate = parse_args(name, rest)?;
                let student = self.update_student(&student_id, &update).await?;
                Ok(json!({
                    "success": true,
                    "message": format!("Student {} updated", student_id),
                    "student": student,
                }))
            }
            "list_students" => {
                let students = self.list_students().await?;
                Ok(json!({ "success": true, "students": students }))
            }
            "delete_student" => {
                let StudentIdArgs { student_id } = parse_args(name, args)?;
                self.delete_student(&student_id).await?;
                Ok(json!({
                    "success": true,
                    "message": format!("Student {} deleted", student_id),
                }))
            }
            "get_total_students" => Ok(json!(self.get_total_students().await?)),
            "get_students_by_department" => Ok(json!(self.get_students_by_department().await?)),
            _ => Err(ToolError::UnknownTool(name.to_string())),
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    // A missing argument object is treated as no arguments.
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

fn split_student_id(tool: &str, args: Value) -> Result<(String, Value), ToolError> {
    let invalid = |reason: &str| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: reason.to_string(),
    };
    let Value::Object(mut map) = args else {
        return Err(invalid("expected an object of keyword arguments"));
    };
    match map.remove("student_id") {
        Some(Value::String(student_id)) => Ok((student_id, Value::Object(map))),
        _ => Err(invalid("missing string field `student_id`")),
    }
}
