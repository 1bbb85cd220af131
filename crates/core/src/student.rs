//! Student roster types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_DEPARTMENT: &str = "General";

fn default_department() -> String {
    DEFAULT_DEPARTMENT.to_string()
}

/// A student record as stored in the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Student {
    pub id: i64,
    #[schema(example = "S1001")]
    pub student_id: String,
    pub name: String,
    pub email: String,
    #[schema(example = "Computer Science")]
    pub department: String,
    pub onboarded_at: DateTime<Utc>,
    pub active: bool,
}

/// Fields required to add a student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NewStudent {
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "S1001")]
    pub student_id: String,
    #[schema(example = "ada@campus.edu")]
    pub email: String,
    #[serde(default = "default_department")]
    #[schema(example = "Computer Science")]
    pub department: String,
}

/// A partial update of a student. Only these four fields can ever change;
/// anything else is rejected when the update is deserialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct StudentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl StudentUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.department.is_none()
            && self.active.is_none()
    }

    /// Applies the present fields to `student` in place.
    pub fn apply_to(&self, student: &mut Student) {
        if let Some(name) = &self.name {
            student.name = name.clone();
        }
        if let Some(email) = &self.email {
            student.email = email.clone();
        }
        if let Some(department) = &self.department {
            student.department = department.clone();
        }
        if let Some(active) = self.active {
            student.active = active;
        }
    }
}
