//! Rule-Based Responder
//!
//! Deterministic replies for when no remote model is available. The user's
//! text is matched against a fixed, ordered list of intents and the first
//! match decides the reply.

use crate::tools::ToolRegistry;

/// The intents the responder understands, in matching priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    AddStudent,
    CountStudents,
    ListStudents,
    StudentsByDepartment,
    Unrecognized,
}

impl Intent {
    /// Classifies `text` by case-insensitive substring match. First match wins.
    pub fn classify(text: &str) -> Self {
        let text = text.to_lowercase();
        if text.contains("add student") {
            Intent::AddStudent
        } else if text.contains("how many students") {
            Intent::CountStudents
        } else if text.contains("list students") {
            Intent::ListStudents
        } else if text.contains("department") && text.contains("students") {
            Intent::StudentsByDepartment
        } else {
            Intent::Unrecognized
        }
    }
}

pub struct RuleBasedResponder {
    tools: ToolRegistry,
}

impl RuleBasedResponder {
    pub fn new(tools: ToolRegistry) -> Self {
        Self { tools }
    }

    /// Produces a reply for `user_message`. Never fails; tool errors are
    /// reported inside the reply text.
    pub async fn respond(&self, user_message: &str) -> String {
        match Intent::classify(user_message) {
            Intent::AddStudent => {
                "Please use the /students endpoint to add students with JSON data".to_string()
            }
            Intent::CountStudents => match self.tools.get_total_students().await {
                Ok(total) => format!("There are {} students in the system.", total),
                Err(e) => format!("Error: {}", e),
            },
            Intent::ListStudents => match self.tools.list_students().await {
                Ok(students) => {
                    let lines: Vec<String> = students
                        .iter()
                        .map(|s| format!("- {} ({}) - {}", s.name, s.student_id, s.department))
                        .collect();
                    format!("Students:\n{}", lines.join("\n"))
                }
                Err(e) => format!("Error: {}", e),
            },
            Intent::StudentsByDepartment => match self.tools.get_students_by_department().await {
                Ok(departments) => {
                    let lines: Vec<String> = departments
                        .iter()
                        .map(|(department, count)| format!("- {}: {} students", department, count))
                        .collect();
                    format!("Students by department:\n{}", lines.join("\n"))
                }
                Err(e) => format!("Error: {}", e),
            },
            Intent::Unrecognized => format!(
                "I received: '{}'. I can help with student management, analytics, and campus information.",
                user_message
            ),
        }
    }
}
