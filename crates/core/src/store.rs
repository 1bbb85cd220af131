//! Record Store Contracts
//!
//! The roster and the conversation memory are persisted by an external store.
//! This module defines what the rest of the crate needs from it, plus an
//! in-memory implementation used for tests and local experimentation.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::memory::{ConversationStore, Role, Turn};
use crate::student::{NewStudent, Student, StudentUpdate};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Student with ID {0} already exists")]
    Conflict(String),
    #[error("Stored data is invalid: {0}")]
    Corrupt(String),
    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Storage for student records.
#[async_trait]
pub trait StudentStore: Send + Sync {
    /// Inserts a student. Fails with [`StoreError::Conflict`] when the
    /// `student_id` is already taken.
    async fn create(&self, new: &NewStudent) -> Result<Student, StoreError>;

    async fn read_by_student_id(&self, student_id: &str) -> Result<Option<Student>, StoreError>;

    /// Applies the present fields of `update`. Returns `None` if no such student exists.
    async fn update_fields(
        &self,
        student_id: &str,
        update: &StudentUpdate,
    ) -> Result<Option<Student>, StoreError>;

    /// Returns whether a record was removed.
    async fn delete_by_student_id(&self, student_id: &str) -> Result<bool, StoreError>;

    async fn list_all(&self) -> Result<Vec<Student>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;

    async fn count_by_department(&self) -> Result<BTreeMap<String, i64>, StoreError>;
}

#[derive(Default)]
struct Tables {
    students: Vec<Student>,
    turns: Vec<Turn>,
    next_student_id: i64,
    next_turn_id: i64,
}

/// A process-local store holding everything in memory.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All turns of a session in the order they were appended.
    pub async fn session_turns(&self, session_id: &str) -> Vec<Turn> {
        let tables = self.tables.lock().await;
        tables
            .turns
            .iter()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn append_turn(
        &self,
        session_id: &str,
        role: Role,
        message: &str,
    ) -> Result<Turn, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.next_turn_id += 1;
        let turn = Turn {
            id: tables.next_turn_id,
            session_id: session_id.to_string(),
            role,
            message: message.to_string(),
            created_at: Utc::now(),
        };
        tables.turns.push(turn.clone());
        Ok(turn)
    }

    async fn recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .turns
            .iter()
            .rev()
            .filter(|t| t.session_id == session_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StudentStore for InMemoryStore {
    async fn create(&self, new: &NewStudent) -> Result<Student, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables
            .students
            .iter()
            .any(|s| s.student_id == new.student_id)
        {
            return Err(StoreError::Conflict(new.student_id.clone()));
        }
        tables.next_student_id += 1;
        let student = Student {
            id: tables.next_student_id,
            student_id: new.student_id.clone(),
            name: new.name.clone(),
            email: new.email.clone(),
            department: new.department.clone(),
            onboarded_at: Utc::now(),
            active: true,
        };
        tables.students.push(student.clone());
        Ok(student)
    }

    async fn read_by_student_id(&self, student_id: &str) -> Result<Option<Student>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .students
            .iter()
            .find(|s| s.student_id == student_id)
            .cloned())
    }

    async fn update_fields(
        &self,
        student_id: &str,
        update: &StudentUpdate,
    ) -> Result<Option<Student>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .students
            .iter_mut()
            .find(|s| s.student_id == student_id)
            .map(|student| {
                update.apply_to(student);
                student.clone()
            }))
    }

    async fn delete_by_student_id(&self, student_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.students.len();
        tables.students.retain(|s| s.student_id != student_id);
        Ok(tables.students.len() < before)
    }

    async fn list_all(&self) -> Result<Vec<Student>, StoreError> {
        Ok(self.tables.lock().await.students.clone())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.tables.lock().await.students.len() as i64)
    }

    async fn count_by_department(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        let tables = self.tables.lock().await;
        let mut departments = BTreeMap::new();
        for student in &tables.students {
            *departments.entry(student.department.clone()).or_insert(0) += 1;
        }
        Ok(departments)
    }
}
