//! Data Access Layer
//!
//! This module implements the record store on top of SQLite. It uses `sqlx`
//! for connection pooling and migrations, and implements the store traits
//! from `campus-core` so the agent and the tools never see SQL.

use anyhow::Result;
use async_trait::async_trait;
use campus_core::{
    memory::{ConversationStore, Role, Turn},
    store::{StoreError, StudentStore},
    student::{NewStudent, Student, StudentUpdate},
};
use chrono::{DateTime, Utc};
use sqlx::{
    FromRow, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{collections::BTreeMap, str::FromStr};
use tracing::debug;

/// A wrapper around the `SqlitePool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `database_url`.
    ///
    /// An in-memory database exists only as long as its connection, so it is
    /// served by a single connection that is never recycled.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };
        debug!(database_url, "Database pool created");
        Ok(Self::new(pool))
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.into())
}

#[derive(FromRow)]
struct StudentRow {
    id: i64,
    student_id: String,
    name: String,
    email: String,
    department: String,
    onboarded_at: DateTime<Utc>,
    active: bool,
}

impl From<StudentRow> for Student {
    fn from(row: StudentRow) -> Self {
        Self {
            id: row.id,
            student_id: row.student_id,
            name: row.name,
            email: row.email,
            department: row.department,
            onboarded_at: row.onboarded_at,
            active: row.active,
        }
    }
}

#[derive(FromRow)]
struct TurnRow {
    id: i64,
    session_id: String,
    role: String,
    message: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TurnRow> for Turn {
    type Error = StoreError;

    fn try_from(row: TurnRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            session_id: row.session_id,
            role: row.role.parse::<Role>()?,
            message: row.message,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl ConversationStore for Db {
    async fn append_turn(
        &self,
        session_id: &str,
        role: Role,
        message: &str,
    ) -> Result<Turn, StoreError> {
        let row = sqlx::query_as::<_, TurnRow>(
            r#"
            INSERT INTO conversation_memory (session_id, role, message, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, session_id, role, message, created_at
            "#,
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(message)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        row.try_into()
    }

    async fn recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, TurnRow>(
            r#"
            SELECT id, session_id, role, message, created_at
            FROM conversation_memory
            WHERE session_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(Turn::try_from).collect()
    }
}

#[async_trait]
impl StudentStore for Db {
    async fn create(&self, new: &NewStudent) -> Result<Student, StoreError> {
        let row = sqlx::query_as::<_, StudentRow>(
            r#"
            INSERT INTO students (student_id, name, email, department, onboarded_at, active)
            VALUES (?, ?, ?, ?, ?, 1)
            RETURNING id, student_id, name, email, department, onboarded_at, active
            "#,
        )
        .bind(&new.student_id)
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.department)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(new.student_id.clone())
            }
            other => backend(other),
        })?;
        Ok(row.into())
    }

    async fn read_by_student_id(&self, student_id: &str) -> Result<Option<Student>, StoreError> {
        let row = sqlx::query_as::<_, StudentRow>(
            r#"
            SELECT id, student_id, name, email, department, onboarded_at, active
            FROM students
            WHERE student_id = ?
            "#,
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(Student::from))
    }

    async fn update_fields(
        &self,
        student_id: &str,
        update: &StudentUpdate,
    ) -> Result<Option<Student>, StoreError> {
        let row = sqlx::query_as::<_, StudentRow>(
            r#"
            UPDATE students
            SET name = COALESCE(?, name),
                email = COALESCE(?, email),
                department = COALESCE(?, department),
                active = COALESCE(?, active)
            WHERE student_id = ?
            RETURNING id, student_id, name, email, department, onboarded_at, active
            "#,
        )
        .bind(update.name.as_deref())
        .bind(update.email.as_deref())
        .bind(update.department.as_deref())
        .bind(update.active)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(Student::from))
    }

    async fn delete_by_student_id(&self, student_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM students WHERE student_id = ?")
            .bind(student_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_all(&self) -> Result<Vec<Student>, StoreError> {
        let rows = sqlx::query_as::<_, StudentRow>(
            r#"
            SELECT id, student_id, name, email, department, onboarded_at, active
            FROM students
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(Student::from).collect())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)
    }

    async fn count_by_department(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT department, COUNT(*) FROM students GROUP BY department",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().collect())
    }
}
