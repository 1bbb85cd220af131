//! Conversation Memory
//!
//! Append-only record of the turns exchanged in each chat session. The agent
//! only ever appends turns and reads back a bounded window of the most recent
//! ones; storage itself lives behind the [`ConversationStore`] trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::store::StoreError;

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(StoreError::Corrupt(format!("unknown turn role '{}'", other))),
        }
    }
}

/// One persisted message of a session. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: i64,
    pub session_id: String,
    pub role: Role,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Storage for conversation turns.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Appends a turn to the session and returns it as stored.
    async fn append_turn(
        &self,
        session_id: &str,
        role: Role,
        message: &str,
    ) -> Result<Turn, StoreError>;

    /// Returns up to `limit` turns of the session, most recent first.
    async fn recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, StoreError>;
}
