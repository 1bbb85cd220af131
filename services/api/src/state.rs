//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources handed to the HTTP handlers.

use crate::db::Db;
use campus_core::{CampusAdminAgent, llm_client::LLMClient, tools::ToolRegistry};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub tools: ToolRegistry,
    pub agent: Arc<CampusAdminAgent>,
}

impl AppState {
    /// Wires the roster tools and the agent to one database. `llm_client` is
    /// `None` when no remote model is available.
    pub fn new(db: Arc<Db>, llm_client: Option<Arc<dyn LLMClient>>, history_limit: usize) -> Self {
        let tools = ToolRegistry::new(db.clone());
        let agent = CampusAdminAgent::new(tools.clone(), db, llm_client)
            .with_history_limit(history_limit);
        Self {
            tools,
            agent: Arc::new(agent),
        }
    }
}
