//! Campus Admin Core
//!
//! Domain logic of the campus administration assistant: the student roster
//! tools, conversation memory, the rule-based responder, the remote model
//! client, and the conversation agent that ties them together. Storage and
//! transport live elsewhere and are reached through the traits defined here.

pub mod agent;
pub mod generic_types;
pub mod llm_client;
pub mod memory;
pub mod responder;
pub mod store;
pub mod student;
pub mod tools;

pub use agent::{CampusAdminAgent, END_SENTINEL};
