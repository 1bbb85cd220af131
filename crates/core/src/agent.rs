//! Campus Admin Conversation Agent
//!
//! Routes each user message either to a remote model or to the rule-based
//! responder, keeps the conversation memory up to date, and offers the reply
//! in one piece or as a stream of chunks ending with [`END_SENTINEL`].
//!
//! Failures never reach the caller. A missing remote model, a failed remote
//! call, and an unavailable memory store all degrade to a reply that is still
//! useful, and every degradation is logged.

use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span, instrument, warn};

use crate::generic_types::ChatMessage;
use crate::llm_client::{LLMClient, LLMError};
use crate::memory::{ConversationStore, Role, Turn};
use crate::responder::RuleBasedResponder;
use crate::tools::ToolRegistry;

/// Last chunk of every reply stream.
pub const END_SENTINEL: &str = "__END__";

pub const SYSTEM_PROMPT: &str = "You are a helpful campus admin assistant. Help with student management, campus information, and analytics.";

/// Number of past turns sent to the remote model as context.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Splits a finished reply into word chunks, each followed by one space,
/// and terminates the sequence with [`END_SENTINEL`].
pub fn word_replay(reply: &str) -> impl Iterator<Item = String> + '_ {
    reply
        .split_whitespace()
        .map(|word| format!("{} ", word))
        .chain(std::iter::once(END_SENTINEL.to_string()))
}

fn log_remote_failure(err: &LLMError) {
    match err {
        LLMError::Provider(e) => {
            warn!(error = %e, "Remote model call failed, falling back to rule-based reply")
        }
        LLMError::EmptyResponse => {
            warn!("Remote model returned no text, falling back to rule-based reply")
        }
    }
}

pub struct CampusAdminAgent {
    responder: RuleBasedResponder,
    memory: Arc<dyn ConversationStore>,
    llm_client: Option<Arc<dyn LLMClient>>,
    history_limit: usize,
}

impl CampusAdminAgent {
    /// Creates an agent. Passing `None` for `llm_client` gives an agent that
    /// answers with rule-based replies only.
    pub fn new(
        tools: ToolRegistry,
        memory: Arc<dyn ConversationStore>,
        llm_client: Option<Arc<dyn LLMClient>>,
    ) -> Self {
        if llm_client.is_none() {
            info!("No remote model configured; replies will be rule-based");
        }
        Self {
            responder: RuleBasedResponder::new(tools),
            memory,
            llm_client,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    pub fn has_remote_model(&self) -> bool {
        self.llm_client.is_some()
    }

    /// Handles one user message and returns the full reply.
    ///
    /// The user turn is persisted first. The remote model is tried when one is
    /// configured; if it is absent or fails, the rule-based responder answers.
    /// Exactly one assistant turn is persisted for the reply.
    #[instrument(name = "handle_message", skip_all, fields(session_id = %session_id))]
    pub async fn handle_message(&self, session_id: &str, user_message: &str) -> String {
        let user_turn = self.save_memory(session_id, Role::User, user_message).await;

        if let Some(client) = self.llm_client.as_deref() {
            match self
                .reply_with_llm(client, session_id, user_message, user_turn.as_ref())
                .await
            {
                Ok(reply) => return reply,
                Err(e) => log_remote_failure(&e),
            }
        }

        self.reply_rule_based(session_id, user_message).await
    }

    /// Computes the whole reply with [`Self::handle_message`], then replays it
    /// word by word followed by [`END_SENTINEL`].
    pub fn stream_handle_message<'a>(
        &'a self,
        session_id: &'a str,
        user_message: &'a str,
    ) -> BoxStream<'a, String> {
        let span = info_span!("stream_handle_message", session_id = %session_id);
        Box::pin(async_stream::stream! {
            let reply = self
                .handle_message(session_id, user_message)
                .instrument(span)
                .await;
            for chunk in word_replay(&reply) {
                yield chunk;
            }
        })
    }

    /// Streams the reply as the remote model produces it.
    ///
    /// Without a remote model this is [`Self::stream_handle_message`]. With
    /// one, each text fragment is forwarded as soon as it arrives and the
    /// accumulated reply is persisted once the provider finishes, before the
    /// sentinel, even when the provider sent no text at all. If the remote
    /// stream fails at any point the partial text is discarded and a
    /// rule-based reply is replayed word by word instead.
    /// Dropping the stream early persists no assistant turn.
    pub fn async_stream_handle_message<'a>(
        &'a self,
        session_id: &'a str,
        user_message: &'a str,
    ) -> BoxStream<'a, String> {
        let Some(client) = self.llm_client.as_deref() else {
            return self.stream_handle_message(session_id, user_message);
        };

        let span = info_span!("async_stream_handle_message", session_id = %session_id);
        Box::pin(async_stream::stream! {
            let user_turn = self
                .save_memory(session_id, Role::User, user_message)
                .instrument(span.clone())
                .await;
            let messages = self
                .build_context(session_id, user_message, user_turn.as_ref())
                .instrument(span.clone())
                .await;

            let failure = match client.stream(messages).instrument(span.clone()).await {
                Ok(mut fragments) => {
                    let mut full_response = String::new();
                    let mut interrupted = None;
                    while let Some(fragment) = fragments.next().instrument(span.clone()).await {
                        match fragment {
                            Ok(text) => {
                                full_response.push_str(&text);
                                yield text;
                            }
                            Err(e) => {
                                interrupted = Some(e);
                                break;
                            }
                        }
                    }
                    match interrupted {
                        Some(e) => e,
                        None => {
                            self.save_memory(session_id, Role::Assistant, &full_response)
                                .instrument(span.clone())
                                .await;
                            yield END_SENTINEL.to_string();
                            return;
                        }
                    }
                }
                Err(e) => e,
            };

            span.in_scope(|| log_remote_failure(&failure));
            let reply = self
                .reply_rule_based(session_id, user_message)
                .instrument(span)
                .await;
            for chunk in word_replay(&reply) {
                yield chunk;
            }
        })
    }

    async fn reply_with_llm(
        &self,
        client: &dyn LLMClient,
        session_id: &str,
        user_message: &str,
        user_turn: Option<&Turn>,
    ) -> Result<String, LLMError> {
        let messages = self
            .build_context(session_id, user_message, user_turn)
            .await;
        let reply = client.complete(messages).await?;
        self.save_memory(session_id, Role::Assistant, &reply).await;
        Ok(reply)
    }

    async fn reply_rule_based(&self, session_id: &str, user_message: &str) -> String {
        let reply = self.responder.respond(user_message).await;
        self.save_memory(session_id, Role::Assistant, &reply).await;
        reply
    }

    /// System prompt, then the recent history oldest first, then the new
    /// message. `current` is the turn already persisted for the new message
    /// and is left out of the history so the message is sent once.
    async fn build_context(
        &self,
        session_id: &str,
        user_message: &str,
        current: Option<&Turn>,
    ) -> Vec<ChatMessage> {
        let history = self.load_memory(session_id, current).await;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend(history.iter().rev().map(ChatMessage::from));
        messages.push(ChatMessage::user(user_message));
        messages
    }

    /// Most recent turns first. A failed read yields an empty history.
    async fn load_memory(&self, session_id: &str, exclude: Option<&Turn>) -> Vec<Turn> {
        let fetch = self.history_limit + usize::from(exclude.is_some());
        match self.memory.recent_turns(session_id, fetch).await {
            Ok(turns) => turns
                .into_iter()
                .filter(|turn| exclude.is_none_or(|excluded| excluded.id != turn.id))
                .take(self.history_limit)
                .collect(),
            Err(e) => {
                error!(session_id, error = %e, "Failed to load conversation memory");
                Vec::new()
            }
        }
    }

    /// A failed write is logged and the turn is simply not remembered.
    async fn save_memory(&self, session_id: &str, role: Role, message: &str) -> Option<Turn> {
        match self.memory.append_turn(session_id, role, message).await {
            Ok(turn) => Some(turn),
            Err(e) => {
                error!(session_id, %role, error = %e, "Failed to save conversation memory");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generic_types::ChatRole;
    use crate::llm_client::{LLMStream, MockLLMClient};
    use crate::memory::MockConversationStore;
    use crate::store::{InMemoryStore, StoreError};
    use crate::student::NewStudent;
    use async_openai::error::OpenAIError;
    use futures::stream;

    fn agent_with(store: &Arc<InMemoryStore>, llm: Option<MockLLMClient>) -> CampusAdminAgent {
        let tools = ToolRegistry::new(store.clone());
        CampusAdminAgent::new(
            tools,
            store.clone(),
            llm.map(|client| Arc::new(client) as Arc<dyn LLMClient>),
        )
    }

    fn fragments(items: Vec<Result<String, LLMError>>) -> LLMStream {
        Box::pin(stream::iter(items))
    }

    fn provider_error() -> LLMError {
        LLMError::Provider(OpenAIError::InvalidArgument(
            "connection reset".to_string(),
        ))
    }

    fn roles(turns: &[Turn]) -> Vec<Role> {
        turns.iter().map(|t| t.role).collect()
    }

    async fn seed_students(store: &Arc<InMemoryStore>) {
        let tools = ToolRegistry::new(store.clone());
        for (student_id, department) in [("S1", "CS"), ("S2", "EE")] {
            tools
                .add_student(NewStudent {
                    name: format!("Student {}", student_id),
                    student_id: student_id.to_string(),
                    email: format!("{}@campus.edu", student_id.to_lowercase()),
                    department: department.to_string(),
                })
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_word_replay_chunks() {
        let reply = "There are 2 students in the system.";
        let chunks: Vec<String> = word_replay(reply).collect();

        assert_eq!(chunks.len(), 8);
        assert_eq!(chunks.last().map(String::as_str), Some(END_SENTINEL));
        assert!(chunks[..7].iter().all(|c| c.ends_with(' ')));
        assert_eq!(chunks[..7].concat().trim(), reply);
    }

    #[test]
    fn test_word_replay_of_empty_reply_is_only_sentinel() {
        let chunks: Vec<String> = word_replay("   ").collect();
        assert_eq!(chunks, vec![END_SENTINEL.to_string()]);
    }

    #[tokio::test]
    async fn test_rule_based_when_no_remote_model() {
        let store = Arc::new(InMemoryStore::new());
        seed_students(&store).await;
        let agent = agent_with(&store, None);
        assert!(!agent.has_remote_model());

        let reply = agent.handle_message("s1", "How many students are there?").await;

        assert_eq!(reply, "There are 2 students in the system.");
        let turns = store.session_turns("s1").await;
        assert_eq!(roles(&turns), vec![Role::User, Role::Assistant]);
        assert_eq!(turns[0].message, "How many students are there?");
        assert_eq!(turns[1].message, reply);
    }

    #[tokio::test]
    async fn test_remote_reply_with_history_context() {
        let store = Arc::new(InMemoryStore::new());
        store.append_turn("s1", Role::User, "first question").await.unwrap();
        store.append_turn("s1", Role::Assistant, "first answer").await.unwrap();
        store.append_turn("other", Role::User, "unrelated").await.unwrap();

        let mut llm = MockLLMClient::new();
        llm.expect_complete()
            .withf(|messages| {
                let expected = [
                    (ChatRole::System, SYSTEM_PROMPT),
                    (ChatRole::User, "first question"),
                    (ChatRole::Assistant, "first answer"),
                    (ChatRole::User, "second question"),
                ];
                messages.len() == expected.len()
                    && messages
                        .iter()
                        .zip(expected)
                        .all(|(m, (role, content))| m.role == role && m.content == content)
            })
            .times(1)
            .returning(|_| Ok("remote answer".to_string()));
        let agent = agent_with(&store, Some(llm));

        let reply = agent.handle_message("s1", "second question").await;

        assert_eq!(reply, "remote answer");
        let turns = store.session_turns("s1").await;
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[2].message, "second question");
        assert_eq!(turns[3].role, Role::Assistant);
        assert_eq!(turns[3].message, "remote answer");
    }

    #[tokio::test]
    async fn test_context_is_bounded_by_history_limit() {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..12 {
            store
                .append_turn("s1", Role::User, &format!("old {}", i))
                .await
                .unwrap();
        }

        let mut llm = MockLLMClient::new();
        llm.expect_complete()
            .withf(|messages| {
                messages.len() == 12
                    && messages[1].content == "old 2"
                    && messages[10].content == "old 11"
                    && messages[11].content == "new"
            })
            .times(1)
            .returning(|_| Ok("ok".to_string()));
        let agent = agent_with(&store, Some(llm));

        assert_eq!(agent.handle_message("s1", "new").await, "ok");
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_silently() {
        let store = Arc::new(InMemoryStore::new());
        let mut llm = MockLLMClient::new();
        llm.expect_complete()
            .times(1)
            .returning(|_| Err(LLMError::EmptyResponse));
        let agent = agent_with(&store, Some(llm));

        let reply = agent.handle_message("s1", "list students").await;

        assert_eq!(reply, "Students:\n");
        let turns = store.session_turns("s1").await;
        assert_eq!(roles(&turns), vec![Role::User, Role::Assistant]);
        assert_eq!(turns[1].message, "Students:\n");
    }

    #[tokio::test]
    async fn test_word_replay_stream_persists_once() {
        let store = Arc::new(InMemoryStore::new());
        let agent = agent_with(&store, None);

        let chunks: Vec<String> = agent
            .stream_handle_message("s1", "add student please")
            .collect()
            .await;

        let reply = "Please use the /students endpoint to add students with JSON data";
        assert_eq!(chunks.len(), reply.split_whitespace().count() + 1);
        assert_eq!(chunks.last().map(String::as_str), Some(END_SENTINEL));
        assert_eq!(chunks[..chunks.len() - 1].concat().trim(), reply);
        assert_eq!(
            roles(&store.session_turns("s1").await),
            vec![Role::User, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn test_async_stream_without_remote_replays_words() {
        let store = Arc::new(InMemoryStore::new());
        let agent = agent_with(&store, None);

        let chunks: Vec<String> = agent
            .async_stream_handle_message("s1", "hi")
            .collect()
            .await;

        assert_eq!(chunks.last().map(String::as_str), Some(END_SENTINEL));
        assert_eq!(chunks[0], "I ");
        assert_eq!(
            roles(&store.session_turns("s1").await),
            vec![Role::User, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn test_async_stream_forwards_fragments_then_persists() {
        let store = Arc::new(InMemoryStore::new());
        let mut llm = MockLLMClient::new();
        llm.expect_stream().times(1).returning(|_| {
            Ok(fragments(vec![
                Ok("Hello".to_string()),
                Ok(", campus".to_string()),
            ]))
        });
        let agent = agent_with(&store, Some(llm));

        let chunks: Vec<String> = agent
            .async_stream_handle_message("s1", "hi")
            .collect()
            .await;

        assert_eq!(chunks, vec!["Hello", ", campus", END_SENTINEL]);
        let turns = store.session_turns("s1").await;
        assert_eq!(roles(&turns), vec![Role::User, Role::Assistant]);
        assert_eq!(turns[1].message, "Hello, campus");
    }

    #[tokio::test]
    async fn test_async_stream_failure_midway_discards_partial_text() {
        let store = Arc::new(InMemoryStore::new());
        let mut llm = MockLLMClient::new();
        llm.expect_stream().times(1).returning(|_| {
            Ok(fragments(vec![
                Ok("partial remote".to_string()),
                Err(provider_error()),
                Ok("never seen".to_string()),
            ]))
        });
        let agent = agent_with(&store, Some(llm));

        let chunks: Vec<String> = agent
            .async_stream_handle_message("s1", "how many students?")
            .collect()
            .await;

        assert_eq!(
            chunks,
            vec![
                "partial remote", "There ", "are ", "0 ", "students ", "in ", "the ",
                "system. ", END_SENTINEL
            ]
        );
        let turns = store.session_turns("s1").await;
        assert_eq!(roles(&turns), vec![Role::User, Role::Assistant]);
        assert_eq!(turns[1].message, "There are 0 students in the system.");
    }

    #[tokio::test]
    async fn test_async_stream_open_failure_falls_back() {
        let store = Arc::new(InMemoryStore::new());
        let mut llm = MockLLMClient::new();
        llm.expect_stream()
            .times(1)
            .returning(|_| Err(provider_error()));
        let agent = agent_with(&store, Some(llm));

        let chunks: Vec<String> = agent
            .async_stream_handle_message("s1", "add student")
            .collect()
            .await;

        assert_eq!(chunks[0], "Please ");
        assert_eq!(chunks.last().map(String::as_str), Some(END_SENTINEL));
        assert_eq!(store.session_turns("s1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_async_stream_empty_remote_reply_is_persisted_as_is() {
        let store = Arc::new(InMemoryStore::new());
        let mut llm = MockLLMClient::new();
        llm.expect_stream()
            .times(1)
            .returning(|_| Ok(fragments(vec![])));
        let agent = agent_with(&store, Some(llm));

        let chunks: Vec<String> = agent
            .async_stream_handle_message("s1", "list students")
            .collect()
            .await;

        assert_eq!(chunks, vec![END_SENTINEL]);
        let turns = store.session_turns("s1").await;
        assert_eq!(roles(&turns), vec![Role::User, Role::Assistant]);
        assert_eq!(turns[1].message, "");
    }

    #[tokio::test]
    async fn test_empty_remote_reply_is_returned_on_both_paths() {
        let store = Arc::new(InMemoryStore::new());
        let mut llm = MockLLMClient::new();
        llm.expect_complete()
            .times(1)
            .returning(|_| Ok(String::new()));
        llm.expect_stream()
            .times(1)
            .returning(|_| Ok(fragments(vec![])));
        let agent = agent_with(&store, Some(llm));

        let reply = agent.handle_message("batch", "list students").await;
        let chunks: Vec<String> = agent
            .async_stream_handle_message("live", "list students")
            .collect()
            .await;

        assert_eq!(reply, "");
        assert_eq!(chunks, vec![END_SENTINEL]);
        for session in ["batch", "live"] {
            let turns = store.session_turns(session).await;
            assert_eq!(roles(&turns), vec![Role::User, Role::Assistant]);
            assert_eq!(turns[1].message, "");
        }
    }

    #[derive(Clone, Default)]
    struct SessionSpans(Arc<std::sync::Mutex<Vec<String>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SessionSpans {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let metadata = attrs.metadata();
            if metadata.fields().field("session_id").is_some() {
                self.0.lock().unwrap().push(metadata.name().to_string());
            }
        }
    }

    #[tokio::test]
    async fn test_stream_entry_points_open_session_spans() {
        use tracing_subscriber::layer::SubscriberExt;

        let spans = SessionSpans::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(spans.clone()));

        let store = Arc::new(InMemoryStore::new());
        let mut llm = MockLLMClient::new();
        llm.expect_stream()
            .times(1)
            .returning(|_| Err(provider_error()));
        let agent = agent_with(&store, Some(llm));
        let _: Vec<String> = agent
            .async_stream_handle_message("s1", "hi")
            .collect()
            .await;

        let replay_only = agent_with(&store, None);
        let _: Vec<String> = replay_only
            .stream_handle_message("s2", "hi")
            .collect()
            .await;

        let names = spans.0.lock().unwrap().clone();
        assert!(names.contains(&"async_stream_handle_message".to_string()));
        assert!(names.contains(&"stream_handle_message".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_stream_persists_no_assistant_turn() {
        let store = Arc::new(InMemoryStore::new());
        let mut llm = MockLLMClient::new();
        llm.expect_stream().times(1).returning(|_| {
            Ok(fragments(vec![
                Ok("one".to_string()),
                Ok("two".to_string()),
            ]))
        });
        let agent = agent_with(&store, Some(llm));

        let first: Vec<String> = agent
            .async_stream_handle_message("s1", "hi")
            .take(1)
            .collect()
            .await;

        assert_eq!(first, vec!["one"]);
        assert_eq!(roles(&store.session_turns("s1").await), vec![Role::User]);
    }

    #[tokio::test]
    async fn test_memory_failures_do_not_fail_the_request() {
        let mut memory = MockConversationStore::new();
        memory
            .expect_append_turn()
            .times(2)
            .returning(|_, _, _| Err(StoreError::Backend(anyhow::anyhow!("disk full"))));
        memory
            .expect_recent_turns()
            .times(1)
            .returning(|_, _| Err(StoreError::Backend(anyhow::anyhow!("locked"))));

        let mut llm = MockLLMClient::new();
        llm.expect_complete()
            .withf(|messages| messages.len() == 2 && messages[1].content == "hello")
            .times(1)
            .returning(|_| Ok("still answered".to_string()));

        let tools = ToolRegistry::new(Arc::new(InMemoryStore::new()));
        let agent = CampusAdminAgent::new(tools, Arc::new(memory), Some(Arc::new(llm)));

        assert_eq!(agent.handle_message("s1", "hello").await, "still answered");
    }
}
