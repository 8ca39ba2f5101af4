//! The per-channel agent and its turn loop.
//!
//! One turn runs:
//!
//! 1. **Record** the user message in memory (before generating)
//! 2. **Generate** from the full history and the fixed system prompt
//! 3. **Parse** the response for a tool directive
//! 4. **If a known tool**: invoke it, then re-query once with the
//!    observation appended; directives in the follow-up are ignored
//! 5. **Commit** the final answer and return it
//!
//! Every model call and tool invocation races the caller's cancellation
//! token. Observation and answer turns are committed only after the calls
//! they depend on return, so a failed or cancelled turn leaves just the
//! user message behind.

use std::future::Future;
use std::sync::Arc;

use parley_core::channel::ChannelId;
use parley_core::error::{Error, Result};
use parley_core::memory::ConversationMemory;
use parley_core::message::Message;
use parley_core::provider::{LanguageModel, ModelSession};
use parley_core::tool::ToolRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::directive::parse_directive;
use crate::prompt::{DEFAULT_TEMPLATE, render_system_prompt};

/// Conversation context bound to one chat channel.
pub struct Agent {
    channel_id: ChannelId,
    memory: ConversationMemory,
    tools: Arc<ToolRegistry>,
    session: ModelSession,
}

impl Agent {
    /// Create an agent with the default prompt template.
    pub fn new(
        channel_id: ChannelId,
        model: Arc<dyn LanguageModel>,
        tools: Arc<ToolRegistry>,
        window_size: usize,
    ) -> Self {
        Self::with_template(channel_id, model, tools, window_size, DEFAULT_TEMPLATE)
    }

    /// Create an agent whose system prompt is rendered from `template`.
    pub fn with_template(
        channel_id: ChannelId,
        model: Arc<dyn LanguageModel>,
        tools: Arc<ToolRegistry>,
        window_size: usize,
        template: &str,
    ) -> Self {
        let mut session = ModelSession::new(model);
        session.set_system_prompt(render_system_prompt(template, &tools));

        debug!(
            channel_id = %channel_id,
            tools = tools.len(),
            window_size,
            "Agent created"
        );

        Self {
            channel_id,
            memory: ConversationMemory::new(window_size),
            tools,
            session,
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn system_prompt(&self) -> &str {
        self.session.system_prompt().unwrap_or_default()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Forget the conversation so far.
    pub fn reset(&mut self) {
        info!(channel_id = %self.channel_id, "Clearing conversation memory");
        self.memory.clear();
    }

    /// Run one turn for `message` and return the final answer.
    ///
    /// The user message stays in memory even if the turn fails. Model
    /// failures and cancellation are returned as errors; tool failures are
    /// not, they become an observation the model answers from.
    ///
    /// A message with no text and no images is not a turn: the model is not
    /// called and the answer is empty.
    pub async fn respond(&mut self, message: Message, cancel: &CancellationToken) -> Result<String> {
        info!(
            channel_id = %self.channel_id,
            author = message.author.as_deref().unwrap_or_default(),
            images = message.image_count(),
            "Processing message"
        );

        // ── Record user turn ──
        if !self.memory.add_message(message) {
            debug!(channel_id = %self.channel_id, "Empty user turn, nothing to answer");
            return Ok(String::new());
        }

        // ── First generation ──
        let history = self.memory.history();
        let response = until_cancelled(cancel, "model call", self.session.generate_with_history(history))
            .await??;
        debug!(channel_id = %self.channel_id, response = %response, "Model raw response");

        let directive = parse_directive(&response).map(|d| (d.tool.to_string(), d.input.to_string()));

        let mut staged = Vec::with_capacity(2);
        let answer = match directive {
            Some((tool_name, input)) if self.tools.get(&tool_name).is_some() => {
                info!(channel_id = %self.channel_id, tool = %tool_name, input = %input, "Tool directive detected");

                // ── Tool dispatch ──
                let outcome = until_cancelled(cancel, "tool call", self.tools.invoke(&tool_name, &input)).await?;
                let observation = match outcome {
                    Ok(result) => {
                        debug!(tool = %tool_name, len = result.len(), "Tool observation");
                        format!("Tool {tool_name} used. Observation: {result}")
                    }
                    Err(e) => {
                        warn!(tool = %tool_name, error = %e, "Tool execution failed");
                        format!("Tool {tool_name} failed: {e}")
                    }
                };
                staged.push(Message::assistant(observation));

                // ── Follow-up generation ──
                let history = self.memory.preview_with(&staged);
                let follow_up = until_cancelled(
                    cancel,
                    "follow-up model call",
                    self.session.generate_with_history(history),
                )
                .await??;
                debug!(channel_id = %self.channel_id, response = %follow_up, "Model raw response after tool use");
                follow_up
            }
            Some((tool_name, _)) => {
                warn!(channel_id = %self.channel_id, tool = %tool_name, "Model asked for an unknown tool");
                response
            }
            None => response,
        };

        // ── Commit ──
        staged.push(Message::assistant(answer.clone()));
        for turn in staged {
            self.memory.add_message(turn);
        }

        info!(channel_id = %self.channel_id, len = answer.len(), "Final answer ready");
        Ok(answer)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("channel_id", &self.channel_id)
            .field("memory_len", &self.memory.len())
            .field("tools", &self.tools)
            .field("session", &self.session)
            .finish()
    }
}

/// Run `fut` unless `cancel` fires first.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    what: &str,
    fut: impl Future<Output = T>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled(format!("{what} aborted"))),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedModel, StubTool};
    use parley_core::error::ProviderError;
    use parley_core::message::Role;
    use parley_core::tool::Tool;
    use std::time::Duration;

    fn agent_with(model: Arc<ScriptedModel>, tools: Vec<Arc<dyn Tool>>) -> Agent {
        Agent::new(
            ChannelId::from("chan-1"),
            model,
            Arc::new(ToolRegistry::from_tools(tools)),
            20,
        )
    }

    fn texts(agent: &Agent) -> Vec<(Role, String)> {
        agent.memory().iter().map(|m| (m.role, m.text())).collect()
    }

    #[tokio::test]
    async fn plain_answer_without_tools() {
        let model = Arc::new(ScriptedModel::texts(&["Hello!"]));
        let mut agent = agent_with(model.clone(), vec![]);

        let answer = agent
            .respond(Message::user("alice", "hi"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(answer, "Hello!");
        assert_eq!(model.call_count(), 1);
        assert_eq!(
            texts(&agent),
            vec![(Role::User, "hi".into()), (Role::Assistant, "Hello!".into())]
        );
    }

    #[tokio::test]
    async fn system_prompt_is_sent_with_every_call() {
        let model = Arc::new(ScriptedModel::texts(&[
            "Action: google_search\nAction Input: rust",
            "Rust is a language.",
        ]));
        let search = Arc::new(StubTool::ok("google_search", "snippet"));
        let mut agent = agent_with(model.clone(), vec![search]);

        agent
            .respond(Message::user("alice", "what is rust?"), &CancellationToken::new())
            .await
            .unwrap();

        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            let prompt = request.system_prompt.as_deref().unwrap();
            assert!(prompt.contains("google_search"));
            assert_eq!(prompt, agent.system_prompt());
        }
    }

    #[tokio::test]
    async fn tool_success_records_observation_and_requeries_once() {
        let model = Arc::new(ScriptedModel::texts(&[
            "Thought: Do I need to use a tool? Yes\nAction: google_search\nAction Input: capital of France",
            "Final Answer: Paris",
        ]));
        let search = Arc::new(StubTool::ok("google_search", "Paris is the capital."));
        let mut agent = agent_with(model.clone(), vec![search.clone()]);

        let answer = agent
            .respond(Message::user("bob", "capital of France?"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(answer, "Final Answer: Paris");
        assert_eq!(search.inputs(), vec!["capital of France"]);
        assert_eq!(model.call_count(), 2);
        assert_eq!(
            texts(&agent),
            vec![
                (Role::User, "capital of France?".into()),
                (
                    Role::Assistant,
                    "Tool google_search used. Observation: Paris is the capital.".into()
                ),
                (Role::Assistant, "Final Answer: Paris".into()),
            ]
        );

        // The follow-up saw the observation as its last turn.
        let follow_up = &model.requests()[1];
        let last = follow_up.messages.last().unwrap();
        assert!(last.text().starts_with("Tool google_search used."));
    }

    #[tokio::test]
    async fn tool_failure_becomes_observation() {
        let model = Arc::new(ScriptedModel::texts(&[
            "Action: url_fetch\nAction Input: https://example.com/missing",
            "Sorry, that page does not exist.",
        ]));
        let fetch = Arc::new(StubTool::failing("url_fetch", "HTTP 404"));
        let mut agent = agent_with(model.clone(), vec![fetch]);

        let answer = agent
            .respond(Message::user("bob", "read this"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(answer, "Sorry, that page does not exist.");
        assert_eq!(model.call_count(), 2);
        assert_eq!(agent.memory().history()[1].text(), "Tool url_fetch failed: HTTP 404");
        assert_eq!(agent.memory().len(), 3);
    }

    #[tokio::test]
    async fn unknown_tool_returns_original_response() {
        let raw = "Action: weather\nAction Input: Paris";
        let model = Arc::new(ScriptedModel::texts(&[raw]));
        let mut agent = agent_with(model.clone(), vec![Arc::new(StubTool::ok("google_search", "x"))]);

        let answer = agent
            .respond(Message::user("bob", "weather?"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(answer, raw);
        assert_eq!(model.call_count(), 1);
        assert_eq!(agent.memory().len(), 2);
    }

    #[tokio::test]
    async fn only_first_directive_is_dispatched() {
        let model = Arc::new(ScriptedModel::texts(&[
            "Action: google_search\nAction Input: one\nAction: url_fetch\nAction Input: https://x.y",
            "done",
        ]));
        let search = Arc::new(StubTool::ok("google_search", "r1"));
        let fetch = Arc::new(StubTool::ok("url_fetch", "r2"));
        let mut agent = agent_with(model.clone(), vec![search.clone(), fetch.clone()]);

        agent
            .respond(Message::user("bob", "go"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(search.inputs(), vec!["one"]);
        assert!(fetch.inputs().is_empty());
        let observations = agent
            .memory()
            .iter()
            .filter(|m| m.text().starts_with("Tool "))
            .count();
        assert_eq!(observations, 1);
    }

    #[tokio::test]
    async fn directive_in_follow_up_is_not_acted_on() {
        let second = "Action: google_search\nAction Input: again";
        let model = Arc::new(ScriptedModel::texts(&[
            "Action: google_search\nAction Input: first",
            second,
        ]));
        let search = Arc::new(StubTool::ok("google_search", "r"));
        let mut agent = agent_with(model.clone(), vec![search.clone()]);

        let answer = agent
            .respond(Message::user("bob", "go"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(answer, second);
        assert_eq!(search.inputs(), vec!["first"]);
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn empty_action_input_reaches_the_tool() {
        let model = Arc::new(ScriptedModel::texts(&[
            "Action: google_search\nAction Input:",
            "What should I search for?",
        ]));
        let search = Arc::new(StubTool::ok("google_search", "Error: No query provided"));
        let mut agent = agent_with(model, vec![search.clone()]);

        agent
            .respond(Message::user("bob", "search"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(search.inputs(), vec![""]);
    }

    #[tokio::test]
    async fn whitespace_answer_is_returned_as_is() {
        let model = Arc::new(ScriptedModel::texts(&["   \n"]));
        let mut agent = agent_with(model, vec![]);

        let answer = agent
            .respond(Message::user("bob", "hm"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(answer, "   \n");
    }

    #[tokio::test]
    async fn model_failure_keeps_only_user_turn() {
        let model = Arc::new(ScriptedModel::new(vec![Err(ProviderError::EmptyResponse(
            "no candidates returned".into(),
        ))]));
        let mut agent = agent_with(model, vec![]);

        let err = agent
            .respond(Message::user("bob", "hello"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provider(ProviderError::EmptyResponse(_))));
        assert_eq!(texts(&agent), vec![(Role::User, "hello".into())]);
    }

    #[tokio::test]
    async fn follow_up_failure_discards_staged_observation() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok("Action: google_search\nAction Input: q".into()),
            Err(ProviderError::Network("connection reset".into())),
        ]));
        let mut agent = agent_with(model, vec![Arc::new(StubTool::ok("google_search", "r"))]);

        let result = agent
            .respond(Message::user("bob", "q?"), &CancellationToken::new())
            .await;

        assert!(result.is_err());
        assert_eq!(agent.memory().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_model_call_leaves_memory_clean() {
        let model = Arc::new(ScriptedModel::texts(&["late"]).with_delay(Duration::from_secs(30)));
        let mut agent = agent_with(model, vec![]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = agent
            .respond(Message::user("bob", "hello"), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(agent.memory().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_tool_call_records_no_observation() {
        let model = Arc::new(ScriptedModel::texts(&["Action: url_fetch\nAction Input: https://slow"]));
        let fetch = Arc::new(StubTool::ok("url_fetch", "body").with_delay(Duration::from_secs(30)));
        let mut agent = agent_with(model.clone(), vec![fetch]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = agent
            .respond(Message::user("bob", "fetch"), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(model.call_count(), 1);
        assert_eq!(texts(&agent), vec![(Role::User, "fetch".into())]);
    }

    #[tokio::test]
    async fn empty_user_turn_skips_the_model() {
        let model = Arc::new(ScriptedModel::texts(&["hello", "unused"]));
        let mut agent = agent_with(model.clone(), vec![]);
        let cancel = CancellationToken::new();

        let answer = agent.respond(Message::user("a", ""), &cancel).await.unwrap();
        assert_eq!(answer, "");
        assert_eq!(model.call_count(), 0);
        assert!(agent.memory().is_empty());

        agent.respond(Message::user("a", "hi"), &cancel).await.unwrap();
        agent.respond(Message::user("a", ""), &cancel).await.unwrap();
        assert_eq!(model.call_count(), 1);
        assert_eq!(
            texts(&agent),
            vec![(Role::User, "hi".into()), (Role::Assistant, "hello".into())]
        );
    }

    #[tokio::test]
    async fn reset_clears_history() {
        let model = Arc::new(ScriptedModel::texts(&["one", "two"]));
        let mut agent = agent_with(model.clone(), vec![]);
        let cancel = CancellationToken::new();

        agent.respond(Message::user("a", "1"), &cancel).await.unwrap();
        agent.reset();
        assert!(agent.memory().is_empty());

        agent.respond(Message::user("a", "2"), &cancel).await.unwrap();
        assert_eq!(model.requests()[1].messages.len(), 1);
        assert_eq!(agent.memory().len(), 2);
    }

    #[tokio::test]
    async fn window_bounds_history_sent_to_model() {
        let model = Arc::new(ScriptedModel::texts(&["a1", "a2", "a3"]));
        let mut agent = Agent::new(
            ChannelId::from("c"),
            model.clone(),
            Arc::new(ToolRegistry::new()),
            3,
        );
        let cancel = CancellationToken::new();

        for text in ["u1", "u2", "u3"] {
            agent.respond(Message::user("a", text), &cancel).await.unwrap();
        }

        // Third call: window holds [a1, u2, a2] + u3 evicts a1 → [u2, a2, u3].
        let sent: Vec<String> = model.requests()[2].messages.iter().map(Message::text).collect();
        assert_eq!(sent, vec!["u2", "a2", "u3"]);
        assert_eq!(agent.memory().len(), 3);
    }
}
