//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the session state
//! for one conversation and drives each turn through the completion relay.

use std::time::Instant;

use crate::chat::config::ChatConfig;
use crate::error::{Error, Result};
use crate::observability::{MODEL_SWITCHES, TURN_DURATION, TURNS_COMPLETED, TURNS_FAILED};
use crate::registry::{ModelRegistry, clamp_max_tokens, default_max_tokens};
use crate::relay::{self, CompletionBackend, RelayOutcome};
use crate::render::Renderer;
use crate::state::{SessionState, Transcript};
use crate::turn::{TurnEvent, TurnPhase};
use crate::types::{ChatCompletionRequest, ModelDescriptor};

/// How a call to [`ChatSession::submit`] ended.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// The prompt was blank; nothing was recorded or sent.
    Skipped,
    /// The reply streamed to completion and was appended to the transcript.
    Completed(String),
    /// The stream failed; the prompt stays in the transcript, no reply does.
    Failed(Error),
}

impl TurnOutcome {
    /// The assembled reply, if the turn completed.
    pub fn reply(&self) -> Option<&str> {
        match self {
            TurnOutcome::Completed(reply) => Some(reply),
            _ => None,
        }
    }

    /// True when the turn completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed(_))
    }
}

/// A chat session that manages conversation state and API interactions.
///
/// The session always has a model selected: it starts on the registry's
/// default and only ever switches to models the registry knows.
pub struct ChatSession<B: CompletionBackend> {
    backend: B,
    registry: ModelRegistry,
    state: SessionState,
    requested_max_tokens: u32,
    phase: TurnPhase,
}

impl<B: CompletionBackend> ChatSession<B> {
    /// Creates a session on the registry's default model.
    pub fn new(backend: B, registry: ModelRegistry) -> Self {
        let default = registry.default_model();
        let requested_max_tokens = default_max_tokens(default.token_ceiling);
        let mut state = SessionState::new();
        state.select_model(&default.id);
        Self {
            backend,
            registry,
            state,
            requested_max_tokens,
            phase: TurnPhase::Idle,
        }
    }

    /// Creates a session from resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the configured model is not in the
    /// configured registry.
    pub fn with_config(backend: B, config: &ChatConfig) -> Result<Self> {
        let mut session = Self::new(backend, config.registry.clone());
        if let Some(model) = &config.model {
            session.select_model(model)?;
        }
        if let Some(max_tokens) = config.max_tokens {
            session.set_max_tokens(max_tokens);
        }
        Ok(session)
    }

    /// Switches to the model with the given id.
    ///
    /// Switching to a different model clears the transcript and resets the
    /// token limit to the new model's default.  Returns whether the model
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for ids the registry does not know; the
    /// session is left untouched.
    pub fn select_model(&mut self, id: &str) -> Result<bool> {
        let ceiling = self.registry.lookup(id)?.token_ceiling;
        let changed = self.state.select_model(id);
        if changed {
            MODEL_SWITCHES.click();
            self.requested_max_tokens = default_max_tokens(ceiling);
        }
        Ok(changed)
    }

    /// Returns the selected model.
    pub fn model(&self) -> &ModelDescriptor {
        self.state
            .current_model()
            .and_then(|id| self.registry.lookup(id).ok())
            .unwrap_or_else(|| self.registry.default_model())
    }

    /// Requests a token limit; returns the effective limit.
    pub fn set_max_tokens(&mut self, max_tokens: u32) -> u32 {
        self.requested_max_tokens = max_tokens;
        self.max_tokens()
    }

    /// The effective token limit: the requested limit clamped to the model.
    pub fn max_tokens(&self) -> u32 {
        clamp_max_tokens(self.requested_max_tokens, self.model().token_ceiling)
    }

    /// The models this session can switch between.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The conversation so far.
    pub fn transcript(&self) -> &Transcript {
        self.state.transcript()
    }

    /// Returns the number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        self.state.transcript().len()
    }

    /// Where the session is within the current exchange.
    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// The backend requests are sent to.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The request that would be sent for the current transcript.
    pub fn build_request(&self) -> ChatCompletionRequest {
        ChatCompletionRequest::new_streaming(
            self.model().id.clone(),
            self.state.transcript().messages().to_vec(),
            self.max_tokens(),
        )
    }

    /// Re-renders the transcript in order.
    pub fn render_history(&self, renderer: &mut dyn Renderer) {
        for message in self.state.transcript() {
            renderer.print_message(message);
        }
    }

    /// Sends a user prompt and streams the reply.
    ///
    /// This method:
    /// 1. Appends the prompt to the transcript and echoes it
    /// 2. Sends a streaming request for the whole transcript
    /// 3. Renders fragments as they arrive
    /// 4. Appends the assembled reply, unless the stream failed
    ///
    /// Stream failures are rendered and returned as [`TurnOutcome::Failed`];
    /// they are not errors of this method.
    ///
    /// If a previous call was dropped before it finished, that turn is
    /// counted as failed and its prompt stays in the transcript without a
    /// reply.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the turn state machine rejects a
    /// transition.
    pub async fn submit(
        &mut self,
        prompt: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<TurnOutcome> {
        self.abandon_interrupted_turn();
        if prompt.trim().is_empty() {
            return Ok(TurnOutcome::Skipped);
        }
        let start = Instant::now();
        self.advance(TurnEvent::Ready)?;
        self.state.append_user_message(prompt);
        if let Some(message) = self.state.transcript().last() {
            renderer.print_message(message);
        }

        let request = self.build_request();
        let model = request.model.clone();
        self.advance(TurnEvent::Submitted)?;
        let relayed = match self.backend.stream_completion(request).await {
            Ok(stream) => {
                self.advance(TurnEvent::StreamOpened)?;
                relay::drain(stream, renderer).await
            }
            Err(err) => relay::fail(renderer, err),
        };

        let outcome = match relayed {
            RelayOutcome::Completed(reply) => {
                self.advance(TurnEvent::StreamEnded)?;
                self.backend.reply_completed(&model, &reply);
                self.state.append_assistant_message(reply.clone());
                TURNS_COMPLETED.click();
                TurnOutcome::Completed(reply)
            }
            RelayOutcome::Failed(err) => {
                self.advance(TurnEvent::StreamFailed)?;
                TURNS_FAILED.click();
                TurnOutcome::Failed(err)
            }
        };
        TURN_DURATION.add(start.elapsed().as_secs_f64());
        self.advance(TurnEvent::Reset)?;
        Ok(outcome)
    }

    // A `submit` future dropped mid-turn leaves the phase wherever it was.
    fn abandon_interrupted_turn(&mut self) {
        if !matches!(self.phase, TurnPhase::Idle | TurnPhase::AwaitingUserInput) {
            TURNS_FAILED.click();
            self.phase = TurnPhase::Idle;
        }
    }

    fn advance(&mut self, event: TurnEvent) -> Result<()> {
        self.phase = self.phase.advance(event)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use futures::stream;
    use serde_json::json;

    use super::*;
    use crate::relay::FragmentStream;
    use crate::types::{Message, MessageRole};

    enum Script {
        Fragments(Vec<Result<String>>),
        Refuse(Error),
        Hang,
    }

    #[derive(Default)]
    struct Scripted {
        scripts: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<ChatCompletionRequest>>,
        replies: Mutex<Vec<(String, String)>>,
    }

    impl Scripted {
        fn replying(fragments: &[&str]) -> Self {
            let scripted = Self::default();
            scripted.push_reply(fragments);
            scripted
        }

        fn push_reply(&self, fragments: &[&str]) {
            let fragments = fragments.iter().map(|f| Ok(f.to_string())).collect();
            self.scripts
                .lock()
                .unwrap()
                .push_back(Script::Fragments(fragments));
        }

        fn push(&self, script: Script) {
            self.scripts.lock().unwrap().push_back(script);
        }

        fn requests(&self) -> Vec<ChatCompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl CompletionBackend for Scripted {
        async fn stream_completion(&self, request: ChatCompletionRequest) -> Result<FragmentStream> {
            self.requests.lock().unwrap().push(request);
            match self.scripts.lock().unwrap().pop_front() {
                Some(Script::Fragments(fragments)) => Ok(Box::pin(stream::iter(fragments))),
                Some(Script::Refuse(err)) => Err(err),
                Some(Script::Hang) => Ok(Box::pin(stream::pending::<Result<String>>())),
                None => Err(Error::connection("no scripted reply", None)),
            }
        }

        fn reply_completed(&self, model: &str, reply: &str) {
            self.replies
                .lock()
                .unwrap()
                .push((model.to_string(), reply.to_string()));
        }
    }

    #[derive(Default)]
    struct Capture {
        messages: Vec<(MessageRole, String)>,
        text: String,
        errors: Vec<String>,
    }

    impl Renderer for Capture {
        fn print_message(&mut self, message: &Message) {
            self.messages.push((message.role, message.content.clone()));
        }

        fn print_text(&mut self, text: &str) {
            self.text.push_str(text);
        }

        fn print_error(&mut self, error: &str) {
            self.errors.push(error.to_string());
        }

        fn print_info(&mut self, _: &str) {}

        fn finish_response(&mut self) {}
    }

    fn session(backend: Scripted) -> ChatSession<Scripted> {
        ChatSession::new(backend, ModelRegistry::builtin())
    }

    fn roles(session: &ChatSession<Scripted>) -> Vec<MessageRole> {
        session.transcript().iter().map(|m| m.role).collect()
    }

    #[test]
    fn new_session_uses_default_model() {
        let session = session(Scripted::default());
        assert_eq!(session.model().id, "mixtral-8x7b-32768");
        assert_eq!(session.max_tokens(), 32768);
        assert_eq!(session.message_count(), 0);
        assert_eq!(session.phase(), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn reselecting_current_model_keeps_history() {
        let mut session = session(Scripted::replying(&["hi"]));
        let mut capture = Capture::default();
        session.submit("Say hi", &mut capture).await.unwrap();
        let before = session.transcript().clone();

        assert!(!session.select_model("mixtral-8x7b-32768").unwrap());
        assert_eq!(session.transcript(), &before);
    }

    #[tokio::test]
    async fn switching_model_clears_history() {
        let mut session = session(Scripted::replying(&["hi"]));
        let mut capture = Capture::default();
        session.submit("Say hi", &mut capture).await.unwrap();
        assert_eq!(session.message_count(), 2);

        assert!(session.select_model("gemma-7b-it").unwrap());
        assert!(session.transcript().is_empty());
        assert_eq!(session.model().id, "gemma-7b-it");
    }

    #[test]
    fn unknown_model_is_not_found_and_changes_nothing() {
        let mut session = session(Scripted::default());
        session.set_max_tokens(1024);
        let err = session.select_model("gpt-4").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(session.model().id, "mixtral-8x7b-32768");
        assert_eq!(session.max_tokens(), 1024);
    }

    #[test]
    fn switching_model_resets_token_limit() {
        let mut session = session(Scripted::default());
        session.set_max_tokens(1024);
        session.select_model("llama2-70b-4096").unwrap();
        assert_eq!(session.max_tokens(), 4096);
        session.set_max_tokens(2048);
        session.select_model("llama2-70b-4096").unwrap();
        assert_eq!(session.max_tokens(), 2048);
    }

    #[test]
    fn token_limit_is_clamped_to_model() {
        let mut session = session(Scripted::default());
        session.select_model("llama3-8b-8192").unwrap();
        assert_eq!(session.set_max_tokens(100_000), 8192);
        assert_eq!(session.set_max_tokens(0), 512);
        assert_eq!(session.set_max_tokens(3000), 3072);
        for requested in [1, 511, 513, 4095, 8191, 9000, u32::MAX] {
            let effective = session.set_max_tokens(requested);
            assert!((512..=8192).contains(&effective));
            assert_eq!(effective % 512, 0);
        }
    }

    #[tokio::test]
    async fn completed_turn_appends_assembled_reply() {
        let mut session = session(Scripted::replying(&["Hel", "lo, ", "world"]));
        let mut capture = Capture::default();
        let outcome = session.submit("Greet me", &mut capture).await.unwrap();

        assert_eq!(outcome.reply(), Some("Hello, world"));
        assert_eq!(roles(&session), vec![MessageRole::User, MessageRole::Assistant]);
        assert_eq!(
            session.transcript().last().unwrap().content,
            "Hello, world"
        );
        assert_eq!(capture.text, "Hello, world");
        assert_eq!(
            capture.messages,
            vec![(MessageRole::User, "Greet me".to_string())]
        );
        assert_eq!(session.phase(), TurnPhase::Idle);
        assert_eq!(
            session.backend().replies.lock().unwrap().as_slice(),
            &[("mixtral-8x7b-32768".to_string(), "Hello, world".to_string())]
        );
    }

    #[tokio::test]
    async fn failure_before_any_fragment_keeps_only_prompt() {
        let backend = Scripted::default();
        backend.push(Script::Refuse(Error::rate_limit("slow down", Some(3))));
        let mut session = session(backend);
        let mut capture = Capture::default();
        let outcome = session.submit("Say hi", &mut capture).await.unwrap();

        assert!(matches!(outcome, TurnOutcome::Failed(ref err) if err.is_rate_limit()));
        assert_eq!(roles(&session), vec![MessageRole::User]);
        assert_eq!(capture.errors.len(), 1);
        assert!(capture.errors[0].contains("slow down"));
        assert_eq!(session.phase(), TurnPhase::Idle);
        assert!(session.backend().replies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_mid_stream_discards_partial_reply() {
        let backend = Scripted::default();
        backend.push(Script::Fragments(vec![
            Ok("partial".to_string()),
            Err(Error::streaming("connection reset", None)),
        ]));
        let mut session = session(backend);
        let mut capture = Capture::default();
        let outcome = session.submit("Say hi", &mut capture).await.unwrap();

        assert!(!outcome.is_completed());
        assert_eq!(roles(&session), vec![MessageRole::User]);
        assert_eq!(capture.text, "partial");
        assert_eq!(capture.errors, vec!["Streaming error: connection reset"]);
    }

    #[tokio::test]
    async fn failed_turn_does_not_block_the_next() {
        let backend = Scripted::default();
        backend.push(Script::Refuse(Error::internal_server("boom", None)));
        backend.push_reply(&["ok"]);
        let mut session = session(backend);
        let mut capture = Capture::default();
        session.submit("first", &mut capture).await.unwrap();
        let outcome = session.submit("second", &mut capture).await.unwrap();

        assert_eq!(outcome.reply(), Some("ok"));
        assert_eq!(
            roles(&session),
            vec![MessageRole::User, MessageRole::User, MessageRole::Assistant]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_turn_does_not_block_the_next() {
        let backend = Scripted::default();
        backend.push(Script::Hang);
        backend.push_reply(&["ok"]);
        let mut session = session(backend);
        let mut capture = Capture::default();
        let cancelled = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            session.submit("first", &mut capture),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(session.phase(), TurnPhase::Streaming);

        let outcome = session.submit("second", &mut capture).await.unwrap();
        assert_eq!(outcome.reply(), Some("ok"));
        assert_eq!(session.phase(), TurnPhase::Idle);
        assert_eq!(
            roles(&session),
            vec![MessageRole::User, MessageRole::User, MessageRole::Assistant]
        );
        assert_eq!(session.backend().requests().len(), 2);
    }

    #[tokio::test]
    async fn blank_prompt_is_skipped() {
        let mut session = session(Scripted::default());
        let mut capture = Capture::default();
        let outcome = session.submit("  \n", &mut capture).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Skipped));
        assert!(session.transcript().is_empty());
        assert!(session.backend().requests().is_empty());
        assert!(capture.messages.is_empty());
    }

    #[tokio::test]
    async fn request_carries_transcript_model_and_limit() {
        let mut session = session(Scripted::replying(&["hi"]));
        session.select_model("llama3-8b-8192").unwrap();
        session.set_max_tokens(8192);
        let mut capture = Capture::default();
        session.submit("Say hi", &mut capture).await.unwrap();

        let requests = session.backend().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            serde_json::to_value(&requests[0]).unwrap(),
            json!({
                "model": "llama3-8b-8192",
                "messages": [{"role": "user", "content": "Say hi"}],
                "max_tokens": 8192,
                "stream": true
            })
        );
    }

    #[tokio::test]
    async fn later_requests_include_history() {
        let backend = Scripted::replying(&["one"]);
        backend.push_reply(&["two"]);
        let mut session = session(backend);
        let mut capture = Capture::default();
        session.submit("first", &mut capture).await.unwrap();
        session.submit("second", &mut capture).await.unwrap();

        let requests = session.backend().requests();
        let contents: Vec<&str> = requests[1]
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["first", "one", "second"]);
    }

    #[tokio::test]
    async fn render_history_is_repeatable_and_read_only() {
        let mut session = session(Scripted::replying(&["hi"]));
        let mut capture = Capture::default();
        session.submit("Say hi", &mut capture).await.unwrap();
        let before = session.transcript().clone();

        let mut first = Capture::default();
        let mut second = Capture::default();
        session.render_history(&mut first);
        session.render_history(&mut second);

        assert_eq!(first.messages, second.messages);
        assert_eq!(
            first.messages,
            vec![
                (MessageRole::User, "Say hi".to_string()),
                (MessageRole::Assistant, "hi".to_string()),
            ]
        );
        assert_eq!(session.transcript(), &before);
    }

    #[test]
    fn with_config_applies_model_and_limit() {
        let config = ChatConfig::new()
            .with_model("llama3-70b-8192")
            .with_max_tokens(2000);
        let session = ChatSession::with_config(Scripted::default(), &config).unwrap();
        assert_eq!(session.model().id, "llama3-70b-8192");
        assert_eq!(session.max_tokens(), 2048);
    }

    #[test]
    fn with_config_rejects_unknown_model() {
        let config = ChatConfig::new().with_model("nope");
        let err = ChatSession::with_config(Scripted::default(), &config)
            .err()
            .unwrap();
        assert!(err.is_not_found());
    }
}
