//! Request lifecycle: user message, loading marker, endpoint exchange, outcome.
//!
//! The controller is driven from a single owner (the UI loop). `submit` does all
//! synchronous work and hands back a [`Submission`] for the caller to dispatch;
//! the caller feeds the outcome back through [`Controller::complete`]. Only the
//! most recent submission may complete: an older reply that arrives late is
//! discarded so replies always follow the message that asked for them.

use tracing::{debug, error, info};

use crate::bootstrap;
use crate::clock::Clock;
use crate::composer::Composer;
use crate::endpoint::{AssistantEndpoint, ChatReply, ChatRequest};
use crate::error::ExchangeError;
use crate::markup;
use crate::renderer::Renderer;
use crate::store::TranscriptStore;
use crate::transcript::{Role, Transcript};

pub const ERROR_MESSAGE: &str = "Sorry, I couldn't reach the project assistant. Please try again.";
pub const FALLBACK_MESSAGE: &str = "I received a response but couldn't display it.";

pub type RequestId = u64;

/// "Assistant reply in flight". At most one exists at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMarker {
    pub id: RequestId,
}

/// A request ready to be sent to the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: RequestId,
    pub request: ChatRequest,
}

/// What `complete` did with an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The reply (or the fallback message) was rendered.
    Rendered,
    /// The exchange failed; the fixed error message was rendered.
    Failed,
    /// Not the pending request; nothing changed.
    Stale,
}

pub struct Controller {
    renderer: Renderer,
    composer: Composer,
    pending: Option<PendingMarker>,
    next_id: RequestId,
    chat_id: Option<String>,
    confirming_reset: bool,
}

impl Controller {
    pub fn new(renderer: Renderer) -> Self {
        Self {
            renderer,
            composer: Composer::new(),
            pending: None,
            next_id: 1,
            chat_id: None,
            confirming_reset: false,
        }
    }

    /// Restore the stored transcript (or seed a fresh one) and build a controller
    /// around it.
    pub fn start(store: TranscriptStore, clock: Box<dyn Clock>) -> Self {
        let mut renderer = Renderer::new(store, clock, Transcript::new());
        let transcript = bootstrap::restore(renderer.store());
        renderer.replace(transcript);
        Self::new(renderer)
    }

    pub fn transcript(&self) -> &Transcript {
        self.renderer.transcript()
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn pending(&self) -> Option<PendingMarker> {
        self.pending
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn take_scroll_request(&mut self) -> bool {
        self.renderer.take_scroll_request()
    }

    /// Submit whatever is in the composer.
    ///
    /// Blank input is ignored: nothing is rendered and `None` is returned.
    pub fn submit(&mut self) -> Option<Submission> {
        let text = self.composer.text().trim().to_string();
        if text.is_empty() {
            return None;
        }

        self.renderer.append(&text, Role::User);
        self.composer.clear();

        if let Some(previous) = self.pending.take() {
            debug!(id = previous.id, "superseding pending request");
        }
        let id = self.next_id;
        self.next_id += 1;
        self.pending = Some(PendingMarker { id });
        debug!(id, "request pending");

        Some(Submission {
            id,
            request: ChatRequest {
                message: text,
                chat_id: self.chat_id.clone(),
            },
        })
    }

    /// Put `text` in the composer and submit it, exactly as if it were typed.
    pub fn submit_text(&mut self, text: &str) -> Option<Submission> {
        self.composer.set(text);
        self.submit()
    }

    /// Activate a suggested prompt from the transcript's suggestions block.
    pub fn ask_suggestion(&mut self, index: usize) -> Option<Submission> {
        let prompt = self.transcript().suggestions()?.get(index)?.clone();
        self.submit_text(&prompt)
    }

    /// Render the outcome of request `id`.
    pub fn complete(
        &mut self,
        id: RequestId,
        outcome: Result<ChatReply, ExchangeError>,
    ) -> Completion {
        match self.pending {
            Some(marker) if marker.id == id => {}
            _ => {
                debug!(id, "discarding reply for a request that is no longer pending");
                return Completion::Stale;
            }
        }
        // The marker goes before anything terminal is rendered.
        self.pending = None;

        match outcome {
            Err(e) => {
                error!(id, "assistant exchange failed: {e}");
                self.renderer.append(ERROR_MESSAGE, Role::Assistant);
                Completion::Failed
            }
            Ok(reply) => {
                if let Some(chat_id) = reply.chat_id.filter(|c| !c.is_empty()) {
                    self.chat_id = Some(chat_id);
                }

                match reply.message.filter(|m| !m.is_empty()) {
                    Some(message) => self.renderer.append(&message, Role::Assistant),
                    None => {
                        info!(id, "reply carried no message");
                        self.renderer.append(FALLBACK_MESSAGE, Role::Assistant);
                    }
                }

                if let Some(chart) = reply.chart.filter(|c| !c.is_empty()) {
                    self.renderer.append_chart(&chart);
                }
                Completion::Rendered
            }
        }
    }

    /// Submit, await the endpoint, and complete in one go.
    pub async fn exchange<E>(&mut self, endpoint: &E, text: &str) -> Option<Completion>
    where
        E: AssistantEndpoint + ?Sized,
    {
        let submission = self.submit_text(text)?;
        let outcome = endpoint.send(&submission.request).await;
        Some(self.complete(submission.id, outcome))
    }

    /// Ask for confirmation before clearing the conversation.
    pub fn request_reset(&mut self) {
        self.confirming_reset = true;
    }

    pub fn confirming_reset(&self) -> bool {
        self.confirming_reset
    }

    /// Answer the confirmation prompt. Returns whether the transcript was reset.
    pub fn confirm_reset(&mut self, confirmed: bool) -> bool {
        if !std::mem::take(&mut self.confirming_reset) || !confirmed {
            return false;
        }
        self.reset();
        true
    }

    /// Clear the stored transcript and go back to the seeded content.
    fn reset(&mut self) {
        if let Err(e) = self.renderer.store().clear() {
            error!("failed to clear stored transcript: {e:#}");
        }
        if let Some(marker) = self.pending.take() {
            debug!(id = marker.id, "dropping pending request on reset");
        }
        self.chat_id = None;
        self.renderer.replace(bootstrap::seed());
        info!("transcript reset");
    }

    /// Transcript markup plus the loading marker, as the live view shows it.
    pub fn view_markup(&self) -> String {
        let mut out = self.transcript().markup();
        if let Some(marker) = self.pending {
            out.push_str(&markup::loading_block(marker.id));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::SqliteStorage;
    use crate::transcript::Block;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn store() -> TranscriptStore {
        TranscriptStore::new(
            SqliteStorage::open_in_memory("http://localhost:8000").unwrap(),
            "obra.transcript",
        )
    }

    fn controller() -> Controller {
        Controller::start(store(), Box::new(FixedClock::new("11:05 AM")))
    }

    fn reply(message: &str) -> ChatReply {
        ChatReply {
            message: Some(message.to_string()),
            ..Default::default()
        }
    }

    fn message_at(controller: &Controller, index_from_end: usize) -> &crate::transcript::Message {
        let blocks = controller.transcript().blocks();
        match &blocks[blocks.len() - 1 - index_from_end] {
            Block::Message(message) => message,
            other => panic!("expected message, got {other:?}"),
        }
    }

    /// Records every request and answers from a script.
    struct ScriptedEndpoint {
        replies: Mutex<Vec<Result<ChatReply, ExchangeError>>>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedEndpoint {
        fn new(replies: Vec<Result<ChatReply, ExchangeError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AssistantEndpoint for ScriptedEndpoint {
        async fn send(&self, request: &ChatRequest) -> Result<ChatReply, ExchangeError> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies.lock().unwrap().remove(0)
        }
    }

    #[test]
    fn test_submit_renders_user_message_before_dispatch() {
        let mut controller = controller();
        controller.composer_mut().set("  Show me all active projects  ");
        let before = controller.transcript().len();

        let submission = controller.submit().unwrap();

        assert_eq!(controller.transcript().len(), before + 1);
        let message = message_at(&controller, 0);
        assert_eq!(message.role, Role::User);
        assert_eq!(message.content, "Show me all active projects");
        assert_eq!(message.timestamp, "11:05 AM");
        assert_eq!(
            serde_json::to_value(&submission.request).unwrap(),
            serde_json::json!({"message": "Show me all active projects"})
        );
        assert!(controller.composer().text().is_empty());
        assert_eq!(controller.pending(), Some(PendingMarker { id: submission.id }));
    }

    #[test]
    fn test_blank_submission_is_ignored() {
        let mut controller = controller();
        let before = controller.transcript().clone();

        for blank in ["", "   ", "\n\t "] {
            assert!(controller.submit_text(blank).is_none());
        }

        assert_eq!(*controller.transcript(), before);
        assert_eq!(controller.pending(), None);
        assert!(controller.renderer().store().raw().unwrap().is_none());
    }

    #[test]
    fn test_marker_added_once_and_removed_before_reply() {
        let mut controller = controller();
        let submission = controller.submit_text("status?").unwrap();
        assert!(controller.view_markup().contains("typing-indicator"));

        let result = controller.complete(submission.id, Ok(reply("Progress: 42% complete")));

        assert_eq!(result, Completion::Rendered);
        assert_eq!(controller.pending(), None);
        assert!(!controller.view_markup().contains("typing-indicator"));
        let message = message_at(&controller, 0);
        assert_eq!(message.role, Role::Assistant);
        assert!(message.content.contains("Progress: 42% complete"));
        assert!(message.rendered_markup.contains("style=\"width: 42%\""));

        // A second completion for the same id has nothing to remove.
        assert_eq!(
            controller.complete(submission.id, Ok(reply("again"))),
            Completion::Stale
        );
    }

    #[test]
    fn test_failure_renders_fixed_error_without_chart() {
        let mut controller = controller();
        let submission = controller.submit_text("budget").unwrap();
        let len = controller.transcript().len();

        let result = controller.complete(
            submission.id,
            Err(ExchangeError::Status {
                status: 500,
                detail: None,
            }),
        );

        assert_eq!(result, Completion::Failed);
        assert_eq!(controller.transcript().len(), len + 1);
        assert_eq!(message_at(&controller, 0).content, ERROR_MESSAGE);
        assert_eq!(controller.pending(), None);
        assert!(!controller
            .transcript()
            .blocks()
            .iter()
            .any(|b| matches!(b, Block::Chart(_))));
    }

    #[test]
    fn test_missing_message_renders_fallback() {
        let mut controller = controller();
        let submission = controller.submit_text("hello").unwrap();
        controller.complete(submission.id, Ok(ChatReply::default()));
        assert_eq!(message_at(&controller, 0).content, FALLBACK_MESSAGE);

        let submission = controller.submit_text("hello again").unwrap();
        controller.complete(submission.id, Ok(reply("")));
        assert_eq!(message_at(&controller, 0).content, FALLBACK_MESSAGE);
    }

    #[test]
    fn test_chart_follows_assistant_message() {
        let mut controller = controller();
        let submission = controller.submit_text("chart").unwrap();
        controller.complete(
            submission.id,
            Ok(ChatReply {
                message: Some("Done".to_string()),
                chart: Some("https://x/y.png".to_string()),
                chat_id: None,
            }),
        );

        let blocks = controller.transcript().blocks();
        assert_eq!(
            blocks.last(),
            Some(&Block::Chart(crate::transcript::ChartAttachment {
                url: "https://x/y.png".to_string()
            }))
        );
        assert_eq!(message_at(&controller, 1).content, "Done");
        assert!(controller
            .transcript()
            .markup()
            .ends_with("loading=\"lazy\"></div>"));
    }

    #[test]
    fn test_late_reply_from_superseded_request_is_discarded() {
        let mut controller = controller();
        let first = controller.submit_text("first question").unwrap();
        let second = controller.submit_text("second question").unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(controller.pending(), Some(PendingMarker { id: second.id }));
        assert_eq!(controller.view_markup().matches("typing-indicator").count(), 1);

        let len = controller.transcript().len();
        assert_eq!(
            controller.complete(first.id, Ok(reply("answer to first"))),
            Completion::Stale
        );
        assert_eq!(controller.transcript().len(), len);
        assert!(controller.pending().is_some());

        controller.complete(second.id, Ok(reply("answer to second")));
        assert_eq!(message_at(&controller, 0).content, "answer to second");
        assert_eq!(message_at(&controller, 1).content, "second question");
    }

    #[test]
    fn test_chat_id_is_echoed_on_next_request() {
        let mut controller = controller();
        let submission = controller.submit_text("first").unwrap();
        assert_eq!(submission.request.chat_id, None);
        controller.complete(
            submission.id,
            Ok(ChatReply {
                message: Some("ok".to_string()),
                chart: None,
                chat_id: Some("c-42".to_string()),
            }),
        );

        let next = controller.submit_text("second").unwrap();
        assert_eq!(next.request.chat_id.as_deref(), Some("c-42"));
    }

    #[test]
    fn test_ask_suggestion_behaves_like_typing() {
        let mut controller = controller();
        let submission = controller.ask_suggestion(0).unwrap();
        assert_eq!(submission.request.message, bootstrap::SUGGESTED_PROMPTS[0]);
        assert_eq!(message_at(&controller, 0).content, bootstrap::SUGGESTED_PROMPTS[0]);
        assert!(controller.ask_suggestion(4).is_none());
    }

    #[test]
    fn test_restart_restores_transcript() {
        let store_path = tempfile::TempDir::new().unwrap();
        let db = store_path.path().join("t.db");
        let open = || {
            TranscriptStore::new(
                SqliteStorage::open(&db, "http://localhost:8000").unwrap(),
                "obra.transcript",
            )
        };

        let mut first = Controller::start(open(), Box::new(FixedClock::new("09:00 AM")));
        let submission = first.submit_text("Show me all active projects").unwrap();
        first.complete(submission.id, Ok(reply("Alpha is 60% complete")));
        let persisted_view = first.transcript().markup();
        drop(first);

        let mut second = Controller::start(open(), Box::new(FixedClock::new("10:00 AM")));
        assert!(second.take_scroll_request());
        assert_eq!(second.transcript().markup(), persisted_view);
        assert_eq!(second.transcript().markup().matches("progress-bar").count(), 1);
    }

    #[test]
    fn test_reset_requires_confirmation() {
        let mut controller = controller();
        let submission = controller.submit_text("hello").unwrap();
        controller.complete(submission.id, Ok(reply("hi")));

        // No prompt raised: nothing happens.
        assert!(!controller.confirm_reset(true));

        controller.request_reset();
        assert!(controller.confirming_reset());
        assert!(!controller.confirm_reset(false));
        assert!(!controller.confirming_reset());
        assert!(controller.renderer().store().raw().unwrap().is_some());

        controller.request_reset();
        assert!(controller.confirm_reset(true));
        assert_eq!(*controller.transcript(), bootstrap::seed());
        assert!(controller.renderer().store().raw().unwrap().is_none());
        assert_eq!(controller.chat_id(), None);
    }

    #[test]
    fn test_reset_matches_fresh_bootstrap() {
        let fresh = controller();
        let mut used = controller();
        let submission = used.submit_text("hello").unwrap();
        used.complete(submission.id, Ok(reply("hi")));
        used.request_reset();
        used.confirm_reset(true);

        assert_eq!(used.transcript(), fresh.transcript());
        assert_eq!(used.view_markup(), fresh.view_markup());
    }

    #[tokio::test]
    async fn test_exchange_round_trip() {
        let endpoint = ScriptedEndpoint::new(vec![
            Ok(reply("Progress: 42% complete")),
            Err(ExchangeError::Transport("connection refused".to_string())),
        ]);
        let mut controller = controller();

        assert_eq!(
            controller.exchange(&endpoint, "Show me all active projects").await,
            Some(Completion::Rendered)
        );
        assert_eq!(
            controller.exchange(&endpoint, "and the budget?").await,
            Some(Completion::Failed)
        );
        assert_eq!(controller.exchange(&endpoint, "   ").await, None);

        let seen = endpoint.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].message, "Show me all active projects");
        assert_eq!(message_at(&controller, 0).content, ERROR_MESSAGE);
    }
}
