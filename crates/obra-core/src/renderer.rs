use tracing::{debug, warn};

use crate::clock::Clock;
use crate::markup;
use crate::store::TranscriptStore;
use crate::transcript::{Block, ChartAttachment, Message, Role, Transcript};
use crate::transform;

/// Appends messages to the live transcript and keeps the stored copy in sync.
///
/// Every append stamps a time label, asks the view to scroll to the latest
/// block, and overwrites the persisted transcript.
pub struct Renderer {
    transcript: Transcript,
    store: TranscriptStore,
    clock: Box<dyn Clock>,
    scroll_requested: bool,
}

impl Renderer {
    pub fn new(store: TranscriptStore, clock: Box<dyn Clock>, transcript: Transcript) -> Self {
        Self {
            transcript,
            store,
            clock,
            scroll_requested: false,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn store(&self) -> &TranscriptStore {
        &self.store
    }

    pub fn append(&mut self, content: &str, role: Role) {
        let rendered_markup = match role {
            Role::User => markup::escape_html(content),
            Role::Assistant => transform::render(content),
        };

        let message = Message {
            role,
            content: content.to_string(),
            rendered_markup,
            timestamp: self.clock.now_label(),
        };
        debug!(?role, chars = content.chars().count(), "appending message");

        self.transcript.push(Block::Message(message));
        self.after_mutation();
    }

    pub fn append_chart(&mut self, url: &str) {
        debug!(url, "appending chart");
        self.transcript.push(Block::Chart(ChartAttachment {
            url: url.to_string(),
        }));
        self.after_mutation();
    }

    /// Swap in a whole transcript (restore or reset). Not persisted: seeded
    /// content is only written once something is appended to it.
    pub fn replace(&mut self, transcript: Transcript) {
        self.transcript = transcript;
        self.scroll_requested = true;
    }

    /// Whether the view should jump to the latest block. Reading clears the flag.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_requested)
    }

    fn after_mutation(&mut self) {
        self.scroll_requested = true;
        if let Err(e) = self.store.persist(&self.transcript) {
            warn!("failed to persist transcript: {e:#}");
        }
    }
}
