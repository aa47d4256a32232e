use std::sync::Arc;

use obra_core::{AssistantEndpoint, Controller, Submission};
use ratatui::layout::Rect;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    pub controller: Controller,
    pub endpoint: Arc<dyn AssistantEndpoint>,
    pub endpoint_label: String,
    events: UnboundedSender<AppEvent>,

    // Chat view state
    pub chat_scroll: u16,
    pub chat_height: u16, // Inner height of the chat area, for scroll calculations
    pub chat_lines: u16,  // Wrapped line count from the last render
    pub follow_latest: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Panel areas for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
}

impl App {
    pub fn new(
        controller: Controller,
        endpoint: Arc<dyn AssistantEndpoint>,
        endpoint_label: &str,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            controller,
            endpoint,
            endpoint_label: endpoint_label.to_string(),
            events,
            chat_scroll: 0,
            chat_height: 0,
            chat_lines: 0,
            follow_latest: true,
            animation_frame: 0,
            chat_area: None,
        }
    }

    /// Send a submission to the endpoint in the background. The outcome comes
    /// back through the event loop as `AppEvent::Reply`.
    pub fn dispatch(&mut self, submission: Submission) {
        let endpoint = Arc::clone(&self.endpoint);
        let tx = self.events.clone();
        let Submission { id, request } = submission;
        debug!(id, "dispatching request");

        tokio::spawn(async move {
            let outcome = endpoint.send(&request).await;
            // The receiver is gone only when the app is shutting down.
            let _ = tx.send(AppEvent::Reply { id, outcome });
        });
    }

    pub fn submit(&mut self) {
        if let Some(submission) = self.controller.submit() {
            self.dispatch(submission);
        }
    }

    pub fn ask_suggestion(&mut self, index: usize) {
        if let Some(submission) = self.controller.ask_suggestion(index) {
            self.dispatch(submission);
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.controller.pending().is_some() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn max_scroll(&self) -> u16 {
        self.chat_lines.saturating_sub(self.chat_height)
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.max_scroll());
        self.follow_latest = self.chat_scroll >= self.max_scroll();
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_latest = false;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.follow_latest = true;
        self.chat_scroll = self.max_scroll();
    }
}
