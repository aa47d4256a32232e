use std::io::{self, Stderr};
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyEvent, KeyEventKind, MouseEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use obra_core::{ChatReply, ExchangeError, RequestId};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

pub type Tui = Terminal<CrosstermBackend<Stderr>>;

/// How often the loading ellipsis advances.
pub const TICK_RATE: Duration = Duration::from_millis(300);

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize(u16, u16),
    Tick,
    /// An endpoint exchange finished.
    Reply {
        id: RequestId,
        outcome: Result<ChatReply, ExchangeError>,
    },
}

/// Terminal input the app reacts to. Key releases and repeats, focus changes
/// and pastes are dropped.
pub fn translate(event: Event) -> Option<AppEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => Some(AppEvent::Key(key)),
        Event::Mouse(mouse) => Some(AppEvent::Mouse(mouse)),
        Event::Resize(w, h) => Some(AppEvent::Resize(w, h)),
        _ => None,
    }
}

/// Single queue for terminal input, animation ticks and endpoint replies.
pub struct EventHandler {
    rx: UnboundedReceiver<AppEvent>,
    tx: UnboundedSender<AppEvent>,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(read_terminal(tx.clone()));
        tokio::spawn(tick(tx.clone(), tick_rate));
        Self { rx, tx }
    }

    /// Sender for events produced outside the terminal, such as endpoint replies.
    pub fn sender(&self) -> UnboundedSender<AppEvent> {
        self.tx.clone()
    }

    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }
}

async fn read_terminal(tx: UnboundedSender<AppEvent>) {
    let mut reader = EventStream::new();
    while let Some(event) = reader.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!("terminal read failed: {e}");
                continue;
            }
        };
        if let Some(event) = translate(event) {
            if tx.send(event).is_err() {
                break;
            }
        }
    }
}

async fn tick(tx: UnboundedSender<AppEvent>, rate: Duration) {
    let mut interval = tokio::time::interval(rate);
    loop {
        interval.tick().await;
        if tx.send(AppEvent::Tick).is_err() {
            break;
        }
    }
}

pub fn init() -> Result<Tui> {
    enable_raw_mode()?;
    execute!(io::stderr(), EnterAlternateScreen, EnableMouseCapture)?;
    Ok(Terminal::new(CrosstermBackend::new(io::stderr()))?)
}

pub fn restore() -> Result<()> {
    execute!(io::stderr(), DisableMouseCapture, LeaveAlternateScreen)?;
    disable_raw_mode()?;
    Ok(())
}

/// Put the terminal back before the panic message prints.
pub fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = restore();
        original_hook(panic_info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEventState, KeyModifiers};

    #[test]
    fn test_translate_keeps_key_presses_only() {
        let press = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        assert!(matches!(translate(Event::Key(press)), Some(AppEvent::Key(k)) if k == press));

        let release = KeyEvent {
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
            ..press
        };
        assert!(translate(Event::Key(release)).is_none());
    }

    #[test]
    fn test_translate_resize_and_drops_focus() {
        assert!(matches!(
            translate(Event::Resize(80, 24)),
            Some(AppEvent::Resize(80, 24))
        ));
        assert!(translate(Event::FocusGained).is_none());
    }
}
