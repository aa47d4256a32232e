pub mod bootstrap;
pub mod clock;
pub mod composer;
pub mod config;
pub mod controller;
pub mod endpoint;
pub mod error;
pub mod markup;
pub mod renderer;
pub mod store;
pub mod transcript;
pub mod transform;

// Re-export main types for convenience
pub use clock::{Clock, FixedClock, LocalClock};
pub use composer::Composer;
pub use config::Config;
pub use controller::{Completion, Controller, PendingMarker, RequestId, Submission};
pub use endpoint::{AssistantEndpoint, ChatReply, ChatRequest, Health, HttpEndpoint};
pub use error::ExchangeError;
pub use renderer::Renderer;
pub use store::{KeyValue, SqliteStorage, TranscriptStore};
pub use transcript::{Block, ChartAttachment, Message, Role, Transcript};
