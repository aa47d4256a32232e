//! UI-agnostic conversation state.
//!
//! A [`Transcript`] is the ordered list of everything that has been rendered.
//! Each block keeps the markup it was rendered with, so restoring a transcript
//! never runs the content transform again.

use serde::{Deserialize, Serialize};

use crate::markup;

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A chat message as appended. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Raw text as typed or as received from the endpoint.
    pub content: String,
    /// Safe markup for the message body (escaped text or transformer output).
    pub rendered_markup: String,
    /// Local time label, e.g. `03:45 PM`.
    pub timestamp: String,
}

impl Message {
    pub fn markup(&self) -> String {
        markup::message_block(self.role, &self.rendered_markup, &self.timestamp)
    }
}

/// Chart image shown after the assistant message it came with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartAttachment {
    pub url: String,
}

impl ChartAttachment {
    /// Media type and decoded size of an inline `data:` chart. `None` for linked
    /// images.
    pub fn inline_payload(&self) -> Option<(&str, usize)> {
        let (meta, payload) = self.url.strip_prefix("data:")?.split_once(',')?;
        let media_type = match meta.split(';').next() {
            Some(media_type) if !media_type.is_empty() => media_type,
            _ => "text/plain",
        };
        let bytes = if meta.ends_with(";base64") {
            payload.trim_end_matches('=').len() * 3 / 4
        } else {
            payload.len()
        };
        Some((media_type, bytes))
    }

    pub fn is_inline(&self) -> bool {
        self.inline_payload().is_some()
    }

    /// One-line description for views that cannot draw the image.
    pub fn summary(&self) -> String {
        match self.inline_payload() {
            Some((media_type, bytes)) => format!("Chart ({}, {})", media_type, format_size(bytes)),
            None => format!("Chart: {}", self.url),
        }
    }
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else {
        format!("{} KB", (bytes + 512) / 1024)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Welcome { text: String },
    Suggestions { prompts: Vec<String> },
    Message(Message),
    Chart(ChartAttachment),
}

impl Block {
    pub fn markup(&self) -> String {
        match self {
            Block::Welcome { text } => markup::welcome_block(text),
            Block::Suggestions { prompts } => markup::suggestions_block(prompts),
            Block::Message(message) => message.markup(),
            Block::Chart(chart) => markup::chart_block(&chart.url),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    blocks: Vec<Block>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn last(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Message(message) => Some(message),
            _ => None,
        })
    }

    /// Prompts of the first suggestions block, if the transcript has one.
    pub fn suggestions(&self) -> Option<&[String]> {
        self.blocks.iter().find_map(|block| match block {
            Block::Suggestions { prompts } => Some(prompts.as_slice()),
            _ => None,
        })
    }

    /// The whole transcript as one markup string, in display order.
    pub fn markup(&self) -> String {
        self.blocks.iter().map(Block::markup).collect()
    }
}
