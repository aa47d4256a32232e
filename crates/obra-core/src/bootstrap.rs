use tracing::{debug, warn};

use crate::store::TranscriptStore;
use crate::transcript::{Block, Transcript};

pub const WELCOME_MESSAGE: &str = "Hello! I'm your construction project assistant. \
Ask me about project status, phases, budgets, procurement, selections, or walkthroughs.";

pub const SUGGESTED_PROMPTS: [&str; 4] = [
    "Show me all active projects",
    "What phase is each project currently in?",
    "Which projects are over budget?",
    "What walkthroughs are scheduled this week?",
];

/// The fresh transcript: one welcome message and the suggested prompts.
pub fn seed() -> Transcript {
    Transcript::from_blocks(vec![
        Block::Welcome {
            text: WELCOME_MESSAGE.to_string(),
        },
        Block::Suggestions {
            prompts: SUGGESTED_PROMPTS.iter().map(|p| p.to_string()).collect(),
        },
    ])
}

/// Startup: the stored transcript verbatim, or the seed when nothing usable is
/// stored. The seed is not written back.
pub fn restore(store: &TranscriptStore) -> Transcript {
    match store.load() {
        Ok(Some(transcript)) => {
            debug!(blocks = transcript.len(), "restored transcript");
            transcript
        }
        Ok(None) => {
            debug!("no stored transcript, seeding welcome content");
            seed()
        }
        Err(e) => {
            warn!("could not read stored transcript, starting fresh: {e:#}");
            seed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStorage;

    fn store() -> TranscriptStore {
        TranscriptStore::new(
            SqliteStorage::open_in_memory("test").unwrap(),
            "obra.transcript",
        )
    }

    #[test]
    fn test_fresh_storage_seeds_without_persisting() {
        let store = store();
        let transcript = restore(&store);

        assert_eq!(transcript, seed());
        assert_eq!(transcript.suggestions().unwrap().len(), 4);
        assert_eq!(transcript.messages().count(), 0);
        assert!(store.raw().unwrap().is_none());
    }

    #[test]
    fn test_stored_transcript_is_used_verbatim() {
        let store = store();
        let mut stored = seed();
        stored.push(Block::Welcome {
            text: "second greeting".to_string(),
        });
        store.persist(&stored).unwrap();

        assert_eq!(restore(&store), stored);
    }

    #[test]
    fn test_seed_markup_lists_every_prompt() {
        let markup = seed().markup();
        for prompt in SUGGESTED_PROMPTS {
            assert!(markup.contains(&format!("data-prompt=\"{}\"", prompt)));
        }
    }
}
