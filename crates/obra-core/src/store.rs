//! Transcript persistence.
//!
//! The transcript is stored as one opaque string under a well-known key, scoped
//! to an origin, the same way a browser's local storage would hold it. The string
//! is a versioned JSON envelope so an incompatible value can be detected and
//! discarded instead of rendered.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::transcript::{Block, Transcript};

pub const ENVELOPE_VERSION: u32 = 1;

/// Origin-scoped string key-value storage.
pub trait KeyValue: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Key-value storage in a SQLite table, partitioned by origin.
pub struct SqliteStorage {
    conn: Connection,
    origin: String,
}

impl SqliteStorage {
    pub fn open(path: &Path, origin: &str) -> Result<Self> {
        // Create data directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening transcript database {}", path.display()))?;
        Self::with_connection(conn, origin)
    }

    pub fn open_in_memory(origin: &str) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, origin)
    }

    fn with_connection(conn: Connection, origin: &str) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                origin TEXT NOT NULL,
                key    TEXT NOT NULL,
                value  TEXT NOT NULL,
                PRIMARY KEY (origin, key)
            );",
        )?;
        Ok(Self {
            conn,
            origin: origin.to_string(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl KeyValue for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv WHERE origin = ?1 AND key = ?2",
                params![self.origin, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (origin, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(origin, key) DO UPDATE SET value = excluded.value",
            params![self.origin, key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM kv WHERE origin = ?1 AND key = ?2",
            params![self.origin, key],
        )?;
        Ok(())
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    blocks: &'a [Block],
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    blocks: Vec<Block>,
}

/// Persists a whole transcript under one key. Every write replaces the previous
/// value; there is no diffing and no size limit.
pub struct TranscriptStore {
    storage: Box<dyn KeyValue>,
    key: String,
}

impl TranscriptStore {
    pub fn new(storage: impl KeyValue + 'static, key: &str) -> Self {
        Self {
            storage: Box::new(storage),
            key: key.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn persist(&self, transcript: &Transcript) -> Result<()> {
        let value = encode(transcript)?;
        self.storage.set(&self.key, &value)?;
        debug!(key = %self.key, blocks = transcript.len(), "persisted transcript");
        Ok(())
    }

    /// Stored transcript, or `None` when nothing usable is stored.
    ///
    /// A value that cannot be decoded or carries another envelope version is
    /// logged and reported as absent.
    pub fn load(&self) -> Result<Option<Transcript>> {
        let Some(value) = self.storage.get(&self.key)? else {
            return Ok(None);
        };

        match decode(&value) {
            Ok(transcript) => Ok(Some(transcript)),
            Err(e) => {
                warn!(key = %self.key, "discarding stored transcript: {e:#}");
                Ok(None)
            }
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.storage.remove(&self.key)
    }

    /// The raw stored string, envelope included.
    pub fn raw(&self) -> Result<Option<String>> {
        self.storage.get(&self.key)
    }
}

pub fn encode(transcript: &Transcript) -> Result<String> {
    let envelope = EnvelopeRef {
        version: ENVELOPE_VERSION,
        blocks: transcript.blocks(),
    };
    Ok(serde_json::to_string(&envelope)?)
}

pub fn decode(value: &str) -> Result<Transcript> {
    let envelope: Envelope =
        serde_json::from_str(value).context("stored transcript is not a valid envelope")?;
    if envelope.version != ENVELOPE_VERSION {
        anyhow::bail!(
            "unsupported transcript version {} (expected {})",
            envelope.version,
            ENVELOPE_VERSION
        );
    }
    Ok(Transcript::from_blocks(envelope.blocks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{ChartAttachment, Message, Role};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_transcript() -> Transcript {
        Transcript::from_blocks(vec![
            Block::Welcome {
                text: "Hello".to_string(),
            },
            Block::Message(Message {
                role: Role::Assistant,
                content: "Framing 42% complete".to_string(),
                rendered_markup: crate::transform::render("Framing 42% complete"),
                timestamp: "02:10 PM".to_string(),
            }),
            Block::Chart(ChartAttachment {
                url: "https://x/y.png".to_string(),
            }),
        ])
    }

    fn memory_store() -> TranscriptStore {
        TranscriptStore::new(
            SqliteStorage::open_in_memory("http://localhost:8000").unwrap(),
            "obra.transcript",
        )
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let store = memory_store();
        let transcript = sample_transcript();
        store.persist(&transcript).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, transcript);
        assert_eq!(loaded.markup(), transcript.markup());
        assert_eq!(loaded.markup().matches("progress-bar").count(), 1);
    }

    #[test]
    fn test_persist_overwrites() {
        let store = memory_store();
        store.persist(&sample_transcript()).unwrap();
        let smaller = Transcript::from_blocks(vec![Block::Welcome {
            text: "only".to_string(),
        }]);
        store.persist(&smaller).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), smaller);
    }

    #[test]
    fn test_missing_value_is_absent() {
        assert!(memory_store().load().unwrap().is_none());
    }

    #[test]
    fn test_clear_removes_value() {
        let store = memory_store();
        store.persist(&sample_transcript()).unwrap();
        store.clear().unwrap();
        assert!(store.raw().unwrap().is_none());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_unknown_version_is_discarded() {
        let store = memory_store();
        store
            .storage
            .set("obra.transcript", r#"{"version":99,"blocks":[]}"#)
            .unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_legacy_markup_blob_is_discarded() {
        let store = memory_store();
        store
            .storage
            .set("obra.transcript", "<div class=\"message user-message\">hi</div>")
            .unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_origins_are_isolated_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("transcript.db");

        let a = TranscriptStore::new(
            SqliteStorage::open(&path, "http://a:8000").unwrap(),
            "obra.transcript",
        );
        a.persist(&sample_transcript()).unwrap();

        let b = TranscriptStore::new(
            SqliteStorage::open(&path, "http://b:8000").unwrap(),
            "obra.transcript",
        );
        assert!(b.load().unwrap().is_none());

        let a_again = TranscriptStore::new(
            SqliteStorage::open(&path, "http://a:8000").unwrap(),
            "obra.transcript",
        );
        assert_eq!(a_again.load().unwrap().unwrap(), sample_transcript());
    }
}
