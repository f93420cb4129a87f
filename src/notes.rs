//! Saved-message store
//!
//! Notes live under a single key of a small key-value store as a JSON array of
//! `{ "time": <RFC 3339>, "message": <text> }` objects.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

use crate::error::{ChatError, Result};

pub const SAVED_MESSAGES_KEY: &str = "savedMessages";

/// Minimal get/set storage capability
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// A bookmarked message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedNote {
    #[serde(rename = "time")]
    pub saved_at: DateTime<Utc>,
    #[serde(rename = "message")]
    pub text: String,
}

pub struct NoteStore<S> {
    store: S,
}

impl<S: KeyValueStore> NoteStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn append_note(&self, text: &str) -> Result<SavedNote> {
        let mut notes = self.list_notes()?;
        let note = SavedNote {
            saved_at: Utc::now(),
            text: text.to_string(),
        };
        notes.push(note.clone());

        let encoded = serde_json::to_string(&notes)
            .map_err(|e| ChatError::StorageWrite(e.to_string()))?;
        self.store.set(SAVED_MESSAGES_KEY, &encoded)?;

        info!(count = notes.len(), "message saved");
        Ok(note)
    }

    pub fn list_notes(&self) -> Result<Vec<SavedNote>> {
        match self.store.get(SAVED_MESSAGES_KEY)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                ChatError::StorageRead(format!("{SAVED_MESSAGES_KEY} is corrupt: {e}"))
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// `"<Month> <Day> : <text>"` using the save date in `tz`
pub fn format_note_line<Tz: TimeZone>(note: &SavedNote, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let local = note.saved_at.with_timezone(tz);
    format!("{} : {}", local.format("%B %-d"), note.text)
}

/// Key-value store backed by one JSON object file
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/companion-chat/storage.json`
    pub fn default_location() -> anyhow::Result<Self> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(Self::new(data_dir.join("companion-chat").join("storage.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| ChatError::StorageRead(format!("{}: {e}", self.path.display())))?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| ChatError::StorageRead(format!("{}: {e}", self.path.display())))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let all = self.read_all()?;
        match all.get(key) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(ChatError::StorageRead(format!(
                "{}: value under {key} is not a string",
                self.path.display()
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let write_err =
            |e: std::io::Error| ChatError::StorageWrite(format!("{}: {e}", self.path.display()));

        let mut all = self.read_all()?;
        all.insert(key.to_string(), Value::String(value.to_string()));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let content = serde_json::to_string_pretty(&all)
            .map_err(|e| ChatError::StorageWrite(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;
        Ok(())
    }
}

/// In-process store, mostly for tests
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| ChatError::StorageRead("memory store lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| ChatError::StorageWrite("memory store lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_then_list_returns_note_last() {
        let notes = NoteStore::new(MemoryStore::default());
        notes.append_note("first").unwrap();
        notes.append_note("Good idea").unwrap();

        let listed = notes.list_notes().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed.last().unwrap().text, "Good idea");
    }

    #[test]
    fn test_duplicates_are_kept() {
        let notes = NoteStore::new(MemoryStore::default());
        notes.append_note("same").unwrap();
        notes.append_note("same").unwrap();
        assert_eq!(notes.list_notes().unwrap().len(), 2);
    }

    #[test]
    fn test_absent_key_lists_empty() {
        let notes = NoteStore::new(MemoryStore::default());
        assert!(notes.list_notes().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_value_fails_and_is_not_overwritten() {
        let store = MemoryStore::default();
        store.set(SAVED_MESSAGES_KEY, "{not json").unwrap();
        let notes = NoteStore::new(store);

        assert!(matches!(notes.list_notes(), Err(ChatError::StorageRead(_))));
        assert!(notes.append_note("lost?").is_err());
        assert_eq!(
            notes.store.get(SAVED_MESSAGES_KEY).unwrap().as_deref(),
            Some("{not json")
        );
    }

    #[test]
    fn test_stored_format_uses_time_and_message() {
        let store = MemoryStore::default();
        let notes = NoteStore::new(store);
        notes.append_note("hi").unwrap();

        let raw = notes.store.get(SAVED_MESSAGES_KEY).unwrap().unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        let entry = &value.as_array().unwrap()[0];
        assert_eq!(entry["message"], "hi");
        assert!(DateTime::parse_from_rfc3339(entry["time"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_reads_javascript_iso_timestamps() {
        let store = MemoryStore::default();
        store
            .set(
                SAVED_MESSAGES_KEY,
                r#"[{"time":"2024-03-04T10:15:30.123Z","message":"Good idea"}]"#,
            )
            .unwrap();
        let notes = NoteStore::new(store).list_notes().unwrap();
        assert_eq!(notes[0].text, "Good idea");
        assert_eq!(format_note_line(&notes[0], &Utc), "March 4 : Good idea");
    }

    #[test]
    fn test_format_uses_save_date() {
        let note = SavedNote {
            saved_at: Utc.with_ymd_and_hms(2024, 12, 25, 8, 0, 0).unwrap(),
            text: "Good idea".to_string(),
        };
        assert_eq!(format_note_line(&note, &Utc), "December 25 : Good idea");
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        NoteStore::new(FileStore::new(&path)).append_note("keep me").unwrap();
        let reopened = NoteStore::new(FileStore::new(&path));
        let listed = reopened.list_notes().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].text, "keep me");
    }

    #[test]
    fn test_file_store_keeps_other_keys() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("storage.json"));
        store.set("other", "value").unwrap();
        store.set(SAVED_MESSAGES_KEY, "[]").unwrap();
        assert_eq!(store.get("other").unwrap().as_deref(), Some("value"));
    }

    #[test]
    fn test_file_store_corrupt_file_is_read_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "garbage").unwrap();
        let store = FileStore::new(&path);
        assert!(matches!(store.get(SAVED_MESSAGES_KEY), Err(ChatError::StorageRead(_))));
    }

    #[test]
    fn test_file_store_non_string_value_is_kept_intact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let original =
            r#"{"savedMessages":[{"time":"2024-03-04T10:15:30Z","message":"precious"}]}"#;
        fs::write(&path, original).unwrap();

        let notes = NoteStore::new(FileStore::new(&path));
        assert!(matches!(notes.list_notes(), Err(ChatError::StorageRead(_))));
        assert!(notes.append_note("new").is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }
}
