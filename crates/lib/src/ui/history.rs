//! Message log persistence for the chat controller.

use crate::ui::ChatMessage;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Where the controller keeps its message log between runs. `save` always writes the full log.
pub trait HistoryStore {
    fn load(&self) -> Vec<ChatMessage>;
    fn save(&self, messages: &[ChatMessage]) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// JSON file holding the whole log.
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HistoryStore for FileHistoryStore {
    /// Missing or unreadable file => empty log.
    fn load(&self) -> Vec<ChatMessage> {
        let s = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(_) => return Vec::new(),
        };
        serde_json::from_str(&s).unwrap_or_else(|e| {
            log::warn!("ignoring unreadable chat history {}: {}", self.path.display(), e);
            Vec::new()
        })
    }

    fn save(&self, messages: &[ChatMessage]) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating history directory {}", dir.display()))?;
        }
        let s = serde_json::to_string_pretty(messages)?;
        std::fs::write(&self.path, s)
            .with_context(|| format!("writing chat history to {}", self.path.display()))
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("removing chat history {}", self.path.display())),
        }
    }
}

/// Process-local log; nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemoryHistoryStore {
    inner: Arc<Mutex<Vec<ChatMessage>>>,
}

impl MemoryHistoryStore {
    pub fn with_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(messages)),
        }
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self) -> Vec<ChatMessage> {
        self.snapshot()
    }

    fn save(&self, messages: &[ChatMessage]) -> Result<()> {
        let mut g = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("history lock poisoned"))?;
        *g = messages.to_vec();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.save(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("chat-relay-history-{}", uuid::Uuid::new_v4()))
            .join("history.json")
    }

    #[test]
    fn file_store_round_trip_and_clear() {
        let path = temp_path();
        let store = FileHistoryStore::new(&path);
        assert!(store.load().is_empty());

        let log = vec![
            ChatMessage::user("Hello"),
            ChatMessage::assistant("Hi!", vec!["doc1".to_string()]),
        ];
        store.save(&log).unwrap();
        assert_eq!(store.load(), log);

        store.clear().unwrap();
        assert!(!path.exists());
        store.clear().unwrap();
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();
        assert!(FileHistoryStore::new(&path).load().is_empty());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
