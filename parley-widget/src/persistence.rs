//! Conversation key persistence — the widget's equivalent of the browser's
//! localStorage slot. One key, no expiry.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

pub trait ConversationKeyStore: Send + Sync {
    /// The persisted conversation key, if a previous session saved one.
    fn load(&self) -> Option<String>;

    /// Persist the active conversation key, replacing any previous value.
    fn save(&self, conversation_id: &str) -> io::Result<()>;
}

/// File-backed key store. The file holds the bare key, nothing else.
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConversationKeyStore for FileKeyStore {
    fn load(&self) -> Option<String> {
        let contents = fs::read_to_string(&self.path).ok()?;
        let key = contents.trim();
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }

    fn save(&self, conversation_id: &str) -> io::Result<()> {
        fs::write(&self.path, conversation_id)
    }
}

/// In-memory key store for tests.
#[derive(Default)]
pub struct MemoryKeyStore {
    key: Mutex<Option<String>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(conversation_id: &str) -> Self {
        Self {
            key: Mutex::new(Some(conversation_id.to_string())),
        }
    }
}

impl ConversationKeyStore for MemoryKeyStore {
    fn load(&self) -> Option<String> {
        self.key.lock().expect("key store lock poisoned").clone()
    }

    fn save(&self, conversation_id: &str) -> io::Result<()> {
        *self.key.lock().expect("key store lock poisoned") = Some(conversation_id.to_string());
        Ok(())
    }
}
