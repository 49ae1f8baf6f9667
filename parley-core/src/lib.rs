pub mod config;
pub mod error;
pub mod models;
pub mod store;

pub use config::ParleyConfig;
pub use error::ParleyError;
pub use models::{ChatMessage, ConversationRecord, ConversationStatus, Sender, StoredMessage};
pub use store::{ConversationStore, MemoryStore, RestStore};
