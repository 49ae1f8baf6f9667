pub mod conversation;
pub mod message;

pub use conversation::{ConversationRecord, ConversationStatus};
pub use message::{now_millis, sort_for_render, ChatMessage, Sender, StoredMessage};
