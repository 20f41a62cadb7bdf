pub mod conversation;
pub mod store;

pub use conversation::{ConversationWindow, Role, Turn};
pub use store::{MemoryStore, MessageRecord, RecordKind};
