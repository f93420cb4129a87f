pub mod app;
pub mod completion;
pub mod config;
pub mod error;
pub mod handler;
pub mod notes;
pub mod session;
pub mod state;
pub mod tui;
pub mod ui;

// Re-export main types for convenience
pub use completion::{CompletionClient, CompletionReply};
pub use config::Config;
pub use error::ChatError;
pub use notes::{format_note_line, FileStore, KeyValueStore, MemoryStore, NoteStore, SavedNote};
pub use session::{CompletionRequest, Session, SessionStatus};
pub use state::{ChatMessage, ChatRole, Persona, ResponseLength, SessionConfig, TranscriptEntry};
