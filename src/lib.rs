//! LingoKa language-practice client.
//!
//! The heart of the crate is [`conversation::ConversationManager`], which keeps
//! one tutoring conversation's transcript, session id and vocabulary in step
//! with the remote tutoring service behind [`tutor::TutorService`].

pub mod catalog;
pub mod conversation;
pub mod profile;
pub mod repl;
pub mod session;
pub mod settings;
pub mod storage;
pub mod tutor;

pub use conversation::{ConversationError, ConversationManager, ConversationOptions, ConversationSnapshot};
pub use session::{ChatRequest, ChatResponse, Message, Role, Vocabulary, VocabularyItem};
pub use tutor::{HttpTutorService, TutorError, TutorService};
