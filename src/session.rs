use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyItem {
    pub word: String,
    #[serde(default)]
    pub translation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronunciation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_of_speech: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl VocabularyItem {
    pub fn new(word: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            translation: translation.into(),
            pronunciation: None,
            part_of_speech: None,
            example: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MessageMetadata {
    pub agent_type: Option<String>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub vocabulary: Vec<VocabularyItem>,
    #[serde(default)]
    pub grammar_notes: Vec<String>,
    pub audio_url: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// One turn of a conversation. Content is fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn assistant(response: &ChatResponse) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: response.message.clone(),
            timestamp: Utc::now(),
            metadata: Some(MessageMetadata {
                agent_type: Some(response.agent_type.clone()),
                confidence: Some(response.confidence),
                vocabulary: response.vocabulary.clone(),
                grammar_notes: response.grammar_notes.clone(),
                audio_url: response.audio_url.clone(),
                suggestions: response.suggestions.clone(),
            }),
        }
    }
}

/// Words surfaced during a conversation, in first-seen order and unique by `word`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    items: Vec<VocabularyItem>,
    seen: HashSet<String>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends items whose word is not yet present and returns how many were added.
    /// Existing entries keep their position and content.
    pub fn merge<I>(&mut self, incoming: I) -> usize
    where
        I: IntoIterator<Item = VocabularyItem>,
    {
        let before = self.items.len();
        for item in incoming {
            if self.seen.insert(item.word.clone()) {
                self.items.push(item);
            }
        }
        self.items.len() - before
    }

    pub fn contains(&self, word: &str) -> bool {
        self.seen.contains(word)
    }

    pub fn items(&self) -> &[VocabularyItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.seen.clear();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub language: String,
    #[serde(default)]
    pub include_audio: bool,
}

fn default_agent_type() -> String {
    "conversation".into()
}

fn default_confidence() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub message: String,
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub vocabulary: Vec<VocabularyItem>,
    #[serde(default)]
    pub grammar_notes: Vec<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ChatResponse {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            agent_type: default_agent_type(),
            session_id: None,
            confidence: default_confidence(),
            vocabulary: Vec::new(),
            grammar_notes: Vec::new(),
            audio_url: None,
            suggestions: Vec::new(),
        }
    }
}

/// Server-side view of a session, as reported by `GET /sessions/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub current_agent: Option<String>,
    #[serde(default)]
    pub message_count: Option<u32>,
    // Service timestamps are not guaranteed to carry an offset, so keep them verbatim.
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}
