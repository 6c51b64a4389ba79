//! Conversation session management.
//!
//! A [`ConversationManager`] owns the transcript, the remote session id and the
//! vocabulary gathered during one conversation, and is the only thing that
//! talks to the tutoring service on that conversation's behalf.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::session::{ChatRequest, Message, Vocabulary, VocabularyItem};
use crate::settings::{DEFAULT_LANGUAGE, DEFAULT_USER_ID, EffectiveSettings};
use crate::tutor::{TutorError, TutorService};

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("a message is already being sent")]
    Busy,
    #[error(transparent)]
    Service(#[from] TutorError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationOptions {
    pub language: String,
    pub user_id: Option<String>,
    pub include_audio: bool,
}

impl Default for ConversationOptions {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.into(),
            user_id: Some(DEFAULT_USER_ID.into()),
            include_audio: false,
        }
    }
}

impl From<&EffectiveSettings> for ConversationOptions {
    fn from(s: &EffectiveSettings) -> Self {
        Self {
            language: s.language.clone(),
            user_id: Some(s.user_id.clone()),
            include_audio: s.include_audio,
        }
    }
}

/// Point-in-time copy of everything a front end renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationSnapshot {
    pub messages: Vec<Message>,
    pub vocabulary: Vec<VocabularyItem>,
    pub session_id: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct ConversationState {
    messages: Vec<Message>,
    vocabulary: Vocabulary,
    session_id: Option<String>,
    is_loading: bool,
    error: Option<String>,
    // Bumped by `clear`; responses tagged with an older epoch are dropped.
    epoch: u64,
    // A send is outstanding in the current epoch.
    in_flight: bool,
}

/// One outstanding user turn. Dropped unsettled (the send future was
/// cancelled mid-await) it rolls the turn back and frees the send slot.
struct PendingTurn<'a> {
    manager: &'a ConversationManager,
    epoch: u64,
    user_message_id: Uuid,
    settled: bool,
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.manager.lock();
        if state.epoch != self.epoch {
            return;
        }
        state.messages.retain(|m| m.id != self.user_message_id);
        state.is_loading = false;
        state.in_flight = false;
        debug!("send abandoned, user turn rolled back");
    }
}

pub struct ConversationManager {
    service: Arc<dyn TutorService>,
    options: ConversationOptions,
    state: Mutex<ConversationState>,
}

impl ConversationManager {
    pub fn new(service: Arc<dyn TutorService>, options: ConversationOptions) -> Self {
        Self {
            service,
            options,
            state: Mutex::new(ConversationState::default()),
        }
    }

    pub fn options(&self) -> &ConversationOptions {
        &self.options
    }

    fn lock(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends one learner turn.
    ///
    /// Blank input is ignored and yields `Ok(None)`. Otherwise the user message
    /// is appended before the request goes out; on success the assistant reply
    /// is appended and returned, on failure the user message is removed again
    /// and the error is both recorded and returned. Dropping the future before
    /// it resolves removes the user message as well.
    ///
    /// Only one send may be in flight per conversation; an overlapping call
    /// gets [`ConversationError::Busy`] and changes nothing. [`clear`](Self::clear)
    /// frees the slot: the result of a send issued before it is not applied,
    /// so a late reply yields `Ok(None)` and a late failure is returned but
    /// not recorded. A session the service opened for such a reply is ended.
    pub async fn send(&self, content: &str) -> Result<Option<Message>, ConversationError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }

        let (request, mut turn) = {
            let mut state = self.lock();
            if state.in_flight {
                return Err(ConversationError::Busy);
            }
            let user_message = Message::user(content);
            let turn = PendingTurn {
                manager: self,
                epoch: state.epoch,
                user_message_id: user_message.id,
                settled: false,
            };
            state.in_flight = true;
            state.messages.push(user_message);
            state.is_loading = true;
            state.error = None;
            let request = ChatRequest {
                message: content.to_owned(),
                user_id: self.options.user_id.clone(),
                session_id: state.session_id.clone(),
                language: self.options.language.clone(),
                include_audio: self.options.include_audio,
            };
            (request, turn)
        };

        debug!(session_id = ?request.session_id, chars = content.len(), "sending message");
        let result = self.service.exchange(&request).await;

        let mut state = self.lock();
        turn.settled = true;

        if state.epoch != turn.epoch {
            drop(state);
            info!(ok = result.is_ok(), "conversation was cleared while sending, discarding result");
            counter!("lingoka_exchanges_total", "outcome" => "discarded").increment(1);
            return match result {
                Ok(response) => {
                    if let Some(orphan) = response
                        .session_id
                        .filter(|id| request.session_id.as_deref() != Some(id.as_str()))
                    {
                        self.spawn_end_session(orphan);
                    }
                    Ok(None)
                }
                Err(err) => Err(err.into()),
            };
        }

        state.in_flight = false;
        state.is_loading = false;

        match result {
            Ok(response) => {
                if state.session_id.is_none() {
                    if let Some(id) = response.session_id.clone() {
                        info!(session_id = %id, "session started");
                        state.session_id = Some(id);
                    }
                }
                let reply = Message::assistant(&response);
                state.messages.push(reply.clone());
                let added = state.vocabulary.merge(response.vocabulary);
                debug!(agent = %response.agent_type, new_words = added, "reply received");
                counter!("lingoka_exchanges_total", "outcome" => "ok").increment(1);
                Ok(Some(reply))
            }
            Err(err) => {
                warn!(error = %err, "message exchange failed, rolling back");
                state.messages.retain(|m| m.id != turn.user_message_id);
                state.error = Some(err.to_string());
                counter!("lingoka_exchanges_total", "outcome" => "failed").increment(1);
                Err(err.into())
            }
        }
    }

    /// Resets the conversation. A held session is ended on the service in a
    /// detached task whose handle is returned; failures there are only logged.
    pub fn clear(&self) -> Option<JoinHandle<()>> {
        let session_id = {
            let mut state = self.lock();
            state.messages.clear();
            state.vocabulary.clear();
            state.error = None;
            state.is_loading = false;
            state.in_flight = false;
            state.epoch += 1;
            state.session_id.take()
        }?;
        self.spawn_end_session(session_id)
    }

    fn spawn_end_session(&self, session_id: String) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(session_id = %session_id, "no async runtime, session not ended remotely");
            return None;
        };
        let service = Arc::clone(&self.service);
        Some(runtime.spawn(async move {
            match service.end_session(&session_id).await {
                Ok(()) => debug!(session_id = %session_id, "session ended"),
                Err(err) => {
                    warn!(session_id = %session_id, error = %err, "failed to end session");
                    counter!("lingoka_end_session_failures_total").increment(1);
                }
            }
        }))
    }

    pub fn set_error(&self, error: Option<String>) {
        self.lock().error = error;
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        let state = self.lock();
        ConversationSnapshot {
            messages: state.messages.clone(),
            vocabulary: state.vocabulary.items().to_vec(),
            session_id: state.session_id.clone(),
            is_loading: state.is_loading,
            error: state.error.clone(),
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn vocabulary(&self) -> Vec<VocabularyItem> {
        self.lock().vocabulary.items().to_vec()
    }

    pub fn session_id(&self) -> Option<String> {
        self.lock().session_id.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().is_loading
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }
}
