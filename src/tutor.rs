use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::catalog::{LearningLevel, Lesson, UserProgress};
use crate::session::{ChatRequest, ChatResponse, HistoryEntry, SessionInfo};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TutorError {
    /// Non-success status. `message` is the service's `detail` when it sent one.
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("request timed out")]
    Timeout,
    #[error("{0} is not supported by this service")]
    Unsupported(&'static str),
}

impl From<reqwest::Error> for TutorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TutorError::Timeout
        } else if err.is_decode() {
            TutorError::Decode(err.to_string())
        } else {
            TutorError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub agents: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub services: serde_json::Map<String, serde_json::Value>,
}

/// The remote tutoring service. Only the exchange and end-session calls are
/// required; the rest default to `Unsupported`.
#[async_trait]
pub trait TutorService: Send + Sync {
    async fn exchange(&self, req: &ChatRequest) -> Result<ChatResponse, TutorError>;

    async fn end_session(&self, session_id: &str) -> Result<(), TutorError>;

    async fn health(&self) -> Result<HealthStatus, TutorError> {
        Err(TutorError::Unsupported("health"))
    }

    async fn session_info(&self, _session_id: &str) -> Result<SessionInfo, TutorError> {
        Err(TutorError::Unsupported("session info"))
    }

    async fn session_history(&self, _session_id: &str) -> Result<Vec<HistoryEntry>, TutorError> {
        Err(TutorError::Unsupported("session history"))
    }

    async fn lessons(&self, _level: Option<LearningLevel>) -> Result<Vec<Lesson>, TutorError> {
        Err(TutorError::Unsupported("lessons"))
    }

    async fn lesson(&self, _id: &str) -> Result<Lesson, TutorError> {
        Err(TutorError::Unsupported("lesson"))
    }

    async fn progress(&self, _user_id: &str) -> Result<UserProgress, TutorError> {
        Err(TutorError::Unsupported("progress"))
    }
}

#[derive(Clone)]
pub struct HttpTutorService {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpTutorService {
    pub fn new(base_url: Url, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self { base_url, client: builder.build()? })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TutorError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TutorError::Network(format!("base url cannot carry a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, TutorError> {
        debug!(%url, "GET");
        let resp = self.client.get(url).send().await?;
        decode(resp).await
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct HistoryBody {
    #[serde(default)]
    messages: Vec<HistoryEntry>,
}

async fn check(resp: Response) -> Result<Response, TutorError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: Option<ErrorBody> = resp.json().await.ok();
    Err(api_error(status, body))
}

fn api_error(status: StatusCode, body: Option<ErrorBody>) -> TutorError {
    let message = body
        .and_then(|b| b.detail)
        .and_then(|d| d.as_str().map(str::to_owned))
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));
    TutorError::Api { status: status.as_u16(), message }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, TutorError> {
    let resp = check(resp).await?;
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| TutorError::Decode(e.to_string()))
}

#[async_trait]
impl TutorService for HttpTutorService {
    async fn exchange(&self, req: &ChatRequest) -> Result<ChatResponse, TutorError> {
        let url = self.endpoint(&["chat"])?;
        debug!(%url, session_id = ?req.session_id, language = %req.language, "POST chat");
        let resp = self.client.post(url).json(req).send().await?;
        decode(resp).await
    }

    async fn end_session(&self, session_id: &str) -> Result<(), TutorError> {
        let url = self.endpoint(&["sessions", session_id])?;
        debug!(%url, "DELETE session");
        let resp = self.client.delete(url).send().await?;
        check(resp).await?;
        Ok(())
    }

    async fn health(&self) -> Result<HealthStatus, TutorError> {
        self.get_json(self.endpoint(&["health"])?).await
    }

    async fn session_info(&self, session_id: &str) -> Result<SessionInfo, TutorError> {
        self.get_json(self.endpoint(&["sessions", session_id])?).await
    }

    async fn session_history(&self, session_id: &str) -> Result<Vec<HistoryEntry>, TutorError> {
        let body: HistoryBody = self.get_json(self.endpoint(&["sessions", session_id, "history"])?).await?;
        Ok(body.messages)
    }

    async fn lessons(&self, level: Option<LearningLevel>) -> Result<Vec<Lesson>, TutorError> {
        let mut url = self.endpoint(&["lessons"])?;
        if let Some(level) = level {
            url.query_pairs_mut().append_pair("level", level.as_str());
        }
        self.get_json(url).await
    }

    async fn lesson(&self, id: &str) -> Result<Lesson, TutorError> {
        self.get_json(self.endpoint(&["lessons", id])?).await
    }

    async fn progress(&self, user_id: &str) -> Result<UserProgress, TutorError> {
        self.get_json(self.endpoint(&["users", user_id, "progress"])?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    async fn spawn(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{}/api", addr)).unwrap()
    }

    fn service(base: Url) -> HttpTutorService {
        HttpTutorService::new(base, Some(Duration::from_secs(5))).unwrap()
    }

    fn request(message: &str, session_id: Option<&str>) -> ChatRequest {
        ChatRequest {
            message: message.into(),
            user_id: Some("demo-user".into()),
            session_id: session_id.map(str::to_owned),
            language: "hiligaynon".into(),
            include_audio: false,
        }
    }

    #[tokio::test]
    async fn exchange_posts_request_and_decodes_reply() {
        let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
        let seen_in = seen.clone();
        let router = Router::new().route(
            "/api/chat",
            post(move |Json(body): Json<Value>| {
                let seen = seen_in.clone();
                async move {
                    seen.lock().unwrap().push(body);
                    Json(json!({
                        "message": "Maayo man!",
                        "agent_type": "conversation",
                        "session_id": "s1",
                        "confidence": 0.8,
                        "routed_to": "conversation",
                        "vocabulary": [{"word": "maayo", "translation": "good"}],
                        "grammar_notes": ["man softens the reply"]
                    }))
                }
            }),
        );
        let svc = service(spawn(router).await);

        let resp = svc.exchange(&request("Kumusta ka?", Some("s1"))).await.unwrap();
        assert_eq!(resp.message, "Maayo man!");
        assert_eq!(resp.session_id.as_deref(), Some("s1"));
        assert_eq!(resp.vocabulary[0].word, "maayo");

        let bodies = seen.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["message"], "Kumusta ka?");
        assert_eq!(bodies[0]["session_id"], "s1");
        assert_eq!(bodies[0]["language"], "hiligaynon");
    }

    #[tokio::test]
    async fn error_detail_becomes_message() {
        let router = Router::new().route(
            "/api/chat",
            post(|| async {
                (AxumStatus::INTERNAL_SERVER_ERROR, Json(json!({"detail": "Chat processing error: boom"})))
            }),
        );
        let svc = service(spawn(router).await);
        let err = svc.exchange(&request("hi", None)).await.unwrap_err();
        assert_eq!(err, TutorError::Api { status: 500, message: "Chat processing error: boom".into() });
        assert_eq!(err.to_string(), "Chat processing error: boom");
    }

    #[tokio::test]
    async fn error_without_detail_uses_status() {
        let router = Router::new().route("/api/chat", post(|| async { (AxumStatus::BAD_GATEWAY, "upstream down") }));
        let svc = service(spawn(router).await);
        let err = svc.exchange(&request("hi", None)).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP error 502");
    }

    #[tokio::test]
    async fn end_session_sends_delete_for_id() {
        let ended: Arc<Mutex<Vec<String>>> = Arc::default();
        let ended_in = ended.clone();
        let router = Router::new().route(
            "/api/sessions/:id",
            delete(move |Path(id): Path<String>| {
                let ended = ended_in.clone();
                async move {
                    ended.lock().unwrap().push(id.clone());
                    Json(json!({"message": "Session ended", "session_id": id}))
                }
            }),
        );
        let svc = service(spawn(router).await);
        svc.end_session("s1").await.unwrap();
        assert_eq!(*ended.lock().unwrap(), vec!["s1".to_string()]);

        let missing = svc.end_session("").await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn lessons_pass_level_query_and_history_unwraps_messages() {
        let router = Router::new()
            .route(
                "/api/lessons",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    let level = q.get("level").cloned().unwrap_or_default();
                    Json(json!([{
                        "id": "x", "title": level, "description": "", "level": "advanced",
                        "topic": "t", "duration_minutes": 1, "xp_reward": 1, "vocabulary_count": 1
                    }]))
                }),
            )
            .route(
                "/api/sessions/:id/history",
                get(|Path(id): Path<String>| async move {
                    Json(json!({"session_id": id, "messages": [
                        {"role": "user", "content": "Kumusta!", "timestamp": "2026-01-01T10:00:00.123456"},
                        {"role": "assistant", "content": "Hello!", "timestamp": "2026-01-01T10:00:01.000000"}
                    ]}))
                }),
            );
        let svc = service(spawn(router).await);
        let lessons = svc.lessons(Some(LearningLevel::UpperIntermediate)).await.unwrap();
        assert_eq!(lessons[0].title, "upper_intermediate");

        let history = svc.session_history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Hello!");
    }

    #[tokio::test]
    async fn session_info_reads_service_view_at_root_base() {
        let router = Router::new().route(
            "/sessions/:id",
            get(|Path(id): Path<String>| async move {
                Json(json!({
                    "session_id": id,
                    "user_id": "demo-user",
                    "current_agent": "conversation",
                    "is_active": true,
                    "started_at": "2026-01-01T10:00:00.000001"
                }))
            }),
        );
        let mut root = spawn(router).await;
        root.set_path("/");
        let info = service(root).session_info("s1").await.unwrap();
        assert_eq!(info.session_id, "s1");
        assert_eq!(info.is_active, Some(true));
        assert_eq!(info.current_agent.as_deref(), Some("conversation"));
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let svc = service(Url::parse(&format!("http://{}", addr)).unwrap());
        let err = svc.health().await.unwrap_err();
        assert!(matches!(err, TutorError::Network(_)));
    }
}
