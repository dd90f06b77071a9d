//! The chat controller: owns the transcript and session state, drives
//! generations against the backend, and broadcasts events to the front end.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use parley_api::{
    ChatRequest, ChatResponse, FileUpload, ModelCatalog, ModelKind, SamplingParams,
    TRANSPORT_FAILURE_TEXT,
};
use tokio::sync::broadcast;

use crate::{
    backend::ChatBackend,
    error::{Error, Result},
    events::ChatEvent,
    fallback,
    handle::ChatHandle,
    reducer::{CommitMode, StreamEnd, StreamReducer},
    retry,
    session::{self, SessionController},
    transcript::{
        ChatMessage, Direction, FileInfo, MessageStatus, Role, Transcript, now_millis,
        parse_rfc3339_millis,
    },
};

/// The currently selected model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub kind: ModelKind,
    pub name: String,
}

/// Durable storage for the model selection, so a fallback switch survives
/// restarts. The CLI backs this with its preference file.
pub trait ModelStore: Send + Sync {
    fn save_selection(&self, kind: ModelKind, name: &str) -> Result<()>;
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Stream responses chunk by chunk (file uploads always go blocking)
    pub streaming: bool,
    /// Substring picking the preferred cloud model on fallback
    pub cloud_fallback_model: String,
    pub sampling: SamplingParams,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            streaming: true,
            cloud_fallback_model: "gemini".to_string(),
            sampling: SamplingParams::default(),
        }
    }
}

/// Orchestrates sends, retries, cancellation, fallback, and session ops
pub struct ChatController {
    backend: Arc<dyn ChatBackend>,
    config: ChatConfig,
    transcript: Transcript,
    sessions: SessionController,
    catalog: ModelCatalog,
    selection: Option<ModelSelection>,
    model_store: Option<Arc<dyn ModelStore>>,
    events: broadcast::Sender<ChatEvent>,
    handle: ChatHandle,
    /// Original upload bytes per user message id, kept for regeneration
    file_uploads: HashMap<String, FileUpload>,
}

impl ChatController {
    pub fn new(backend: Arc<dyn ChatBackend>, config: ChatConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            backend,
            config,
            transcript: session::welcome_transcript(),
            sessions: SessionController::new(),
            catalog: ModelCatalog::default(),
            selection: None,
            model_store: None,
            events,
            handle: ChatHandle::new(),
            file_uploads: HashMap::new(),
        }
    }

    pub fn with_model_store(mut self, store: Arc<dyn ModelStore>) -> Self {
        self.model_store = Some(store);
        self
    }

    /// Subscribe to controller events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Handle for aborting the active generation from another task
    pub fn handle(&self) -> ChatHandle {
        self.handle.clone()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn sessions(&self) -> &SessionController {
        &self.sessions
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn selection(&self) -> Option<&ModelSelection> {
        self.selection.as_ref()
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    /// Fetch the model catalog and stored sessions. Picks a default
    /// selection (first local, else first cloud) when none is set.
    pub async fn init(&mut self) -> Result<()> {
        self.catalog = self.backend.list_models().await?;
        let records = self.backend.history().await?;
        self.sessions.load_summaries(&records);

        if self.selection.is_none() {
            if let Some((kind, name)) = self.catalog.first_available() {
                self.selection = Some(ModelSelection {
                    kind,
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Set the model selection, checked against the catalog when one has
    /// been fetched.
    pub fn set_selection(&mut self, kind: ModelKind, name: &str) -> Result<()> {
        if !self.catalog.is_empty() && !self.catalog.contains(kind, name) {
            return Err(Error::Other(format!("unknown model: {}", name)));
        }
        self.selection = Some(ModelSelection {
            kind,
            name: name.to_string(),
        });
        Ok(())
    }

    fn selected(&self) -> Result<ModelSelection> {
        self.selection.clone().ok_or(Error::NoModelSelected)
    }

    fn build_request(
        &self,
        message: &str,
        selection: &ModelSelection,
        file: Option<FileUpload>,
    ) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            model_kind: selection.kind,
            model_name: selection.name.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            session_id: self.sessions.request_session_id(),
            sampling: self.config.sampling.clone(),
            file,
            mention_session_ids: vec![],
        }
    }

    /// Send a user message, streaming the response unless it carries a
    /// file upload or streaming is disabled.
    pub async fn send(&mut self, text: &str, file: Option<FileUpload>) -> Result<()> {
        if !self.sessions.can_send() {
            return Err(Error::LimitReached);
        }
        let selection = self.selected()?;

        let user_id = new_id();
        let user_message = match &file {
            Some(upload) => ChatMessage::user_with_file(
                &user_id,
                text,
                FileInfo {
                    name: upload.name.clone(),
                    size: upload.size,
                    media_type: upload.media_type.clone(),
                },
            ),
            None => ChatMessage::user(&user_id, text),
        };
        self.transcript = self.transcript.append(user_message.clone());
        self.emit(ChatEvent::MessageStart {
            message: user_message,
        });
        if let Some(upload) = &file {
            self.file_uploads.insert(user_id.clone(), upload.clone());
        }

        let request = self.build_request(text, &selection, file.clone());
        if self.config.streaming && file.is_none() {
            let target_id = new_id();
            let placeholder = ChatMessage::placeholder(&target_id);
            self.transcript = self.transcript.append(placeholder.clone());
            self.emit(ChatEvent::MessageStart {
                message: placeholder,
            });
            self.run_stream(request, &target_id, CommitMode::Replace)
                .await
        } else {
            self.send_blocking(request, &user_id).await
        }
    }

    /// Regenerate an assistant message, optionally under a different
    /// model. A silent no-op when the id has no triggering user turn.
    pub async fn retry(
        &mut self,
        assistant_id: &str,
        model_override: Option<(ModelKind, String)>,
    ) -> Result<()> {
        if !self.sessions.can_send() {
            return Err(Error::LimitReached);
        }
        let Some(trigger) = retry::find_trigger_turn(&self.transcript, assistant_id) else {
            return Ok(());
        };
        let text = trigger.content.clone();
        let file = self.file_uploads.get(&trigger.id).cloned();

        let selection = match model_override {
            Some((kind, name)) => ModelSelection { kind, name },
            None => self.selected()?,
        };
        let request = self.build_request(&text, &selection, file.clone());

        if self.config.streaming && file.is_none() {
            // Preserve the displayed result as version one before the
            // stream starts overwriting the content.
            self.transcript = self.transcript.seed_versions(assistant_id);
            self.run_stream(request, assistant_id, CommitMode::AppendVersion)
                .await
        } else {
            match self.backend.chat(&request).await {
                Ok(response) => {
                    let timestamp = response
                        .timestamp
                        .as_deref()
                        .map(parse_rfc3339_millis)
                        .unwrap_or_else(now_millis);
                    self.transcript = self.transcript.add_version(
                        assistant_id,
                        response.response.clone(),
                        timestamp,
                    );
                    self.after_blocking_response(&response);
                    self.emit_message_end(assistant_id);
                    Ok(())
                }
                Err(e) => {
                    // Keep the displayed version; just report the failure.
                    if e.is_limit_reached() {
                        self.sessions.set_limit_reached(true);
                        self.emit(ChatEvent::LimitReached {
                            message: e.to_string(),
                        });
                        return Err(Error::LimitReached);
                    }
                    tracing::warn!("regeneration failed: {}", e);
                    self.emit(ChatEvent::Error {
                        message: TRANSPORT_FAILURE_TEXT.to_string(),
                    });
                    Ok(())
                }
            }
        }
    }

    /// Drive one generation's event stream to completion, folding events
    /// into the transcript under the cancellation token.
    async fn run_stream(
        &mut self,
        request: ChatRequest,
        target_id: &str,
        mode: CommitMode,
    ) -> Result<()> {
        let token = self.handle.fresh_token();
        let mut reducer =
            StreamReducer::new(target_id, self.sessions.active_id()).with_mode(mode);

        let mut stream = match self.backend.chat_stream(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("failed to open stream: {}", e);
                // A fresh generation shows the failure in place; a
                // regenerate keeps its displayed version untouched.
                if mode == CommitMode::Replace {
                    self.transcript = self
                        .transcript
                        .replace_content(target_id, TRANSPORT_FAILURE_TEXT)
                        .set_status(target_id, MessageStatus::Error);
                }
                self.emit(ChatEvent::Error {
                    message: TRANSPORT_FAILURE_TEXT.to_string(),
                });
                self.emit_message_end(target_id);
                return Ok(());
            }
        };

        self.handle.set_streaming(true);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    self.transcript = reducer.cancel(&self.transcript);
                    break;
                }
                event = stream.next() => {
                    match event {
                        Some(event) => {
                            self.transcript = reducer.apply(&self.transcript, &event);
                            if reducer.is_done() {
                                break;
                            }
                            if let Some(message) = self.transcript.get(target_id) {
                                self.emit(ChatEvent::MessageUpdate {
                                    message: message.clone(),
                                });
                            }
                        }
                        None => {
                            // Connection closed without a terminal event.
                            if !reducer.is_done() {
                                let failure = parley_api::StreamEvent::Error {
                                    message: TRANSPORT_FAILURE_TEXT.to_string(),
                                    limit_reached: false,
                                };
                                self.transcript = reducer.apply(&self.transcript, &failure);
                            }
                            break;
                        }
                    }
                }
            }
        }
        self.handle.set_streaming(false);
        self.emit_message_end(target_id);

        let outcome = reducer.finish();
        if let Some(session_id) = &outcome.pending_session_id {
            if self.sessions.adopt_session(session_id, &outcome.content) {
                self.emit(ChatEvent::SessionAdopted {
                    session_id: session_id.clone(),
                });
            }
        }
        if outcome.end == StreamEnd::Completed {
            let active = self.sessions.active_id().to_string();
            self.sessions.touch_preview(&active, &outcome.content);
        }

        if outcome.limit_reached {
            self.sessions.set_limit_reached(true);
            self.emit(ChatEvent::LimitReached {
                message: outcome.error_message.clone().unwrap_or_default(),
            });
        } else if let Some(message) = &outcome.error_message {
            self.emit(ChatEvent::Error {
                message: message.clone(),
            });
        }

        let failed_locally = outcome.fallback_detected
            || (outcome.end == StreamEnd::Completed && fallback::is_model_failure(&outcome.content));
        if failed_locally {
            self.trigger_fallback();
        }
        Ok(())
    }

    /// Non-streamed generation for file uploads and `streaming = false`
    async fn send_blocking(&mut self, request: ChatRequest, user_id: &str) -> Result<()> {
        match self.backend.chat(&request).await {
            Ok(response) => {
                let timestamp = response
                    .timestamp
                    .as_deref()
                    .map(parse_rfc3339_millis)
                    .unwrap_or_else(now_millis);
                let target_id = new_id();
                self.transcript = self.transcript.append(ChatMessage::assistant_final(
                    &target_id,
                    response.response.clone(),
                    timestamp,
                ));
                self.after_blocking_response(&response);
                self.emit_message_end(&target_id);
                Ok(())
            }
            Err(e) => self.blocking_failure(&new_id(), e, Some(user_id)),
        }
    }

    /// Shared follow-up after a successful blocking response: session
    /// adoption, preview refresh, fallback detection.
    fn after_blocking_response(&mut self, response: &ChatResponse) {
        if let Some(session_id) = &response.session_id {
            if self.sessions.adopt_session(session_id, &response.response) {
                self.emit(ChatEvent::SessionAdopted {
                    session_id: session_id.clone(),
                });
            }
        }
        let active = self.sessions.active_id().to_string();
        self.sessions.touch_preview(&active, &response.response);

        if response.fallback_used || fallback::is_model_failure(&response.response) {
            self.trigger_fallback();
        }
    }

    /// Fold a blocking-request failure into the transcript. A limit error
    /// rolls back the optimistic user message and gates further sends.
    fn blocking_failure(
        &mut self,
        target_id: &str,
        error: Error,
        rollback_user_id: Option<&str>,
    ) -> Result<()> {
        if error.is_limit_reached() {
            if let Some(user_id) = rollback_user_id {
                self.transcript = self.transcript.remove(user_id);
                self.file_uploads.remove(user_id);
            }
            self.sessions.set_limit_reached(true);
            self.emit(ChatEvent::LimitReached {
                message: error.to_string(),
            });
            return Err(Error::LimitReached);
        }

        tracing::warn!("generation failed: {}", error);
        self.transcript = self.transcript.append(
            ChatMessage::assistant(target_id, TRANSPORT_FAILURE_TEXT, now_millis()),
        );
        self.transcript = self.transcript.set_status(target_id, MessageStatus::Error);
        self.emit(ChatEvent::Error {
            message: TRANSPORT_FAILURE_TEXT.to_string(),
        });
        self.emit_message_end(target_id);
        Ok(())
    }

    /// Switch the selection to the preferred cloud model after a local
    /// failure, persist it, and announce the switch. No-op when already
    /// on a cloud model or no cloud model is available.
    fn trigger_fallback(&mut self) {
        let Some(current) = &self.selection else {
            return;
        };
        if current.kind == ModelKind::Cloud {
            return;
        }
        let preferred = self.config.cloud_fallback_model.to_lowercase();
        let target = self
            .catalog
            .cloud_models
            .iter()
            .find(|m| m.to_lowercase().contains(&preferred))
            .or_else(|| self.catalog.cloud_models.first());
        let Some(target) = target.cloned() else {
            return;
        };

        let from = current.name.clone();
        self.selection = Some(ModelSelection {
            kind: ModelKind::Cloud,
            name: target.clone(),
        });
        if let Some(store) = &self.model_store {
            if let Err(e) = store.save_selection(ModelKind::Cloud, &target) {
                tracing::warn!("failed to persist fallback selection: {}", e);
            }
        }
        self.emit(ChatEvent::FallbackTriggered { from, to: target });
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Activate a stored session, rebuilding the transcript from history
    pub async fn switch_session(&mut self, id: &str) -> Result<()> {
        let history = self.backend.session(id).await?;
        self.transcript = self
            .sessions
            .switch_to(id, &history.messages, history.limit_reached);
        self.file_uploads.clear();
        Ok(())
    }

    /// Start a fresh sentinel conversation
    pub fn new_session(&mut self) {
        self.transcript = self.sessions.start_new();
        self.file_uploads.clear();
    }

    /// Delete a session. Deleting the active one activates the first
    /// remaining session, else falls back to a fresh conversation.
    pub async fn delete_session(&mut self, id: &str) -> Result<()> {
        self.backend.delete_session(id).await?;
        if self.sessions.delete(id) {
            match self.sessions.next_after_delete().map(str::to_string) {
                Some(next) => self.switch_session(&next).await?,
                None => self.new_session(),
            }
        }
        Ok(())
    }

    pub async fn rename_session(&mut self, id: &str, name: &str) -> Result<()> {
        self.backend.rename_session(id, name).await?;
        self.sessions.rename(id, name);
        Ok(())
    }

    /// Wipe a session's messages, keeping the session itself
    pub async fn clear_session(&mut self, id: &str) -> Result<()> {
        self.backend.clear_session(id).await?;
        if self.sessions.active_id() == id {
            self.transcript = session::welcome_transcript();
        }
        self.sessions.touch_preview(id, "");
        Ok(())
    }

    /// Step a message's displayed version backward or forward
    pub fn navigate_version(&mut self, id: &str, direction: Direction) {
        self.transcript = self.transcript.navigate_version(id, direction);
    }

    /// Plain-text export of the current transcript
    pub fn export_transcript(&self) -> String {
        let mut out = String::new();
        for message in self.transcript.messages() {
            let time = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(message.timestamp)
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            let who = match message.role {
                Role::User => "You",
                Role::Assistant => "Bot",
            };
            out.push_str(&format!("[{}] {}: {}\n", time, who, message.content));
        }
        out
    }

    fn emit_message_end(&self, id: &str) {
        if let Some(message) = self.transcript.get(id) {
            self.emit(ChatEvent::MessageEnd {
                message: message.clone(),
            });
        }
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use parley_api::{SessionHistory, SessionRecord, StreamEvent, StreamEventStream};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedBackend {
        catalog: ModelCatalog,
        streams: Mutex<VecDeque<Vec<StreamEvent>>>,
        responses: Mutex<VecDeque<std::result::Result<ChatResponse, parley_api::Error>>>,
        histories: Mutex<HashMap<String, SessionHistory>>,
        refuse_streams: Mutex<u32>,
    }

    impl ScriptedBackend {
        fn with_catalog(local: &[&str], cloud: &[&str]) -> Self {
            Self {
                catalog: ModelCatalog {
                    local_models: local.iter().map(|s| s.to_string()).collect(),
                    cloud_models: cloud.iter().map(|s| s.to_string()).collect(),
                },
                ..Default::default()
            }
        }

        fn push_stream(&self, events: Vec<StreamEvent>) {
            self.streams.lock().push_back(events);
        }

        fn push_response(
            &self,
            response: std::result::Result<ChatResponse, parley_api::Error>,
        ) {
            self.responses.lock().push_back(response);
        }

        fn refuse_next_stream(&self) {
            *self.refuse_streams.lock() += 1;
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn list_models(&self) -> Result<ModelCatalog> {
            Ok(self.catalog.clone())
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse> {
            match self.responses.lock().pop_front() {
                Some(Ok(response)) => Ok(response),
                Some(Err(e)) => Err(e.into()),
                None => Ok(ChatResponse::default()),
            }
        }

        async fn chat_stream(&self, _request: &ChatRequest) -> Result<StreamEventStream> {
            {
                let mut refusals = self.refuse_streams.lock();
                if *refusals > 0 {
                    *refusals -= 1;
                    return Err(parley_api::Error::api(502, "stream refused").into());
                }
            }
            let events = self.streams.lock().pop_front().unwrap_or_default();
            Ok(Box::pin(tokio_stream::iter(events)))
        }

        async fn history(&self) -> Result<Vec<SessionRecord>> {
            Ok(vec![])
        }

        async fn session(&self, id: &str) -> Result<SessionHistory> {
            Ok(self.histories.lock().get(id).cloned().unwrap_or_default())
        }

        async fn delete_session(&self, _id: &str) -> Result<()> {
            Ok(())
        }

        async fn rename_session(&self, _id: &str, _new_name: &str) -> Result<()> {
            Ok(())
        }

        async fn clear_session(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn complete_event() -> StreamEvent {
        StreamEvent::Complete {
            timestamp: "2024-06-01T12:00:00Z".into(),
            latency: Some(0.5),
            session_id: None,
        }
    }

    async fn controller_with(backend: ScriptedBackend) -> (ChatController, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let mut controller =
            ChatController::new(Arc::clone(&backend) as Arc<dyn ChatBackend>, ChatConfig::default());
        controller.init().await.unwrap();
        (controller, backend)
    }

    #[tokio::test]
    async fn test_streamed_send_folds_chunks_and_adopts_session() {
        let backend = ScriptedBackend::with_catalog(&["llama3"], &["gemini-pro"]);
        backend.push_stream(vec![
            StreamEvent::SessionInfo {
                session_id: "abc123".into(),
            },
            StreamEvent::Chunk { text: "Hel".into() },
            StreamEvent::Chunk { text: "lo".into() },
            complete_event(),
        ]);
        let (mut controller, _backend) = controller_with(backend).await;

        controller.send("hi there", None).await.unwrap();

        let last = controller.transcript().last().unwrap();
        assert_eq!(last.content, "Hello");
        assert_eq!(last.versions, vec!["Hello"]);
        assert_eq!(last.status, MessageStatus::Complete);
        assert_eq!(controller.sessions().active_id(), "abc123");
        assert_eq!(controller.sessions().summaries()[0].preview, "Hello");
    }

    #[tokio::test]
    async fn test_stream_limit_error_blocks_further_sends() {
        let backend = ScriptedBackend::with_catalog(&["llama3"], &[]);
        backend.push_stream(vec![StreamEvent::Error {
            message: "Daily limit exceeded".into(),
            limit_reached: true,
        }]);
        let (mut controller, _backend) = controller_with(backend).await;

        controller.send("hi", None).await.unwrap();
        assert!(!controller.sessions().can_send());

        let blocked = controller.send("again", None).await;
        assert!(matches!(blocked, Err(Error::LimitReached)));

        // a fresh session unblocks
        controller.new_session();
        assert!(controller.sessions().can_send());
    }

    #[tokio::test]
    async fn test_blocking_limit_rolls_back_user_message() {
        let backend = ScriptedBackend::with_catalog(&["llama3"], &[]);
        backend.push_response(Err(parley_api::Error::LimitReached {
            message: "Daily limit exceeded".into(),
        }));
        let backend = Arc::new(backend);
        let config = ChatConfig {
            streaming: false,
            ..Default::default()
        };
        let mut controller =
            ChatController::new(Arc::clone(&backend) as Arc<dyn ChatBackend>, config);
        controller.init().await.unwrap();
        let before = controller.transcript().len();

        let result = controller.send("over the limit", None).await;
        assert!(matches!(result, Err(Error::LimitReached)));
        assert_eq!(controller.transcript().len(), before);
        assert!(!controller.sessions().can_send());
    }

    #[tokio::test]
    async fn test_retry_appends_a_new_version() {
        let backend = ScriptedBackend::with_catalog(&["llama3"], &[]);
        backend.push_stream(vec![
            StreamEvent::Chunk { text: "A".into() },
            complete_event(),
        ]);
        backend.push_stream(vec![
            StreamEvent::Chunk { text: "B".into() },
            complete_event(),
        ]);
        let (mut controller, _backend) = controller_with(backend).await;

        controller.send("question", None).await.unwrap();
        let target_id = controller.transcript().last().unwrap().id.clone();

        controller.retry(&target_id, None).await.unwrap();
        let message = controller.transcript().get(&target_id).unwrap();
        assert_eq!(message.versions, vec!["A", "B"]);
        assert_eq!(message.current_version, 1);
        assert_eq!(message.content, "B");
    }

    #[tokio::test]
    async fn test_retry_error_event_keeps_displayed_version() {
        let backend = ScriptedBackend::with_catalog(&["llama3"], &[]);
        backend.push_stream(vec![
            StreamEvent::Chunk { text: "A".into() },
            complete_event(),
        ]);
        backend.push_stream(vec![
            StreamEvent::Chunk {
                text: "partial B".into(),
            },
            StreamEvent::Error {
                message: "model exploded".into(),
                limit_reached: false,
            },
        ]);
        let (mut controller, _backend) = controller_with(backend).await;

        controller.send("question", None).await.unwrap();
        let target_id = controller.transcript().last().unwrap().id.clone();

        controller.retry(&target_id, None).await.unwrap();
        let message = controller.transcript().get(&target_id).unwrap();
        assert_eq!(message.content, "A");
        assert_eq!(message.versions, vec!["A"]);
        assert_eq!(message.current_version, 0);
        assert_eq!(message.content, message.versions[message.current_version]);
        assert_eq!(message.status, MessageStatus::Complete);
    }

    #[tokio::test]
    async fn test_retry_stream_open_failure_keeps_displayed_version() {
        let backend = ScriptedBackend::with_catalog(&["llama3"], &[]);
        backend.push_stream(vec![
            StreamEvent::Chunk { text: "A".into() },
            complete_event(),
        ]);
        let (mut controller, backend) = controller_with(backend).await;

        controller.send("question", None).await.unwrap();
        let target_id = controller.transcript().last().unwrap().id.clone();

        backend.refuse_next_stream();
        controller.retry(&target_id, None).await.unwrap();

        let message = controller.transcript().get(&target_id).unwrap();
        assert_eq!(message.content, "A");
        assert_eq!(message.versions, vec!["A"]);
        assert_eq!(message.current_version, 0);
        assert_eq!(message.content, message.versions[message.current_version]);
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_preview_untouched() {
        let backend = ScriptedBackend::with_catalog(&["llama3"], &[]);
        backend.push_stream(vec![
            StreamEvent::Chunk {
                text: "partial".into(),
            },
            StreamEvent::Error {
                message: "boom".into(),
                limit_reached: false,
            },
        ]);
        let (mut controller, _backend) = controller_with(backend).await;

        controller.send("hi", None).await.unwrap();
        assert_eq!(
            controller.sessions().summaries()[0].preview,
            session::WELCOME_TEXT
        );
    }

    #[tokio::test]
    async fn test_retry_on_welcome_message_is_a_noop() {
        let backend = ScriptedBackend::with_catalog(&["llama3"], &[]);
        let (mut controller, _backend) = controller_with(backend).await;
        let welcome_id = controller.transcript().messages()[0].id.clone();
        let before = controller.transcript().clone();

        controller.retry(&welcome_id, None).await.unwrap();
        assert_eq!(controller.transcript().len(), before.len());
    }

    #[tokio::test]
    async fn test_failure_signature_triggers_cloud_fallback() {
        let backend = ScriptedBackend::with_catalog(&["llama3"], &["gemini-pro", "other"]);
        backend.push_stream(vec![
            StreamEvent::Chunk {
                text: "Local model error: connection refused".into(),
            },
            complete_event(),
        ]);
        let (mut controller, _backend) = controller_with(backend).await;
        let mut events = controller.subscribe();

        controller.send("hi", None).await.unwrap();

        let selection = controller.selection().unwrap();
        assert_eq!(selection.kind, ModelKind::Cloud);
        assert_eq!(selection.name, "gemini-pro");

        let mut saw_fallback = false;
        while let Ok(event) = events.try_recv() {
            if let ChatEvent::FallbackTriggered { from, to } = event {
                assert_eq!(from, "llama3");
                assert_eq!(to, "gemini-pro");
                saw_fallback = true;
            }
        }
        assert!(saw_fallback);
    }

    #[tokio::test]
    async fn test_in_band_marker_triggers_fallback_without_error() {
        let backend = ScriptedBackend::with_catalog(&["llama3"], &["gemini-pro"]);
        backend.push_stream(vec![
            StreamEvent::Chunk {
                text: "[Local model failed, switching to Gemini]\n".into(),
            },
            StreamEvent::Chunk {
                text: "The answer is 42.".into(),
            },
            complete_event(),
        ]);
        let (mut controller, _backend) = controller_with(backend).await;

        controller.send("hi", None).await.unwrap();
        assert_eq!(controller.selection().unwrap().kind, ModelKind::Cloud);
        assert_eq!(
            controller.transcript().last().unwrap().status,
            MessageStatus::Complete
        );
    }

    #[tokio::test]
    async fn test_fallback_persists_through_model_store() {
        struct Recorder(Mutex<Option<(ModelKind, String)>>);
        impl ModelStore for Recorder {
            fn save_selection(&self, kind: ModelKind, name: &str) -> Result<()> {
                *self.0.lock() = Some((kind, name.to_string()));
                Ok(())
            }
        }

        let backend = ScriptedBackend::with_catalog(&["llama3"], &["gemini-pro"]);
        backend.push_stream(vec![
            StreamEvent::Chunk {
                text: "local model error".into(),
            },
            complete_event(),
        ]);
        let backend = Arc::new(backend);
        let store = Arc::new(Recorder(Mutex::new(None)));
        let mut controller =
            ChatController::new(Arc::clone(&backend) as Arc<dyn ChatBackend>, ChatConfig::default())
                .with_model_store(Arc::clone(&store) as Arc<dyn ModelStore>);
        controller.init().await.unwrap();

        controller.send("hi", None).await.unwrap();
        let saved = store.0.lock().clone();
        assert_eq!(saved, Some((ModelKind::Cloud, "gemini-pro".to_string())));
    }

    #[tokio::test]
    async fn test_delete_active_session_falls_back_to_welcome() {
        let backend = ScriptedBackend::with_catalog(&["llama3"], &[]);
        backend.push_stream(vec![
            StreamEvent::SessionInfo {
                session_id: "abc".into(),
            },
            StreamEvent::Chunk { text: "hi".into() },
            complete_event(),
        ]);
        let (mut controller, _backend) = controller_with(backend).await;
        controller.send("hello", None).await.unwrap();
        assert_eq!(controller.sessions().active_id(), "abc");

        controller.delete_session("abc").await.unwrap();
        assert!(controller.sessions().is_sentinel());
        assert_eq!(controller.transcript().len(), 1);
        assert_eq!(
            controller.transcript().messages()[0].content,
            session::WELCOME_TEXT
        );
    }

    #[tokio::test]
    async fn test_send_without_model_is_rejected() {
        let backend = ScriptedBackend::default();
        let backend = Arc::new(backend);
        let mut controller = ChatController::new(
            Arc::clone(&backend) as Arc<dyn ChatBackend>,
            ChatConfig::default(),
        );
        let result = controller.send("hi", None).await;
        assert!(matches!(result, Err(Error::NoModelSelected)));
    }

    #[tokio::test]
    async fn test_navigate_version_through_controller() {
        let backend = ScriptedBackend::with_catalog(&["llama3"], &[]);
        backend.push_stream(vec![
            StreamEvent::Chunk { text: "A".into() },
            complete_event(),
        ]);
        backend.push_stream(vec![
            StreamEvent::Chunk { text: "B".into() },
            complete_event(),
        ]);
        let (mut controller, _backend) = controller_with(backend).await;
        controller.send("q", None).await.unwrap();
        let id = controller.transcript().last().unwrap().id.clone();
        controller.retry(&id, None).await.unwrap();

        controller.navigate_version(&id, Direction::Prev);
        assert_eq!(controller.transcript().get(&id).unwrap().content, "A");
        controller.navigate_version(&id, Direction::Next);
        assert_eq!(controller.transcript().get(&id).unwrap().content, "B");
    }

    #[tokio::test]
    async fn test_export_transcript_labels_roles() {
        let backend = ScriptedBackend::with_catalog(&["llama3"], &[]);
        backend.push_stream(vec![
            StreamEvent::Chunk { text: "Hi!".into() },
            complete_event(),
        ]);
        let (mut controller, _backend) = controller_with(backend).await;
        controller.send("hello", None).await.unwrap();

        let export = controller.export_transcript();
        assert!(export.contains("You: hello"));
        assert!(export.contains("Bot: Hi!"));
    }
}
