//! HTTP client for the chat backend

use async_stream::stream;
use futures::StreamExt;
use serde::Deserialize;

use crate::{
    error::{Error, Result},
    stream::{StreamEvent, StreamEventStream, decode_frame, drain_lines},
    types::{ChatRequest, ChatResponse, ModelCatalog, Profile, SessionHistory, SessionRecord},
};

/// Text shown in place of a response when the transport fails mid-stream
pub const TRANSPORT_FAILURE_TEXT: &str = "Failed to get response from AI. Please try again.";

/// Error payload the backend attaches to failed requests
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for the chat backend
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl BackendClient {
    /// Create a new client against the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
        }
    }

    /// Attach a bearer token to every request
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Map a failed response to an Error, surfacing the distinguished
    /// limit-reached condition on HTTP 403.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let code = status.as_u16();
        let text = response.text().await.unwrap_or_default();

        if code == 403 {
            if let Ok(body) = serde_json::from_str::<ChatResponse>(&text) {
                if body.limit_reached {
                    return Err(Error::LimitReached {
                        message: body
                            .error
                            .unwrap_or_else(|| "Message limit reached".to_string()),
                    });
                }
            }
        }

        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        Err(Error::api(code, message))
    }

    /// `GET /models`
    pub async fn list_models(&self) -> Result<ModelCatalog> {
        let response = self
            .authorized(self.client.get(self.url("/models")))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// `POST /chat` — one full (non-streamed) generation
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let response = self
            .authorized(self.client.post(self.url("/chat")))
            .multipart(request.to_form())
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// `POST /chat/stream` — decoded event stream for one generation.
    ///
    /// The stream ends after the first terminal event or when the backend
    /// closes the connection. A transport failure mid-stream is folded into
    /// a terminal `Error` event carrying the generic retry message; the
    /// cause is logged, never rendered.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<StreamEventStream> {
        let response = self
            .authorized(self.client.post(self.url("/chat/stream")))
            .multipart(request.to_form())
            .send()
            .await?;
        let response = Self::check(response).await?;
        let mut body = response.bytes_stream();

        Ok(Box::pin(stream! {
            let mut buffer: Vec<u8> = Vec::new();
            loop {
                match body.next().await {
                    Some(Ok(bytes)) => {
                        buffer.extend_from_slice(&bytes);
                        for line in drain_lines(&mut buffer) {
                            if let Some(event) = decode_frame(&line) {
                                let terminal = event.is_terminal();
                                yield event;
                                if terminal {
                                    return;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!("stream transport failed: {}", e);
                        yield StreamEvent::Error {
                            message: TRANSPORT_FAILURE_TEXT.to_string(),
                            limit_reached: false,
                        };
                        return;
                    }
                    None => {
                        // Connection closed; flush a final unterminated line.
                        let tail = String::from_utf8_lossy(&buffer);
                        if let Some(event) = decode_frame(tail.trim_end()) {
                            yield event;
                        }
                        return;
                    }
                }
            }
        }))
    }

    /// `POST /chat/history` — all stored sessions for the caller
    pub async fn history(&self) -> Result<Vec<SessionRecord>> {
        let response = self
            .authorized(self.client.post(self.url("/chat/history")))
            .json(&serde_json::json!({ "session_ids": [] }))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// `GET /chat/:id` — full message history of one session
    pub async fn session(&self, id: &str) -> Result<SessionHistory> {
        let response = self
            .authorized(self.client.get(self.url(&format!("/chat/{}", id))))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// `DELETE /chat/delete/:id`
    pub async fn delete_session(&self, id: &str) -> Result<()> {
        let response = self
            .authorized(
                self.client
                    .delete(self.url(&format!("/chat/delete/{}", id))),
            )
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// `POST /chat/rename`
    pub async fn rename_session(&self, id: &str, new_name: &str) -> Result<()> {
        let response = self
            .authorized(self.client.post(self.url("/chat/rename")))
            .json(&serde_json::json!({ "session_id": id, "new_name": new_name }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// `POST /clear` — wipe a session's messages, keeping the session
    pub async fn clear_session(&self, id: &str) -> Result<()> {
        let response = self
            .authorized(self.client.post(self.url("/clear")))
            .json(&serde_json::json!({ "session_id": id }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// `GET /api/profile`
    pub async fn profile(&self) -> Result<Profile> {
        let response = self
            .authorized(self.client.get(self.url("/api/profile")))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// `PUT /api/profile`
    pub async fn update_profile(&self, profile: &Profile) -> Result<()> {
        let response = self
            .authorized(self.client.put(self.url("/api/profile")))
            .json(profile)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
