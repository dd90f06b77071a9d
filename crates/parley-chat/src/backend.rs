//! Backend abstraction so the controller can run against a scripted
//! double in tests.

use async_trait::async_trait;
use parley_api::{
    BackendClient, ChatRequest, ChatResponse, ModelCatalog, SessionHistory, SessionRecord,
    StreamEventStream,
};

use crate::error::Result;

/// The slice of the backend API the controller drives
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn list_models(&self) -> Result<ModelCatalog>;
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;
    async fn chat_stream(&self, request: &ChatRequest) -> Result<StreamEventStream>;
    async fn history(&self) -> Result<Vec<SessionRecord>>;
    async fn session(&self, id: &str) -> Result<SessionHistory>;
    async fn delete_session(&self, id: &str) -> Result<()>;
    async fn rename_session(&self, id: &str, new_name: &str) -> Result<()>;
    async fn clear_session(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl ChatBackend for BackendClient {
    async fn list_models(&self) -> Result<ModelCatalog> {
        Ok(BackendClient::list_models(self).await?)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        Ok(BackendClient::chat(self, request).await?)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<StreamEventStream> {
        Ok(BackendClient::chat_stream(self, request).await?)
    }

    async fn history(&self) -> Result<Vec<SessionRecord>> {
        Ok(BackendClient::history(self).await?)
    }

    async fn session(&self, id: &str) -> Result<SessionHistory> {
        Ok(BackendClient::session(self, id).await?)
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        Ok(BackendClient::delete_session(self, id).await?)
    }

    async fn rename_session(&self, id: &str, new_name: &str) -> Result<()> {
        Ok(BackendClient::rename_session(self, id, new_name).await?)
    }

    async fn clear_session(&self, id: &str) -> Result<()> {
        Ok(BackendClient::clear_session(self, id).await?)
    }
}
