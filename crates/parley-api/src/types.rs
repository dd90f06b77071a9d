//! Request and response shapes for the chat backend

use serde::{Deserialize, Serialize};

/// Whether a model runs on the local host or in the cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Local,
    Cloud,
}

impl ModelKind {
    /// Wire value for the `model_type` form field
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Local => "local",
            ModelKind::Cloud => "cloud",
        }
    }
}

/// Models advertised by `GET /models`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelCatalog {
    #[serde(default)]
    pub local_models: Vec<String>,
    #[serde(default)]
    pub cloud_models: Vec<String>,
}

impl ModelCatalog {
    /// Whether the catalog advertises the given model
    pub fn contains(&self, kind: ModelKind, name: &str) -> bool {
        match kind {
            ModelKind::Local => self.local_models.iter().any(|m| m == name),
            ModelKind::Cloud => self.cloud_models.iter().any(|m| m == name),
        }
    }

    /// Default selection: first local model, else first cloud model
    pub fn first_available(&self) -> Option<(ModelKind, &str)> {
        if let Some(name) = self.local_models.first() {
            return Some((ModelKind::Local, name));
        }
        self.cloud_models
            .first()
            .map(|name| (ModelKind::Cloud, name.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.local_models.is_empty() && self.cloud_models.is_empty()
    }
}

/// Sampling parameters sent with every generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_tokens: u32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub stop_sequence: Option<String>,
    /// Absent means a random seed on the backend
    pub seed: Option<i64>,
    pub system_prompt: Option<String>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            max_tokens: 2048,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            stop_sequence: None,
            seed: None,
            system_prompt: None,
        }
    }
}

/// A file attached to a chat request
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    pub size: u64,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// One generation request against `/chat` or `/chat/stream`
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub model_kind: ModelKind,
    pub model_name: String,
    /// RFC 3339 timestamp of the user turn
    pub timestamp: String,
    /// Absent for the sentinel session (backend mints a new id)
    pub session_id: Option<String>,
    pub sampling: SamplingParams,
    pub file: Option<FileUpload>,
    /// Other sessions referenced via @-mentions in the message
    pub mention_session_ids: Vec<String>,
}

impl ChatRequest {
    /// Render the request as the backend's multipart form
    pub(crate) fn to_form(&self) -> reqwest::multipart::Form {
        let mut form = reqwest::multipart::Form::new()
            .text("message", self.message.clone())
            .text("model_type", self.model_kind.as_str())
            .text("model_name", self.model_name.clone())
            .text("timestamp", self.timestamp.clone());

        if let Some(ref session_id) = self.session_id {
            form = form.text("session_id", session_id.clone());
        }

        let s = &self.sampling;
        form = form
            .text("temperature", s.temperature.to_string())
            .text("top_p", s.top_p.to_string())
            .text("top_k", s.top_k.to_string())
            .text("max_tokens", s.max_tokens.to_string())
            .text("frequency_penalty", s.frequency_penalty.to_string())
            .text("presence_penalty", s.presence_penalty.to_string());
        if let Some(ref stop) = s.stop_sequence {
            form = form.text("stop_sequence", stop.clone());
        }
        if let Some(seed) = s.seed {
            form = form.text("seed", seed.to_string());
        }
        if let Some(ref prompt) = s.system_prompt {
            form = form.text("system_prompt", prompt.clone());
        }

        for id in &self.mention_session_ids {
            form = form.text("mention_session_ids[]", id.clone());
        }

        if let Some(ref file) = self.file {
            let mut part = reqwest::multipart::Part::bytes(file.bytes.clone())
                .file_name(file.name.clone());
            if let Ok(with_mime) = part.mime_str(&file.media_type) {
                part = with_mime;
            } else {
                part = reqwest::multipart::Part::bytes(file.bytes.clone())
                    .file_name(file.name.clone());
            }
            form = form.part("uploaded_file", part);
        }

        form
    }
}

/// Response from the non-streaming `/chat` endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub response: String,
    pub timestamp: Option<String>,
    pub latency: Option<f64>,
    pub session_id: Option<String>,
    /// The backend already switched to the alternate model for this reply
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default)]
    pub limit_reached: bool,
    pub error: Option<String>,
}

/// One stored session as returned by `POST /chat/history`
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub session_name: Option<String>,
    pub created_at: Option<String>,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
}

impl SessionRecord {
    /// Content of the last stored message, if any
    pub fn last_message(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }
}

/// Full history of one session from `GET /chat/:id`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionHistory {
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
    #[serde(default)]
    pub limit_reached: bool,
}

/// One stored message inside a session
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    pub id: Option<String>,
    pub role: String,
    #[serde(default)]
    pub content: String,
    pub timestamp: Option<String>,
    pub uploaded_file: Option<UploadedFileInfo>,
}

impl HistoryMessage {
    /// Role normalization: only `"user"` is a user turn; `"bot"` and
    /// anything unknown render as assistant.
    pub fn is_user(&self) -> bool {
        self.role == "user"
    }
}

/// Stored descriptor of a file that was attached to a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFileInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type", default)]
    pub media_type: String,
}

/// User profile from `GET /api/profile`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_first_available_prefers_local() {
        let catalog = ModelCatalog {
            local_models: vec!["llama3".into()],
            cloud_models: vec!["gemini".into()],
        };
        assert_eq!(catalog.first_available(), Some((ModelKind::Local, "llama3")));
    }

    #[test]
    fn test_catalog_falls_back_to_cloud() {
        let catalog = ModelCatalog {
            local_models: vec![],
            cloud_models: vec!["gemini".into()],
        };
        assert_eq!(catalog.first_available(), Some((ModelKind::Cloud, "gemini")));
        assert!(ModelCatalog::default().first_available().is_none());
    }

    #[test]
    fn test_catalog_contains_checks_kind() {
        let catalog = ModelCatalog {
            local_models: vec!["llama3".into()],
            cloud_models: vec!["gemini".into()],
        };
        assert!(catalog.contains(ModelKind::Local, "llama3"));
        assert!(!catalog.contains(ModelKind::Cloud, "llama3"));
    }

    #[test]
    fn test_catalog_decodes_with_missing_fields() {
        let catalog: ModelCatalog = serde_json::from_str("{}").unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_chat_response_defaults() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"response":"hi","latency":0.42}"#).unwrap();
        assert_eq!(response.response, "hi");
        assert!(!response.fallback_used);
        assert!(!response.limit_reached);
        assert_eq!(response.latency, Some(0.42));
    }

    #[test]
    fn test_limit_body_decodes() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"limit_reached":true,"error":"Daily limit exceeded"}"#)
                .unwrap();
        assert!(response.limit_reached);
        assert_eq!(response.error.as_deref(), Some("Daily limit exceeded"));
    }

    #[test]
    fn test_history_role_normalization() {
        let msg: HistoryMessage =
            serde_json::from_str(r#"{"role":"bot","content":"hello"}"#).unwrap();
        assert!(!msg.is_user());
        let msg: HistoryMessage =
            serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert!(msg.is_user());
    }

    #[test]
    fn test_session_record_last_message() {
        let record: SessionRecord = serde_json::from_str(
            r#"{"_id":"abc","session_name":"Trip planning","messages":[
                {"role":"user","content":"hi"},
                {"role":"bot","content":"hello there"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(record.last_message(), Some("hello there"));
        assert_eq!(record.session_name.as_deref(), Some("Trip planning"));
    }
}
