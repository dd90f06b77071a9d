//! Durable key-value preferences
//!
//! Stores small UI preferences in ~/.config/parley/prefs.json. The model
//! selection keys let a fallback switch survive restarts.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use parley_api::ModelKind;
use parley_chat::ModelStore;

pub const SELECTED_MODEL_NAME: &str = "selected_model_name";
pub const SELECTED_MODEL_TYPE: &str = "selected_model_type";

/// Get the preferences directory
fn prefs_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parley")
}

/// Get the preferences file path
fn prefs_file() -> PathBuf {
    prefs_dir().join("prefs.json")
}

/// Load all preferences from storage
fn load_store() -> HashMap<String, String> {
    let path = prefs_file();
    if !path.exists() {
        return HashMap::new();
    }

    match fs::read_to_string(&path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => HashMap::new(),
    }
}

/// Save all preferences to storage
fn save_store(store: &HashMap<String, String>) -> io::Result<()> {
    let dir = prefs_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }

    let content = serde_json::to_string_pretty(store)?;
    fs::write(prefs_file(), content)
}

/// Parse a wire model-type value
pub fn parse_model_kind(value: &str) -> Option<ModelKind> {
    match value.to_lowercase().as_str() {
        "local" => Some(ModelKind::Local),
        "cloud" => Some(ModelKind::Cloud),
        _ => None,
    }
}

/// Read the stored model selection from a preference map
fn selection_from_store(store: &HashMap<String, String>) -> Option<(ModelKind, String)> {
    let name = store.get(SELECTED_MODEL_NAME)?;
    let kind = parse_model_kind(store.get(SELECTED_MODEL_TYPE)?)?;
    Some((kind, name.clone()))
}

/// Write a model selection into a preference map
fn store_selection(store: &mut HashMap<String, String>, kind: ModelKind, name: &str) {
    store.insert(SELECTED_MODEL_NAME.to_string(), name.to_string());
    store.insert(SELECTED_MODEL_TYPE.to_string(), kind.as_str().to_string());
}

/// Load the persisted model selection, if any
pub fn load_selection() -> Option<(ModelKind, String)> {
    selection_from_store(&load_store())
}

/// Persist the model selection
pub fn save_selection(kind: ModelKind, name: &str) -> io::Result<()> {
    let mut store = load_store();
    store_selection(&mut store, kind, name);
    save_store(&store)
}

/// Preference-file backed store the chat controller persists through
pub struct PrefModelStore;

impl ModelStore for PrefModelStore {
    fn save_selection(&self, kind: ModelKind, name: &str) -> parley_chat::Result<()> {
        save_selection(kind, name).map_err(|e| parley_chat::Error::Other(e.to_string()))
    }
}
