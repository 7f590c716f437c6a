//! Persistent application settings (JSON file in app data directory).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jarvis_core::LiveConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const MIN_OUTBOUND_CAPACITY: usize = 4;
const MAX_OUTBOUND_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub transcription: bool,
    pub web_search: bool,
    pub outbound_capacity: usize,
    pub preferred_input_device: Option<String>,
    pub preferred_output_device: Option<String>,
    /// Program used for the local fallback voice; the text is its last argument.
    pub speech_command: String,
    pub speech_args: Vec<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        let live = LiveConfig::default();
        Self {
            api_key: None,
            endpoint: live.endpoint,
            model: live.model,
            voice: live.voice,
            system_instruction: live.system_instruction,
            transcription: live.transcription,
            web_search: live.web_search,
            outbound_capacity: live.outbound_capacity,
            preferred_input_device: None,
            preferred_output_device: None,
            speech_command: default_speech_command().into(),
            speech_args: Vec::new(),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        let defaults = LiveConfig::default();
        self.api_key = normalize_optional(self.api_key.take());
        self.endpoint = normalize_or(&self.endpoint, &defaults.endpoint);
        self.model = normalize_model(&self.model, &defaults.model);
        self.voice = normalize_or(&self.voice, &defaults.voice);
        self.system_instruction = normalize_or(&self.system_instruction, &defaults.system_instruction);
        self.outbound_capacity = self
            .outbound_capacity
            .clamp(MIN_OUTBOUND_CAPACITY, MAX_OUTBOUND_CAPACITY);
        self.preferred_input_device = normalize_optional(self.preferred_input_device.take());
        self.preferred_output_device = normalize_optional(self.preferred_output_device.take());
        self.speech_command = normalize_or(&self.speech_command, default_speech_command());
        self.speech_args.retain(|a| !a.trim().is_empty());
    }

    /// Environment keys win over the file.
    pub fn apply_env(&mut self) {
        for var in ["GEMINI_API_KEY", "API_KEY"] {
            if let Some(key) = std::env::var(var).ok().and_then(|k| normalize_optional(Some(k))) {
                info!(source = var, "api key taken from environment");
                self.api_key = Some(key);
                return;
            }
        }
    }

    pub fn live_config(&self) -> LiveConfig {
        LiveConfig {
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone().unwrap_or_default(),
            model: self.model.clone(),
            voice: self.voice.clone(),
            system_instruction: self.system_instruction.clone(),
            transcription: self.transcription,
            web_search: self.web_search,
            outbound_capacity: self.outbound_capacity,
        }
    }
}

fn normalize_optional(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn normalize_or(raw: &str, fallback: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        fallback.into()
    } else {
        trimmed.into()
    }
}

/// The endpoint expects fully qualified `models/<name>`.
fn normalize_model(raw: &str, fallback: &str) -> String {
    let model = normalize_or(raw, fallback);
    if model.starts_with("models/") {
        model
    } else {
        format!("models/{model}")
    }
}

fn default_speech_command() -> &'static str {
    if cfg!(target_os = "macos") {
        "say"
    } else {
        "espeak-ng"
    }
}

pub fn default_settings_path() -> PathBuf {
    if let Some(path) = std::env::var_os("JARVIS_SETTINGS") {
        return PathBuf::from(path);
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Jarvis")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("jarvis")
            .join("settings.json")
    }
}

/// Missing file means defaults; a file that exists but does not parse is
/// an error.
pub fn load_settings(path: &Path) -> Result<AppSettings> {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw)
            .with_context(|| format!("parsing settings at {}", path.display()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "no settings file, using defaults");
            AppSettings::default()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("reading settings at {}", path.display()))
        }
    };
    settings.normalize();
    Ok(settings)
}
