use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::codec::{LayoutMode, SubtitleFormat};
use crate::completion::CompletionPolicy;
use crate::error::{Result, SubflowError};

fn default_grace_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub transcribe: TranscribeConfig,
    pub optimize: OptimizeConfig,
    pub subtitle: SubtitleConfig,
    pub completion: CompletionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeConfig {
    /// Path to the transcription binary (e.g., whisper-cli)
    pub binary_path: String,
    /// Model passed to the binary
    pub model: String,
    /// Source language hint, "auto" for detection
    pub language: String,
    /// Sampling temperature for transcription
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeConfig {
    /// OpenAI-compatible endpoint base URL
    pub endpoint: String,
    /// API key sent as a bearer token
    pub api_key: String,
    /// Model used for optimization and translation
    pub model: String,
    /// Maximum retries for a failed batch request
    pub max_retries: u32,
    /// Entries per optimization request
    pub batch_size: usize,
    /// Worker threads advertised to the backend
    pub thread_num: usize,
    /// Default target language for translation
    pub target_language: String,
    /// Run the optimization pass by default
    pub need_optimize: bool,
    /// Run the translation pass by default
    pub need_translate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleConfig {
    /// Default export format
    pub format: SubtitleFormat,
    /// How original and translated text are arranged on export
    pub layout: LayoutMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Action taken once the whole batch is finished
    pub policy: CompletionPolicy,
    /// Grace window in seconds before suspend/shutdown is issued
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            binary_path: "whisper-cli".to_string(),
            model: "medium".to_string(),
            language: "auto".to_string(),
            temperature: 0.0,
        }
    }
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            api_key: String::new(),
            model: "llama3.2:3b".to_string(),
            max_retries: 3,
            batch_size: 10,
            thread_num: 4,
            target_language: "en".to_string(),
            need_optimize: true,
            need_translate: false,
        }
    }
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            format: SubtitleFormat::Srt,
            layout: LayoutMode::OriginalOnTop,
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            policy: CompletionPolicy::DoNothing,
            grace_secs: default_grace_secs(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SubflowError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SubflowError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}
