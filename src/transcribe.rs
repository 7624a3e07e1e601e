use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::TranscribeConfig;
use crate::document::{SubtitleDocument, SubtitleEntry};
use crate::error::{Result, SubflowError};
use crate::job::Job;
use crate::worker::{Transcriber, WorkerEvent};

/// JSON emitted by the transcription binary
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CliTranscriptionOutput {
    text: String,
    segments: Vec<CliTranscriptionSegment>,
    language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CliTranscriptionSegment {
    /// Start offset in seconds
    start: f64,
    /// End offset in seconds
    end: f64,
    text: String,
}

/// Runs an external speech-to-text binary (whisper-cli compatible) and
/// maps its JSON output into a subtitle document
pub struct CliTranscriber {
    config: TranscribeConfig,
}

impl CliTranscriber {
    pub fn new(config: TranscribeConfig) -> Self {
        Self { config }
    }

    fn to_entries(output: CliTranscriptionOutput) -> Vec<SubtitleEntry> {
        output
            .segments
            .into_iter()
            .map(|segment| {
                SubtitleEntry::new(
                    (segment.start * 1000.0) as u64,
                    (segment.end * 1000.0) as u64,
                    segment.text.trim(),
                    "",
                )
            })
            .collect()
    }
}

#[async_trait]
impl Transcriber for CliTranscriber {
    async fn run(
        &self,
        job: &Job,
        events: &UnboundedSender<WorkerEvent>,
        cancel: &CancellationToken,
    ) -> Result<SubtitleDocument> {
        info!("Transcribing {}", job.path.display());
        let _ = events.send(WorkerEvent::Progress {
            percent: 0,
            message: "starting transcription".to_string(),
        });

        let temp_dir = tempfile::tempdir()
            .map_err(|e| SubflowError::Worker(format!("Failed to create temp directory: {e}")))?;
        let output_prefix = temp_dir.path().join("transcription");

        let mut child = Command::new(&self.config.binary_path)
            .arg("-m")
            .arg(&self.config.model)
            .arg("-l")
            .arg(&self.config.language)
            .arg("--temperature")
            .arg(self.config.temperature.to_string())
            .arg("-oj")
            .arg("-of")
            .arg(&output_prefix)
            .arg("-f")
            .arg(&job.path)
            .spawn()
            .map_err(|e| {
                SubflowError::Worker(format!(
                    "Failed to launch {}: {e}",
                    self.config.binary_path
                ))
            })?;

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                debug!("Transcription canceled, killing worker process");
                let _ = child.kill().await;
                return Err(SubflowError::Worker("transcription canceled".to_string()));
            }
        };
        if !status.success() {
            return Err(SubflowError::Worker(format!(
                "transcription binary exited with {status}"
            )));
        }

        let json_path = output_prefix.with_extension("json");
        let content = tokio::fs::read_to_string(&json_path).await?;
        let output: CliTranscriptionOutput = serde_json::from_str(&content)?;

        let entries = Self::to_entries(output);
        info!("Transcription produced {} segments", entries.len());
        let _ = events.send(WorkerEvent::Progress {
            percent: 100,
            message: "transcription finished".to_string(),
        });

        Ok(SubtitleDocument::from_entries(entries))
    }
}
