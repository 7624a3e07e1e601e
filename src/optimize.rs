use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::OptimizeConfig;
use crate::document::SubtitleDocument;
use crate::error::{Result, SubflowError};
use crate::job::Job;
use crate::worker::{Optimizer, WorkerEvent};

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// LLM-backed optimizer/translator talking to an OpenAI-compatible
/// chat-completions endpoint. Entries are processed in batches; each
/// batch's result is applied to the document and mirrored to the host as a
/// partial update.
pub struct LlmOptimizer {
    config: OptimizeConfig,
    client: reqwest::Client,
}

impl LlmOptimizer {
    pub fn new(config: OptimizeConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn build_system_prompt(&self, job: &Job, custom_prompt: &str) -> String {
        let mut prompt = String::from(
            "You receive a JSON object mapping subtitle keys to text. \
             Return a JSON object with the same keys.",
        );
        if job.params.need_optimize {
            prompt.push_str(" Fix transcription errors, punctuation and casing.");
        }
        if job.params.need_translate {
            prompt.push_str(&format!(
                " Translate each value into {}.",
                job.params.target_language
            ));
        }
        if !custom_prompt.is_empty() {
            prompt.push_str("\nReference notes:\n");
            prompt.push_str(custom_prompt);
        }
        prompt
    }

    async fn optimize_chunk(
        &self,
        system_prompt: &str,
        chunk: &BTreeMap<u32, String>,
    ) -> Result<BTreeMap<u32, String>> {
        let payload = serde_json::to_string(chunk)?;
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.endpoint))
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "model": self.config.model,
                "messages": [
                    { "role": "system", "content": system_prompt },
                    { "role": "user", "content": payload },
                ],
                "response_format": { "type": "json_object" },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SubflowError::Worker(format!(
                "optimization request failed {status}: {error_text}"
            )));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let content = completion
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| SubflowError::Worker("empty optimization response".to_string()))?;

        parse_update_map(content)
    }
}

/// Parse the model's JSON reply into entry updates, ignoring keys that are
/// not valid entry numbers
fn parse_update_map(content: &str) -> Result<BTreeMap<u32, String>> {
    let raw: BTreeMap<String, String> = serde_json::from_str(content.trim())
        .map_err(|e| SubflowError::Worker(format!("unparsable optimization reply: {e}")))?;

    let mut updates = BTreeMap::new();
    for (key, value) in raw {
        match key.parse::<u32>() {
            Ok(key) => {
                updates.insert(key, value);
            }
            Err(_) => warn!("Dropping reply entry with non-numeric key {:?}", key),
        }
    }
    Ok(updates)
}

#[async_trait]
impl Optimizer for LlmOptimizer {
    async fn run(
        &self,
        job: &Job,
        document: &mut SubtitleDocument,
        prompt: &str,
        events: &UnboundedSender<WorkerEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let system_prompt = self.build_system_prompt(job, prompt);
        let keys: Vec<u32> = document.entries().keys().copied().collect();
        let total = keys.len();
        let batch_size = job.params.batch_size.max(1);
        info!(
            "Optimizing {} entries in batches of {} for {}",
            total,
            batch_size,
            job.path.display()
        );

        let mut processed = 0usize;
        for chunk_keys in keys.chunks(batch_size) {
            if cancel.is_cancelled() {
                return Err(SubflowError::Worker("optimization canceled".to_string()));
            }

            let chunk: BTreeMap<u32, String> = chunk_keys
                .iter()
                .filter_map(|key| {
                    document
                        .get(*key)
                        .map(|entry| (*key, entry.original_text.clone()))
                })
                .collect();

            let mut updates = BTreeMap::new();
            let mut last_error = None;
            for attempt in 0..=self.config.max_retries {
                match self.optimize_chunk(&system_prompt, &chunk).await {
                    Ok(result) => {
                        updates = result;
                        last_error = None;
                        break;
                    }
                    Err(error) => {
                        debug!("Optimization attempt {} failed: {}", attempt + 1, error);
                        last_error = Some(error);
                    }
                }
            }
            if let Some(error) = last_error {
                return Err(error);
            }

            document.apply_updates(&updates);
            let _ = events.send(WorkerEvent::PartialUpdate(updates));

            processed += chunk_keys.len();
            let percent = if total == 0 {
                100
            } else {
                (processed * 100 / total) as u8
            };
            let _ = events.send(WorkerEvent::Progress {
                percent,
                message: format!("optimized {processed}/{total} entries"),
            });
        }

        let _ = events.send(WorkerEvent::FullUpdate(
            document.entries().values().cloned().collect(),
        ));
        Ok(())
    }
}
