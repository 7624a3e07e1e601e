use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::codec::{DocumentCodec, LayoutMode, SubtitleFormat};
use crate::document::{SubtitleDocument, SubtitleEntry};
use crate::error::{Result, SubflowError};
use crate::job::{Job, JobKind, JobStatus};

/// Notifications a running worker sends back to its driver. Delivery is
/// asynchronous; the worker never blocks on the consumer.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// The job moved to a new in-progress stage
    Stage(JobStatus),
    Progress { percent: u8, message: String },
    /// Incremental text updates keyed by entry
    PartialUpdate(BTreeMap<u32, String>),
    /// Wholesale replacement of the working document's entries
    FullUpdate(Vec<SubtitleEntry>),
}

/// Speech-to-text collaborator. Produces a fresh document from the job's
/// source file, emitting progress along the way. Must poll the
/// cancellation token and stop cooperatively when it fires.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn run(
        &self,
        job: &Job,
        events: &UnboundedSender<WorkerEvent>,
        cancel: &CancellationToken,
    ) -> Result<SubtitleDocument>;
}

/// Text optimization/translation collaborator. Mutates the document in
/// place and mirrors intermediate results through partial/full updates.
#[async_trait]
pub trait Optimizer: Send + Sync {
    async fn run(
        &self,
        job: &Job,
        document: &mut SubtitleDocument,
        prompt: &str,
        events: &UnboundedSender<WorkerEvent>,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Executes one job end to end on behalf of the scheduler
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(
        &self,
        job: &Job,
        events: &UnboundedSender<WorkerEvent>,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Default runner wiring the transcriber, optimizer and codec together
/// according to the job kind
pub struct PipelineRunner {
    transcriber: Arc<dyn Transcriber>,
    optimizer: Arc<dyn Optimizer>,
    codec: Arc<dyn DocumentCodec>,
    layout: LayoutMode,
    output_dir: Option<PathBuf>,
}

impl PipelineRunner {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        optimizer: Arc<dyn Optimizer>,
        codec: Arc<dyn DocumentCodec>,
        layout: LayoutMode,
    ) -> Self {
        Self {
            transcriber,
            optimizer,
            codec,
            layout,
            output_dir: None,
        }
    }

    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    fn output_path(&self, job: &Job) -> PathBuf {
        let stem = job
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        let file_name = format!("{}.{}", stem, SubtitleFormat::Srt.extension());
        let output = match (&self.output_dir, job.path.parent()) {
            (Some(dir), _) => dir.join(file_name),
            (None, Some(parent)) => parent.join(file_name),
            (None, None) => PathBuf::from(file_name),
        };
        if output == job.path {
            // Never clobber the source subtitle file
            output.with_file_name(format!("{}_optimized.srt", stem))
        } else {
            output
        }
    }

    async fn generate(
        &self,
        job: &Job,
        document: &SubtitleDocument,
        events: &UnboundedSender<WorkerEvent>,
    ) -> Result<PathBuf> {
        let _ = events.send(WorkerEvent::Stage(JobStatus::Generating));
        let output = self.output_path(job);
        self.codec
            .save(document, &output, SubtitleFormat::Srt, self.layout, None)
            .await?;
        info!("Generated subtitle file: {}", output.display());
        Ok(output)
    }
}

#[async_trait]
impl JobRunner for PipelineRunner {
    async fn run(
        &self,
        job: &Job,
        events: &UnboundedSender<WorkerEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match job.kind {
            JobKind::TranscribeOnly => {
                let document = self.transcriber.run(job, events, cancel).await?;
                self.generate(job, &document, events).await?;
            }
            JobKind::OptimizeOnly => {
                let mut document = self.codec.load(&job.path).await?;
                let _ = events.send(WorkerEvent::Stage(JobStatus::Optimizing));
                self.optimizer
                    .run(job, &mut document, &job.params.custom_prompt, events, cancel)
                    .await?;
                self.generate(job, &document, events).await?;
            }
            JobKind::SubtitlePipeline => {
                let mut document = self.transcriber.run(job, events, cancel).await?;
                if cancel.is_cancelled() {
                    return Err(SubflowError::Worker("canceled".to_string()));
                }
                let _ = events.send(WorkerEvent::Stage(JobStatus::Optimizing));
                self.optimizer
                    .run(job, &mut document, &job.params.custom_prompt, events, cancel)
                    .await?;
                self.generate(job, &document, events).await?;
            }
        }
        Ok(())
    }
}
