use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::codec::{DocumentCodec, FileCodec, SubtitleFormat};
use crate::completion::{CompletionDispatcher, SystemHostControl};
use crate::config::Config;
use crate::document::{EntryColumn, SubtitleDocument};
use crate::error::{Result, SubflowError};
use crate::intake::FileIntakeQueue;
use crate::job::{JobFactory, JobKind, JobParams};
use crate::optimize::LlmOptimizer;
use crate::scheduler::{BatchScheduler, SchedulerEvent};
use crate::transcribe::CliTranscriber;
use crate::worker::{Optimizer, PipelineRunner, Transcriber, WorkerEvent};

const MEDIA_EXTENSIONS: [&str; 13] = [
    "mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "mp3", "wav", "flac", "m4a", "aac", "ogg",
];
const SUBTITLE_EXTENSIONS: [&str; 3] = ["srt", "ass", "json"];

/// Wires the intake queue, job factory, scheduler, collaborators and
/// completion dispatcher together for a host
pub struct Workflow {
    config: Config,
    codec: Arc<dyn DocumentCodec>,
    transcriber: Arc<dyn Transcriber>,
    optimizer: Arc<dyn Optimizer>,
    queue: FileIntakeQueue,
    document: SubtitleDocument,
    scheduler: BatchScheduler,
    scheduler_events: UnboundedReceiver<SchedulerEvent>,
    completion: CompletionDispatcher,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        let transcriber: Arc<dyn Transcriber> =
            Arc::new(CliTranscriber::new(config.transcribe.clone()));
        let optimizer: Arc<dyn Optimizer> = Arc::new(LlmOptimizer::new(config.optimize.clone()));
        Self::with_collaborators(config, transcriber, optimizer, Arc::new(FileCodec))
    }

    /// Construction seam for hosts and tests that bring their own
    /// collaborators
    pub fn with_collaborators(
        config: Config,
        transcriber: Arc<dyn Transcriber>,
        optimizer: Arc<dyn Optimizer>,
        codec: Arc<dyn DocumentCodec>,
    ) -> Result<Self> {
        let runner = PipelineRunner::new(
            transcriber.clone(),
            optimizer.clone(),
            codec.clone(),
            config.subtitle.layout,
        );
        let (scheduler, scheduler_events) = BatchScheduler::new(Arc::new(runner));
        let completion =
            CompletionDispatcher::new(config.completion.policy, Arc::new(SystemHostControl))
                .with_grace(Duration::from_secs(config.completion.grace_secs));

        Ok(Self {
            config,
            codec,
            transcriber,
            optimizer,
            queue: FileIntakeQueue::new(),
            document: SubtitleDocument::new(),
            scheduler,
            scheduler_events,
            completion,
        })
    }

    /// Handle to the scheduler for hosts that drive it directly
    pub fn scheduler(&self) -> BatchScheduler {
        self.scheduler.clone()
    }

    fn default_params(&self) -> JobParams {
        JobParams {
            target_language: self.config.optimize.target_language.clone(),
            need_optimize: self.config.optimize.need_optimize,
            need_translate: self.config.optimize.need_translate,
            batch_size: self.config.optimize.batch_size,
            thread_num: self.config.optimize.thread_num,
            custom_prompt: String::new(),
        }
    }

    /// Expand files and directories into processable source paths,
    /// filtered by the extensions the given job kind accepts
    pub fn collect_inputs(inputs: &[PathBuf], kind: JobKind) -> Vec<PathBuf> {
        let accepted: &[&str] = match kind {
            JobKind::OptimizeOnly => &SUBTITLE_EXTENSIONS,
            _ => &MEDIA_EXTENSIONS,
        };
        let matches = |path: &Path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| accepted.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        };

        let mut files = Vec::new();
        for input in inputs {
            if input.is_dir() {
                for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
                    if entry.file_type().is_file() && matches(entry.path()) {
                        files.push(entry.path().to_path_buf());
                    }
                }
            } else if matches(input) {
                files.push(input.clone());
            } else {
                warn!("Skipping unsupported input: {}", input.display());
            }
        }
        files
    }

    /// Queue source files and run them as one sequential batch, then
    /// evaluate the completion policy
    pub async fn run_batch(
        &mut self,
        inputs: &[PathBuf],
        kind: JobKind,
        custom_prompt: Option<&str>,
    ) -> Result<()> {
        let files = Self::collect_inputs(inputs, kind);
        if files.is_empty() {
            return Err(SubflowError::EmptyBatch);
        }
        info!("Found {} files to process", files.len());
        self.queue.enqueue(files);

        let mut params = self.default_params();
        if let Some(prompt) = custom_prompt {
            params.custom_prompt = prompt.to_string();
        }
        while let Some(path) = self.queue.dequeue_next() {
            let job = JobFactory::create(&path, kind, params.clone())?;
            match self.scheduler.add_job(job).await {
                Ok(()) => {}
                Err(SubflowError::DuplicateJob(duplicate)) => {
                    warn!("Skipping duplicate source file: {}", duplicate);
                }
                Err(other) => return Err(other),
            }
        }

        let total = self.scheduler.jobs().await.len() as u64;
        let progress = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
            progress.set_style(style);
        }

        self.scheduler.start_batch().await?;
        while let Some(event) = self.scheduler_events.recv().await {
            match event {
                SchedulerEvent::JobStarted(path) => {
                    progress.set_message(format!("processing {}", path.display()));
                }
                SchedulerEvent::JobProgress { message, .. } => {
                    progress.set_message(message);
                }
                SchedulerEvent::JobFinished(path) => {
                    info!("Finished: {}", path.display());
                    progress.inc(1);
                }
                SchedulerEvent::JobFailed(path, message) => {
                    warn!("Failed: {}: {}", path.display(), message);
                    progress.inc(1);
                }
                SchedulerEvent::BatchFinished => break,
            }
        }
        progress.finish_with_message("batch finished");

        self.completion.dispatch().await
    }

    /// Queue subtitle files and optimize them strictly one at a time. The
    /// queue never advances on its own; the next file is pulled only after
    /// the previous one reached a terminal state, success or failure.
    pub async fn optimize_queue(
        &mut self,
        inputs: &[PathBuf],
        custom_prompt: Option<&str>,
    ) -> Result<()> {
        let files = Self::collect_inputs(inputs, JobKind::OptimizeOnly);
        if files.is_empty() {
            return Err(SubflowError::EmptyBatch);
        }
        self.queue.enqueue(files);

        while let Some(path) = self.queue.dequeue_next() {
            match self.optimize_one(&path, custom_prompt).await {
                Ok(output) => info!("Optimized {} -> {}", path.display(), output.display()),
                Err(error) => warn!("Failed to optimize {}: {}", path.display(), error),
            }
        }

        self.completion.dispatch().await
    }

    async fn optimize_one(
        &mut self,
        path: &Path,
        custom_prompt: Option<&str>,
    ) -> Result<PathBuf> {
        let mut params = self.default_params();
        if let Some(prompt) = custom_prompt {
            params.custom_prompt = prompt.to_string();
        }
        let job = JobFactory::create(path, JobKind::OptimizeOnly, params)?;

        self.document = self.codec.load(path).await?;
        let (worker_events, mut worker_receiver) = unbounded_channel();
        let logger = tokio::spawn(async move {
            while let Some(event) = worker_receiver.recv().await {
                if let WorkerEvent::Progress { percent, message } = event {
                    info!("{}% {}", percent, message);
                }
            }
        });

        let cancel = CancellationToken::new();
        let result = self
            .optimizer
            .run(
                &job,
                &mut self.document,
                &job.params.custom_prompt,
                &worker_events,
                &cancel,
            )
            .await;
        drop(worker_events);
        let _ = logger.await;
        result?;

        let output = self.output_path(path);
        self.codec
            .save(
                &self.document,
                &output,
                self.config.subtitle.format,
                self.config.subtitle.layout,
                None,
            )
            .await?;
        Ok(output)
    }

    fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        let extension = self.config.subtitle.format.extension();
        let candidate = input.with_file_name(format!("{}.{}", stem, extension));
        if candidate == input {
            input.with_file_name(format!("{}_optimized.{}", stem, extension))
        } else {
            candidate
        }
    }

    /// Transcribe one media file and write the subtitle to the given
    /// output path
    pub async fn transcribe_file(&mut self, input: &Path, output: &Path) -> Result<()> {
        let job = JobFactory::create(input, JobKind::TranscribeOnly, self.default_params())?;
        let (worker_events, mut worker_receiver) = unbounded_channel();
        tokio::spawn(async move { while worker_receiver.recv().await.is_some() {} });

        let cancel = CancellationToken::new();
        self.document = self.transcriber.run(&job, &worker_events, &cancel).await?;
        let format = SubtitleFormat::from_extension(output).unwrap_or(SubtitleFormat::Srt);
        self.codec
            .save(
                &self.document,
                output,
                format,
                self.config.subtitle.layout,
                None,
            )
            .await
    }

    /// Convert a subtitle file to another format, optionally applying a
    /// style payload for styled export
    pub async fn convert(
        &mut self,
        input: &Path,
        output: &Path,
        style: Option<&str>,
    ) -> Result<()> {
        let format = SubtitleFormat::from_extension(output)?;
        self.document = self.codec.load(input).await?;
        self.codec
            .save(
                &self.document,
                output,
                format,
                self.config.subtitle.layout,
                style,
            )
            .await
    }

    /// Currently loaded document
    pub fn document(&self) -> &SubtitleDocument {
        &self.document
    }

    pub async fn load_document(&mut self, path: &Path) -> Result<()> {
        self.document = self.codec.load(path).await?;
        Ok(())
    }

    /// Merge the given rows of the loaded document
    pub fn merge_rows(&mut self, rows: &[usize]) -> Result<bool> {
        self.document.merge_rows(rows)
    }

    /// Edit one cell of the loaded document
    pub fn set_cell(&mut self, key: u32, column: EntryColumn, value: &str) -> Result<()> {
        self.document.set_cell(key, column, value)
    }
}
