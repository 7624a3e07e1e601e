use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SubflowError};

/// What a job does when it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum JobKind {
    /// Transcribe, optimize and generate the final subtitle file
    SubtitlePipeline,
    /// Speech-to-text only
    TranscribeOnly,
    /// Optimize/translate an existing subtitle file
    OptimizeOnly,
}

impl JobKind {
    /// First in-progress status a job of this kind enters when started
    pub fn initial_running_status(self) -> JobStatus {
        match self {
            JobKind::SubtitlePipeline | JobKind::TranscribeOnly => JobStatus::Transcribing,
            JobKind::OptimizeOnly => JobStatus::Optimizing,
        }
    }
}

/// Job lifecycle: Pending -> (Transcribing | Optimizing | Generating)
/// -> (Completed | Failed). Cancel forces any running state back to Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Transcribing,
    Optimizing,
    Generating,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_running(self) -> bool {
        matches!(
            self,
            JobStatus::Transcribing | JobStatus::Optimizing | JobStatus::Generating
        )
    }
}

/// Execution parameters, opaque to the scheduler and passed through to the
/// collaborator that runs the job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParams {
    /// Target language for translation
    pub target_language: String,
    /// Run the text optimization pass
    pub need_optimize: bool,
    /// Run the translation pass
    pub need_translate: bool,
    /// Entries per optimization request
    pub batch_size: usize,
    /// Worker threads available to the executing collaborator
    pub thread_num: usize,
    /// Free-form prompt steering optimization/translation
    pub custom_prompt: String,
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            target_language: "en".to_string(),
            need_optimize: true,
            need_translate: false,
            batch_size: 10,
            thread_num: 4,
            custom_prompt: String::new(),
        }
    }
}

/// A unit of work, identified by its source file path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub path: PathBuf,
    pub kind: JobKind,
    pub status: JobStatus,
    pub params: JobParams,
    /// Display name, probed from the source file
    pub file_name: String,
    /// Source file size in bytes, probed from the source file
    pub file_size: u64,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new<P: Into<PathBuf>>(path: P, kind: JobKind, params: JobParams) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            path,
            kind,
            status: JobStatus::Pending,
            params,
            file_name,
            file_size: 0,
            created_at: Utc::now(),
        }
    }
}

/// Creates jobs from source files, probing the metadata hosts display.
/// The probe is for presentation only; the scheduler never reads it.
pub struct JobFactory;

impl JobFactory {
    pub fn create<P: AsRef<Path>>(path: P, kind: JobKind, params: JobParams) -> Result<Job> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SubflowError::FileNotFound(path.display().to_string()));
        }

        let mut job = Job::new(path, kind, params);
        job.file_size = std::fs::metadata(path)?.len();
        debug!(
            "Created {:?} job for {} ({} bytes)",
            kind,
            path.display(),
            job.file_size
        );
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_status_classification() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(JobStatus::Transcribing.is_running());
        assert!(JobStatus::Optimizing.is_running());
        assert!(JobStatus::Generating.is_running());
        assert!(!JobStatus::Pending.is_running());
        assert!(!JobStatus::Completed.is_running());
    }

    #[test]
    fn test_initial_running_status_per_kind() {
        assert_eq!(
            JobKind::SubtitlePipeline.initial_running_status(),
            JobStatus::Transcribing
        );
        assert_eq!(
            JobKind::TranscribeOnly.initial_running_status(),
            JobStatus::Transcribing
        );
        assert_eq!(
            JobKind::OptimizeOnly.initial_running_status(),
            JobStatus::Optimizing
        );
    }

    #[test]
    fn test_factory_probes_metadata() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"1\n00:00:00,000 --> 00:00:01,000\nhi\n")
            .unwrap();

        let job = JobFactory::create(file.path(), JobKind::OptimizeOnly, JobParams::default())
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.file_size > 0);
        assert!(!job.file_name.is_empty());
    }

    #[test]
    fn test_factory_rejects_missing_file() {
        let result = JobFactory::create(
            "/no/such/file.srt",
            JobKind::TranscribeOnly,
            JobParams::default(),
        );
        assert!(matches!(result, Err(SubflowError::FileNotFound(_))));
    }
}
