use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::completion::CompletionPolicy;
use crate::job::JobKind;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a batch of media files through transcription and optimization
    Batch {
        /// Media files or directories to process
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// What each job does
        #[arg(short, long, value_enum, default_value = "subtitle-pipeline")]
        kind: JobKind,

        /// Action taken once the batch finishes
        #[arg(long, value_enum)]
        when_done: Option<CompletionPolicy>,

        /// Extra context handed to the optimizer (speaker names, jargon)
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Optimize existing subtitle files, strictly one at a time
    Optimize {
        /// Subtitle files or directories to process
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Action taken once the queue drains
        #[arg(long, value_enum)]
        when_done: Option<CompletionPolicy>,

        /// Extra context handed to the optimizer
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Transcribe one media file to a subtitle file
    Transcribe {
        /// Input media file
        input: PathBuf,

        /// Output subtitle path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Convert a subtitle file to another format
    Convert {
        /// Input subtitle file
        input: PathBuf,

        /// Output subtitle path; the extension selects the format
        #[arg(short, long)]
        output: PathBuf,

        /// ASS style block pasted into styled exports
        #[arg(long)]
        style: Option<String>,
    },

    /// Write a default configuration file
    Init {
        /// Where to write it
        #[arg(short, long, default_value = "config.toml")]
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_defaults() {
        let args = Args::parse_from(["subflow", "batch", "a.mp4", "b.mp4"]);
        match args.command {
            Commands::Batch {
                inputs,
                kind,
                when_done,
                prompt,
            } => {
                assert_eq!(inputs.len(), 2);
                assert_eq!(kind, JobKind::SubtitlePipeline);
                assert!(when_done.is_none());
                assert!(prompt.is_none());
            }
            _ => panic!("expected batch command"),
        }
    }

    #[test]
    fn test_when_done_policy_parses() {
        let args = Args::parse_from(["subflow", "batch", "a.mp4", "--when-done", "shutdown"]);
        match args.command {
            Commands::Batch { when_done, .. } => {
                assert_eq!(when_done, Some(CompletionPolicy::Shutdown));
            }
            _ => panic!("expected batch command"),
        }
    }

    #[test]
    fn test_batch_requires_inputs() {
        assert!(Args::try_parse_from(["subflow", "batch"]).is_err());
    }
}
