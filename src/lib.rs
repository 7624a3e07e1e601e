//! Subflow - batch subtitle transcription and optimization
//!
//! Queues media and subtitle files, drives them through transcription and
//! LLM-backed optimization one job at a time, and runs a configurable
//! completion action once the batch finishes.

pub mod cli;
pub mod codec;
pub mod completion;
pub mod config;
pub mod document;
pub mod error;
pub mod intake;
pub mod job;
pub mod optimize;
pub mod scheduler;
pub mod transcribe;
pub mod worker;
pub mod workflow;
