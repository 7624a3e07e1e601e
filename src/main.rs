//! Subflow - batch subtitle transcription and optimization
//!
//! Entry point wiring the CLI to the workflow: jobs are queued, driven
//! sequentially by the batch scheduler, and followed by the configured
//! completion action.

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subflow::cli::{Args, Commands};
use subflow::config::Config;
use subflow::workflow::Workflow;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            // Try to load config.toml from current directory first
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Batch {
            inputs,
            kind,
            when_done,
            prompt,
        } => {
            if let Some(policy) = when_done {
                config.completion.policy = policy;
            }
            let mut workflow = Workflow::new(config)?;
            workflow.run_batch(&inputs, kind, prompt.as_deref()).await?;
        }
        Commands::Optimize {
            inputs,
            when_done,
            prompt,
        } => {
            if let Some(policy) = when_done {
                config.completion.policy = policy;
            }
            let mut workflow = Workflow::new(config)?;
            workflow.optimize_queue(&inputs, prompt.as_deref()).await?;
        }
        Commands::Transcribe { input, output } => {
            info!("Transcribing media file: {}", input.display());
            let mut workflow = Workflow::new(config)?;
            workflow.transcribe_file(&input, &output).await?;
        }
        Commands::Convert {
            input,
            output,
            style,
        } => {
            info!("Converting subtitle file: {}", input.display());
            let mut workflow = Workflow::new(config)?;
            workflow.convert(&input, &output, style.as_deref()).await?;
        }
        Commands::Init { path } => {
            Config::default().save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }

    info!("Done");
    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".subflow").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "subflow.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer().with_target(false);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
