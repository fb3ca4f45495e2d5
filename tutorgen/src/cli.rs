///
/// This module implements the CLI interface for tutorgen: command parsing,
/// argument validation, the async entrypoint and the user-visible failure report.
///
/// All pipeline logic (crawler, gateway, stages) lives in the [`tutorgen-core`] crate.
/// This module is strictly CLI glue: it turns flags into a [`TutorialConfig`], builds the
/// provider and gateway, and runs the pipeline.
///
/// ## How To Use
/// - For command-line users: run the installed `tutorgen` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// ## Exit codes
/// See [`exit_code`]: 0 success, 1 pipeline failure, 2 configuration error, 130 cancelled.
///
/// [`tutorgen-core`]: ../../tutorgen-core/
/// [`TutorialConfig`]: tutorgen_core::config::TutorialConfig
use crate::load_config::{build_config, load_config, resolve_cache_file, FileConfig};
use crate::provider::{HttpProvider, HttpProviderConfig};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tutorgen_core::cache::ResponseCache;
use tutorgen_core::error::FlowError;
use tutorgen_core::gateway::{LlmGateway, RetryPolicy};
use tutorgen_core::pipeline::generate_tutorial;

/// CLI for tutorgen: turn a codebase into a beginner-friendly tutorial.
#[derive(Parser)]
#[clap(
    name = "tutorgen",
    version,
    about = "Generate a multi-chapter tutorial for a codebase with an LLM"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl a repository or directory and write a tutorial for it
    Generate(GenerateArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct GenerateArgs {
    /// URL of a git repository (https or ssh); `/tree/<ref>/<path>` URLs are understood
    #[clap(long, conflicts_with = "dir")]
    pub repo: Option<String>,

    /// Branch, tag or commit to check out (with --repo)
    #[clap(long = "ref", conflicts_with = "dir")]
    pub reference: Option<String>,

    /// Path to a local directory
    #[clap(long)]
    pub dir: Option<PathBuf>,

    /// Project name; derived from the repository or directory when absent
    #[clap(short = 'n', long)]
    pub name: Option<String>,

    /// Access token for private repositories
    #[clap(short = 't', long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Output directory; the tutorial is written to <OUTPUT>/<NAME>/
    #[clap(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Include file patterns (repeatable); replaces the default set
    #[clap(short = 'i', long = "include")]
    pub include: Vec<String>,

    /// Exclude file patterns (repeatable); replaces the default set
    #[clap(short = 'e', long = "exclude")]
    pub exclude: Vec<String>,

    /// Maximum file size in bytes
    #[clap(short = 's', long)]
    pub max_size: Option<u64>,

    /// Number of abstractions to ask for
    #[clap(long)]
    pub max_abstractions: Option<usize>,

    /// Do not read or write the response cache file
    #[clap(long)]
    pub no_cache: bool,

    /// Response cache file
    #[clap(long)]
    pub cache_file: Option<PathBuf>,

    /// Optional YAML config file; flags override its values
    #[clap(long)]
    pub config: Option<PathBuf>,
}

/// A configuration problem detected before the pipeline started.
#[derive(Debug)]
pub struct ConfigError(pub anyhow::Error);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl std::error::Error for ConfigError {}

fn config_error(e: anyhow::Error) -> anyhow::Error {
    anyhow::Error::new(ConfigError(e))
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Generate(args) => {
            let file = match &args.config {
                Some(path) => load_config(path).map_err(config_error)?,
                None => FileConfig::default(),
            };
            let config = build_config(&args, &file).map_err(config_error)?;
            config.trace_loaded();

            let provider_config = HttpProviderConfig::from_env().map_err(config_error)?;
            let policy = RetryPolicy {
                call_timeout: provider_config.timeout,
                ..RetryPolicy::default()
            };
            let provider = HttpProvider::new(provider_config).map_err(config_error)?;
            let cache = match resolve_cache_file(&args, &file) {
                Some(path) => ResponseCache::open(&path).map_err(|e| {
                    config_error(anyhow::anyhow!(
                        "Failed to open response cache {}: {e}",
                        path.display()
                    ))
                })?,
                None => ResponseCache::in_memory(),
            };
            let gateway = Arc::new(LlmGateway::new(Arc::new(provider), cache, policy));

            tracing::info!(command = "generate", "Starting tutorial generation");
            match generate_tutorial(config, gateway, cancel).await {
                Ok(report) => {
                    tracing::info!(command = "generate", ?report, "Tutorial generation complete");
                    println!(
                        "Tutorial for {} written to {} ({} chapters)",
                        report.project_name,
                        report.output_path.display(),
                        report.chapter_files.len()
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "generate", error = %e, "Tutorial generation failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}

/// Process exit code for a failed run.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<FlowError>() {
        Some(FlowError::Cancelled { .. }) => 130,
        Some(FlowError::Stage { .. }) => 1,
        None => 2,
    }
}

/// The one-line failure report written to stderr.
pub fn failure_line(err: &anyhow::Error) -> String {
    match err.downcast_ref::<FlowError>() {
        Some(flow) => {
            let message = match flow {
                FlowError::Stage { source, .. } => source.to_string(),
                FlowError::Cancelled { .. } => flow.to_string(),
            };
            format!(
                "error: stage={} kind={}: {}",
                flow.stage(),
                flow.kind(),
                message
            )
        }
        None => format!("error: stage=startup kind=config: {err:#}"),
    }
}
