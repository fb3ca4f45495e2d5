/// `load_config` module: loads an optional YAML config file and layers CLI flags over it
/// to produce the core [`TutorialConfig`].
///
/// This module is the only place where untrusted YAML is parsed and mapped to the
/// strongly-typed configuration of the core crate.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into [`FileConfig`] (every key optional)
/// - Merge it with the `generate` flags; a flag that is set always wins
/// - Resolve the source locator (`--repo` or `--dir`, exactly one); `--ref` is only
///   valid with a repository. The access token comes from `--token`, which clap fills
///   from `GITHUB_TOKEN` when the flag is absent
/// - Fail with clear diagnostics; all errors here are configuration errors
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary with exit code 2.
use anyhow::{bail, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tutorgen_core::config::TutorialConfig;
use tutorgen_core::crawl::SourceLocator;

use crate::cli::GenerateArgs;

/// Keys accepted in the YAML config file. Same meaning as the `generate` flags.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub repo: Option<String>,
    pub reference: Option<String>,
    pub dir: Option<PathBuf>,
    pub name: Option<String>,
    pub output: Option<PathBuf>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub max_size: Option<u64>,
    pub max_abstractions: Option<usize>,
    pub max_parse_retries: Option<u32>,
    pub cache_file: Option<PathBuf>,
    pub no_cache: Option<bool>,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            bail!("Failed to read config file {:?}: {}", path_ref, e);
        }
    };

    match serde_yaml::from_str::<Option<FileConfig>>(&content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf.unwrap_or_default())
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            bail!("Failed to parse config YAML: {e}");
        }
    }
}

/// Where cached model responses live, or `None` when caching is disabled.
pub fn resolve_cache_file(args: &GenerateArgs, file: &FileConfig) -> Option<PathBuf> {
    if args.no_cache || file.no_cache.unwrap_or(false) {
        return None;
    }
    Some(
        args.cache_file
            .clone()
            .or_else(|| file.cache_file.clone())
            .unwrap_or_else(|| PathBuf::from(tutorgen_core::cache::DEFAULT_CACHE_FILE)),
    )
}

/// Merge flags over the file config into a [`TutorialConfig`].
pub fn build_config(args: &GenerateArgs, file: &FileConfig) -> Result<TutorialConfig> {
    let repo = args.repo.clone().or_else(|| file.repo.clone());
    let dir = args.dir.clone().or_else(|| file.dir.clone());
    let reference = args.reference.clone().or_else(|| file.reference.clone());
    let source = match (repo, dir) {
        (Some(_), Some(_)) => bail!("Specify either a repository URL or a local directory, not both"),
        (None, None) => bail!("A source is required: pass --repo <URL> or --dir <PATH>"),
        (Some(url), None) => SourceLocator::Git {
            url,
            reference,
            // clap already falls back to GITHUB_TOKEN for --token.
            token: args.token.clone().filter(|t| !t.trim().is_empty()),
        },
        (None, Some(_)) if reference.is_some() => {
            bail!("--ref only applies to a repository source (--repo), not to --dir")
        }
        (None, Some(dir)) => SourceLocator::Local(dir),
    };

    let output = args
        .output
        .clone()
        .or_else(|| file.output.clone())
        .unwrap_or_else(|| PathBuf::from("output"));

    let mut config = TutorialConfig::new(source, output);
    config.project_name = args.name.clone().or_else(|| file.name.clone());
    if let Some(include) = pick_list(&args.include, &file.include) {
        config.include_patterns = include;
    }
    if let Some(exclude) = pick_list(&args.exclude, &file.exclude) {
        config.exclude_patterns = exclude;
    }
    if let Some(max) = args.max_size.or(file.max_size) {
        config.max_file_size = max;
    }
    if let Some(max) = args.max_abstractions.or(file.max_abstractions) {
        if max == 0 {
            bail!("--max-abstractions must be at least 1");
        }
        config.max_abstractions = max;
    }
    if let Some(retries) = file.max_parse_retries {
        config.max_parse_retries = retries;
    }
    Ok(config)
}

fn pick_list(flag: &[String], file: &Option<Vec<String>>) -> Option<Vec<String>> {
    if !flag.is_empty() {
        Some(flag.to_vec())
    } else {
        file.clone()
    }
}
