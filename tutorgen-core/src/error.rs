//! Error taxonomy of the pipeline.
//!
//! Per-file crawl problems and dropped edges are not errors; they are recorded
//! in the context as warnings. Everything in this module aborts the run.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single provider round-trip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("provider error: {0}")]
    Provider(String),
}

impl ProviderError {
    /// Transient failures are retried by the gateway; the rest are fatal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout | ProviderError::RateLimited { .. } | ProviderError::Provider(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Timeout => "timeout",
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::Auth(_) => "auth",
            ProviderError::MalformedRequest(_) => "malformed_request",
            ProviderError::Provider(_) => "provider",
        }
    }
}

/// Final outcome of a gateway call that did not produce a response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{source} (after {attempts} attempt(s))")]
pub struct GatewayError {
    pub attempts: u32,
    #[source]
    pub source: ProviderError,
}

/// A model response that does not match the expected structure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("response is not valid YAML: {0}")]
    InvalidYaml(String),

    #[error("unexpected response structure: {0}")]
    Schema(String),

    #[error("file index {index} is out of range (corpus has {len} files)")]
    FileIndexOutOfRange { index: usize, len: usize },

    #[error("response contained no entries")]
    Empty,
}

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("invalid glob pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("source root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("git clone of {url} failed: {message}")]
    Clone { url: String, message: String },

    #[error("no files matched the include/exclude patterns")]
    NoFiles,

    #[error("I/O error while crawling: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of one stage.
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Crawl(#[from] CrawlError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("{source} (after {attempts} attempt(s))")]
    Parse {
        attempts: u32,
        #[source]
        source: ParseError,
    },

    #[error("stage input `{0}` is missing from the context")]
    MissingInput(&'static str),

    #[error("context artifact `{0}` was already produced by an earlier stage")]
    AlreadySet(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StageError {
    /// Stable error category reported to the user.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::Crawl(CrawlError::InvalidPattern { .. }) => "config",
            StageError::Crawl(CrawlError::NoFiles) => "config",
            StageError::Crawl(_) => "io",
            StageError::Gateway(e) => e.source.kind(),
            StageError::Parse { .. } => "parse",
            StageError::MissingInput(_) | StageError::AlreadySet(_) => "internal",
            StageError::Io(_) => "io",
        }
    }
}

/// Failure of a whole flow run, tagged with the stage it happened in.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("stage `{stage}` failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: StageError,
    },

    #[error("run cancelled before stage `{next_stage}`")]
    Cancelled { next_stage: &'static str },
}

impl FlowError {
    pub fn stage(&self) -> &'static str {
        match self {
            FlowError::Stage { stage, .. } => stage,
            FlowError::Cancelled { next_stage } => next_stage,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::Stage { source, .. } => source.kind(),
            FlowError::Cancelled { .. } => "cancelled",
        }
    }
}
