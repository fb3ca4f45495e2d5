//! High-level pipeline: orchestrates crawl → identify → analyze → order → write → assemble.
//!
//! This module wires the six stages into a [`Flow`] over [`TutorialContext`]
//! and runs it once for a given [`TutorialConfig`]:
//!   - Crawls the source tree (local or cloned) into a sorted file list
//!   - Asks the model for abstractions, then for their relationships
//!   - Orders the abstractions into chapters without any model call
//!   - Writes each chapter in order, then assembles and writes the tutorial
//!
//! # Responsibilities
//! - Fail-fast orchestration: the first failing stage ends the run and nothing is written
//! - Cancellation between stages through a [`CancellationToken`]
//! - Aggregates a [`TutorialReport`] for the caller (output path, warnings, call counters)
//!
//! # Callable From
//! - The CLI crate and integration tests
//! - Expects a ready [`LlmGateway`]; provider, cache and retry policy are the caller's choice
//!
//! # Navigation
//! - Main entrypoint: [`generate_tutorial`]
//! - Flow construction only: [`tutorial_flow`]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::TutorialConfig;
use crate::context::TutorialContext;
use crate::crawl::CrawlStage;
use crate::error::FlowError;
use crate::flow::Flow;
use crate::gateway::{GatewayStats, LlmGateway};
use crate::model::{GraphConsistencyWarning, SkippedFile};
use crate::stages::{
    AbstractionIdentifier, ChapterOrderer, ChapterWriter, RelationshipAnalyzer, TutorialAssembler,
};

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct TutorialReport {
    pub project_name: String,
    /// Directory holding `index.md` and the chapter files.
    pub output_path: PathBuf,
    pub chapter_files: Vec<String>,
    pub skipped_files: Vec<SkippedFile>,
    /// Clarifying re-prompts per stage name.
    pub reprompts: BTreeMap<&'static str, u32>,
    pub warnings: Vec<GraphConsistencyWarning>,
    pub gateway: GatewayStats,
}

/// The six tutorial stages in their fixed order.
pub fn tutorial_flow(gateway: Arc<LlmGateway>) -> Flow<TutorialContext> {
    Flow::new()
        .then(CrawlStage)
        .then(AbstractionIdentifier::new(Arc::clone(&gateway)))
        .then(RelationshipAnalyzer::new(Arc::clone(&gateway)))
        .then(ChapterOrderer)
        .then(ChapterWriter::new(gateway))
        .then(TutorialAssembler)
}

/// Run the whole pipeline once.
pub async fn generate_tutorial(
    config: TutorialConfig,
    gateway: Arc<LlmGateway>,
    cancel: CancellationToken,
) -> Result<TutorialReport, FlowError> {
    info!(source = %config.source, "[PIPELINE] Starting tutorial generation");
    let flow = tutorial_flow(Arc::clone(&gateway)).with_cancellation(cancel);

    let ctx = match flow.run(TutorialContext::new(config)).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(stage = e.stage(), kind = e.kind(), error = %e, "[PIPELINE][ERROR] Tutorial generation aborted");
            return Err(e);
        }
    };

    let report = build_report(&ctx, gateway.stats()).map_err(|source| FlowError::Stage {
        stage: "assemble",
        source,
    })?;
    for w in &report.warnings {
        warn!(warning = %w, "[PIPELINE] Relationship warning");
    }
    info!(
        project = %report.project_name,
        path = %report.output_path.display(),
        chapters = report.chapter_files.len(),
        skipped_files = report.skipped_files.len(),
        provider_calls = report.gateway.provider_calls,
        cache_hits = report.gateway.cache_hits,
        retries = report.gateway.retries,
        "[PIPELINE] Tutorial generation complete"
    );
    Ok(report)
}

fn build_report(
    ctx: &TutorialContext,
    gateway: GatewayStats,
) -> Result<TutorialReport, crate::error::StageError> {
    Ok(TutorialReport {
        project_name: ctx.project_name().to_string(),
        output_path: ctx.output_path()?.to_path_buf(),
        chapter_files: ctx
            .tree()?
            .chapters
            .iter()
            .map(|c| c.file_name.clone())
            .collect(),
        skipped_files: ctx.crawl_report()?.skipped.clone(),
        reprompts: ctx.reprompts().clone(),
        warnings: ctx.warnings().to_vec(),
        gateway,
    })
}
