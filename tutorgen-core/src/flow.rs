//! Generic sequential stage executor.
//!
//! A [`Flow`] owns an ordered list of [`Stage`]s and threads one context value
//! through them by ownership transfer: each stage consumes the value produced
//! by its predecessor and returns the next one. Stage N+1 never starts before
//! stage N has returned. Cancellation is honored between stages only.

use async_trait::async_trait;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::error::{FlowError, StageError};

/// One unit of pipeline work.
#[async_trait]
pub trait Stage<C: Send + 'static>: Send + Sync {
    /// Stable name, used in logs and in error reports.
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: C) -> Result<C, StageError>;
}

pub struct Flow<C: Send + 'static> {
    stages: Vec<Box<dyn Stage<C>>>,
    cancel: CancellationToken,
}

impl<C: Send + 'static> Default for Flow<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send + 'static> Flow<C> {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Append a stage.
    pub fn then(mut self, stage: impl Stage<C> + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Use `token` to stop the run at the next stage boundary.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order and return the final context.
    pub async fn run(&self, ctx: C) -> Result<C, FlowError> {
        let mut ctx = ctx;
        for (position, stage) in self.stages.iter().enumerate() {
            let name = stage.name();
            if self.cancel.is_cancelled() {
                info!(next_stage = name, "Run cancelled between stages");
                return Err(FlowError::Cancelled { next_stage: name });
            }

            info!(stage = name, position = position + 1, total = self.stages.len(), "Stage starting");
            let started = Instant::now();
            let span = info_span!("stage", stage = name);
            ctx = match stage.run(ctx).instrument(span).await {
                Ok(next) => next,
                Err(source) => {
                    error!(stage = name, kind = source.kind(), error = %source, "Stage failed");
                    return Err(FlowError::Stage {
                        stage: name,
                        source,
                    });
                }
            };
            info!(
                stage = name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Stage finished"
            );
        }
        Ok(ctx)
    }
}
