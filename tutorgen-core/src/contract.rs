//! # contract: the seam between the pipeline and the language model
//!
//! This module defines the single trait ([`LlmProvider`]) that concrete model
//! integrations implement. The pipeline never talks to a provider directly:
//! every call goes through [`crate::gateway::LlmGateway`], which adds caching,
//! retries and per-key call collapsing on top of the raw round-trip.
//!
//! ## Interface & Extensibility
//! - Implement [`LlmProvider`] for a new backend (HTTP API, local model, test double).
//! - Map backend failures onto [`ProviderError`]; the variant decides whether the
//!   gateway retries (`Timeout`, `RateLimited`, `Provider`) or gives up (`Auth`,
//!   `MalformedRequest`).
//! - A provider performs exactly one round-trip per call. No caching, no retries.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall` so tests can script responses and
//!   assert on the number of round-trips.

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::ProviderError;

/// One blocking prompt → response round-trip to a language model.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send `prompt` and return the raw response text.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}
