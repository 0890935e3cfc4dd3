//! Extraction oracle trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GraphloomResult;
use crate::types::{Chunk, Extraction};

/// Context passed alongside a chunk to improve extraction quality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionContext {
    /// Title of the article the chunk came from, if known.
    pub article_title: Option<String>,
    /// ISO language code of the text, if known.
    pub language: Option<String>,
}

/// The external extraction collaborator, treated as a black box.
///
/// Implementations are expected to be slow and unreliable; they signal
/// transient conditions (timeouts, rate limiting) through error codes
/// so the orchestrator can retry with backoff. All retry logic lives in
/// the orchestrator, never in the oracle.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    /// Extract candidate entities and relations from one chunk.
    async fn extract(
        &self,
        chunk: &Chunk,
        context: &ExtractionContext,
    ) -> GraphloomResult<Extraction>;

    /// Human-readable oracle name, for logging.
    fn name(&self) -> &str;
}
