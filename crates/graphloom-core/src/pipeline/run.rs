//! Run lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resolver::{DroppedRelation, TypeConflict};
use crate::types::EntityType;

/// Metadata for the article a run ingests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleMeta {
    /// Caller-supplied article id; doubles as the scratch namespace
    /// suffix and the article-scope merge key.
    pub id: String,
    pub url: Option<String>,
    pub title: Option<String>,
}

impl ArticleMeta {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Pipeline run state machine.
///
/// Terminal states are `Succeeded`, `Partial` and `Failed`. `Partial`
/// means some chunks failed permanently but at least one extraction
/// succeeded and its results were merged and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Created,
    Ingesting,
    Extracting,
    Merging,
    Summarizing,
    Succeeded,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Partial | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Ingesting => "INGESTING",
            Self::Extracting => "EXTRACTING",
            Self::Merging => "MERGING",
            Self::Summarizing => "SUMMARIZING",
            Self::Succeeded => "SUCCEEDED",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chunk whose extraction failed after all retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub chunk_id: String,
    pub chunk_index: usize,
    pub error: String,
    /// Attempts made, including the first.
    pub attempts: usize,
}

/// Everything a run excluded or failed on. Always populated, never a
/// silent partial.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunManifest {
    pub failed_chunks: Vec<ChunkFailure>,
    pub dropped_relations: Vec<DroppedRelation>,
    pub type_conflicts: Vec<TypeConflict>,
}

impl RunManifest {
    pub fn is_clean(&self) -> bool {
        self.failed_chunks.is_empty()
            && self.dropped_relations.is_empty()
            && self.type_conflicts.is_empty()
    }
}

/// One line of the run summary's top-entity list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub confidence: f64,
}

/// Aggregate outcome of the merge, produced by the SUMMARIZING stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub entity_count: usize,
    pub relation_count: usize,
    /// Highest-confidence entities, at most
    /// `PipelineConfig.summary_top_entities` of them.
    pub top_entities: Vec<TopEntity>,
}

/// Snapshot of a run, published on every stage transition and returned
/// by `await_run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub article: ArticleMeta,
    pub status: RunStatus,
    pub chunks_total: usize,
    pub chunks_failed: usize,
    pub manifest: RunManifest,
    pub summary: Option<RunSummary>,
    /// Terminal error message when `status` is `Failed`.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunResult {
    pub(crate) fn new(run_id: String, article: ArticleMeta, chunks_total: usize) -> Self {
        Self {
            run_id,
            article,
            status: RunStatus::Created,
            chunks_total,
            chunks_failed: 0,
            manifest: RunManifest::default(),
            summary: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}
