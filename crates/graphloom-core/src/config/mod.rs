//! Configuration system for graphloom.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{GraphloomError, GraphloomResult};

/// Scope within which entities with the same normalization key merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeScope {
    /// Entities merge across the whole graph: "Acme" in two articles
    /// is one entity.
    #[default]
    Global,
    /// Entities merge only within one article.
    Article,
}

/// Retry policy for transient failures (oracle calls, storage writes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: u32,
    /// Initial delay before the first retry (milliseconds).
    pub initial_delay_ms: u64,
    /// Maximum delay between retries (milliseconds).
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff.
    pub multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 200,
            max_delay_ms: 30_000,
            multiplier: 2.0_f32,
        }
    }
}

/// Pipeline orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on concurrent chunk extractions. Defaults to the
    /// machine's available parallelism.
    pub max_concurrent_extractions: usize,
    /// Per-chunk extraction timeout in seconds. Expiry counts as a
    /// transient failure and is retried.
    pub chunk_timeout_secs: u64,
    /// Maximum accepted chunk length in characters; longer chunks are
    /// rejected at submit.
    pub max_chunk_chars: usize,
    /// Entity merge scope.
    pub scope: MergeScope,
    /// Number of top-confidence entities included in the run summary.
    pub summary_top_entities: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            max_concurrent_extractions: parallelism,
            chunk_timeout_secs: 60,
            max_chunk_chars: 8_000,
            scope: MergeScope::Global,
            summary_top_entities: 5,
        }
    }
}

/// Workflow engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Path to the checkpoint database.
    pub checkpoint_db_path: PathBuf,
    /// Optional deadline for human confirmations, in seconds. A paused
    /// step resumed after the deadline fails instead of resuming.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_deadline_secs: Option<u64>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        let home = dirs::home_dir()
            .map(|h| h.join(".graphloom"))
            .unwrap_or_else(|| PathBuf::from(".graphloom"));
        Self {
            checkpoint_db_path: home.join("checkpoints.db"),
            confirmation_deadline_secs: None,
        }
    }
}

/// Top-level graphloom configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphloomConfig {
    /// Pipeline orchestrator settings.
    pub pipeline: PipelineConfig,
    /// Retry policy for transient failures.
    pub retry: RetryConfig,
    /// Workflow engine settings.
    pub workflow: WorkflowConfig,
}

impl GraphloomConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> GraphloomResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| GraphloomError::Configuration(e.to_string()))
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| GraphloomError::Configuration(e.to_string())),
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| GraphloomError::Configuration(e.to_string())),
            _ => Err(GraphloomError::Configuration(
                "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset. A `.env` file in the working
    /// directory is loaded first if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(n) = std::env::var("GRAPHLOOM_MAX_CONCURRENT_EXTRACTIONS") {
            if let Ok(n) = n.parse() {
                config.pipeline.max_concurrent_extractions = n;
            }
        }
        if let Ok(secs) = std::env::var("GRAPHLOOM_CHUNK_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.pipeline.chunk_timeout_secs = secs;
            }
        }
        if let Ok(scope) = std::env::var("GRAPHLOOM_MERGE_SCOPE") {
            config.pipeline.scope = match scope.to_lowercase().as_str() {
                "article" => MergeScope::Article,
                _ => MergeScope::Global,
            };
        }
        if let Ok(path) = std::env::var("GRAPHLOOM_CHECKPOINT_DB_PATH") {
            config.workflow.checkpoint_db_path = PathBuf::from(path);
        }
        if let Ok(n) = std::env::var("GRAPHLOOM_MAX_RETRIES") {
            if let Ok(n) = n.parse() {
                config.retry.max_retries = n;
            }
        }

        config
    }

    /// Build configuration using the builder pattern.
    pub fn builder() -> GraphloomConfigBuilder {
        GraphloomConfigBuilder::default()
    }
}

/// Builder for [`GraphloomConfig`].
#[derive(Default)]
pub struct GraphloomConfigBuilder {
    config: GraphloomConfig,
}

impl GraphloomConfigBuilder {
    /// Set pipeline configuration.
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.config.pipeline = pipeline;
        self
    }

    /// Set retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set workflow configuration.
    pub fn workflow(mut self, workflow: WorkflowConfig) -> Self {
        self.config.workflow = workflow;
        self
    }

    /// Set the merge scope.
    pub fn scope(mut self, scope: MergeScope) -> Self {
        self.config.pipeline.scope = scope;
        self
    }

    /// Set the extraction concurrency bound.
    pub fn max_concurrent_extractions(mut self, n: usize) -> Self {
        self.config.pipeline.max_concurrent_extractions = n;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> GraphloomConfig {
        self.config
    }
}
