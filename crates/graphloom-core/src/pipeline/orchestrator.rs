//! Pipeline orchestrator.
//!
//! Drives one run per submitted article through INGESTING, EXTRACTING,
//! MERGING and SUMMARIZING. Chunk extractions fan out to the oracle
//! under a concurrency bound, with per-chunk timeout and retry, and
//! fan in at a join barrier before the merge. A permanently failed
//! chunk is contained: its candidates are excluded, the failure is
//! recorded in the manifest, and the run continues to a PARTIAL
//! terminal instead of failing outright.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use serde_json::json;
use tokio::sync::{watch, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{GraphloomConfig, PipelineConfig, RetryConfig};
use crate::error::{ErrorCode, GraphloomError, GraphloomResult};
use crate::resolver::{EntityResolver, MergeConfig, Resolution};
use crate::scratch::ScratchStore;
use crate::traits::{ExtractionContext, ExtractionOracle, GraphStore};
use crate::types::{ArticleRecord, CandidateEntity, CandidateRelation, Chunk};

use super::run::{ArticleMeta, ChunkFailure, RunResult, RunStatus, RunSummary, TopEntity};

struct RunHandle {
    rx: watch::Receiver<RunResult>,
}

/// Orchestrates pipeline runs. One instance serves many concurrent
/// runs; shared state lives behind `Arc`s so spawned run tasks own
/// their dependencies.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    retry: RetryConfig,
    oracle: Arc<dyn ExtractionOracle>,
    graph_store: Arc<dyn GraphStore>,
    scratch: Arc<ScratchStore>,
    runs: RwLock<HashMap<String, RunHandle>>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: &GraphloomConfig,
        oracle: Arc<dyn ExtractionOracle>,
        graph_store: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            config: config.pipeline.clone(),
            retry: config.retry.clone(),
            oracle,
            graph_store,
            scratch: Arc::new(ScratchStore::new()),
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// The scratch store runs use for intermediate state.
    pub fn scratch(&self) -> Arc<ScratchStore> {
        Arc::clone(&self.scratch)
    }

    /// Validate and start a run. Returns immediately with the run id;
    /// the run itself executes on a spawned task.
    pub async fn submit(
        &self,
        article: ArticleMeta,
        chunks: Vec<Chunk>,
    ) -> GraphloomResult<String> {
        if article.id.trim().is_empty() {
            return Err(GraphloomError::validation("article id must not be empty"));
        }
        if chunks.is_empty() {
            return Err(GraphloomError::validation_with_code(
                "a run needs at least one chunk",
                ErrorCode::ValEmptyChunks,
            ));
        }
        for chunk in &chunks {
            if chunk.text.chars().count() > self.config.max_chunk_chars {
                return Err(GraphloomError::validation_with_code(
                    format!(
                        "chunk {} exceeds {} characters",
                        chunk.id, self.config.max_chunk_chars
                    ),
                    ErrorCode::ValChunkTooLong,
                ));
            }
        }

        let run_id = format!("run-{}", Uuid::new_v4());
        let result = RunResult::new(run_id.clone(), article.clone(), chunks.len());
        let (tx, rx) = watch::channel(result.clone());

        self.runs
            .write()
            .await
            .insert(run_id.clone(), RunHandle { rx });

        info!(run_id = %run_id, article_id = %article.id, chunks = chunks.len(), "run submitted");

        let ctx = RunContext {
            config: self.config.clone(),
            retry: self.retry.clone(),
            oracle: Arc::clone(&self.oracle),
            graph_store: Arc::clone(&self.graph_store),
            scratch: Arc::clone(&self.scratch),
            article,
            chunks,
        };
        tokio::spawn(async move {
            ctx.execute(result, tx).await;
        });

        Ok(run_id)
    }

    /// Current snapshot of a run.
    pub async fn status(&self, run_id: &str) -> GraphloomResult<RunResult> {
        let runs = self.runs.read().await;
        let handle = runs.get(run_id).ok_or_else(|| GraphloomError::RunNotFound {
            run_id: run_id.to_string(),
        })?;
        let snapshot = handle.rx.borrow().clone();
        Ok(snapshot)
    }

    /// Wait until a run reaches a terminal status.
    ///
    /// The timeout bounds only this caller's wait. The run keeps
    /// executing after expiry; a later `await_run` or `status` call
    /// still observes it. Once a terminal result has been delivered
    /// the run handle is discarded, so subsequent lookups of that run
    /// id return `RunNotFound`.
    pub async fn await_run(&self, run_id: &str, timeout: Duration) -> GraphloomResult<RunResult> {
        let mut rx = {
            let runs = self.runs.read().await;
            runs.get(run_id)
                .ok_or_else(|| GraphloomError::RunNotFound {
                    run_id: run_id.to_string(),
                })?
                .rx
                .clone()
        };

        let result = tokio::time::timeout(timeout, async {
            loop {
                let snapshot = rx.borrow().clone();
                if snapshot.status.is_terminal() {
                    return snapshot;
                }
                // A closed sender means the run task is gone; the last
                // published snapshot is all there is.
                if rx.changed().await.is_err() {
                    return rx.borrow().clone();
                }
            }
        })
        .await
        .map_err(|_| GraphloomError::AwaitTimeout {
            run_id: run_id.to_string(),
        })?;

        if result.status.is_terminal() {
            debug!(run_id = %run_id, "terminal run observed, releasing handle");
            self.runs.write().await.remove(run_id);
        }
        Ok(result)
    }
}

/// Everything a spawned run task owns.
struct RunContext {
    config: PipelineConfig,
    retry: RetryConfig,
    oracle: Arc<dyn ExtractionOracle>,
    graph_store: Arc<dyn GraphStore>,
    scratch: Arc<ScratchStore>,
    article: ArticleMeta,
    chunks: Vec<Chunk>,
}

impl RunContext {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_max_times(self.retry.max_retries as usize)
            .with_min_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .with_factor(self.retry.multiplier)
    }

    async fn execute(self, mut result: RunResult, tx: watch::Sender<RunResult>) {
        let run_id = result.run_id.clone();
        if let Err(e) = self.drive(&mut result, &tx).await {
            error!(run_id = %run_id, error = %e, "run failed");
            result.status = RunStatus::Failed;
            result.error = Some(e.to_string());
        }
        result.finished_at = Some(Utc::now());
        // Intermediates never outlive their run.
        self.scratch.clear_namespace(&run_id).await;
        info!(run_id = %run_id, status = %result.status, "run finished");
        let _ = tx.send(result);
    }

    async fn drive(
        &self,
        result: &mut RunResult,
        tx: &watch::Sender<RunResult>,
    ) -> GraphloomResult<()> {
        let run_id = result.run_id.clone();

        self.transition(result, tx, RunStatus::Ingesting);
        self.ingest(&run_id).await?;

        self.transition(result, tx, RunStatus::Extracting);
        let (entities, relations, failures) = self.extract_all(&run_id).await;
        result.chunks_failed = failures.len();
        result.manifest.failed_chunks = failures;

        if result.chunks_failed == result.chunks_total {
            return Err(GraphloomError::Extraction {
                message: format!("all {} chunk extractions failed", result.chunks_total),
                code: ErrorCode::ExtExhaustedRetries,
                chunk_id: None,
            });
        }

        self.transition(result, tx, RunStatus::Merging);
        let resolution = self.merge(&entities, &relations).await?;
        result.manifest.dropped_relations = resolution.dropped_relations.clone();
        result.manifest.type_conflicts = resolution.type_conflicts.clone();

        self.transition(result, tx, RunStatus::Summarizing);
        result.summary = Some(self.summarize(&resolution));

        result.status = if result.chunks_failed > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Succeeded
        };
        Ok(())
    }

    fn transition(
        &self,
        result: &mut RunResult,
        tx: &watch::Sender<RunResult>,
        status: RunStatus,
    ) {
        info!(run_id = %result.run_id, from = %result.status, to = %status, "stage transition");
        result.status = status;
        let _ = tx.send(result.clone());
    }

    /// INGESTING: register the run's inputs in the scratch namespace
    /// and persist article metadata.
    async fn ingest(&self, run_id: &str) -> GraphloomResult<()> {
        self.scratch
            .set(run_id, "article", json!(&self.article), None)
            .await;
        self.scratch
            .set(run_id, "chunks_total", json!(self.chunks.len()), None)
            .await;

        if let Some(url) = &self.article.url {
            let record = ArticleRecord {
                url: url.clone(),
                title: self.article.title.clone().unwrap_or_default(),
                ..Default::default()
            };
            let store = Arc::clone(&self.graph_store);
            (|| async { store.upsert_article(&record).await })
                .retry(self.backoff())
                .when(GraphloomError::is_transient)
                .notify(|err, dur| {
                    warn!(error = %err, delay = ?dur, "article upsert failed, retrying");
                })
                .await?;
        }
        Ok(())
    }

    /// EXTRACTING: bounded fan-out over chunks, then the join barrier.
    ///
    /// Returns all successful candidates plus the failures that
    /// exhausted their retries. Never returns an error itself.
    async fn extract_all(
        &self,
        run_id: &str,
    ) -> (
        Vec<CandidateEntity>,
        Vec<CandidateRelation>,
        Vec<ChunkFailure>,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_extractions.max(1)));
        let context = ExtractionContext {
            article_title: self.article.title.clone(),
            language: None,
        };
        let mut tasks = JoinSet::new();

        for chunk in self.chunks.clone() {
            let semaphore = Arc::clone(&semaphore);
            let oracle = Arc::clone(&self.oracle);
            let context = context.clone();
            let backoff = self.backoff();
            let timeout = Duration::from_secs(self.config.chunk_timeout_secs);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                let attempts = AtomicUsize::new(0);
                let outcome = (|| async {
                    attempts.fetch_add(1, Ordering::Relaxed);
                    match tokio::time::timeout(timeout, oracle.extract(&chunk, &context)).await {
                        Ok(res) => res,
                        Err(_) => Err(GraphloomError::oracle_timeout(format!(
                            "chunk {} extraction exceeded {:?}",
                            chunk.id, timeout
                        ))),
                    }
                })
                .retry(backoff)
                .when(GraphloomError::is_transient)
                .notify(|err, dur| {
                    warn!(chunk_id = %chunk.id, error = %err, delay = ?dur, "extraction failed, retrying");
                })
                .await;
                (chunk, outcome, attempts.into_inner())
            });
        }

        let mut entities = Vec::new();
        let mut relations = Vec::new();
        let mut failures = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let (chunk, outcome, attempts) = match joined {
                Ok(v) => v,
                Err(e) => {
                    // A panicked extraction task loses its chunk handle;
                    // surface it as a run-level failure entry.
                    error!(error = %e, "extraction task panicked");
                    failures.push(ChunkFailure {
                        chunk_id: String::new(),
                        chunk_index: 0,
                        error: format!("extraction task panicked: {e}"),
                        attempts: 0,
                    });
                    continue;
                }
            };
            match outcome {
                Ok(extraction) => {
                    debug!(
                        chunk_id = %chunk.id,
                        entities = extraction.entities.len(),
                        relations = extraction.relations.len(),
                        "chunk extracted"
                    );
                    self.scratch
                        .set(
                            run_id,
                            &format!("extracted:{}", chunk.id),
                            json!({
                                "entities": extraction.entities.len(),
                                "relations": extraction.relations.len(),
                            }),
                            None,
                        )
                        .await;
                    entities.extend(extraction.entities);
                    relations.extend(extraction.relations);
                }
                Err(e) => {
                    warn!(chunk_id = %chunk.id, error = %e, "chunk extraction exhausted retries");
                    failures.push(ChunkFailure {
                        chunk_id: chunk.id,
                        chunk_index: chunk.index,
                        error: e.to_string(),
                        attempts,
                    });
                }
            }
        }

        failures.sort_by_key(|f| f.chunk_index);
        (entities, relations, failures)
    }

    /// MERGING: resolve candidates and upsert the result, retrying
    /// transient storage failures.
    async fn merge(
        &self,
        entities: &[CandidateEntity],
        relations: &[CandidateRelation],
    ) -> GraphloomResult<Resolution> {
        let resolver = EntityResolver::new(MergeConfig::with_scope(self.config.scope));
        let resolution = resolver.resolve(
            &self.article.id,
            self.article.url.as_deref(),
            entities,
            relations,
        );

        for entity in &resolution.entities {
            let store = Arc::clone(&self.graph_store);
            (|| async { store.upsert_entity(entity).await })
                .retry(self.backoff())
                .when(GraphloomError::is_transient)
                .notify(|err, dur| {
                    warn!(entity_id = %entity.id, error = %err, delay = ?dur, "entity upsert failed, retrying");
                })
                .await?;
        }
        for relation in &resolution.relations {
            let store = Arc::clone(&self.graph_store);
            (|| async { store.upsert_relation(relation).await })
                .retry(self.backoff())
                .when(GraphloomError::is_transient)
                .notify(|err, dur| {
                    warn!(relation_id = %relation.id, error = %err, delay = ?dur, "relation upsert failed, retrying");
                })
                .await?;
        }

        info!(
            entities = resolution.entities.len(),
            relations = resolution.relations.len(),
            dropped = resolution.dropped_relations.len(),
            conflicts = resolution.type_conflicts.len(),
            "merge complete"
        );
        Ok(resolution)
    }

    /// SUMMARIZING: reduce the merge result to counts and the
    /// top-confidence entities.
    fn summarize(&self, resolution: &Resolution) -> RunSummary {
        let mut ranked: Vec<&crate::types::Entity> = resolution.entities.iter().collect();
        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.canonical_name.cmp(&b.canonical_name))
        });
        RunSummary {
            entity_count: resolution.entities.len(),
            relation_count: resolution.relations.len(),
            top_entities: ranked
                .into_iter()
                .take(self.config.summary_top_entities)
                .map(|e| TopEntity {
                    name: e.canonical_name.clone(),
                    entity_type: e.entity_type,
                    confidence: e.confidence,
                })
                .collect(),
        }
    }
}
