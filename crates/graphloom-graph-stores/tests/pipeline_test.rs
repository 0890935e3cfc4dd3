//! End-to-end pipeline tests: fixture oracle, real resolver, real
//! graph stores.

use std::sync::Arc;
use std::time::Duration;

use graphloom_core::{
    ArticleMeta, Chunk, EntityType, GraphStore, GraphloomConfig, PipelineConfig,
    PipelineOrchestrator, RetryConfig, RunStatus,
};
use graphloom_graph_stores::InMemoryGraphStore;
use graphloom_oracle::FixtureOracle;

const AWAIT: Duration = Duration::from_secs(30);

fn fast_retry_config() -> GraphloomConfig {
    GraphloomConfig::builder()
        .retry(RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 10,
            multiplier: 2.0,
        })
        .build()
}

fn chunks(article_id: &str, texts: &[&str]) -> Vec<Chunk> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| Chunk::new(article_id, i, *text))
        .collect()
}

#[tokio::test]
async fn test_successful_run_builds_graph() {
    let article = ArticleMeta::new("a1").url("https://example.org/a1").title("Apple news");
    let chunks = chunks("a1", &["chunk one", "chunk two"]);

    let oracle = FixtureOracle::new()
        .with_entity(&chunks[0].id, "Apple", EntityType::Organization, 0.9)
        .with_entity(&chunks[1].id, "Tim Cook", EntityType::Person, 0.95)
        .with_relation(&chunks[1].id, "Tim Cook", "works for", "Apple", 0.9);

    let store = Arc::new(InMemoryGraphStore::new());
    let orchestrator = PipelineOrchestrator::new(
        &fast_retry_config(),
        Arc::new(oracle),
        Arc::clone(&store) as Arc<dyn GraphStore>,
    );

    let run_id = orchestrator.submit(article, chunks).await.unwrap();
    let result = orchestrator.await_run(&run_id, AWAIT).await.unwrap();

    assert_eq!(result.status, RunStatus::Succeeded);
    assert!(result.manifest.failed_chunks.is_empty());

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.entity_count, 2);
    assert_eq!(stats.relation_count, 1);
    assert_eq!(stats.article_count, 1);

    let summary = result.summary.unwrap();
    assert_eq!(summary.entity_count, 2);
    assert_eq!(summary.top_entities[0].name, "Tim Cook");

    // Article metadata landed during ingestion.
    let record = store.get_article("https://example.org/a1").await.unwrap().unwrap();
    assert_eq!(record.title, "Apple news");
}

#[tokio::test]
async fn test_partial_run_contains_failed_chunk() {
    let article = ArticleMeta::new("a1");
    let chunks = chunks("a1", &["good", "bad", "also good"]);

    let oracle = FixtureOracle::new()
        .with_entity(&chunks[0].id, "Acme", EntityType::Organization, 0.8)
        .with_entity(&chunks[2].id, "Widget", EntityType::Concept, 0.7)
        .fail_permanently(&chunks[1].id, "oracle cannot read this chunk");

    let store = Arc::new(InMemoryGraphStore::new());
    let orchestrator = PipelineOrchestrator::new(
        &fast_retry_config(),
        Arc::new(oracle),
        Arc::clone(&store) as Arc<dyn GraphStore>,
    );

    let run_id = orchestrator.submit(article, chunks.clone()).await.unwrap();
    let result = orchestrator.await_run(&run_id, AWAIT).await.unwrap();

    assert_eq!(result.status, RunStatus::Partial);
    assert_eq!(result.chunks_failed, 1);
    assert_eq!(result.manifest.failed_chunks.len(), 1);
    assert_eq!(result.manifest.failed_chunks[0].chunk_id, chunks[1].id);

    // The surviving chunks' entities still made it to the graph.
    assert_eq!(store.stats().await.unwrap().entity_count, 2);
}

#[tokio::test]
async fn test_all_chunks_failing_fails_the_run() {
    let article = ArticleMeta::new("a1");
    let chunks = chunks("a1", &["one", "two"]);

    let oracle = FixtureOracle::new()
        .fail_permanently(&chunks[0].id, "broken")
        .fail_permanently(&chunks[1].id, "broken");

    let store = Arc::new(InMemoryGraphStore::new());
    let orchestrator = PipelineOrchestrator::new(
        &fast_retry_config(),
        Arc::new(oracle),
        Arc::clone(&store) as Arc<dyn GraphStore>,
    );

    let run_id = orchestrator.submit(article, chunks).await.unwrap();
    let result = orchestrator.await_run(&run_id, AWAIT).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.error.is_some());
    assert_eq!(store.stats().await.unwrap().entity_count, 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let article = ArticleMeta::new("a1");
    let chunks = chunks("a1", &["flaky chunk"]);

    let oracle = Arc::new(
        FixtureOracle::new()
            .with_entity(&chunks[0].id, "Acme", EntityType::Organization, 0.8)
            .fail_transiently(&chunks[0].id, 2),
    );

    let store = Arc::new(InMemoryGraphStore::new());
    let orchestrator = PipelineOrchestrator::new(
        &fast_retry_config(),
        Arc::clone(&oracle) as Arc<dyn graphloom_core::ExtractionOracle>,
        Arc::clone(&store) as Arc<dyn GraphStore>,
    );

    let run_id = orchestrator.submit(article, chunks).await.unwrap();
    let result = orchestrator.await_run(&run_id, AWAIT).await.unwrap();

    assert_eq!(result.status, RunStatus::Succeeded);
    // Two scripted failures plus the final success.
    assert_eq!(oracle.calls(), 3);
    assert_eq!(store.stats().await.unwrap().entity_count, 1);
}

#[tokio::test]
async fn test_reprocessing_same_article_is_idempotent() {
    let article = ArticleMeta::new("a1").url("https://example.org/a1");
    let chunks = chunks("a1", &["chunk"]);

    let store = Arc::new(InMemoryGraphStore::new());
    for _ in 0..2 {
        let oracle = FixtureOracle::new()
            .with_entity(&chunks[0].id, "Acme", EntityType::Organization, 0.8)
            .with_entity(&chunks[0].id, "Bob", EntityType::Person, 0.9)
            .with_relation(&chunks[0].id, "Bob", "WORKS_FOR", "Acme", 0.9);

        let orchestrator = PipelineOrchestrator::new(
            &fast_retry_config(),
            Arc::new(oracle),
            Arc::clone(&store) as Arc<dyn GraphStore>,
        );
        let run_id = orchestrator.submit(article.clone(), chunks.clone()).await.unwrap();
        let result = orchestrator.await_run(&run_id, AWAIT).await.unwrap();
        assert_eq!(result.status, RunStatus::Succeeded);
    }

    // Same deterministic ids on both runs, so nothing duplicated.
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.entity_count, 2);
    assert_eq!(stats.relation_count, 1);
}

#[tokio::test]
async fn test_dangling_relation_reported_in_manifest() {
    let article = ArticleMeta::new("a1");
    let chunks = chunks("a1", &["chunk"]);

    let oracle = FixtureOracle::new()
        .with_entity(&chunks[0].id, "Acme", EntityType::Organization, 0.8)
        .with_relation(&chunks[0].id, "Ghost", "FOUNDED", "Acme", 0.7);

    let store = Arc::new(InMemoryGraphStore::new());
    let orchestrator = PipelineOrchestrator::new(
        &fast_retry_config(),
        Arc::new(oracle),
        Arc::clone(&store) as Arc<dyn GraphStore>,
    );

    let run_id = orchestrator.submit(article, chunks).await.unwrap();
    let result = orchestrator.await_run(&run_id, AWAIT).await.unwrap();

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(result.manifest.dropped_relations.len(), 1);
    assert_eq!(result.manifest.dropped_relations[0].subject_name, "Ghost");
    assert_eq!(store.stats().await.unwrap().relation_count, 0);
}

#[tokio::test]
async fn test_type_conflict_recorded_and_resolved() {
    let article = ArticleMeta::new("a1");
    let chunks = chunks("a1", &["first mention", "second mention"]);

    let oracle = FixtureOracle::new()
        .with_entity(&chunks[0].id, "Apple", EntityType::Organization, 0.9)
        .with_entity(&chunks[1].id, "Apple", EntityType::Location, 0.4);

    let store = Arc::new(InMemoryGraphStore::new());
    let orchestrator = PipelineOrchestrator::new(
        &fast_retry_config(),
        Arc::new(oracle),
        Arc::clone(&store) as Arc<dyn GraphStore>,
    );

    let run_id = orchestrator.submit(article, chunks).await.unwrap();
    let result = orchestrator.await_run(&run_id, AWAIT).await.unwrap();

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(result.manifest.type_conflicts.len(), 1);
    assert_eq!(result.manifest.type_conflicts[0].winner, EntityType::Organization);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.entity_count, 1);
    assert_eq!(stats.entities_by_type["ORGANIZATION"], 1);
}

#[tokio::test]
async fn test_submit_rejects_bad_input() {
    let store = Arc::new(InMemoryGraphStore::new());
    let orchestrator = PipelineOrchestrator::new(
        &fast_retry_config(),
        Arc::new(FixtureOracle::new()),
        Arc::clone(&store) as Arc<dyn GraphStore>,
    );

    // Empty chunk list.
    assert!(orchestrator
        .submit(ArticleMeta::new("a1"), vec![])
        .await
        .is_err());

    // Oversize chunk.
    let config = GraphloomConfig::builder()
        .pipeline(PipelineConfig {
            max_chunk_chars: 10,
            ..Default::default()
        })
        .build();
    let strict = PipelineOrchestrator::new(
        &config,
        Arc::new(FixtureOracle::new()),
        Arc::clone(&store) as Arc<dyn GraphStore>,
    );
    let oversize = vec![Chunk::new("a1", 0, "this text is longer than ten characters")];
    assert!(strict.submit(ArticleMeta::new("a1"), oversize).await.is_err());
}

#[tokio::test]
async fn test_await_run_timeout_does_not_cancel_run() {
    let article = ArticleMeta::new("a1");
    let chunks = chunks("a1", &["slow chunk"]);

    // Two transient failures with real (if small) backoff delays make
    // the run outlast a zero-ish await timeout.
    let oracle = FixtureOracle::new()
        .with_entity(&chunks[0].id, "Acme", EntityType::Organization, 0.8)
        .fail_transiently(&chunks[0].id, 2);

    let store = Arc::new(InMemoryGraphStore::new());
    let orchestrator = PipelineOrchestrator::new(
        &fast_retry_config(),
        Arc::new(oracle),
        Arc::clone(&store) as Arc<dyn GraphStore>,
    );

    let run_id = orchestrator.submit(article, chunks).await.unwrap();
    let early = orchestrator.await_run(&run_id, Duration::from_micros(1)).await;
    assert!(early.is_err());

    // The run survived the caller's timeout and still completes.
    let result = orchestrator.await_run(&run_id, AWAIT).await.unwrap();
    assert_eq!(result.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_terminal_run_handle_released_after_await() {
    let article = ArticleMeta::new("a1");
    let chunks = chunks("a1", &["chunk"]);

    let oracle = FixtureOracle::new().with_entity(
        &chunks[0].id,
        "Acme",
        EntityType::Organization,
        0.8,
    );

    let store = Arc::new(InMemoryGraphStore::new());
    let orchestrator = PipelineOrchestrator::new(
        &fast_retry_config(),
        Arc::new(oracle),
        Arc::clone(&store) as Arc<dyn GraphStore>,
    );

    let run_id = orchestrator.submit(article, chunks).await.unwrap();
    // The run is visible while in flight or freshly submitted.
    assert_eq!(orchestrator.status(&run_id).await.unwrap().run_id, run_id);

    let result = orchestrator.await_run(&run_id, AWAIT).await.unwrap();
    assert_eq!(result.status, RunStatus::Succeeded);

    // Delivering the terminal result discards the handle.
    assert!(orchestrator.status(&run_id).await.is_err());
    assert!(orchestrator.await_run(&run_id, AWAIT).await.is_err());
}

#[tokio::test]
async fn test_status_for_unknown_run() {
    let store = Arc::new(InMemoryGraphStore::new());
    let orchestrator = PipelineOrchestrator::new(
        &fast_retry_config(),
        Arc::new(FixtureOracle::new()),
        Arc::clone(&store) as Arc<dyn GraphStore>,
    );
    assert!(orchestrator.status("run-nope").await.is_err());
}
