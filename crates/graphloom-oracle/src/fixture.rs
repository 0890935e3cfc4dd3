//! Deterministic fixture oracle.
//!
//! Replaces the real extraction service in tests: each chunk id maps to
//! a scripted extraction, and failures (transient or permanent) can be
//! scripted per chunk to exercise the orchestrator's retry and
//! containment paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use graphloom_core::{
    CandidateEntity, CandidateRelation, Chunk, EntityType, Extraction, ExtractionContext,
    ExtractionOracle, GraphloomError, GraphloomResult,
};

/// Scripted oracle for tests.
#[derive(Default)]
pub struct FixtureOracle {
    extractions: HashMap<String, Extraction>,
    /// chunk id -> remaining transient failures before success.
    transient_failures: Mutex<HashMap<String, usize>>,
    permanent_failures: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
}

impl FixtureOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the extraction returned for a chunk. Unscripted chunks
    /// return an empty extraction.
    pub fn with_extraction(mut self, chunk_id: impl Into<String>, extraction: Extraction) -> Self {
        self.extractions.insert(chunk_id.into(), extraction);
        self
    }

    /// Convenience: add one entity to a chunk's scripted extraction.
    pub fn with_entity(
        mut self,
        chunk_id: &str,
        name: &str,
        entity_type: EntityType,
        confidence: f64,
    ) -> Self {
        let entry = self.extractions.entry(chunk_id.to_string()).or_default();
        entry
            .entities
            .push(CandidateEntity::new(name, entity_type, confidence, chunk_id));
        self
    }

    /// Convenience: add one relation to a chunk's scripted extraction.
    pub fn with_relation(
        mut self,
        chunk_id: &str,
        subject: &str,
        predicate: &str,
        object: &str,
        confidence: f64,
    ) -> Self {
        let entry = self.extractions.entry(chunk_id.to_string()).or_default();
        entry.relations.push(CandidateRelation::new(
            subject, predicate, object, confidence, chunk_id,
        ));
        self
    }

    /// Fail the chunk's first `times` calls with a transient timeout,
    /// then succeed.
    pub fn fail_transiently(self, chunk_id: &str, times: usize) -> Self {
        self.transient_failures
            .lock()
            .unwrap()
            .insert(chunk_id.to_string(), times);
        self
    }

    /// Fail the chunk permanently on every call.
    pub fn fail_permanently(self, chunk_id: &str, message: &str) -> Self {
        self.permanent_failures
            .lock()
            .unwrap()
            .insert(chunk_id.to_string(), message.to_string());
        self
    }

    /// Total number of extract calls observed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ExtractionOracle for FixtureOracle {
    async fn extract(
        &self,
        chunk: &Chunk,
        _context: &ExtractionContext,
    ) -> GraphloomResult<Extraction> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if let Some(message) = self.permanent_failures.lock().unwrap().get(&chunk.id) {
            return Err(GraphloomError::oracle(message.clone()));
        }
        {
            let mut transient = self.transient_failures.lock().unwrap();
            if let Some(remaining) = transient.get_mut(&chunk.id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(GraphloomError::oracle_timeout(format!(
                        "scripted transient failure for {}",
                        chunk.id
                    )));
                }
            }
        }

        Ok(self.extractions.get(&chunk.id).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "fixture"
    }
}
