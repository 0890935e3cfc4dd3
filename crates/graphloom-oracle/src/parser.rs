//! Parsing for oracle responses.
//!
//! Extraction models wrap their JSON in markdown fences more often than
//! not, and field names drift between runs. The parser strips fences,
//! decodes leniently, and skips malformed list items instead of failing
//! the whole chunk.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::warn;

use graphloom_core::{
    CandidateEntity, CandidateRelation, EntityType, Extraction, GraphloomError, GraphloomResult,
};

/// Extract JSON from a potentially fenced response.
pub fn extract_json(text: &str) -> String {
    static CODE_BLOCK_RE: OnceLock<Regex> = OnceLock::new();
    let re = CODE_BLOCK_RE
        .get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("valid regex"));

    let text = text.trim();
    if let Some(captures) = re.captures(text) {
        if let Some(content) = captures.get(1) {
            return content.as_str().trim().to_string();
        }
    }
    text.to_string()
}

#[derive(Debug, Deserialize)]
struct WireEntity {
    #[serde(rename = "type")]
    entity_type: String,
    #[serde(alias = "name")]
    canonical_name: String,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WireRelation {
    subject: String,
    predicate: String,
    object: String,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WireExtraction {
    #[serde(default)]
    entities: Vec<serde_json::Value>,
    #[serde(default)]
    relations: Vec<serde_json::Value>,
}

const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Parse an oracle response into candidates for one chunk.
///
/// Invalid JSON is a permanent parse error. Individual entities with an
/// unrecognized type or relations missing an endpoint are skipped with
/// a warning; the rest of the chunk's output survives.
pub fn parse_extraction(response: &str, chunk_id: &str) -> GraphloomResult<Extraction> {
    let json = extract_json(response);
    let wire: WireExtraction = serde_json::from_str(&json).map_err(|e| {
        GraphloomError::parse(format!("chunk {chunk_id}: oracle response is not valid JSON: {e}"))
    })?;

    let mut extraction = Extraction::default();

    for value in wire.entities {
        let entity: WireEntity = match serde_json::from_value(value) {
            Ok(e) => e,
            Err(e) => {
                warn!(chunk_id, error = %e, "skipping malformed entity");
                continue;
            }
        };
        let Some(entity_type) = EntityType::from_str_flexible(&entity.entity_type) else {
            warn!(chunk_id, entity_type = %entity.entity_type, "skipping entity with unknown type");
            continue;
        };
        if entity.canonical_name.trim().is_empty() {
            continue;
        }
        extraction.entities.push(CandidateEntity::new(
            entity.canonical_name.trim(),
            entity_type,
            entity.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            chunk_id,
        ));
    }

    for value in wire.relations {
        let relation: WireRelation = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                warn!(chunk_id, error = %e, "skipping malformed relation");
                continue;
            }
        };
        if relation.subject.trim().is_empty()
            || relation.predicate.trim().is_empty()
            || relation.object.trim().is_empty()
        {
            warn!(chunk_id, "skipping relation with empty endpoint or predicate");
            continue;
        }
        extraction.relations.push(CandidateRelation::new(
            relation.subject.trim(),
            relation.predicate.trim(),
            relation.object.trim(),
            relation.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            chunk_id,
        ));
    }

    Ok(extraction)
}
