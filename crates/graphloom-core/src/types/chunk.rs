//! Article chunk type.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A chunk of article text, produced by ingestion and consumed by the
/// extraction oracle. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable chunk identifier, derived from the article id and index.
    pub id: String,
    /// Identifier of the article this chunk belongs to.
    pub article_id: String,
    /// Zero-based position of the chunk within the article.
    pub index: usize,
    /// The chunk text.
    pub text: String,
}

impl Chunk {
    /// Create a chunk with a deterministic id.
    ///
    /// The id is stable across runs for the same article and index, so
    /// re-submitting an article produces the same chunk ids and the
    /// same entity provenance.
    pub fn new(article_id: impl Into<String>, index: usize, text: impl Into<String>) -> Self {
        let article_id = article_id.into();
        let mut hasher = Sha256::new();
        hasher.update(article_id.as_bytes());
        hasher.update([0x1f]);
        hasher.update(index.to_le_bytes());
        let digest = hasher.finalize();
        let id = format!("chunk-{}", &hex::encode(digest)[..16]);

        Self {
            id,
            article_id,
            index,
            text: text.into(),
        }
    }

    /// Split article text into chunks of at most `max_chars` characters,
    /// preferring paragraph boundaries. Empty paragraphs are dropped.
    pub fn split_text(article_id: &str, text: &str, max_chars: usize) -> Vec<Chunk> {
        let max_chars = max_chars.max(1);
        let mut pieces: Vec<String> = Vec::new();
        let mut current = String::new();

        for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            if paragraph.chars().count() > max_chars {
                if !current.is_empty() {
                    pieces.push(std::mem::take(&mut current));
                }
                // Hard-split a paragraph that alone exceeds the limit.
                let chars: Vec<char> = paragraph.chars().collect();
                for window in chars.chunks(max_chars) {
                    pieces.push(window.iter().collect());
                }
                continue;
            }
            let projected = current.chars().count() + paragraph.chars().count() + 2;
            if !current.is_empty() && projected > max_chars {
                pieces.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
        }
        if !current.is_empty() {
            pieces.push(current);
        }

        pieces
            .into_iter()
            .enumerate()
            .map(|(index, piece)| Chunk::new(article_id, index, piece))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_is_deterministic() {
        let a = Chunk::new("article-1", 0, "some text");
        let b = Chunk::new("article-1", 0, "different text");
        let c = Chunk::new("article-1", 1, "some text");
        let d = Chunk::new("article-2", 0, "some text");

        // Same article and index gives the same id regardless of text.
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_ne!(a.id, d.id);
    }

    #[test]
    fn test_split_text_prefers_paragraphs() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = Chunk::split_text("article-1", text, 40);

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.contains("First paragraph."));
        assert!(chunks[0].text.contains("Second paragraph."));
        assert_eq!(chunks[1].text, "Third paragraph.");
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn test_split_text_hard_splits_long_paragraph() {
        let text = "x".repeat(25);
        let chunks = Chunk::split_text("article-1", &text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 10));
    }

    #[test]
    fn test_split_text_drops_blank_input() {
        assert!(Chunk::split_text("article-1", "  \n\n  ", 100).is_empty());
    }
}
