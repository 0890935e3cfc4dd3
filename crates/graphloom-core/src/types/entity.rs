//! Entity type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity types that can be extracted from article text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    /// A person (e.g., "Marie Curie").
    Person,
    /// An organization (e.g., "Acme Corp", "MIT").
    Organization,
    /// An abstract concept or topic (e.g., "machine learning").
    Concept,
    /// An event (e.g., "product launch", "election").
    Event,
    /// A physical location (e.g., "Berlin").
    Location,
}

impl EntityType {
    /// Parse an entity type from a string with flexible matching.
    ///
    /// Handles variations in oracle output like "PERSON", "Person",
    /// "person", "people", "company", etc.
    pub fn from_str_flexible(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase();

        match normalized.as_str() {
            "person" | "per" | "people" | "individual" | "human" => Some(Self::Person),

            "organization" | "org" | "organisation" | "company" | "corporation"
            | "institution" | "business" | "firm" | "agency" => Some(Self::Organization),

            "concept" | "idea" | "topic" | "theme" | "notion" | "theory" | "subject"
            | "field" | "technology" | "discipline" => Some(Self::Concept),

            "event" | "evt" | "meeting" | "conference" | "occasion" | "happening"
            | "occurrence" => Some(Self::Event),

            "location" | "loc" | "place" | "address" | "city" | "country" | "region"
            | "area" | "venue" | "site" => Some(Self::Location),

            _ => None,
        }
    }

    /// Get all entity type variants.
    pub fn all() -> &'static [EntityType] {
        &[
            Self::Person,
            Self::Organization,
            Self::Concept,
            Self::Event,
            Self::Location,
        ]
    }

    /// Convert to string for prompts, ids, and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Organization => "ORGANIZATION",
            Self::Concept => "CONCEPT",
            Self::Event => "EVENT",
            Self::Location => "LOCATION",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_flexible(s).ok_or_else(|| format!("Unknown entity type: {}", s))
    }
}
