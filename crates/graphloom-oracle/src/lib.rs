//! graphloom-oracle - Extraction oracle adapters for graphloom.
//!
//! Implementations of the `ExtractionOracle` trait: an OpenAI-compatible
//! HTTP client for production and a deterministic fixture oracle for
//! tests, plus the shared response parser.

pub mod fixture;
pub mod openai;
pub mod parser;

pub use fixture::FixtureOracle;
pub use openai::{OpenAiOracle, OracleConfig};
pub use parser::{extract_json, parse_extraction};
