//! Pattern-matched findings and the supporting evidence shapes the
//! validation engine refines (§4.5 "Inputs").

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPattern {
    pub pattern: String,
    pub count: u32,
}

/// One unit of analyser output from pattern matching, before (and after)
/// LLM refinement. `source` is a human-readable address (a file path, a
/// `db(table.column)` coordinate, or similar), used by a `SourceProvider`
/// to fetch the underlying content for `EXTENDED_CONTEXT` batching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    pub source: String,
    pub category: String,
    pub evidence: Vec<Evidence>,
    pub matched_patterns: Vec<MatchedPattern>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Finding {
    pub fn new(source: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            category: category.into(),
            evidence: Vec::new(),
            matched_patterns: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_evidence(mut self, content: impl Into<String>) -> Self {
        self.evidence.push(Evidence {
            content: content.into(),
        });
        self
    }

    /// Stamps the per-analyser validation flag described in §4.5 "Outcome
    /// aggregation": `<category>_llm_validated = true`, keyed so that
    /// multiple analyser categories can stack flags on a shared finding
    /// without clobbering one another.
    pub fn mark_llm_validated(&mut self) {
        let key = format!("{}_llm_validated", self.category);
        self.metadata.insert(key, Value::Bool(true));
    }
}
