//! The LLM structured-output contract the validation engine depends on
//! (§4.5 "Inputs", §6 "LLM structured-output contract"): a prompt plus a
//! strict JSON-Schema-described response type, validated before it comes
//! back to the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationVerdict {
    TruePositive,
    FalsePositive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Keep,
    Discard,
    FlagForReview,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmValidationResult {
    pub finding_id: Uuid,
    pub validation_result: ValidationVerdict,
    pub confidence: f64,
    pub reasoning: String,
    pub recommended_action: RecommendedAction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmValidationResponse {
    pub results: Vec<LlmValidationResult>,
}

/// The strict JSON Schema every batch response is validated against before
/// it reaches the engine's aggregation step (§4.5 step 2).
pub fn response_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "results": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "finding_id": {"type": "string", "format": "uuid"},
                        "validation_result": {
                            "type": "string",
                            "enum": ["TRUE_POSITIVE", "FALSE_POSITIVE"]
                        },
                        "confidence": {"type": "number", "minimum": 0, "maximum": 1},
                        "reasoning": {"type": "string"},
                        "recommended_action": {
                            "type": "string",
                            "enum": ["keep", "discard", "flag_for_review"]
                        }
                    },
                    "required": [
                        "finding_id",
                        "validation_result",
                        "confidence",
                        "reasoning",
                        "recommended_action"
                    ]
                }
            }
        },
        "required": ["results"]
    })
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub response_schema: Value,
    pub model_name: String,
}

/// Abstracts the concrete LLM provider wire protocol (out of scope per
/// §1); the engine only ever calls `complete`.
pub trait LlmService: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> anyhow::Result<LlmValidationResponse>;
}
