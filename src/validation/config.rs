//! Validation configuration recognised by the engine (§9 "Configuration
//! objects"): `{enableLlmValidation, llmBatchSize, llmValidationMode,
//! batching.modelContextWindow}`, matching the field set exercised by
//! `original_source/.../test_extended_context_strategy.py::_create_config`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    Standard,
    Conservative,
}

impl Default for ValidationMode {
    fn default() -> Self {
        Self::Standard
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchingConfig {
    pub model_context_window: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            model_context_window: 100_000,
        }
    }
}

/// Fixed per-source prompt overhead added to a source's estimated token
/// count during `EXTENDED_CONTEXT` batching (§4.5).
pub const SOURCE_PROMPT_OVERHEAD_TOKENS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmValidationConfig {
    #[serde(default = "default_enable")]
    pub enable_llm_validation: bool,
    #[serde(default = "default_batch_size")]
    pub llm_batch_size: usize,
    #[serde(default)]
    pub llm_validation_mode: ValidationMode,
    #[serde(default)]
    pub batching: BatchingConfig,
}

fn default_enable() -> bool {
    true
}

fn default_batch_size() -> usize {
    50
}

impl Default for LlmValidationConfig {
    fn default() -> Self {
        Self {
            enable_llm_validation: default_enable(),
            llm_batch_size: default_batch_size(),
            llm_validation_mode: ValidationMode::default(),
            batching: BatchingConfig::default(),
        }
    }
}

/// A `TRUE_POSITIVE` result is downgraded to `llm_not_flagged` (kept, but
/// not stamped `_llm_validated`) in conservative mode when the LLM's own
/// confidence falls below this threshold (consistent with the fail-safe
/// philosophy of §8 property 7: a low-confidence acceptance isn't treated
/// as a confirmed true positive).
pub const CONSERVATIVE_CONFIDENCE_FLOOR: f64 = 0.5;
