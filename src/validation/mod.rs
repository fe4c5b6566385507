//! The analyser-side Validation Engine (C8): token-aware batching of
//! pattern-matched findings, LLM structured-output invocation with a strict
//! response schema, and fail-safe outcome aggregation (§4.5).

pub mod cache;
pub mod config;
pub mod engine;
pub mod finding;
pub mod llm;
pub mod prompt;
pub mod strategy;

pub use cache::CachingLlmService;
pub use config::{BatchingConfig, LlmValidationConfig, ValidationMode};
pub use engine::{CategoryBreakdown, ValidationEngine, ValidationOutcome, ValidationSummary};
pub use finding::{Evidence, Finding, MatchedPattern};
pub use llm::{
    response_schema, CompletionRequest, LlmService, LlmValidationResponse, LlmValidationResult,
    RecommendedAction, ValidationVerdict,
};
pub use prompt::{DefaultPromptBuilder, PromptBuilder};
pub use strategy::{
    BatchPlan, BatchingStrategy, CountBasedStrategy, ExtendedContextStrategy, SkipReason,
    SkippedFinding, SourceProvider,
};
