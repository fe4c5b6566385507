//! The validation engine (C8): takes raw pattern-matched findings and
//! refines them via an LLM, with token-aware batching, strict
//! structured-output parsing, and fail-safe aggregation (§4.5).
//!
//! Grounded on `original_source/libs/waivern-analysers-shared/.../
//! llm_validation/{extended_context_strategy,batched_files_strategy}.py`'s
//! `validate_findings` methods, unified behind one engine parameterised by
//! a `BatchingStrategy` rather than duplicated per concrete strategy class.

use crate::validation::config::{LlmValidationConfig, ValidationMode, CONSERVATIVE_CONFIDENCE_FLOOR};
use crate::validation::finding::Finding;
use crate::validation::llm::{response_schema, CompletionRequest, LlmService, ValidationVerdict};
use crate::validation::prompt::{DefaultPromptBuilder, PromptBuilder};
use crate::validation::strategy::{BatchingStrategy, SkipReason, SkippedFinding, SourceProvider};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct CategoryBreakdown {
    pub kept: usize,
    pub removed: usize,
    pub not_flagged: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationSummary {
    pub total: usize,
    pub kept: usize,
    pub removed: usize,
    pub not_flagged: usize,
    pub skipped: usize,
    pub by_category: HashMap<String, CategoryBreakdown>,
}

/// Output of a validation run (§4.5 "Output"). `validation_succeeded` is
/// `false` whenever any finding was skipped (batch error, oversize, missing
/// content, or no LLM service): a signal of *partial* validation, not a
/// hard failure. `kept_findings` is always well-formed regardless.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub kept_findings: Vec<Finding>,
    pub llm_validated_kept: Vec<Uuid>,
    pub llm_validated_removed: Vec<Uuid>,
    pub llm_not_flagged: Vec<Uuid>,
    pub skipped: Vec<SkippedFinding>,
    pub validation_succeeded: bool,
}

impl ValidationOutcome {
    /// Sorted by finding ID so repeated runs over the same input produce an
    /// identical summary (§5 "Ordering guarantees between concurrent
    /// operations": batch order is unspecified, aggregation must not be).
    pub fn summary(&self) -> ValidationSummary {
        let mut summary = ValidationSummary {
            total: self.kept_findings.len() + self.removed_count(),
            kept: self.kept_findings.len(),
            removed: self.llm_validated_removed.len(),
            not_flagged: self.llm_not_flagged.len(),
            skipped: self.skipped.len(),
            by_category: HashMap::new(),
        };

        for finding in &self.kept_findings {
            let entry = summary.by_category.entry(finding.category.clone()).or_default();
            if self.llm_validated_kept.contains(&finding.id) {
                entry.kept += 1;
            } else {
                entry.not_flagged += 1;
            }
        }
        for skipped in &self.skipped {
            summary
                .by_category
                .entry(skipped.finding.category.clone())
                .or_default()
                .skipped += 1;
        }

        summary
    }

    fn removed_count(&self) -> usize {
        self.llm_validated_removed.len()
    }
}

pub struct ValidationEngine {
    llm_service: Option<Arc<dyn LlmService>>,
    strategy: Box<dyn BatchingStrategy>,
    prompt_builder: Box<dyn PromptBuilder>,
    model_name: String,
}

impl ValidationEngine {
    pub fn new(llm_service: Option<Arc<dyn LlmService>>, strategy: Box<dyn BatchingStrategy>) -> Self {
        Self {
            llm_service,
            strategy,
            prompt_builder: Box::new(DefaultPromptBuilder),
            model_name: "default".to_string(),
        }
    }

    pub fn with_prompt_builder(mut self, prompt_builder: Box<dyn PromptBuilder>) -> Self {
        self.prompt_builder = prompt_builder;
        self
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Refines `findings` per §4.5. An empty input is idempotently a no-op
    /// (§8 property 8) without ever touching the batching strategy or the
    /// LLM service.
    pub fn validate(
        &self,
        findings: Vec<Finding>,
        config: &LlmValidationConfig,
        source_provider: &dyn SourceProvider,
    ) -> ValidationOutcome {
        if findings.is_empty() {
            return ValidationOutcome {
                validation_succeeded: true,
                ..Default::default()
            };
        }

        if !config.enable_llm_validation {
            return ValidationOutcome {
                kept_findings: findings,
                validation_succeeded: true,
                ..Default::default()
            };
        }

        let Some(llm_service) = &self.llm_service else {
            warn!("LLM validation requested but no LLM service is registered; keeping findings unvalidated");
            return ValidationOutcome {
                kept_findings: findings,
                validation_succeeded: false,
                ..Default::default()
            };
        };

        let plan = self.strategy.build_batches(findings, config, source_provider);
        let mut outcome = ValidationOutcome {
            validation_succeeded: plan.pre_skipped.is_empty(),
            ..Default::default()
        };

        for pre_skipped in plan.pre_skipped {
            outcome.kept_findings.push(pre_skipped.finding.clone());
            outcome.skipped.push(pre_skipped);
        }

        for batch in plan.batches {
            self.run_batch(batch, config, llm_service.as_ref(), &mut outcome);
        }

        outcome.kept_findings.sort_by_key(|f| f.id);
        outcome.llm_validated_kept.sort();
        outcome.llm_validated_removed.sort();
        outcome.llm_not_flagged.sort();

        outcome
    }

    fn run_batch(
        &self,
        batch: Vec<Finding>,
        config: &LlmValidationConfig,
        llm_service: &dyn LlmService,
        outcome: &mut ValidationOutcome,
    ) {
        let batch_ids: std::collections::HashSet<Uuid> = batch.iter().map(|f| f.id).collect();
        let prompt = self.prompt_builder.build_prompt(&batch);
        let request = CompletionRequest {
            prompt,
            response_schema: response_schema(),
            model_name: self.model_name.clone(),
        };

        let response = match llm_service.complete(&request) {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, batch_size = batch.len(), "LLM batch validation failed");
                outcome.validation_succeeded = false;
                for finding in batch {
                    outcome.kept_findings.push(finding.clone());
                    outcome.skipped.push(SkippedFinding {
                        finding,
                        reason: SkipReason::BatchError,
                    });
                }
                return;
            }
        };

        // Defensive against LLM drift: discard entries for IDs that weren't
        // in this batch, then join by finding_id (§4.5 step 3/4).
        let mut by_id: HashMap<Uuid, crate::validation::llm::LlmValidationResult> = HashMap::new();
        for result in response.results {
            if batch_ids.contains(&result.finding_id) {
                by_id.insert(result.finding_id, result);
            }
        }

        for mut finding in batch {
            match by_id.get(&finding.id) {
                None => {
                    // Fail-safe: omission is not rejection.
                    outcome.llm_not_flagged.push(finding.id);
                    outcome.kept_findings.push(finding);
                }
                Some(result) => match result.validation_result {
                    ValidationVerdict::FalsePositive => {
                        outcome.llm_validated_removed.push(finding.id);
                    }
                    ValidationVerdict::TruePositive => {
                        let downgrade = config.llm_validation_mode == ValidationMode::Conservative
                            && result.confidence < CONSERVATIVE_CONFIDENCE_FLOOR;
                        if downgrade {
                            outcome.llm_not_flagged.push(finding.id);
                        } else {
                            finding.mark_llm_validated();
                            outcome.llm_validated_kept.push(finding.id);
                        }
                        outcome.kept_findings.push(finding);
                    }
                },
            }
        }
    }
}
