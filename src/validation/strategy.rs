//! Batching strategies (§4.5 "Two batching modes"). `CountBasedStrategy`
//! packs independent findings up to a fixed batch size; `ExtendedContextStrategy`
//! groups findings by source and packs whole sources that fit the model's
//! context window. Both are grounded on the original source's
//! `batched_files_strategy.py` / `extended_context_strategy.py` pair, unified
//! here behind one `BatchingStrategy` trait rather than a parallel class
//! hierarchy per analyser.

use crate::validation::config::{LlmValidationConfig, SOURCE_PROMPT_OVERHEAD_TOKENS};
use crate::validation::finding::Finding;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BatchError,
    Oversized,
    MissingContent,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::BatchError => "BATCH_ERROR",
            SkipReason::Oversized => "OVERSIZED",
            SkipReason::MissingContent => "MISSING_CONTENT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkippedFinding {
    pub finding: Finding,
    pub reason: SkipReason,
}

/// Abstracts how source content is fetched for `EXTENDED_CONTEXT` batching
/// (§4.5 "Inputs", `sourceProvider`). `tokens_estimate` lets an adapter
/// report a token count without materialising content (e.g. from a cached
/// file-size index); the default derives a rough estimate from content
/// length when the adapter doesn't override it.
pub trait SourceProvider: Send + Sync {
    fn source_id(&self, finding: &Finding) -> String;
    fn get_source_content(&self, source_id: &str) -> Option<String>;

    fn tokens_estimate(&self, source_id: &str) -> usize {
        self.get_source_content(source_id)
            .map(|content| content.len() / 4)
            .unwrap_or(0)
    }
}

pub struct BatchPlan {
    pub batches: Vec<Vec<Finding>>,
    pub pre_skipped: Vec<SkippedFinding>,
}

pub trait BatchingStrategy: Send + Sync {
    fn build_batches(
        &self,
        findings: Vec<Finding>,
        config: &LlmValidationConfig,
        source_provider: &dyn SourceProvider,
    ) -> BatchPlan;
}

/// `COUNT_BASED`: each finding is independent; pack up to
/// `config.llm_batch_size` per call.
pub struct CountBasedStrategy;

impl BatchingStrategy for CountBasedStrategy {
    fn build_batches(
        &self,
        findings: Vec<Finding>,
        config: &LlmValidationConfig,
        _source_provider: &dyn SourceProvider,
    ) -> BatchPlan {
        let batch_size = config.llm_batch_size.max(1);
        let batches = findings
            .chunks(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        BatchPlan {
            batches,
            pre_skipped: Vec::new(),
        }
    }
}

/// `EXTENDED_CONTEXT`: findings are grouped by source; a batch contains
/// whole sources whose combined content (plus a fixed per-source prompt
/// overhead) fits the configured context window. Sources exceeding the
/// window alone are never batched; their findings are pre-skipped as
/// `oversized_source`. Sources with no retrievable content are pre-skipped
/// as `missing_content`.
pub struct ExtendedContextStrategy;

struct SourceGroup {
    source_id: String,
    tokens: usize,
    findings: Vec<Finding>,
}

impl BatchingStrategy for ExtendedContextStrategy {
    fn build_batches(
        &self,
        findings: Vec<Finding>,
        config: &LlmValidationConfig,
        source_provider: &dyn SourceProvider,
    ) -> BatchPlan {
        use std::collections::HashMap;

        let mut by_source: HashMap<String, Vec<Finding>> = HashMap::new();
        for finding in findings {
            let source_id = source_provider.source_id(&finding);
            by_source.entry(source_id).or_default().push(finding);
        }

        let mut source_ids: Vec<String> = by_source.keys().cloned().collect();
        source_ids.sort();

        let window = config.batching.model_context_window;
        let mut pre_skipped = Vec::new();
        let mut groups: Vec<SourceGroup> = Vec::new();

        for source_id in source_ids {
            let source_findings = by_source.remove(&source_id).unwrap();
            if source_provider.get_source_content(&source_id).is_none() {
                for finding in source_findings {
                    pre_skipped.push(SkippedFinding {
                        finding,
                        reason: SkipReason::MissingContent,
                    });
                }
                continue;
            }

            let tokens = source_provider.tokens_estimate(&source_id) + SOURCE_PROMPT_OVERHEAD_TOKENS;
            if tokens > window {
                for finding in source_findings {
                    pre_skipped.push(SkippedFinding {
                        finding,
                        reason: SkipReason::Oversized,
                    });
                }
                continue;
            }

            groups.push(SourceGroup {
                source_id,
                tokens,
                findings: source_findings,
            });
        }

        let batches = pack_groups_into_batches(groups, window);

        BatchPlan {
            batches,
            pre_skipped,
        }
    }
}

/// Greedily packs source groups into batches that fit `window`, in stable
/// (sorted-source-id) order. A single group is already guaranteed `<=
/// window` tokens by the caller.
fn pack_groups_into_batches(groups: Vec<SourceGroup>, window: usize) -> Vec<Vec<Finding>> {
    let mut batches: Vec<Vec<Finding>> = Vec::new();
    let mut current: Vec<Finding> = Vec::new();
    let mut current_tokens = 0usize;

    for group in groups {
        if !current.is_empty() && current_tokens + group.tokens > window {
            batches.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current_tokens += group.tokens;
        current.extend(group.findings);
        let _ = &group.source_id;
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::config::LlmValidationConfig;

    struct MapSourceProvider {
        contents: std::collections::HashMap<String, Option<String>>,
    }

    impl SourceProvider for MapSourceProvider {
        fn source_id(&self, finding: &Finding) -> String {
            finding.source.clone()
        }
        fn get_source_content(&self, source_id: &str) -> Option<String> {
            self.contents.get(source_id).cloned().flatten()
        }
    }

    #[test]
    fn count_based_packs_up_to_batch_size() {
        let findings: Vec<Finding> = (0..5).map(|i| Finding::new("s", format!("c{i}"))).collect();
        let config = LlmValidationConfig {
            llm_batch_size: 2,
            ..Default::default()
        };
        let provider = MapSourceProvider {
            contents: Default::default(),
        };
        let plan = CountBasedStrategy.build_batches(findings, &config, &provider);
        assert_eq!(plan.batches.len(), 3);
        assert_eq!(plan.batches[0].len(), 2);
        assert_eq!(plan.batches[2].len(), 1);
        assert!(plan.pre_skipped.is_empty());
    }

    #[test]
    fn extended_context_skips_oversized_source() {
        let huge = "a".repeat(400_000);
        let findings = vec![
            Finding::new("src/huge.py", "c"),
            Finding::new("src/small.py", "c"),
        ];
        let mut contents = std::collections::HashMap::new();
        contents.insert("src/huge.py".to_string(), Some(huge));
        contents.insert("src/small.py".to_string(), Some("small code".to_string()));
        let provider = MapSourceProvider { contents };

        let config = LlmValidationConfig {
            batching: crate::validation::config::BatchingConfig {
                model_context_window: 10_000,
            },
            ..Default::default()
        };

        let plan = ExtendedContextStrategy.build_batches(findings, &config, &provider);
        assert_eq!(plan.pre_skipped.len(), 1);
        assert_eq!(plan.pre_skipped[0].reason, SkipReason::Oversized);
        assert_eq!(plan.batches.iter().map(Vec::len).sum::<usize>(), 1);
    }

    #[test]
    fn extended_context_skips_missing_content() {
        let findings = vec![
            Finding::new("src/available.py", "c"),
            Finding::new("src/missing.py", "c"),
        ];
        let mut contents = std::collections::HashMap::new();
        contents.insert(
            "src/available.py".to_string(),
            Some("available code".to_string()),
        );
        contents.insert("src/missing.py".to_string(), None);
        let provider = MapSourceProvider { contents };

        let plan = ExtendedContextStrategy.build_batches(
            findings,
            &LlmValidationConfig::default(),
            &provider,
        );
        assert_eq!(plan.pre_skipped.len(), 1);
        assert_eq!(plan.pre_skipped[0].reason, SkipReason::MissingContent);
        assert_eq!(plan.batches.iter().map(Vec::len).sum::<usize>(), 1);
    }

    #[test]
    fn extended_context_groups_findings_by_source_into_one_batch_when_it_fits() {
        let findings = vec![
            Finding::new("src/payments.py", "c"),
            Finding::new("src/payments.py", "c"),
            Finding::new("src/analytics.py", "c"),
        ];
        let mut contents = std::collections::HashMap::new();
        contents.insert("src/payments.py".to_string(), Some("payment code".into()));
        contents.insert("src/analytics.py".to_string(), Some("analytics code".into()));
        let provider = MapSourceProvider { contents };

        let plan = ExtendedContextStrategy.build_batches(
            findings,
            &LlmValidationConfig::default(),
            &provider,
        );
        assert_eq!(plan.batches.len(), 1);
        assert_eq!(plan.batches[0].len(), 3);
    }
}
