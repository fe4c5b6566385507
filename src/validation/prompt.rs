//! Prompt construction for a validation batch (§4.5 step 1). The prompt
//! format itself is opaque to callers; the one hard requirement is that
//! each finding's ID is echoed verbatim so the response can be joined back
//! by `finding_id`.

use crate::validation::finding::Finding;

pub trait PromptBuilder: Send + Sync {
    fn build_prompt(&self, batch: &[Finding]) -> String;
}

/// Emits one `Finding [<UUID>]: <category>: <evidence...>` line per
/// finding, in batch order.
pub struct DefaultPromptBuilder;

impl PromptBuilder for DefaultPromptBuilder {
    fn build_prompt(&self, batch: &[Finding]) -> String {
        let mut prompt = String::from(
            "Review each finding below and decide whether it is a TRUE_POSITIVE or \
             FALSE_POSITIVE match. Respond with one result per finding, keyed by its ID.\n\n",
        );
        for finding in batch {
            let evidence = finding
                .evidence
                .iter()
                .map(|e| e.content.as_str())
                .collect::<Vec<_>>()
                .join(" | ");
            prompt.push_str(&format!(
                "Finding [{}]: {}: {}\n",
                finding.id, finding.category, evidence
            ));
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_echoes_every_finding_id() {
        let findings = vec![
            Finding::new("a", "cat").with_evidence("ev1"),
            Finding::new("b", "cat").with_evidence("ev2"),
        ];
        let prompt = DefaultPromptBuilder.build_prompt(&findings);
        for finding in &findings {
            assert!(prompt.contains(&finding.id.to_string()));
        }
    }
}
