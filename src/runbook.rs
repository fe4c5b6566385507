//! Pure data: `Runbook`, `ArtifactDefinition`, run-wide `RunConfig` (C5).
//!
//! This module only models the shapes named in the YAML runbook file (§6);
//! loading and validating an actual YAML document is an external
//! collaborator's job.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// One or more input artifact IDs. Deserializes from either a bare string or
/// a list, normalising to a list at construction time (§4.2 step 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputRef {
    Single(String),
    Many(Vec<String>),
}

impl InputRef {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            InputRef::Single(id) => vec![id],
            InputRef::Many(ids) => ids,
        }
    }
}

/// An artifact is either a `Leaf` (produced by a connector from an external
/// source) or `Derived` (produced from predecessor artifacts, optionally via
/// a processor; absent `process` means passthrough).
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactKind {
    Leaf { source: ComponentSpec },
    Derived {
        inputs: Vec<String>,
        process: Option<ComponentSpec>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactDefinition {
    pub kind: ArtifactKind,
    pub optional: bool,
    pub output: bool,
}

impl ArtifactDefinition {
    /// Enforces invariant 3 (§3): exactly one of `source`/`inputs`, and a
    /// derived artifact needs at least one input.
    pub fn leaf(source: ComponentSpec, optional: bool, output: bool) -> Self {
        Self {
            kind: ArtifactKind::Leaf { source },
            optional,
            output,
        }
    }

    pub fn derived(
        inputs: Vec<String>,
        process: Option<ComponentSpec>,
        optional: bool,
        output: bool,
    ) -> Result<Self> {
        if inputs.is_empty() {
            return Err(PipelineError::configuration(
                "derived artifact must declare at least one input",
            ));
        }
        Ok(Self {
            kind: ArtifactKind::Derived { inputs, process },
            optional,
            output,
        })
    }

    pub fn inputs(&self) -> &[String] {
        match &self.kind {
            ArtifactKind::Leaf { .. } => &[],
            ArtifactKind::Derived { inputs, .. } => inputs,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, ArtifactKind::Leaf { .. })
    }

    /// A derived artifact with no `process` forwards its single input
    /// verbatim (§4.3 step 4 "Passthrough").
    pub fn is_passthrough(&self) -> bool {
        matches!(
            &self.kind,
            ArtifactKind::Derived { process: None, .. }
        )
    }
}

/// Wire shape of an `ArtifactDefinition` as it would appear under a YAML
/// `artifacts:` map. Deserialized here and converted via `TryFrom` so the
/// invariant-enforcing constructors above stay the only way to build one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDefinitionWire {
    pub source: Option<ComponentSpec>,
    pub inputs: Option<InputRef>,
    pub process: Option<ComponentSpec>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub output: bool,
}

impl TryFrom<ArtifactDefinitionWire> for ArtifactDefinition {
    type Error = PipelineError;

    fn try_from(wire: ArtifactDefinitionWire) -> Result<Self> {
        match (wire.source, wire.inputs) {
            (Some(source), None) => {
                if wire.process.is_some() {
                    return Err(PipelineError::configuration(
                        "leaf artifact may not declare a process",
                    ));
                }
                Ok(ArtifactDefinition::leaf(source, wire.optional, wire.output))
            }
            (None, Some(inputs)) => ArtifactDefinition::derived(
                inputs.into_vec(),
                wire.process,
                wire.optional,
                wire.output,
            ),
            (Some(_), Some(_)) => Err(PipelineError::configuration(
                "artifact declares both `source` and `inputs`",
            )),
            (None, None) => Err(PipelineError::configuration(
                "artifact declares neither `source` nor `inputs`",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_timeout_seconds() -> u64 {
    3600
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Runbook {
    pub name: String,
    pub description: Option<String>,
    pub artifacts: HashMap<String, ArtifactDefinition>,
    pub aliases: HashMap<String, String>,
    pub config: RunConfig,
}

impl Runbook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            artifacts: HashMap::new(),
            aliases: HashMap::new(),
            config: RunConfig::default(),
        }
    }

    pub fn with_artifact(mut self, id: impl Into<String>, def: ArtifactDefinition) -> Self {
        self.artifacts.insert(id.into(), def);
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), artifact_id.into());
        self
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_and_inputs_are_mutually_exclusive() {
        let wire = ArtifactDefinitionWire {
            source: Some(ComponentSpec {
                component_type: "static".into(),
                properties: serde_json::json!({}),
            }),
            inputs: Some(InputRef::Single("A".into())),
            process: None,
            optional: false,
            output: false,
        };
        assert!(ArtifactDefinition::try_from(wire).is_err());
    }

    #[test]
    fn neither_source_nor_inputs_is_rejected() {
        let wire = ArtifactDefinitionWire {
            source: None,
            inputs: None,
            process: None,
            optional: false,
            output: false,
        };
        assert!(ArtifactDefinition::try_from(wire).is_err());
    }

    #[test]
    fn single_input_normalises_to_one_element_vec() {
        let def = ArtifactDefinition::derived(vec!["A".into()], None, false, false).unwrap();
        assert_eq!(def.inputs(), &["A".to_string()]);
        assert!(def.is_passthrough());
    }

    #[test]
    fn run_config_defaults_match_spec() {
        let config = RunConfig::default();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.timeout_seconds, 3600);
    }

    #[test]
    fn run_config_deserializes_with_defaults_when_missing() {
        let config: RunConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RunConfig::default());
    }
}
