//! Property-based tests for the planner's schema-version selection and
//! topological ordering.
//!
//! These check invariants that should hold for any well-formed runbook,
//! rather than fixed example inputs.

use proptest::prelude::*;
use std::sync::Arc;
use waivern_runtime::component::{Connector, ConnectorFactory, Processor, ProcessorFactory};
use waivern_runtime::{plan, ArtifactDefinition, ComponentRegistry, ComponentSpec, Message, Result, Runbook, Schema};

struct StaticConnector(Schema);
impl Connector for StaticConnector {
    fn name(&self) -> &str {
        "static"
    }
    fn supported_output_schemas(&self) -> Vec<Schema> {
        vec![self.0.clone()]
    }
    fn extract(&self, output_schema: &Schema) -> Result<Message> {
        Ok(Message::new("m", output_schema.clone(), serde_json::json!({})))
    }
}

struct StaticConnectorFactory(Vec<Schema>);
impl ConnectorFactory for StaticConnectorFactory {
    fn component_name(&self) -> &str {
        "static"
    }
    fn get_output_schemas(&self) -> Vec<Schema> {
        self.0.clone()
    }
    fn can_create(&self, _config: &serde_json::Value) -> bool {
        true
    }
    fn create(&self, _config: &serde_json::Value) -> Result<Arc<dyn Connector>> {
        Ok(Arc::new(StaticConnector(self.0[0].clone())))
    }
}

struct IdentityProcessor;
impl Processor for IdentityProcessor {
    fn name(&self) -> &str {
        "identity"
    }
    fn input_requirements(&self) -> Vec<Vec<waivern_runtime::component::InputRequirement>> {
        vec![]
    }
    fn supported_output_schemas(&self) -> Vec<Schema> {
        vec![Schema::new("S", 9, 9, 9)]
    }
    fn process(&self, inputs: &[Message], output_schema: &Schema) -> Result<Message> {
        Ok(Message::new("m", output_schema.clone(), inputs[0].content.clone()))
    }
}

struct IdentityProcessorFactory(Vec<Schema>);
impl ProcessorFactory for IdentityProcessorFactory {
    fn component_name(&self) -> &str {
        "identity"
    }
    fn get_input_schemas(&self) -> Vec<Schema> {
        self.0.clone()
    }
    fn get_output_schemas(&self) -> Vec<Schema> {
        vec![Schema::new("S", 9, 9, 9)]
    }
    fn can_create(&self, _config: &serde_json::Value) -> bool {
        true
    }
    fn create(&self, _config: &serde_json::Value) -> Result<Arc<dyn Processor>> {
        Ok(Arc::new(IdentityProcessor))
    }
}

/// Distinct (major, minor, patch) triples, each turned into an `S`-named
/// schema version.
fn version_triple() -> impl Strategy<Value = (u32, u32, u32)> {
    (0u32..4, 0u32..4, 0u32..4)
}

fn distinct_version_sets() -> impl Strategy<Value = (Vec<(u32, u32, u32)>, Vec<(u32, u32, u32)>)> {
    (
        prop::collection::hash_set(version_triple(), 1..6),
        prop::collection::hash_set(version_triple(), 1..6),
    )
        .prop_map(|(offered, requested)| {
            (
                offered.into_iter().collect::<Vec<_>>(),
                requested.into_iter().collect::<Vec<_>>(),
            )
        })
}

proptest! {
    /// Whenever a predecessor's offered versions and a successor's requested
    /// versions share at least one exact (major, minor, patch), planning
    /// succeeds and picks the maximum of the shared set; when they share
    /// none, planning fails with a version mismatch rather than silently
    /// picking something.
    #[test]
    fn negotiation_picks_max_of_intersection_or_reports_mismatch(
        (offered, requested) in distinct_version_sets(),
    ) {
        let offered_schemas: Vec<Schema> = offered
            .iter()
            .map(|&(maj, min, pat)| Schema::new("S", maj, min, pat))
            .collect();
        let requested_schemas: Vec<Schema> = requested
            .iter()
            .map(|&(maj, min, pat)| Schema::new("S", maj, min, pat))
            .collect();

        let mut registry = ComponentRegistry::new();
        registry.register_connector(Arc::new(StaticConnectorFactory(offered_schemas.clone())));
        registry.register_processor(Arc::new(IdentityProcessorFactory(requested_schemas.clone())));
        let registry = Arc::new(registry);

        let runbook = Runbook::new("r")
            .with_artifact(
                "A",
                ArtifactDefinition::leaf(
                    ComponentSpec { component_type: "static".into(), properties: serde_json::json!({}) },
                    false,
                    false,
                ),
            )
            .with_artifact(
                "B",
                ArtifactDefinition::derived(
                    vec!["A".into()],
                    Some(ComponentSpec { component_type: "identity".into(), properties: serde_json::json!({}) }),
                    false,
                    true,
                )
                .unwrap(),
            );

        let offered_set: std::collections::HashSet<_> = offered.iter().cloned().collect();
        let requested_set: std::collections::HashSet<_> = requested.iter().cloned().collect();
        let intersection_max = offered_set.intersection(&requested_set).max().copied();

        match (plan(&runbook, &registry), intersection_max) {
            (Ok(execution_plan), Some(expected)) => {
                let input_schema = execution_plan
                    .artifact_schemas
                    .get("B")
                    .unwrap()
                    .input_schema
                    .clone()
                    .expect("negotiated input schema");
                prop_assert_eq!(input_schema.version_tuple(), expected);
            }
            (Err(_), None) => {
                // No shared version: planning must fail, which it did.
            }
            (Ok(_), None) => {
                prop_assert!(false, "planning succeeded with no shared schema version");
            }
            (Err(e), Some(expected)) => {
                prop_assert!(false, "planning failed despite a shared version {expected:?}: {e}");
            }
        }
    }
}

/// Builds a chain `leaf_0 -> leaf_1 -> ... -> leaf_{n-1}` (each a passthrough
/// except the last hop, which runs through identity) and checks the
/// planner's execution order respects every dependency: every artifact
/// appears in a later batch than all of its inputs.
proptest! {
    #[test]
    fn execution_order_respects_dependencies(chain_length in 2usize..8) {
        let schema = Schema::new("S", 1, 0, 0);
        let mut registry = ComponentRegistry::new();
        registry.register_connector(Arc::new(StaticConnectorFactory(vec![schema.clone()])));
        registry.register_processor(Arc::new(IdentityProcessorFactory(vec![schema.clone()])));
        let registry = Arc::new(registry);

        let mut runbook = Runbook::new("r").with_artifact(
            "artifact-0",
            ArtifactDefinition::leaf(
                ComponentSpec { component_type: "static".into(), properties: serde_json::json!({}) },
                false,
                false,
            ),
        );
        for i in 1..chain_length {
            runbook = runbook.with_artifact(
                format!("artifact-{i}"),
                ArtifactDefinition::derived(
                    vec![format!("artifact-{}", i - 1)],
                    Some(ComponentSpec { component_type: "identity".into(), properties: serde_json::json!({}) }),
                    false,
                    i == chain_length - 1,
                )
                .unwrap(),
            );
        }

        let execution_plan = plan(&runbook, &registry).unwrap();
        let mut batch_of = std::collections::HashMap::new();
        for (batch_index, batch) in execution_plan.dag.execution_order().iter().enumerate() {
            for artifact_id in batch {
                batch_of.insert(artifact_id.clone(), batch_index);
            }
        }

        for i in 1..chain_length {
            let this = batch_of[&format!("artifact-{i}")];
            let pred = batch_of[&format!("artifact-{}", i - 1)];
            prop_assert!(this > pred);
        }
    }
}
