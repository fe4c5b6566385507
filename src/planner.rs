//! Builds an immutable `ExecutionPlan` from a `Runbook` and a
//! `ComponentRegistry` (C6). The acyclicity check generalises
//! `PipelineDAG::topological_sort` (Kahn's algorithm over a fixed `StageId`
//! enum) to arbitrary artifact IDs, and reports the offending cycle rather
//! than a bare "cycle detected" (Scenario 3 requires naming both IDs).
//! Per-edge schema negotiation follows the original source's
//! `waivern_orchestration::dag::ExecutionDAG` + the schema-version-selection
//! rule in §4.2 step 5/§9.

use crate::component::{ComponentRegistry, ConnectorFactory, ProcessorFactory};
use crate::error::{PipelineError, Result};
use crate::message::Schema;
use crate::runbook::{ArtifactKind, Runbook};
use std::collections::{HashMap, HashSet, VecDeque};

/// Forward and reverse adjacency maps over artifact IDs.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionDag {
    /// artifact -> its predecessors (inputs)
    forward: HashMap<String, Vec<String>>,
    /// artifact -> its dependents
    reverse: HashMap<String, Vec<String>>,
    /// topological execution order, grouped into parallel-ready batches
    execution_order: Vec<Vec<String>>,
}

impl ExecutionDag {
    pub fn predecessors(&self, artifact_id: &str) -> &[String] {
        self.forward
            .get(artifact_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn dependents(&self, artifact_id: &str) -> &[String] {
        self.reverse
            .get(artifact_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn execution_order(&self) -> &[Vec<String>] {
        &self.execution_order
    }

    /// All transitive dependents of `artifact_id`, via iterative BFS over
    /// the reverse graph (§4.3 "Failure cascade": explicit queue to handle
    /// deep chains without recursion).
    pub fn transitive_dependents(&self, artifact_id: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(artifact_id);
        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents(current) {
                if seen.insert(dependent.clone()) {
                    queue.push_back(dependent.as_str());
                }
            }
        }
        seen
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSchemas {
    pub input_schema: Option<Schema>,
    pub output_schema: Schema,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub runbook: Runbook,
    pub dag: ExecutionDag,
    pub artifact_schemas: HashMap<String, ArtifactSchemas>,
    pub reversed_aliases: HashMap<String, String>,
}

/// Builds an `ExecutionDag`, validating invariants 1/3/5 (§3) and acyclicity
/// (§4.2 steps 1-4), then resolves per-edge schema versions and the alias
/// reverse-index (steps 5-6).
pub fn plan(runbook: &Runbook, registry: &ComponentRegistry) -> Result<ExecutionPlan> {
    validate_referential_integrity(runbook)?;

    let dag = build_dag(runbook)?;
    let artifact_schemas = resolve_schemas(runbook, registry, &dag)?;
    let reversed_aliases = invert_aliases(runbook)?;

    Ok(ExecutionPlan {
        runbook: runbook.clone(),
        dag,
        artifact_schemas,
        reversed_aliases,
    })
}

fn validate_referential_integrity(runbook: &Runbook) -> Result<()> {
    for (artifact_id, def) in &runbook.artifacts {
        for input in def.inputs() {
            if !runbook.artifacts.contains_key(input) {
                return Err(PipelineError::Configuration(format!(
                    "artifact `{artifact_id}` references unknown input `{input}`"
                )));
            }
        }
    }
    for (alias, target) in &runbook.aliases {
        if !runbook.artifacts.contains_key(target) {
            return Err(PipelineError::Configuration(format!(
                "alias `{alias}` resolves to unknown artifact `{target}`"
            )));
        }
    }
    Ok(())
}

fn build_dag(runbook: &Runbook) -> Result<ExecutionDag> {
    let mut forward: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse: HashMap<String, Vec<String>> = HashMap::new();
    let mut in_degree: HashMap<String, usize> = HashMap::new();

    for artifact_id in runbook.artifacts.keys() {
        forward.entry(artifact_id.clone()).or_default();
        reverse.entry(artifact_id.clone()).or_default();
        in_degree.entry(artifact_id.clone()).or_insert(0);
    }

    for (artifact_id, def) in &runbook.artifacts {
        for input in def.inputs() {
            forward.get_mut(artifact_id).unwrap().push(input.clone());
            reverse.get_mut(input).unwrap().push(artifact_id.clone());
            *in_degree.get_mut(artifact_id).unwrap() += 1;
        }
    }

    let execution_order = topological_sort(&runbook.artifacts, &forward, in_degree)?;

    Ok(ExecutionDag {
        forward,
        reverse,
        execution_order,
    })
}

/// Kahn's algorithm, grouping each round's zero-in-degree frontier into one
/// parallel-ready batch. On stall (a cycle), a second pass over the
/// remaining nodes' predecessor edges recovers one offending cycle to name
/// in the error (Scenario 3).
fn topological_sort(
    artifacts: &std::collections::HashMap<String, crate::runbook::ArtifactDefinition>,
    forward: &HashMap<String, Vec<String>>,
    mut in_degree: HashMap<String, usize>,
) -> Result<Vec<Vec<String>>> {
    let mut ready: VecDeque<String> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| id.clone())
        .collect();
    let mut ready_sorted: Vec<String> = ready.iter().cloned().collect();
    ready_sorted.sort();
    ready = ready_sorted.into();

    let mut order = Vec::new();
    let mut remaining = in_degree.len();

    while !ready.is_empty() {
        let mut batch: Vec<String> = ready.drain(..).collect();
        batch.sort();
        remaining -= batch.len();

        let mut next_ready = Vec::new();
        for artifact_id in &batch {
            // Dependents are artifacts whose `inputs` contain artifact_id.
            for (candidate, preds) in forward {
                if preds.contains(artifact_id) {
                    let degree = in_degree.get_mut(candidate).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        next_ready.push(candidate.clone());
                    }
                }
            }
        }
        order.push(batch);
        next_ready.sort();
        ready = next_ready.into();
    }

    if remaining > 0 {
        let stuck: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id)
            .collect();
        let cycle = find_cycle(artifacts, &stuck);
        return Err(PipelineError::CycleDetected(cycle));
    }

    Ok(order)
}

/// DFS with a colouring scheme (white/grey/black) restricted to the nodes
/// still stuck after Kahn's algorithm stalls, returning the first cycle found.
fn find_cycle(
    artifacts: &std::collections::HashMap<String, crate::runbook::ArtifactDefinition>,
    stuck: &[String],
) -> Vec<String> {
    #[derive(PartialEq, Clone, Copy)]
    enum Colour {
        White,
        Grey,
        Black,
    }

    let stuck_set: HashSet<&String> = stuck.iter().collect();
    let mut colour: HashMap<&str, Colour> = stuck.iter().map(|id| (id.as_str(), Colour::White)).collect();
    let mut path = Vec::new();

    fn visit<'a>(
        node: &'a str,
        artifacts: &'a std::collections::HashMap<String, crate::runbook::ArtifactDefinition>,
        stuck_set: &HashSet<&'a String>,
        colour: &mut HashMap<&'a str, Colour>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        colour.insert(node, Colour::Grey);
        path.push(node.to_string());

        if let Some(def) = artifacts.get(node) {
            for input in def.inputs() {
                if !stuck_set.contains(input) {
                    continue;
                }
                match colour.get(input.as_str()) {
                    Some(Colour::Grey) => {
                        let start = path.iter().position(|id| id == input).unwrap_or(0);
                        let mut cycle = path[start..].to_vec();
                        cycle.push(input.clone());
                        return Some(cycle);
                    }
                    Some(Colour::White) | None => {
                        if let Some(found) = visit(input, artifacts, stuck_set, colour, path) {
                            return Some(found);
                        }
                    }
                    Some(Colour::Black) => {}
                }
            }
        }

        path.pop();
        colour.insert(node, Colour::Black);
        None
    }

    for start in stuck {
        if colour.get(start.as_str()) == Some(&Colour::White) {
            if let Some(cycle) = visit(start, artifacts, &stuck_set, &mut colour, &mut path) {
                return cycle;
            }
        }
    }

    stuck.to_vec()
}

/// Resolves, for each artifact, its pinned output schema, and for derived
/// artifacts the input schema selected on each predecessor edge (§4.2 step 5).
///
/// A connector/processor factory may *declare* several output schema
/// versions it is capable of producing; at runtime it produces exactly one
/// message carrying exactly one of them. The version actually pinned for a
/// leaf is therefore not simply "the first declared": it is whichever
/// version survives intersection against every processor that consumes it
/// (§4.2 step 5: "intersect the offered version sets ... pick the highest
/// compatible semver"). Processor-produced (non-passthrough) artifacts pin
/// their own declared output independently of this negotiation, since their
/// output schema is unrelated to what they consume.
fn resolve_schemas(
    runbook: &Runbook,
    registry: &ComponentRegistry,
    dag: &ExecutionDag,
) -> Result<HashMap<String, ArtifactSchemas>> {
    // Candidate output schemas each artifact is *capable* of producing,
    // before any edge negotiation narrows a leaf down to one concrete
    // version. Passthrough artifacts have no candidates of their own: they
    // inherit whatever their first predecessor ends up pinned to.
    let mut candidates: HashMap<String, Vec<Schema>> = HashMap::new();
    let mut own_output: HashMap<String, Schema> = HashMap::new();

    for (artifact_id, def) in &runbook.artifacts {
        match &def.kind {
            ArtifactKind::Leaf { source } => {
                let factory = registry.connector_factory(&source.component_type)?;
                let schemas = factory.get_output_schemas();
                if schemas.is_empty() {
                    return Err(PipelineError::Configuration(format!(
                        "connector `{}` declares no output schemas",
                        source.component_type
                    )));
                }
                candidates.insert(artifact_id.clone(), schemas);
            }
            ArtifactKind::Derived {
                process: Some(process),
                ..
            } => {
                let factory = registry.processor_factory(&process.component_type)?;
                let schema = factory
                    .get_output_schemas()
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        PipelineError::Configuration(format!(
                            "processor `{}` declares no output schemas",
                            process.component_type
                        ))
                    })?;
                candidates.insert(artifact_id.clone(), vec![schema.clone()]);
                own_output.insert(artifact_id.clone(), schema);
            }
            ArtifactKind::Derived { process: None, .. } => {
                // Resolved in the passthrough-inheritance pass below.
            }
        }
    }

    // Negotiate each (pred -> succ) edge for non-passthrough derived
    // artifacts, pinning the predecessor's candidate set down to the
    // negotiated version and recording the succ's negotiated input schema.
    // A predecessor feeding several successors is pinned by its last
    // negotiated edge in iteration order; declaring incompatible demands
    // across multiple successors of the same predecessor is a configuration
    // error the planner does not attempt to reconcile further.
    let mut input_schema: HashMap<String, Schema> = HashMap::new();

    for (artifact_id, def) in &runbook.artifacts {
        if let ArtifactKind::Derived {
            inputs,
            process: Some(process),
        } = &def.kind
        {
            let factory = registry.processor_factory(&process.component_type)?;
            let declared_inputs = factory.get_input_schemas();

            for pred_id in inputs {
                let offered = candidates.get(pred_id).cloned().unwrap_or_default();

                let offered_for_name: Vec<&Schema> =
                    offered.iter().filter(|s| {
                        declared_inputs.iter().any(|d| d.name == s.name)
                    }).collect();
                if offered_for_name.is_empty() {
                    return Err(PipelineError::SchemaIncompatible {
                        predecessor: pred_id.clone(),
                        successor: artifact_id.clone(),
                    });
                }

                let schema_name = offered_for_name[0].name.clone();
                let requested_for_name: Vec<&Schema> = declared_inputs
                    .iter()
                    .filter(|s| s.name == schema_name)
                    .collect();

                let offered_versions: HashSet<(u32, u32, u32)> =
                    offered_for_name.iter().map(|s| s.version_tuple()).collect();
                let compatible: Vec<&Schema> = requested_for_name
                    .iter()
                    .filter(|s| offered_versions.contains(&s.version_tuple()))
                    .copied()
                    .collect();

                let chosen = compatible
                    .iter()
                    .max_by_key(|s| s.version_tuple())
                    .copied()
                    .ok_or_else(|| PipelineError::SchemaVersionMismatch {
                        schema_name: schema_name.clone(),
                        offered: offered_for_name.iter().map(|s| s.version_string()).collect(),
                        requested: requested_for_name.iter().map(|s| s.version_string()).collect(),
                    })?
                    .clone();

                candidates.insert(pred_id.clone(), vec![chosen.clone()]);
                input_schema.insert(artifact_id.clone(), chosen);
            }
        }
    }

    let mut resolved: HashMap<String, ArtifactSchemas> = HashMap::new();
    for (artifact_id, def) in &runbook.artifacts {
        if def.is_passthrough() {
            continue;
        }
        let output_schema = if let Some(schema) = own_output.get(artifact_id) {
            schema.clone()
        } else {
            // Leaf: pinned by negotiation above if it has a consumer,
            // otherwise defaults to the highest schema it declares.
            candidates
                .get(artifact_id)
                .and_then(|schemas| schemas.iter().max_by_key(|s| s.version_tuple()))
                .cloned()
                .expect("leaf candidates populated in the first pass")
        };
        resolved.insert(
            artifact_id.clone(),
            ArtifactSchemas {
                input_schema: input_schema.get(artifact_id).cloned(),
                output_schema,
            },
        );
    }

    // Second pass: passthrough artifacts inherit their first predecessor's
    // output schema; predecessors are resolved first because
    // `execution_order` places them earlier, but we simply iterate until
    // stable since the DAG is small and acyclic.
    //
    // A fan-in passthrough (more than one input, §4.3 step 4/§9) is still
    // pinned here even though production will fail with a captured
    // "fan-in passthrough merge is not implemented" error: every artifact
    // in the plan needs an entry in `artifact_schemas` so the executor can
    // look one up before it ever calls into `produce_derived`, where that
    // error is actually raised.
    let mut changed = true;
    while changed {
        changed = false;
        for (artifact_id, def) in &runbook.artifacts {
            if resolved.contains_key(artifact_id) {
                continue;
            }
            if let ArtifactKind::Derived { inputs, process: None } = &def.kind {
                if let Some(pred) = inputs.first().and_then(|first| resolved.get(first)) {
                    resolved.insert(
                        artifact_id.clone(),
                        ArtifactSchemas {
                            input_schema: Some(pred.output_schema.clone()),
                            output_schema: pred.output_schema.clone(),
                        },
                    );
                    changed = true;
                }
            }
        }
    }

    let _ = dag;
    Ok(resolved)
}

/// Inverts `runbook.aliases` (alias -> artifact) into (artifact -> alias).
/// When multiple aliases target the same artifact, the lexicographically
/// smallest alias wins, for a deterministic inverse (§4.2 step 6, §9).
fn invert_aliases(runbook: &Runbook) -> Result<HashMap<String, String>> {
    let mut reversed: HashMap<String, String> = HashMap::new();
    let mut sorted_aliases: Vec<(&String, &String)> = runbook.aliases.iter().collect();
    sorted_aliases.sort_by(|a, b| a.0.cmp(b.0));

    for (alias, artifact_id) in sorted_aliases {
        reversed
            .entry(artifact_id.clone())
            .and_modify(|existing| {
                if alias < existing {
                    *existing = alias.clone();
                }
            })
            .or_insert_with(|| alias.clone());
    }
    Ok(reversed)
}
