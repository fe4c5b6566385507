//! A compliance-analysis pipeline runtime: given a declarative runbook that
//! names data sources, derivation steps, and outputs, this crate plans an
//! artifact DAG and executes it with bounded parallelism, producing a set
//! of named, typed artifacts.
//!
//! Architecture:
//! - Message & Schema (`message`): the immutable envelope exchanged
//!   between components.
//! - Service Container (`service`): typed dependency resolution with
//!   singleton/transient lifetimes.
//! - Component model (`component`): connector/processor contracts plus the
//!   factory + registry machinery.
//! - Artifact Store (`store`): the write-once, per-run key/value store of
//!   produced messages.
//! - Runbook (`runbook`): the declarative input model.
//! - Planner (`planner`): runbook -> immutable execution plan.
//! - DAG Executor (`executor`): runs a plan with bounded concurrency,
//!   timeouts, and cascade-skip on failure.
//! - Validation Engine (`validation`): the analyser-side sub-engine that
//!   refines pattern-matched findings via an LLM.

pub mod component;
pub mod error;
pub mod executor;
pub mod message;
pub mod planner;
pub mod runbook;
pub mod service;
pub mod store;
pub mod validation;

pub use component::{
    ComponentRegistry, Connector, ConnectorFactory, InputRequirement, Processor, ProcessorFactory,
};
pub use error::{PipelineError, Result};
pub use executor::{DagExecutor, ExecutionResult};
pub use message::{ExecutionContext, ExecutionStatus, Message, Origin, Schema};
pub use planner::{plan, ArtifactSchemas, ExecutionDag, ExecutionPlan};
pub use runbook::{ArtifactDefinition, ArtifactKind, ComponentSpec, RunConfig, Runbook};
pub use service::{Lifetime, ServiceContainer};
pub use store::{ArtifactStore, InMemoryArtifactStore};
