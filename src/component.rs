//! Connector & Processor contracts, and the factory + registry machinery
//! that turns declarative config into component instances (C3/C9).
//!
//! Connectors and processors are synchronous (they may block on I/O); the
//! executor (§4.3) is what bridges them into the async world via
//! `tokio::task::spawn_blocking`. Plain blocking trait objects, no async
//! trait wrapper (see DESIGN.md).

use crate::error::{PipelineError, Result};
use crate::message::{Message, Schema};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One acceptable input schema for a processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRequirement {
    pub schema_name: String,
    pub version: String,
}

pub trait Connector: Send + Sync {
    fn name(&self) -> &str;
    fn supported_output_schemas(&self) -> Vec<Schema>;

    /// Fails with `ConnectorConfigError` (bad config, missing file, schema
    /// not supported) or `ConnectorExtractionError` (runtime I/O/decoding
    /// failure). No other error kinds are permitted by the contract.
    fn extract(&self, output_schema: &Schema) -> Result<Message>;
}

pub trait Processor: Send + Sync {
    fn name(&self) -> &str;

    /// A disjunction of conjunctions: each inner `Vec` is one acceptable
    /// combination of input schemas, enabling fan-in and alternative shapes.
    fn input_requirements(&self) -> Vec<Vec<InputRequirement>>;
    fn supported_output_schemas(&self) -> Vec<Schema>;

    /// Fails with `AnalyserProcessingError`.
    fn process(&self, inputs: &[Message], output_schema: &Schema) -> Result<Message>;
}

pub trait ConnectorFactory: Send + Sync {
    fn component_name(&self) -> &str;
    fn get_input_schemas(&self) -> Vec<Schema> {
        Vec::new()
    }
    fn get_output_schemas(&self) -> Vec<Schema>;
    /// Never throws; used for discovery and fallback.
    fn can_create(&self, config: &Value) -> bool;
    /// Throws on validation failure.
    fn create(&self, config: &Value) -> Result<Arc<dyn Connector>>;
    /// Names are documentation; reserved for future auto-wiring.
    fn get_service_dependencies(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

pub trait ProcessorFactory: Send + Sync {
    fn component_name(&self) -> &str;
    fn get_input_schemas(&self) -> Vec<Schema>;
    fn get_output_schemas(&self) -> Vec<Schema>;
    fn can_create(&self, config: &Value) -> bool;
    fn create(&self, config: &Value) -> Result<Arc<dyn Processor>>;
    fn get_service_dependencies(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Maps a component-type name to its factory, for each component kind.
#[derive(Default)]
pub struct ComponentRegistry {
    connector_factories: HashMap<String, Arc<dyn ConnectorFactory>>,
    processor_factories: HashMap<String, Arc<dyn ProcessorFactory>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_connector(&mut self, factory: Arc<dyn ConnectorFactory>) {
        self.connector_factories
            .insert(factory.component_name().to_string(), factory);
    }

    pub fn register_processor(&mut self, factory: Arc<dyn ProcessorFactory>) {
        self.processor_factories
            .insert(factory.component_name().to_string(), factory);
    }

    pub fn connector_factory(&self, component_type: &str) -> Result<Arc<dyn ConnectorFactory>> {
        self.connector_factories
            .get(component_type)
            .cloned()
            .ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "no connector factory registered for `{component_type}`"
                ))
            })
    }

    pub fn processor_factory(&self, component_type: &str) -> Result<Arc<dyn ProcessorFactory>> {
        self.processor_factories
            .get(component_type)
            .cloned()
            .ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "no processor factory registered for `{component_type}`"
                ))
            })
    }
}
