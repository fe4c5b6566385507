//! The immutable envelope that flows between connectors, processors, and the
//! artifact store: `Schema`, `Message`, and `ExecutionContext`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identity of a message shape: a name plus a `(major, minor, patch)` version.
///
/// Modelled as integer components rather than a raw semver string (§9 Design
/// Notes) so comparison and intersection don't re-parse on every call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Schema {
    pub fn new(name: impl Into<String>, major: u32, minor: u32, patch: u32) -> Self {
        Self {
            name: name.into(),
            major,
            minor,
            patch,
        }
    }

    pub fn version_tuple(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.patch)
    }

    /// Parses a `"major.minor.patch"` string, the shape schemas arrive in at
    /// the YAML/wire boundary. Returns `None` on malformed input.
    pub fn parse_version(name: impl Into<String>, version: &str) -> Option<Self> {
        let mut parts = version.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(name, major, minor, patch))
    }

    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version_string())
    }
}

impl PartialOrd for Schema {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Schema {
    /// Orders by version only; callers compare within a fixed `name` (the
    /// planner never orders schemas of different names against each other).
    fn cmp(&self, other: &Self) -> Ordering {
        self.version_tuple().cmp(&other.version_tuple())
    }
}

/// Where a produced message originated from, for `ExecutionContext::origin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Parent,
    Child(String),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Parent => write!(f, "parent"),
            Origin::Child(name) => write!(f, "child:{name}"),
        }
    }
}

/// Derives `origin` from an artifact ID's namespace prefix: IDs of the form
/// `child:<runbookName>:<localID>` belong to a child runbook expansion;
/// everything else belongs to the parent run.
pub fn origin_from_artifact_id(artifact_id: &str) -> Origin {
    let mut parts = artifact_id.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("child"), Some(name), Some(_)) => Origin::Child(name.to_string()),
        _ => Origin::Parent,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

/// Annotation the executor attaches to a produced message; never present on
/// the value a connector/processor hands back directly (§9 "Message
/// immutability": the executor builds a new `Message` carrying this).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub status: ExecutionStatus,
    pub duration_seconds: f64,
    pub origin: Origin,
    pub alias: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageExtensions {
    pub execution: Option<ExecutionContext>,
}

/// An immutable typed envelope exchanged between components. Once built, a
/// `Message` is never mutated in place: annotating it with an
/// `ExecutionContext` produces a new value (see `Message::with_execution`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub schema: Schema,
    pub content: serde_json::Value,
    pub source: Option<String>,
    #[serde(default)]
    pub extensions: MessageExtensions,
}

impl Message {
    pub fn new(id: impl Into<String>, schema: Schema, content: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            schema,
            content,
            source: None,
            extensions: MessageExtensions::default(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns a copy of `self` with `extensions.execution` populated,
    /// leaving the original message untouched.
    pub fn with_execution(&self, execution: ExecutionContext) -> Self {
        let mut copy = self.clone();
        copy.extensions.execution = Some(execution);
        copy
    }

    /// Builds a synthetic error message (§4.3 step 6): empty content, no
    /// source, execution context carrying the error and elapsed duration.
    pub fn error(
        id: impl Into<String>,
        schema: Schema,
        origin: Origin,
        alias: Option<String>,
        duration_seconds: f64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            schema,
            content: serde_json::Value::Null,
            source: None,
            extensions: MessageExtensions {
                execution: Some(ExecutionContext {
                    status: ExecutionStatus::Error,
                    duration_seconds,
                    origin,
                    alias,
                    error: Some(error.into()),
                }),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.extensions.execution.as_ref().map(|e| &e.status),
            Some(ExecutionStatus::Success) | None
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self.extensions.execution.as_ref().map(|e| &e.status),
            Some(ExecutionStatus::Error)
        )
    }
}
