//! In-memory model of one ETL package document
//!
//! Built once by the loader, immutable for the duration of a review, and
//! discarded afterwards. Property values are kept as raw strings exactly as
//! present in the document; coercion happens only where a condition demands
//! it, inside the evaluator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A declared package variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value_type: String,
    pub value: String,
}

/// A declared package parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

/// A connection manager declaration
///
/// Referenced (not owned) by pipeline components via name lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionManager {
    pub name: String,

    /// Provider/type tag (e.g. `OLEDB`)
    pub provider: String,

    /// Server identifier parsed from the connection string
    pub server: Option<String>,

    /// Database identifier parsed from the connection string
    pub database: Option<String>,
}

/// A control-flow task (Execute-SQL task or similar)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub task_type: String,

    /// Enclosing container name, if the task sits inside one
    pub container: Option<String>,

    /// Embedded SQL statement, for Execute-SQL tasks
    pub sql_statement: Option<String>,
}

/// Coarse component role derived from the document structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Source,
    Destination,
    Transform,
}

/// One dataflow component with its raw property bag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataflowComponent {
    pub name: String,

    /// Class ID as written in the document
    pub raw_type: String,

    /// Normalized type tag used for rule lookup
    pub type_tag: String,

    pub kind: ComponentKind,

    /// Raw property values, untyped and untrimmed
    pub properties: BTreeMap<String, String>,

    /// Embedded command text (the `SqlCommand` property), if any
    pub command_text: Option<String>,

    /// Referenced connection manager name, if any
    pub connection: Option<String>,

    /// Cached column names on the component inputs (`inputColumn` entries)
    pub input_columns: Vec<String>,

    /// Column names exposed on the component outputs (`outputColumn` entries)
    pub output_columns: Vec<String>,

    /// Column names declared in the external metadata
    /// (`externalMetadataColumn` entries, destination side)
    pub external_columns: Vec<String>,
}

impl DataflowComponent {
    /// Raw property value by name
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

/// Pipeline role, assigned by the analyzer (not at load time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineRole {
    Staging,
    Warehouse,
    Other,
    Unclassified,
}

impl PipelineRole {
    /// Sort rank: staging < warehouse < other
    pub fn rank(&self) -> u8 {
        match self {
            Self::Staging => 0,
            Self::Warehouse => 1,
            Self::Other | Self::Unclassified => 2,
        }
    }
}

impl std::fmt::Display for PipelineRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Staging => write!(f, "staging"),
            Self::Warehouse => write!(f, "warehouse"),
            Self::Other => write!(f, "other"),
            Self::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// A dataflow pipeline: ordered components plus directed edges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,

    /// Enclosing container name, kept when nested pipelines are flattened
    /// (config-table checks are often inside a loop container)
    pub container: Option<String>,

    /// Components in document order
    pub components: Vec<DataflowComponent>,

    /// Directed edges between component indices (upstream, downstream)
    pub edges: Vec<(usize, usize)>,

    /// Role classification, `Unclassified` until the analyzer assigns it
    pub role: PipelineRole,
}

impl Pipeline {
    /// First source component in document order
    pub fn first_source(&self) -> Option<&DataflowComponent> {
        self.components
            .iter()
            .find(|c| c.kind == ComponentKind::Source)
    }

    /// Last destination component in document order
    pub fn last_destination(&self) -> Option<&DataflowComponent> {
        self.components
            .iter()
            .rev()
            .find(|c| c.kind == ComponentKind::Destination)
    }

    /// All destination components in document order
    pub fn destinations(&self) -> impl Iterator<Item = (usize, &DataflowComponent)> {
        self.components
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == ComponentKind::Destination)
    }
}

/// Root of the parsed package tree
///
/// Owned exclusively by one analysis run; immutable after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDocument {
    pub name: String,
    pub variables: Vec<Variable>,
    pub parameters: Vec<Parameter>,
    pub connections: Vec<ConnectionManager>,
    pub tasks: Vec<Task>,

    /// All pipelines, flattened from nested containers, in document order
    pub pipelines: Vec<Pipeline>,

    /// Names of the sequence/loop containers found at any nesting level
    pub containers: Vec<String>,
}

impl PackageDocument {
    /// Look up a connection manager by name
    pub fn connection(&self, name: &str) -> Option<&ConnectionManager> {
        self.connections.iter().find(|c| c.name == name)
    }

    /// Find a declared variable whose name matches a predicate
    pub fn find_variable(&self, mut pred: impl FnMut(&str) -> bool) -> Option<&Variable> {
        self.variables.iter().find(|v| pred(&v.name))
    }
}
