//! PackAudit package model
//!
//! Parses an ETL package document into an immutable tree of typed nodes:
//! connection managers, variables, parameters, control-flow tasks, and
//! dataflow pipelines with their component graphs.

pub mod graph;
pub mod loader;
pub mod model;

pub use graph::ComponentGraph;
pub use loader::{load, parse, LoadError};
pub use model::{
    ComponentKind, ConnectionManager, DataflowComponent, PackageDocument, Parameter, Pipeline,
    PipelineRole, Task, Variable,
};
