//! Audit engine: condition evaluation, structural validation, and
//! dataflow analysis over a loaded package document.
//!
//! The engine is synchronous and allocation-light: one pass over the
//! document per concern, findings appended to a plain `Vec`. Rule sets and
//! configs are shared by reference and reusable across sequential runs.

pub mod analyzer;
pub mod evaluator;
pub mod validator;

pub use analyzer::{analyze, AnalysisOutcome, SqlMetadata, TableRef};
pub use evaluator::{evaluate, Evaluation};
pub use validator::{components_checked, validate};
