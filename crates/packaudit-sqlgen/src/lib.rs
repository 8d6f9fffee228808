//! SQL extraction, comparison, and review-script generation
//!
//! Text-level SQL helpers for the audit: pull table references and named
//! sections out of SQL found in packages and companion scripts, compare
//! package statements against a reviewed script, and render a
//! review-script template against analyzed package metadata.

pub mod comparator;
pub mod extractor;
pub mod generator;

pub use comparator::compare_script;
pub use extractor::{clean_sql, extract_sections, extract_tables, similarity};
pub use generator::{generate, TemplateMismatchError};
