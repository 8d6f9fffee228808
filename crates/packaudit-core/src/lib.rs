//! PackAudit Core
//!
//! Core domain model with stable, versioned types.
//! Never rename finding codes - they are part of the public API.

pub mod config;
pub mod finding;
pub mod report;
pub mod rules;

pub use config::{AuditConfig, ConfigError, PackageKind, PatternList, ShapeConfig};
pub use finding::{Finding, FindingCode, Severity, Subject};
pub use report::{Report, ReportSummary, ReportVersion};
pub use rules::{normalize_type_tag, Condition, RuleConfigError, RuleSet, DEFAULT_RULES_YAML};
