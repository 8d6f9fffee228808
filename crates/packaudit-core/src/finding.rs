//! Finding codes and compliance reporting
//!
//! IMPORTANT: Finding codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Finding code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingCode {
    // Property rule results (1xxx)
    /// A component property failed a configured rule
    RuleViolation,

    /// A component's type has no rule-set entry at all
    UncheckedComponentType,

    // Package structure (2xxx)
    /// A required variable or parameter is not declared
    MissingVariable,

    /// An incremental-style variable is declared but no config-table check
    /// pattern was found in the package
    VariableWithoutConfigCheck,

    /// A config-table check pattern is present but the controlling variable
    /// is missing
    ConfigCheckWithoutVariable,

    /// A framework container expected for this package kind is absent
    MissingContainer,

    /// A package, container, or component name violates a naming convention
    NameConvention,

    // Dataflow shape (3xxx)
    /// A pipeline's component edges form a cycle
    PipelineCycle,

    /// An update-capable destination has no hash/compare component upstream
    MissingHashBeforeUpdate,

    /// A staging destination lacks a truncate-or-replace load marker
    MissingTruncateMarker,

    /// A pipeline could not be classified as staging or warehouse
    UnclassifiedPipeline,

    // Column flow (4xxx)
    /// A destination maps an external column that no input column feeds
    UnmappedDestinationColumn,

    /// A source column is not selected into a downstream hash component
    UnselectedSourceColumn,

    // Script comparison (5xxx)
    /// A package statement differs from its reviewed script section
    ScriptQueryDrift,

    /// A script section has no same-named statement in the package
    ScriptSectionUnmatched,
}

impl FindingCode {
    /// Get the finding code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuleViolation => "RULE_VIOLATION",
            Self::UncheckedComponentType => "UNCHECKED_COMPONENT_TYPE",
            Self::MissingVariable => "MISSING_VARIABLE",
            Self::VariableWithoutConfigCheck => "VARIABLE_WITHOUT_CONFIG_CHECK",
            Self::ConfigCheckWithoutVariable => "CONFIG_CHECK_WITHOUT_VARIABLE",
            Self::MissingContainer => "MISSING_CONTAINER",
            Self::NameConvention => "NAME_CONVENTION",
            Self::PipelineCycle => "PIPELINE_CYCLE",
            Self::MissingHashBeforeUpdate => "MISSING_HASH_BEFORE_UPDATE",
            Self::MissingTruncateMarker => "MISSING_TRUNCATE_MARKER",
            Self::UnclassifiedPipeline => "UNCLASSIFIED_PIPELINE",
            Self::UnmappedDestinationColumn => "UNMAPPED_DESTINATION_COLUMN",
            Self::UnselectedSourceColumn => "UNSELECTED_SOURCE_COLUMN",
            Self::ScriptQueryDrift => "SCRIPT_QUERY_DRIFT",
            Self::ScriptSectionUnmatched => "SCRIPT_SECTION_UNMATCHED",
        }
    }
}

impl std::fmt::Display for FindingCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Finding severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Warning - should be reviewed but not blocking
    Warning,

    /// Error - blocking issue that should fail the review
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// What a finding is about
///
/// Carries enough identification that a caller can render an actionable
/// message without re-walking the package model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum Subject {
    /// The package as a whole
    Package { name: String },

    /// A dataflow pipeline
    Pipeline { name: String },

    /// A dataflow component, with its owning pipeline
    Component { name: String, pipeline: String },

    /// A declared (or missing) variable or parameter
    Variable { name: String },

    /// A control-flow container or task
    Container { name: String },
}

impl Subject {
    pub fn package(name: impl Into<String>) -> Self {
        Self::Package { name: name.into() }
    }

    pub fn pipeline(name: impl Into<String>) -> Self {
        Self::Pipeline { name: name.into() }
    }

    pub fn component(name: impl Into<String>, pipeline: impl Into<String>) -> Self {
        Self::Component {
            name: name.into(),
            pipeline: pipeline.into(),
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable { name: name.into() }
    }

    pub fn container(name: impl Into<String>) -> Self {
        Self::Container { name: name.into() }
    }

    /// Render a short identifier for console output
    pub fn display_name(&self) -> String {
        match self {
            Self::Package { name } => format!("package '{name}'"),
            Self::Pipeline { name } => format!("pipeline '{name}'"),
            Self::Component { name, pipeline } => {
                format!("component '{name}' in pipeline '{pipeline}'")
            }
            Self::Variable { name } => format!("variable '{name}'"),
            Self::Container { name } => format!("container '{name}'"),
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// One reported compliance result
///
/// Findings are value data: no timestamps, no counters. Running the same
/// checks on the same document twice yields identical sequences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Stable finding code
    pub code: FindingCode,

    /// Severity level
    pub severity: Severity,

    /// What the finding is about
    pub subject: Subject,

    /// Human-readable message
    pub message: String,

    /// Expected value (for comparison findings)
    pub expected: Option<String>,

    /// Actual value (for comparison findings)
    pub actual: Option<String>,
}

impl Finding {
    /// Create a new finding with minimal fields
    pub fn new(
        code: FindingCode,
        severity: Severity,
        subject: Subject,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            severity,
            subject,
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    /// Shorthand for an error-severity finding
    pub fn error(code: FindingCode, subject: Subject, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, subject, message)
    }

    /// Shorthand for a warning-severity finding
    pub fn warning(code: FindingCode, subject: Subject, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warning, subject, message)
    }

    /// Set expected/actual values
    pub fn with_comparison(
        mut self,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }
}
