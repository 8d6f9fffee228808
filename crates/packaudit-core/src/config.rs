//! Audit configuration (packaudit.toml)
//!
//! The classification heuristics, required-variable names, and naming
//! conventions are deployment-specific, so all of them live here rather
//! than in code. `AuditConfig::default()` reproduces the conventions the
//! audit framework was originally built around.

use crate::rules::normalize_type_tag;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kind of package under review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    /// Dimension-table load package
    Dimension,

    /// Fact-table load package (incremental windowing expected)
    Fact,
}

impl std::fmt::Display for PackageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dimension => write!(f, "dimension"),
            Self::Fact => write!(f, "fact"),
        }
    }
}

impl std::str::FromStr for PackageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dimension" | "dim" => Ok(Self::Dimension),
            "fact" => Ok(Self::Fact),
            other => Err(format!("unknown package kind '{other}'")),
        }
    }
}

/// A list of regex patterns, compiled once at config load
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternList {
    patterns: Vec<String>,

    #[serde(skip)]
    compiled: Vec<Regex>,
}

impl PatternList {
    pub fn new(patterns: Vec<String>) -> Result<Self, ConfigError> {
        let mut list = Self {
            patterns,
            compiled: Vec::new(),
        };
        list.compile()?;
        Ok(list)
    }

    fn compile(&mut self) -> Result<(), ConfigError> {
        self.compiled = self
            .patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|source| ConfigError::InvalidPattern {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    /// Whether any pattern matches the input
    pub fn is_match(&self, input: &str) -> bool {
        self.compiled.iter().any(|re| re.is_match(input))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Patterns that no input matches, in declaration order
    pub fn unmatched_patterns<'a>(&'a self, inputs: &[&str]) -> Vec<&'a str> {
        self.patterns
            .iter()
            .zip(&self.compiled)
            .filter(|(_, re)| !inputs.iter().any(|input| re.is_match(input)))
            .map(|(pattern, _)| pattern.as_str())
            .collect()
    }
}

// Regex has no PartialEq; compare the source patterns only.
impl PartialEq for PatternList {
    fn eq(&self, other: &Self) -> bool {
        self.patterns == other.patterns
    }
}

/// Pipeline role classification heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Destination connection/database names marking a staging pipeline
    #[serde(default)]
    pub staging_patterns: PatternList,

    /// Destination connection/database names marking a warehouse pipeline
    #[serde(default)]
    pub warehouse_patterns: PatternList,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            staging_patterns: PatternList::new(vec![r"(?i)stag(e|ing)".to_string()])
                .expect("default patterns are valid"),
            warehouse_patterns: PatternList::new(vec![r"(?i)(dw|warehouse|mart)".to_string()])
                .expect("default patterns are valid"),
        }
    }
}

/// Required-variable name patterns per package kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableConfig {
    /// Current batch/run id variable, required for every package kind
    #[serde(default)]
    pub batch_id: PatternList,

    /// Incremental-windowing variable, additionally required for fact packages
    #[serde(default)]
    pub incremental_window: PatternList,
}

impl Default for VariableConfig {
    fn default() -> Self {
        Self {
            batch_id: PatternList::new(vec![r"(?i)(batch|run)_?id".to_string()])
                .expect("default patterns are valid"),
            incremental_window: PatternList::new(vec![
                r"(?i)incremental".to_string(),
                r"(?i)last_?value".to_string(),
            ])
            .expect("default patterns are valid"),
        }
    }
}

/// Incremental-load detection heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalConfig {
    /// Name markers in source command text recognizing a config-table check
    #[serde(default)]
    pub config_markers: PatternList,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            config_markers: PatternList::new(vec![r"(?i)config".to_string()])
                .expect("default patterns are valid"),
        }
    }
}

/// Dataflow shape-check heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeConfig {
    /// Type tags counting as hash/compare components (normalized at load)
    #[serde(default = "ShapeConfig::default_hash_types")]
    pub hash_types: Vec<String>,

    /// Destination properties whose non-empty value marks it update-capable
    #[serde(default = "ShapeConfig::default_update_properties")]
    pub update_properties: Vec<String>,

    /// The destination property carrying the staging load mode
    #[serde(default = "ShapeConfig::default_load_mode_property")]
    pub load_mode_property: String,

    /// The destination property carrying the target table name
    #[serde(default = "ShapeConfig::default_table_property")]
    pub table_property: String,

    /// Accepted truncate-or-replace markers on the load mode property
    #[serde(default = "ShapeConfig::default_truncate_markers")]
    pub truncate_markers: Vec<String>,
}

impl ShapeConfig {
    fn default_hash_types() -> Vec<String> {
        vec!["multiple_hash".to_string()]
    }

    fn default_update_properties() -> Vec<String> {
        vec!["SqlCommand".to_string()]
    }

    fn default_load_mode_property() -> String {
        "FastLoadOptions".to_string()
    }

    fn default_table_property() -> String {
        "OpenRowset".to_string()
    }

    fn default_truncate_markers() -> Vec<String> {
        vec![
            "TABLOCK".to_string(),
            "TRUNCATE".to_string(),
            "REPLACE".to_string(),
        ]
    }

    /// Whether a normalized type tag counts as a hash/compare component
    pub fn is_hash_type(&self, normalized_tag: &str) -> bool {
        self.hash_types
            .iter()
            .any(|t| normalize_type_tag(t) == normalized_tag)
    }

    /// Regex pattern matching any accepted truncate marker
    pub fn truncate_marker_pattern(&self) -> String {
        let alternatives = self
            .truncate_markers
            .iter()
            .map(|m| regex::escape(m))
            .collect::<Vec<_>>()
            .join("|");
        format!("(?i)({alternatives})")
    }
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            hash_types: Self::default_hash_types(),
            update_properties: Self::default_update_properties(),
            load_mode_property: Self::default_load_mode_property(),
            table_property: Self::default_table_property(),
            truncate_markers: Self::default_truncate_markers(),
        }
    }
}

/// Naming-convention checks (all optional)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Package name pattern for dimension packages
    #[serde(default)]
    pub dimension_package: PatternList,

    /// Package name pattern for fact packages
    #[serde(default)]
    pub fact_package: PatternList,

    /// Framework containers every package is expected to carry
    #[serde(default)]
    pub framework_containers: PatternList,

    /// Source component name pattern
    #[serde(default)]
    pub source_component: PatternList,

    /// Destination component name pattern
    #[serde(default)]
    pub destination_component: PatternList,

    /// Hash component name pattern (applied to the shape's hash types)
    #[serde(default)]
    pub hash_component: PatternList,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            dimension_package: PatternList::new(vec![r"^Fill_Dim\w+$".to_string()])
                .expect("default patterns are valid"),
            fact_package: PatternList::new(vec![r"^Fill_Fact\w+$".to_string()])
                .expect("default patterns are valid"),
            framework_containers: PatternList::new(vec![
                r"Stage.*Initialization".to_string(),
                r"Extract.*Transform.*OLTP".to_string(),
                r"Load.*Data".to_string(),
                r"Update.*Config.*Table.*Insert.*Log".to_string(),
            ])
            .expect("default patterns are valid"),
            source_component: PatternList::new(vec![r"^Get Data [Ff]rom \w+".to_string()])
                .expect("default patterns are valid"),
            destination_component: PatternList::new(vec![r"^Insert [Ii]nto \w+".to_string()])
                .expect("default patterns are valid"),
            hash_component: PatternList::new(vec![r"^Multiple Hash".to_string()])
                .expect("default patterns are valid"),
        }
    }
}

/// Main audit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Pipeline role classification
    #[serde(default)]
    pub classification: ClassificationConfig,

    /// Required variables
    #[serde(default)]
    pub variables: VariableConfig,

    /// Incremental-load detection
    #[serde(default)]
    pub incremental: IncrementalConfig,

    /// Dataflow shape checks
    #[serde(default)]
    pub shape: ShapeConfig,

    /// Naming conventions
    #[serde(default)]
    pub naming: NamingConfig,

    /// Raw component class ID -> rule-set type tag
    #[serde(default = "AuditConfig::default_component_aliases")]
    pub component_aliases: BTreeMap<String, String>,
}

impl AuditConfig {
    fn default_component_aliases() -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "Microsoft.OLEDBSource".to_string(),
                "oledb_source".to_string(),
            ),
            (
                "Microsoft.SSISOracleSrc".to_string(),
                "oracle_source".to_string(),
            ),
            (
                "Microsoft.OLEDBDestination".to_string(),
                "oledb_destination".to_string(),
            ),
            (
                "Microsoft.ManagedComponentHost".to_string(),
                "multiple_hash".to_string(),
            ),
        ])
    }

    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let mut config: AuditConfig =
            toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.compile()?;
        Ok(config)
    }

    // Serde skips compiled regexes; rebuild them after deserialization.
    fn compile(&mut self) -> Result<(), ConfigError> {
        self.classification.staging_patterns.compile()?;
        self.classification.warehouse_patterns.compile()?;
        self.variables.batch_id.compile()?;
        self.variables.incremental_window.compile()?;
        self.incremental.config_markers.compile()?;
        self.naming.dimension_package.compile()?;
        self.naming.fact_package.compile()?;
        self.naming.framework_containers.compile()?;
        self.naming.source_component.compile()?;
        self.naming.destination_component.compile()?;
        self.naming.hash_component.compile()?;
        Ok(())
    }

    /// Resolve a raw component class ID to a normalized rule-set tag
    pub fn resolve_type_tag(&self, raw_type: &str) -> String {
        match self.component_aliases.get(raw_type) {
            Some(alias) => normalize_type_tag(alias),
            None => normalize_type_tag(raw_type),
        }
    }

    /// Package name pattern for a kind
    pub fn package_name_patterns(&self, kind: PackageKind) -> &PatternList {
        match kind {
            PackageKind::Dimension => &self.naming.dimension_package,
            PackageKind::Fact => &self.naming.fact_package,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            classification: ClassificationConfig::default(),
            variables: VariableConfig::default(),
            incremental: IncrementalConfig::default(),
            shape: ShapeConfig::default(),
            naming: NamingConfig::default(),
            component_aliases: Self::default_component_aliases(),
        }
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}
