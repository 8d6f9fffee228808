//! Rule store: externally configured property compliance rules
//!
//! The rule file maps component type tags to property rules. It is pure
//! data; the conditions it names are interpreted by the engine's evaluator.
//! A `RuleSet` is loaded once per run, validated eagerly, and shared by
//! reference thereafter.

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Normalize a component type tag for rule lookup.
///
/// Lowercases and strips every non-alphanumeric character so that the parsed
/// document and the rule file agree on the key regardless of casing or
/// punctuation (`OLEDB_Source` == `oledb_source` == `OledbSource`).
pub fn normalize_type_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// A validated property condition
///
/// `Equals` and `RegexMatch` always carry their expected value; the other
/// kinds never do. That invariant is enforced at load time, so evaluation
/// never has to handle a half-configured rule.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Trimmed raw value must textually equal the expected value
    Equals(String),

    /// Raw value must be present and non-blank after trimming
    StrNotEmpty,

    /// Raw value must be absent, or blank after trimming
    IsNone,

    /// Raw value must match the pattern (absent value fails)
    RegexMatch { pattern: String, regex: Regex },
}

impl Condition {
    /// The condition kind as written in the rule file
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Equals(_) => "equals",
            Self::StrNotEmpty => "str_not_empty",
            Self::IsNone => "is_none",
            Self::RegexMatch { .. } => "regex_match",
        }
    }

    /// The expected value, where the kind carries one
    pub fn expected(&self) -> Option<&str> {
        match self {
            Self::Equals(v) => Some(v),
            Self::RegexMatch { pattern, .. } => Some(pattern),
            Self::StrNotEmpty | Self::IsNone => None,
        }
    }
}

/// Rule configuration error
///
/// Always names the offending component type and property so the rule
/// author can fix the file without guessing.
#[derive(Debug, thiserror::Error)]
pub enum RuleConfigError {
    #[error("failed to read rule file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse rule file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("unrecognized condition '{condition}' for {component_type}.{property}")]
    UnknownCondition {
        component_type: String,
        property: String,
        condition: String,
    },

    #[error("condition '{condition}' for {component_type}.{property} requires a value")]
    MissingValue {
        component_type: String,
        property: String,
        condition: String,
    },

    #[error("condition '{condition}' for {component_type}.{property} does not take a value")]
    UnexpectedValue {
        component_type: String,
        property: String,
        condition: String,
    },

    #[error("invalid regex for {component_type}.{property}: {source}")]
    InvalidRegex {
        component_type: String,
        property: String,
        source: regex::Error,
    },

    #[error("duplicate rule for {component_type}.{property} after normalization")]
    DuplicateProperty {
        component_type: String,
        property: String,
    },
}

/// Raw rule entry as written in YAML
#[derive(Debug, Deserialize)]
struct RawRule {
    condition: String,
    #[serde(default)]
    value: Option<String>,
}

/// Externally configured rule set
///
/// Mapping of normalized component type tag to property rules. Immutable
/// after load; share by reference, never copy per component.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: BTreeMap<String, BTreeMap<String, Condition>>,
}

impl RuleSet {
    /// Load rules from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, RuleConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, RuleConfigError> {
        let raw: BTreeMap<String, BTreeMap<String, RawRule>> = serde_yaml::from_str(yaml)?;

        let mut rules: BTreeMap<String, BTreeMap<String, Condition>> = BTreeMap::new();
        for (type_tag, properties) in raw {
            let normalized = normalize_type_tag(&type_tag);
            let entry = rules.entry(normalized).or_default();
            for (property, rule) in properties {
                let condition = Self::build_condition(&type_tag, &property, rule)?;
                if entry.insert(property.clone(), condition).is_some() {
                    return Err(RuleConfigError::DuplicateProperty {
                        component_type: type_tag,
                        property,
                    });
                }
            }
        }

        Ok(Self { rules })
    }

    fn build_condition(
        type_tag: &str,
        property: &str,
        raw: RawRule,
    ) -> Result<Condition, RuleConfigError> {
        let named = |k: &str| (type_tag.to_string(), property.to_string(), k.to_string());

        match raw.condition.as_str() {
            "equals" => match raw.value {
                Some(v) => Ok(Condition::Equals(v)),
                None => {
                    let (component_type, property, condition) = named("equals");
                    Err(RuleConfigError::MissingValue {
                        component_type,
                        property,
                        condition,
                    })
                }
            },
            "regex_match" => match raw.value {
                Some(pattern) => {
                    let regex =
                        Regex::new(&pattern).map_err(|source| RuleConfigError::InvalidRegex {
                            component_type: type_tag.to_string(),
                            property: property.to_string(),
                            source,
                        })?;
                    Ok(Condition::RegexMatch { pattern, regex })
                }
                None => {
                    let (component_type, property, condition) = named("regex_match");
                    Err(RuleConfigError::MissingValue {
                        component_type,
                        property,
                        condition,
                    })
                }
            },
            kind @ ("str_not_empty" | "is_none") => {
                if raw.value.is_some() {
                    let (component_type, property, condition) = named(kind);
                    return Err(RuleConfigError::UnexpectedValue {
                        component_type,
                        property,
                        condition,
                    });
                }
                Ok(match kind {
                    "str_not_empty" => Condition::StrNotEmpty,
                    _ => Condition::IsNone,
                })
            }
            other => {
                let (component_type, property, condition) = named(other);
                Err(RuleConfigError::UnknownCondition {
                    component_type,
                    property,
                    condition,
                })
            }
        }
    }

    /// Property rules declared for a normalized type tag, if any
    pub fn for_type(&self, normalized_tag: &str) -> Option<&BTreeMap<String, Condition>> {
        self.rules.get(normalized_tag)
    }

    /// Whether any rules are declared for a normalized type tag
    pub fn has_rules_for(&self, normalized_tag: &str) -> bool {
        self.rules.contains_key(normalized_tag)
    }

    /// All declared type tags (normalized), in sorted order
    pub fn type_tags(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Total number of property rules across all types
    pub fn rule_count(&self) -> usize {
        self.rules.values().map(BTreeMap::len).sum()
    }
}

/// The default rule file shipped with the tool, matching the conventions the
/// audit framework was built around. `packaudit init-rules` writes this out.
pub const DEFAULT_RULES_YAML: &str = r#"# Dataflow component property rules
#
# Each top-level key is a component type tag. Each property rule specifies:
#   condition: equals | str_not_empty | is_none | regex_match
#   value: expected value or pattern (required for equals / regex_match)
oledb_source:
  AlwaysUseDefaultCodePage: { condition: equals, value: "false" }
  SqlCommand: { condition: str_not_empty }
  SqlCommandVariable: { condition: is_none }
oracle_source:
  DefaultCodePage: { condition: equals, value: "1256" }
  SqlCommand: { condition: str_not_empty }
  BatchSize: { condition: equals, value: "100000" }
oledb_destination:
  AlwaysUseDefaultCodePage: { condition: equals, value: "false" }
  SqlCommand: { condition: is_none }
multiple_hash:
  MultipleThreads: { condition: equals, value: "0" }
  SafeNullHandling: { condition: equals, value: "1" }
  IncludeMillsecond: { condition: equals, value: "1" }
  HashType: { condition: equals, value: "6" }
  HashOutputType: { condition: equals, value: "0" }
"#;
