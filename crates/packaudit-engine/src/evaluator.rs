//! Condition evaluation against raw property values
//!
//! The single place where rule conditions meet property text. Both the
//! validator's rule pass and the analyzer's shape probes come through
//! here, so "does this property satisfy that condition" has exactly one
//! answer in the whole engine.

use packaudit_core::Condition;

/// Outcome of evaluating one condition against one raw value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub passed: bool,

    /// Human-readable reason, phrased for the failure report
    pub reason: String,
}

impl Evaluation {
    fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
        }
    }
}

/// Evaluate a condition against a raw property value.
///
/// `raw` is the property text exactly as present in the document, or `None`
/// when the property is not set at all. An absent property and a blank one
/// are distinguished in the reported reason but collapse to the same verdict
/// only where the condition says so (`is_none` accepts both).
pub fn evaluate(raw: Option<&str>, condition: &Condition) -> Evaluation {
    match condition {
        Condition::Equals(expected) => match raw {
            None => Evaluation::fail(format!("property is not set, expected '{expected}'")),
            Some(value) => {
                let trimmed = value.trim();
                if trimmed == expected {
                    Evaluation::pass(format!("value equals '{expected}'"))
                } else {
                    Evaluation::fail(format!("expected '{expected}', found '{trimmed}'"))
                }
            }
        },
        Condition::StrNotEmpty => match raw {
            None => Evaluation::fail("property is not set"),
            Some(value) if value.trim().is_empty() => Evaluation::fail("value is blank"),
            Some(_) => Evaluation::pass("value is a non-empty string"),
        },
        Condition::IsNone => match raw {
            None => Evaluation::pass("property is not set"),
            Some(value) if value.trim().is_empty() => Evaluation::pass("value is blank"),
            Some(value) => Evaluation::fail(format!(
                "expected no value, found '{}'",
                value.trim()
            )),
        },
        Condition::RegexMatch { pattern, regex } => match raw {
            None => Evaluation::fail(format!(
                "property is not set, expected a match for '{pattern}'"
            )),
            Some(value) if regex.is_match(value) => {
                Evaluation::pass(format!("value matches '{pattern}'"))
            }
            Some(value) => Evaluation::fail(format!(
                "value '{}' does not match '{pattern}'",
                value.trim()
            )),
        },
    }
}
