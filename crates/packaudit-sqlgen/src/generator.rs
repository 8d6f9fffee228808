//! Review-script generation from analyzer metadata
//!
//! A template carries `{{name}}` placeholders; the analyzer's table
//! metadata supplies the bindings. Substitution is strict in both
//! directions: an unbound placeholder and an unused table are both hard
//! errors, and an error never yields partial output.

use crate::extractor::extract_tables;
use packaudit_engine::SqlMetadata;
use packaudit_model::PipelineRole;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// Template/metadata mismatch
///
/// Raised by `generate` only; package findings are unaffected when the
/// SQL step fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateMismatchError {
    #[error("template placeholder '{{{{{0}}}}}' has no binding in the package metadata")]
    UnresolvedPlaceholder(String),

    #[error("table '{0}' from the package is not used by the template")]
    UnusedTable(String),
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// Placeholder bindings derived from the analyzer's metadata.
///
/// The first staging and first warehouse table (in classified order) supply
/// the named bindings; `table` is the warehouse target.
fn bindings(metadata: &SqlMetadata) -> BTreeMap<&'static str, String> {
    let mut map = BTreeMap::new();
    if let Some(staging) = metadata.first_for_role(PipelineRole::Staging) {
        map.insert("staging_table", staging.table.clone());
        if let Some(database) = &staging.database {
            map.insert("staging_database", database.clone());
        }
    }
    if let Some(warehouse) = metadata.first_for_role(PipelineRole::Warehouse) {
        map.insert("warehouse_table", warehouse.table.clone());
        map.insert("table", warehouse.table.clone());
        if let Some(database) = &warehouse.database {
            map.insert("warehouse_database", database.clone());
        }
    }
    map
}

/// Render a review-script template against the package metadata.
///
/// Placeholders resolve in document order, so the output is byte-identical
/// across runs; statement order is whatever the template author wrote,
/// which follows the staging-before-warehouse order the metadata is in.
pub fn generate(template: &str, metadata: &SqlMetadata) -> Result<String, TemplateMismatchError> {
    let bindings = bindings(metadata);
    let regex = placeholder_regex();

    let mut output = String::with_capacity(template.len());
    let mut last = 0;
    for caps in regex.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = bindings
            .get(name.as_str())
            .ok_or_else(|| TemplateMismatchError::UnresolvedPlaceholder(name.as_str().to_string()))?;
        output.push_str(&template[last..whole.start()]);
        output.push_str(value);
        last = whole.end();
    }
    output.push_str(&template[last..]);

    // A table counts as used only as a statement target in the rendered
    // output; a mention in a comment does not.
    let used = extract_tables(&output);
    for table in &metadata.tables {
        if !used.iter().any(|u| u.eq_ignore_ascii_case(&table.table)) {
            return Err(TemplateMismatchError::UnusedTable(table.table.clone()));
        }
    }

    debug!(bytes = output.len(), "rendered review script");
    Ok(output)
}
