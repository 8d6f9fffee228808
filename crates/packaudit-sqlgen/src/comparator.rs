//! Section-by-section comparison of package SQL against a reviewed script
//!
//! A reviewed script names its sections after the tasks and source
//! components they mirror. Each same-named statement in the package is
//! compared after normalization; drift comes back as findings, never as
//! an error.

use crate::extractor::{extract_sections, similarity};
use packaudit_core::{Finding, FindingCode, Subject};
use packaudit_model::PackageDocument;
use tracing::debug;

/// Compare every named section of a reviewed script against the package
/// statement of the same name.
///
/// Statements are gathered from Execute-SQL tasks and from dataflow source
/// commands; matching is by name, case-insensitive. A section with no
/// counterpart is reported; extra package statements are not.
pub fn compare_script(script: &str, doc: &PackageDocument) -> Vec<Finding> {
    let statements = package_statements(doc);
    let mut findings = Vec::new();

    for (section, body) in extract_sections(script) {
        let matched = statements
            .iter()
            .find(|(name, _, _)| name.trim().eq_ignore_ascii_case(&section));
        match matched {
            None => findings.push(Finding::warning(
                FindingCode::ScriptSectionUnmatched,
                Subject::package(&doc.name),
                format!("script section '{section}' has no same-named statement in the package"),
            )),
            Some((name, subject, sql)) => {
                let score = similarity(sql, &body);
                debug!(section = %section, statement = %name, score, "compared script section");
                if score < 100.0 {
                    findings.push(
                        Finding::warning(
                            FindingCode::ScriptQueryDrift,
                            subject.clone(),
                            format!(
                                "statement is {score:.1}% similar to script section '{section}'"
                            ),
                        )
                        .with_comparison(body.trim(), sql.trim()),
                    );
                }
            }
        }
    }
    findings
}

fn package_statements(doc: &PackageDocument) -> Vec<(String, Subject, String)> {
    let mut statements = Vec::new();
    for task in &doc.tasks {
        if let Some(sql) = &task.sql_statement {
            statements.push((
                task.name.clone(),
                Subject::container(&task.name),
                sql.clone(),
            ));
        }
    }
    for pipeline in &doc.pipelines {
        for component in &pipeline.components {
            if let Some(text) = &component.command_text {
                statements.push((
                    component.name.clone(),
                    Subject::component(&component.name, &pipeline.name),
                    text.clone(),
                ));
            }
        }
    }
    statements
}
