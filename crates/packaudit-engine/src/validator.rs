//! Structural validation of a loaded package
//!
//! Walks the document once and reports everything as findings: property
//! rule failures, missing variables, incremental-load control mismatches,
//! and naming-convention drift. Nothing in the audited package's own
//! content is ever an engine error.

use crate::evaluator::evaluate;
use packaudit_core::{
    AuditConfig, Finding, FindingCode, PackageKind, PatternList, RuleSet, Subject,
};
use packaudit_model::{ComponentKind, DataflowComponent, PackageDocument};
use tracing::debug;

/// Run all structural checks against a loaded package.
///
/// The rule set and config are shared by reference; repeated runs over the
/// same document produce the same finding sequence.
pub fn validate(
    doc: &PackageDocument,
    rules: &RuleSet,
    kind: PackageKind,
    config: &AuditConfig,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    check_package_name(doc, kind, config, &mut findings);
    check_framework_containers(doc, config, &mut findings);

    for pipeline in &doc.pipelines {
        for component in &pipeline.components {
            check_component(component, &pipeline.name, rules, config, &mut findings);
        }
    }

    check_required_variables(doc, kind, config, &mut findings);
    check_incremental_control(doc, kind, config, &mut findings);

    debug!(
        package = %doc.name,
        findings = findings.len(),
        "validation finished"
    );
    findings
}

/// Number of dataflow components whose type tag has a rule-set entry.
///
/// Components of unruled types are reported by `validate` but do not count
/// as checked.
pub fn components_checked(doc: &PackageDocument, rules: &RuleSet) -> usize {
    doc.pipelines
        .iter()
        .flat_map(|p| &p.components)
        .filter(|c| rules.for_type(&c.type_tag).is_some())
        .count()
}

fn check_package_name(
    doc: &PackageDocument,
    kind: PackageKind,
    config: &AuditConfig,
    findings: &mut Vec<Finding>,
) {
    let patterns = config.package_name_patterns(kind);
    if patterns.is_empty() || patterns.is_match(&doc.name) {
        return;
    }
    findings.push(
        Finding::warning(
            FindingCode::NameConvention,
            Subject::package(&doc.name),
            format!("package name does not follow the {kind} naming convention"),
        )
        .with_comparison(patterns.patterns().join(" | "), &doc.name),
    );
}

fn check_framework_containers(
    doc: &PackageDocument,
    config: &AuditConfig,
    findings: &mut Vec<Finding>,
) {
    let expected = &config.naming.framework_containers;
    if expected.is_empty() {
        return;
    }
    let names: Vec<&str> = doc.containers.iter().map(String::as_str).collect();
    for pattern in expected.unmatched_patterns(&names) {
        findings.push(Finding::warning(
            FindingCode::MissingContainer,
            Subject::package(&doc.name),
            format!("no container matches the expected framework pattern '{pattern}'"),
        ));
    }
}

fn check_component(
    component: &DataflowComponent,
    pipeline: &str,
    rules: &RuleSet,
    config: &AuditConfig,
    findings: &mut Vec<Finding>,
) {
    let subject = Subject::component(&component.name, pipeline);

    match rules.for_type(&component.type_tag) {
        None => {
            findings.push(Finding::warning(
                FindingCode::UncheckedComponentType,
                subject.clone(),
                format!(
                    "component type '{}' has no property rules declared",
                    component.raw_type
                ),
            ));
        }
        Some(property_rules) => {
            for (property, condition) in property_rules {
                let raw = component.property(property);
                let outcome = evaluate(raw, condition);
                if outcome.passed {
                    continue;
                }
                let mut finding = Finding::error(
                    FindingCode::RuleViolation,
                    subject.clone(),
                    format!(
                        "property '{property}' failed {} check: {}",
                        condition.kind(),
                        outcome.reason
                    ),
                );
                if let (Some(expected), Some(actual)) = (condition.expected(), raw) {
                    finding = finding.with_comparison(expected, actual.trim());
                }
                findings.push(finding);
            }
        }
    }

    let name_patterns: &PatternList = match component.kind {
        ComponentKind::Source => &config.naming.source_component,
        ComponentKind::Destination => &config.naming.destination_component,
        // Generic transforms carry no naming convention; hash components do.
        ComponentKind::Transform if config.shape.is_hash_type(&component.type_tag) => {
            &config.naming.hash_component
        }
        ComponentKind::Transform => return,
    };
    if !name_patterns.is_empty() && !name_patterns.is_match(&component.name) {
        findings.push(
            Finding::warning(
                FindingCode::NameConvention,
                subject,
                "component name does not follow the naming convention",
            )
            .with_comparison(name_patterns.patterns().join(" | "), &component.name),
        );
    }
}

fn check_required_variables(
    doc: &PackageDocument,
    kind: PackageKind,
    config: &AuditConfig,
    findings: &mut Vec<Finding>,
) {
    let mut required: Vec<(&PatternList, &str)> =
        vec![(&config.variables.batch_id, "batch/run id")];
    if kind == PackageKind::Fact {
        required.push((&config.variables.incremental_window, "incremental window"));
    }

    for (patterns, label) in required {
        if patterns.is_empty() {
            continue;
        }
        if doc.find_variable(|name| patterns.is_match(name)).is_none() {
            findings.push(Finding::error(
                FindingCode::MissingVariable,
                Subject::variable(patterns.patterns().join(" | ")),
                format!("no declared variable matches the required {label} pattern"),
            ));
        }
    }
}

/// Incremental loading needs both halves: the declared windowing variable
/// and a config-table check inside a container. Either half alone is a
/// mismatch; the check without the variable means the capability runs with
/// no declared control surface, which is the worse of the two.
fn check_incremental_control(
    doc: &PackageDocument,
    kind: PackageKind,
    config: &AuditConfig,
    findings: &mut Vec<Finding>,
) {
    let variable = doc.find_variable(|name| config.variables.incremental_window.is_match(name));
    let has_check = doc.pipelines.iter().any(|pipeline| {
        pipeline.container.is_some()
            && pipeline.components.iter().any(|component| {
                component.kind == ComponentKind::Source
                    && component
                        .command_text
                        .as_deref()
                        .is_some_and(|text| config.incremental.config_markers.is_match(text))
            })
    });

    match (variable, has_check) {
        (Some(variable), false) => {
            findings.push(Finding::warning(
                FindingCode::VariableWithoutConfigCheck,
                Subject::variable(&variable.name),
                "incremental-window variable is declared but no config-table check was found",
            ));
        }
        (None, true) => {
            // For fact packages the required-variable check already reported
            // this exact variable as missing; one error per cause.
            if kind != PackageKind::Fact {
                findings.push(Finding::error(
                    FindingCode::ConfigCheckWithoutVariable,
                    Subject::package(&doc.name),
                    "a config-table check is present but no incremental-window variable is declared",
                ));
            }
        }
        _ => {}
    }
}
