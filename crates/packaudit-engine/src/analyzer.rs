//! Dataflow analysis: classification, ordering, and shape checks
//!
//! The analyzer never re-runs property rules; it reasons about the graph
//! (classification, ordering, cycles) and probes individual properties
//! through the evaluator where a shape check needs one.

use crate::evaluator::evaluate;
use packaudit_core::{AuditConfig, Condition, Finding, FindingCode, Subject};
use packaudit_model::{ComponentGraph, ComponentKind, PackageDocument, Pipeline, PipelineRole};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// One resolved destination table, in classified pipeline order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRef {
    /// Owning pipeline
    pub pipeline: String,

    /// Role of the owning pipeline
    pub role: PipelineRole,

    /// Destination table name (the table property, or the component name
    /// when the property is absent)
    pub table: String,

    /// Database of the destination's connection manager, when resolvable
    pub database: Option<String>,

    /// Command text of the pipeline's first source, if any
    pub source_command: Option<String>,
}

/// Table metadata handed to the SQL generator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SqlMetadata {
    /// Tables in classified pipeline order (staging before warehouse)
    pub tables: Vec<TableRef>,
}

impl SqlMetadata {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// First table reference for a role, in classified order
    pub fn first_for_role(&self, role: PipelineRole) -> Option<&TableRef> {
        self.tables.iter().find(|t| t.role == role)
    }
}

/// Result of analyzing one package
#[derive(Debug)]
pub struct AnalysisOutcome {
    /// Pipelines with roles assigned, in classified order
    pub pipelines: Vec<Pipeline>,

    /// Shape and ordering findings
    pub findings: Vec<Finding>,

    /// Table metadata for SQL generation
    pub metadata: SqlMetadata,
}

/// Classify, order, and shape-check every pipeline in the document.
///
/// The document itself stays untouched; classified pipelines are returned
/// as a reordered copy.
pub fn analyze(doc: &PackageDocument, config: &AuditConfig) -> AnalysisOutcome {
    let mut findings = Vec::new();
    let mut pipelines: Vec<Pipeline> = doc.pipelines.clone();

    for pipeline in &mut pipelines {
        pipeline.role = classify(pipeline, doc, config);
        debug!(pipeline = %pipeline.name, role = %pipeline.role, "classified pipeline");
        if pipeline.last_destination().is_none() && !pipeline.components.is_empty() {
            findings.push(Finding::warning(
                FindingCode::UnclassifiedPipeline,
                Subject::pipeline(&pipeline.name),
                "pipeline has no destination component, role defaults to other",
            ));
        }
    }

    // Stable sort keeps document order within a role class.
    pipelines.sort_by_key(|p| p.role.rank());

    for pipeline in &pipelines {
        let graph = ComponentGraph::from_pipeline(pipeline);
        if graph.topological_sort().is_none() {
            findings.push(Finding::error(
                FindingCode::PipelineCycle,
                Subject::pipeline(&pipeline.name),
                "component paths form a cycle",
            ));
            // Upstream queries are meaningless in a cyclic pipeline.
            continue;
        }
        match pipeline.role {
            PipelineRole::Warehouse => {
                check_hash_before_update(pipeline, &graph, config, &mut findings)
            }
            PipelineRole::Staging => check_truncate_marker(pipeline, config, &mut findings),
            PipelineRole::Other | PipelineRole::Unclassified => {}
        }
        check_column_flow(pipeline, config, &mut findings);
    }

    let metadata = SqlMetadata {
        tables: pipelines
            .iter()
            .filter_map(|pipeline| table_ref(pipeline, doc, config))
            .collect(),
    };

    AnalysisOutcome {
        pipelines,
        findings,
        metadata,
    }
}

/// Assign a role from the destination's connection manager: the connection
/// name and its database name are matched against the staging patterns
/// first, then the warehouse patterns.
fn classify(pipeline: &Pipeline, doc: &PackageDocument, config: &AuditConfig) -> PipelineRole {
    let Some(destination) = pipeline.last_destination() else {
        return PipelineRole::Other;
    };
    let Some(connection_name) = destination.connection.as_deref() else {
        return PipelineRole::Other;
    };

    let mut candidates = vec![connection_name.to_string()];
    if let Some(database) = doc
        .connection(connection_name)
        .and_then(|c| c.database.clone())
    {
        candidates.push(database);
    }

    for candidate in &candidates {
        if config.classification.staging_patterns.is_match(candidate) {
            return PipelineRole::Staging;
        }
    }
    for candidate in &candidates {
        if config.classification.warehouse_patterns.is_match(candidate) {
            return PipelineRole::Warehouse;
        }
    }
    PipelineRole::Other
}

/// A destination that carries its own command text can update rows in
/// place, so something upstream must have computed the change detection
/// hash for it.
fn check_hash_before_update(
    pipeline: &Pipeline,
    graph: &ComponentGraph,
    config: &AuditConfig,
    findings: &mut Vec<Finding>,
) {
    for (idx, destination) in pipeline.destinations() {
        let update_capable = config.shape.update_properties.iter().any(|property| {
            evaluate(destination.property(property), &Condition::StrNotEmpty).passed
        });
        if !update_capable {
            continue;
        }

        let has_hash_upstream = graph
            .upstream(idx)
            .into_iter()
            .any(|i| config.shape.is_hash_type(&pipeline.components[i].type_tag));
        if !has_hash_upstream {
            findings.push(Finding::warning(
                FindingCode::MissingHashBeforeUpdate,
                Subject::component(&destination.name, &pipeline.name),
                "update-capable destination has no hash/compare component upstream",
            ));
        }
    }
}

/// Staging destinations are full reloads; the load mode property must carry
/// a truncate-or-replace marker.
fn check_truncate_marker(pipeline: &Pipeline, config: &AuditConfig, findings: &mut Vec<Finding>) {
    let pattern = config.shape.truncate_marker_pattern();
    let Ok(regex) = Regex::new(&pattern) else {
        // Markers are regex-escaped at pattern build, this cannot fail.
        return;
    };
    let condition = Condition::RegexMatch { pattern, regex };

    for (_, destination) in pipeline.destinations() {
        let raw = destination.property(&config.shape.load_mode_property);
        if !evaluate(raw, &condition).passed {
            findings.push(
                Finding::warning(
                    FindingCode::MissingTruncateMarker,
                    Subject::component(&destination.name, &pipeline.name),
                    format!(
                        "staging destination's '{}' carries no truncate-or-replace marker",
                        config.shape.load_mode_property
                    ),
                )
                .with_comparison(
                    config.shape.truncate_markers.join(" | "),
                    raw.unwrap_or_default().trim(),
                ),
            );
        }
    }
}

/// Column bookkeeping across one pipeline. Every external column a
/// destination maps must be fed by an input column, and every column the
/// source exposes must be selected into the hash components.
///
/// Components without column metadata are skipped rather than reported as
/// fully unmapped.
fn check_column_flow(pipeline: &Pipeline, config: &AuditConfig, findings: &mut Vec<Finding>) {
    let source_columns: Vec<&str> = pipeline
        .first_source()
        .map(|s| s.output_columns.iter().map(String::as_str).collect())
        .unwrap_or_default();

    for component in &pipeline.components {
        match component.kind {
            ComponentKind::Destination if !component.external_columns.is_empty() => {
                let unmapped: Vec<&str> = component
                    .external_columns
                    .iter()
                    .filter(|c| !contains_ignore_case(&component.input_columns, c))
                    .map(String::as_str)
                    .collect();
                if !unmapped.is_empty() {
                    findings.push(Finding::warning(
                        FindingCode::UnmappedDestinationColumn,
                        Subject::component(&component.name, &pipeline.name),
                        format!(
                            "destination columns have no matching input column: {}",
                            unmapped.join(", ")
                        ),
                    ));
                }
            }
            ComponentKind::Transform
                if config.shape.is_hash_type(&component.type_tag)
                    && !component.input_columns.is_empty() =>
            {
                let unselected: Vec<&str> = source_columns
                    .iter()
                    .filter(|c| !contains_ignore_case(&component.input_columns, c))
                    .copied()
                    .collect();
                if !unselected.is_empty() {
                    findings.push(Finding::warning(
                        FindingCode::UnselectedSourceColumn,
                        Subject::component(&component.name, &pipeline.name),
                        format!(
                            "source columns are not selected into the hash: {}",
                            unselected.join(", ")
                        ),
                    ));
                }
            }
            _ => {}
        }
    }
}

fn contains_ignore_case(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|h| h.eq_ignore_ascii_case(needle))
}

fn table_ref(pipeline: &Pipeline, doc: &PackageDocument, config: &AuditConfig) -> Option<TableRef> {
    let destination = pipeline.last_destination()?;
    let table = destination
        .property(&config.shape.table_property)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| destination.name.clone());
    let database = destination
        .connection
        .as_deref()
        .and_then(|name| doc.connection(name))
        .and_then(|c| c.database.clone());

    Some(TableRef {
        pipeline: pipeline.name.clone(),
        role: pipeline.role,
        table,
        database,
        source_command: pipeline.first_source().and_then(|s| s.command_text.clone()),
    })
}
