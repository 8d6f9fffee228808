//! Package document loader
//!
//! Parses the package XML into a generic element tree with quick-xml, then
//! extracts the typed model. The whole file is read, parsed, and dropped
//! before `load` returns; no handle outlives the call.

use crate::model::{
    ComponentKind, ConnectionManager, DataflowComponent, PackageDocument, Parameter, Pipeline,
    PipelineRole, Task, Variable,
};
use packaudit_core::AuditConfig;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

/// Package load error
///
/// Load failures are fatal to the run: no partial model is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read package file: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not well-formed or lacks a recognizable root
    #[error("malformed package document: {0}")]
    MalformedPackage(String),

    /// The document carries no version/schema marker
    #[error("unsupported package document: {0}")]
    UnsupportedPackage(String),
}

const EXECUTABLE: &str = "DTS:Executable";
const EXECUTABLES: &str = "DTS:Executables";
const OBJECT_NAME: &str = "DTS:ObjectName";
const EXECUTABLE_TYPE: &str = "DTS:ExecutableType";
const VERSION_MAJOR: &str = "DTS:VersionMajor";
const TYPE_PIPELINE: &str = "Microsoft.Pipeline";

/// Load a package document from disk
pub fn load(path: &Path, config: &AuditConfig) -> Result<PackageDocument, LoadError> {
    tracing::info!(path = %path.display(), "loading package document");
    let content = std::fs::read_to_string(path)?;
    parse(&content, config)
}

/// Parse a package document from its XML text
pub fn parse(content: &str, config: &AuditConfig) -> Result<PackageDocument, LoadError> {
    let root = parse_tree(content)?;

    if root.name != EXECUTABLE {
        return Err(LoadError::MalformedPackage(format!(
            "expected {EXECUTABLE} root, found <{}>",
            root.name
        )));
    }
    if root.attr(VERSION_MAJOR).is_none() {
        return Err(LoadError::UnsupportedPackage(format!(
            "root element carries no {VERSION_MAJOR} marker"
        )));
    }
    let name = root
        .attr(OBJECT_NAME)
        .ok_or_else(|| {
            LoadError::MalformedPackage(format!("root element carries no {OBJECT_NAME}"))
        })?
        .to_string();

    let mut doc = PackageDocument {
        name,
        variables: extract_variables(&root),
        parameters: extract_parameters(&root),
        connections: extract_connections(&root),
        tasks: Vec::new(),
        pipelines: Vec::new(),
        containers: Vec::new(),
    };

    walk_executables(&root, None, config, &mut doc);

    tracing::debug!(
        package = %doc.name,
        pipelines = doc.pipelines.len(),
        tasks = doc.tasks.len(),
        variables = doc.variables.len(),
        "package model built"
    );

    Ok(doc)
}

// ---------------------------------------------------------------------------
// Generic element tree
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: HashMap<String, String>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Depth-first search for the first descendant with the given name
    fn find(&self, name: &str) -> Option<&Element> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// Collect every descendant with the given name, in document order
    fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        for child in &self.children {
            if child.name == name {
                out.push(child);
            }
            child.find_all(name, out);
        }
    }
}

fn parse_tree(content: &str) -> Result<Element, LoadError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let mut element = Element {
                    name: String::from_utf8_lossy(e.name().as_ref()).to_string(),
                    ..Element::default()
                };
                for attr in e.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    element.attrs.insert(key, value);
                }
                stack.push(element);
            }
            Ok(Event::Empty(e)) => {
                let mut element = Element {
                    name: String::from_utf8_lossy(e.name().as_ref()).to_string(),
                    ..Element::default()
                };
                for attr in e.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    element.attrs.insert(key, value);
                }
                attach(element, &mut stack, &mut root);
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().ok_or_else(|| {
                    LoadError::MalformedPackage("unbalanced closing tag".to_string())
                })?;
                attach(element, &mut stack, &mut root);
            }
            Ok(Event::Text(e)) => {
                if let Some(top) = stack.last_mut() {
                    let text = e
                        .unescape()
                        .map_err(|e| LoadError::MalformedPackage(e.to_string()))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(LoadError::MalformedPackage(e.to_string())),
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(LoadError::MalformedPackage(
            "document ended with unclosed elements".to_string(),
        ));
    }

    root.ok_or_else(|| LoadError::MalformedPackage("document has no root element".to_string()))
}

fn attach(element: Element, stack: &mut Vec<Element>, root: &mut Option<Element>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        // Keep the first root; trailing junk is ignored by the XML parser
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Model extraction
// ---------------------------------------------------------------------------

fn extract_variables(root: &Element) -> Vec<Variable> {
    let mut elements = Vec::new();
    root.find_all("DTS:Variable", &mut elements);
    elements
        .into_iter()
        .filter_map(|e| {
            let name = e.attr(OBJECT_NAME)?.to_string();
            let value = e
                .child("DTS:VariableValue")
                .map(|v| v.text.clone())
                .unwrap_or_else(|| e.text.clone());
            Some(Variable {
                name,
                value_type: e.attr("DTS:DataType").unwrap_or_default().to_string(),
                value,
            })
        })
        .collect()
}

fn extract_parameters(root: &Element) -> Vec<Parameter> {
    let mut elements = Vec::new();
    root.find_all("DTS:PackageParameter", &mut elements);
    elements
        .into_iter()
        .filter_map(|e| {
            let name = e.attr(OBJECT_NAME)?.to_string();
            let value = e
                .child("DTS:Property")
                .map(|v| v.text.clone())
                .unwrap_or_else(|| e.text.clone());
            Some(Parameter { name, value })
        })
        .collect()
}

fn extract_connections(root: &Element) -> Vec<ConnectionManager> {
    let mut elements = Vec::new();
    root.find_all("DTS:ConnectionManager", &mut elements);
    elements
        .into_iter()
        .filter_map(|e| {
            // ConnectionManager elements nest (ObjectData wraps an inner one
            // holding the connection string); only the named outer ones count.
            let name = e.attr(OBJECT_NAME)?.to_string();
            let connection_string = e
                .attr("DTS:ConnectionString")
                .map(str::to_string)
                .or_else(|| {
                    let mut inner = Vec::new();
                    e.find_all("DTS:ConnectionManager", &mut inner);
                    inner
                        .iter()
                        .find_map(|i| i.attr("DTS:ConnectionString"))
                        .map(str::to_string)
                });
            let (server, database) = connection_string
                .as_deref()
                .map(parse_connection_string)
                .unwrap_or((None, None));
            Some(ConnectionManager {
                name,
                provider: e.attr("DTS:CreationName").unwrap_or_default().to_string(),
                server,
                database,
            })
        })
        .collect()
}

/// Pull server and database identifiers out of a `key=value;` connection string
fn parse_connection_string(cs: &str) -> (Option<String>, Option<String>) {
    let mut server = None;
    let mut database = None;
    for pair in cs.split(';') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "data source" | "server" => server = Some(value.to_string()),
            "initial catalog" | "database" => database = Some(value.to_string()),
            _ => {}
        }
    }
    (server, database)
}

/// Recursively walk the executable tree, flattening container contents.
///
/// Pipelines found inside a loop/sequence container keep a back-reference to
/// the container's name; incremental-load detection relies on it.
fn walk_executables(
    element: &Element,
    container: Option<&str>,
    config: &AuditConfig,
    doc: &mut PackageDocument,
) {
    let Some(executables) = element.child(EXECUTABLES) else {
        return;
    };

    for exec in executables.children_named(EXECUTABLE) {
        let name = exec.attr(OBJECT_NAME).unwrap_or_default().to_string();
        let exec_type = exec.attr(EXECUTABLE_TYPE).unwrap_or_default().to_string();

        if exec_type.starts_with("STOCK:") {
            // Sequence / loop container: record it and flatten its contents
            doc.containers.push(name.clone());
            walk_executables(exec, Some(name.as_str()), config, doc);
        } else if exec_type == TYPE_PIPELINE {
            match exec.find("pipeline") {
                Some(pipeline_element) => {
                    let pipeline =
                        extract_pipeline(&name, container, pipeline_element, config);
                    doc.pipelines.push(pipeline);
                }
                None => {
                    tracing::warn!(task = %name, "pipeline task carries no pipeline body");
                }
            }
        } else {
            let sql_statement = exec
                .find("SQLTask:SqlTaskData")
                .and_then(|d| d.attr("SQLTask:SqlStatementSource"))
                .map(str::to_string);
            doc.tasks.push(Task {
                name,
                task_type: exec_type,
                container: container.map(str::to_string),
                sql_statement,
            });
            walk_executables(exec, container, config, doc);
        }
    }
}

fn extract_pipeline(
    name: &str,
    container: Option<&str>,
    pipeline_element: &Element,
    config: &AuditConfig,
) -> Pipeline {
    let mut components = Vec::new();
    let mut ref_ids = Vec::new();

    if let Some(components_element) = pipeline_element.find("components") {
        for component in components_element.children_named("component") {
            let component_name = component.attr("name").unwrap_or_default().to_string();
            let raw_type = component
                .attr("componentClassID")
                .unwrap_or_default()
                .to_string();

            let mut properties = BTreeMap::new();
            if let Some(props) = component.child("properties") {
                for prop in props.children_named("property") {
                    if let Some(prop_name) = prop.attr("name") {
                        properties.insert(prop_name.to_string(), prop.text.clone());
                    }
                }
            }

            let connection = component
                .find("connection")
                .and_then(|c| c.attr("connectionManagerRefId"))
                .and_then(extract_bracketed_name);

            let command_text = properties
                .get("SqlCommand")
                .filter(|v| !v.trim().is_empty())
                .cloned();

            let kind = component_kind(component, &raw_type);

            ref_ids.push(component.attr("refId").map(str::to_string));
            components.push(DataflowComponent {
                name: component_name,
                type_tag: config.resolve_type_tag(&raw_type),
                raw_type,
                kind,
                properties,
                command_text,
                connection,
                input_columns: column_names(component, "inputColumn", "cachedName"),
                output_columns: column_names(component, "outputColumn", "name"),
                external_columns: column_names(component, "externalMetadataColumn", "name"),
            });
        }
    }

    let edges = extract_edges(pipeline_element, &components, &ref_ids);

    Pipeline {
        name: name.to_string(),
        container: container.map(str::to_string),
        components,
        edges,
        role: PipelineRole::Unclassified,
    }
}

/// Derive the component kind from the document structure, falling back to
/// the class ID when the component declares neither inputs nor outputs.
fn component_kind(component: &Element, raw_type: &str) -> ComponentKind {
    let has_inputs = component
        .find("inputs")
        .map(|i| i.children_named("input").count() > 0)
        .unwrap_or(false);
    let has_outputs = component
        .find("outputs")
        .map(|o| o.children_named("output").count() > 0)
        .unwrap_or(false);

    match (has_inputs, has_outputs) {
        (false, true) => ComponentKind::Source,
        (true, false) => ComponentKind::Destination,
        (true, true) => ComponentKind::Transform,
        (false, false) => {
            let lowered = raw_type.to_ascii_lowercase();
            if lowered.contains("destination") {
                ComponentKind::Destination
            } else if lowered.contains("source") || lowered.contains("src") {
                ComponentKind::Source
            } else {
                ComponentKind::Transform
            }
        }
    }
}

/// Collect one attribute from every matching column element under a component
///
/// Input columns carry the upstream name in `cachedName`; fall back to
/// `name` for writers that omit the cached form.
fn column_names(component: &Element, element_name: &str, attr_name: &str) -> Vec<String> {
    let mut elements = Vec::new();
    component.find_all(element_name, &mut elements);
    elements
        .iter()
        .filter_map(|e| e.attr(attr_name).or_else(|| e.attr("name")))
        .map(str::to_string)
        .collect()
}

/// Extract the `[Name]` portion of a connection manager ref ID
fn extract_bracketed_name(ref_id: &str) -> Option<String> {
    let start = ref_id.find('[')?;
    let end = ref_id[start..].find(']')? + start;
    Some(ref_id[start + 1..end].to_string())
}

fn extract_edges(
    pipeline_element: &Element,
    components: &[DataflowComponent],
    ref_ids: &[Option<String>],
) -> Vec<(usize, usize)> {
    let Some(paths) = pipeline_element.find("paths") else {
        return Vec::new();
    };

    let mut edges = Vec::new();
    for path in paths.children_named("path") {
        let (Some(start), Some(end)) = (path.attr("startId"), path.attr("endId")) else {
            continue;
        };
        let from = resolve_endpoint(start, ".Outputs[", components, ref_ids);
        let to = resolve_endpoint(end, ".Inputs[", components, ref_ids);
        if let (Some(from), Some(to)) = (from, to) {
            edges.push((from, to));
        } else {
            tracing::debug!(start, end, "unresolvable path endpoint");
        }
    }
    edges
}

/// Match a path endpoint like `Package\Flow\Sort.Outputs[Sort Output]` back
/// to a component index, by refId prefix or by trailing component name.
fn resolve_endpoint(
    endpoint: &str,
    marker: &str,
    components: &[DataflowComponent],
    ref_ids: &[Option<String>],
) -> Option<usize> {
    let id = match endpoint.find(marker) {
        Some(pos) => &endpoint[..pos],
        None => endpoint,
    };

    if let Some(idx) = ref_ids
        .iter()
        .position(|r| r.as_deref() == Some(id))
    {
        return Some(idx);
    }

    let trailing = id.rsplit('\\').next().unwrap_or(id);
    components.iter().position(|c| c.name == trailing)
}
