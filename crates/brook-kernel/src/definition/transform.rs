use std::collections::HashSet;
use std::fmt;

use brook_mapping::{Mapping, MappingSpec};
use indexmap::IndexMap;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Bfs;
use serde::Deserialize;
use thiserror::Error;

use super::{
    CompiledWorkflow, DEFAULT_TASK_RETRIES, ElementKind, FlowElement, IoMapping, TaskMetadata,
};
use crate::event::TaskHeader;

const MAX_PROCESS_ID_LENGTH: usize = 255;

/// Turns a deployment resource into executable workflows.
pub trait WorkflowTransformer: Send + Sync {
    fn transform(&self, resource: &[u8]) -> Result<Vec<CompiledWorkflow>, TransformError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub process_id: String,
    pub element_id: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    fn error(process_id: &str, element_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            process_id: process_id.to_string(),
            element_id: element_id.map(str::to_string),
            message: message.into(),
        }
    }

    fn warning(process_id: &str, element_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(process_id, element_id, message)
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        };
        match &self.element_id {
            Some(element) => write!(
                f,
                "[{severity}] process '{}', element '{element}': {}",
                self.process_id, self.message
            ),
            None => write!(f, "[{severity}] process '{}': {}", self.process_id, self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("failed to read process definition: {0}")]
    Parse(String),
    #[error("process definition is invalid:\n{}", join_issues(.0))]
    Invalid(Vec<ValidationIssue>),
    #[error("deployment contains no executable process")]
    NoExecutableProcess,
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads process definitions from a JSON document:
///
/// ```json
/// {"processes": [{"id": "order", "elements": [
///   {"type": "startEvent", "id": "start"},
///   {"type": "sequenceFlow", "id": "f1", "source": "start", "target": "pay"},
///   {"type": "serviceTask", "id": "pay", "taskType": "payment",
///    "ioMapping": {"inputs": [{"source": "$.total", "target": "$.amount"}]}},
///   {"type": "sequenceFlow", "id": "f2", "source": "pay", "target": "end"},
///   {"type": "endEvent", "id": "end"}
/// ]}]}
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWorkflowTransformer;

impl WorkflowTransformer for JsonWorkflowTransformer {
    fn transform(&self, resource: &[u8]) -> Result<Vec<CompiledWorkflow>, TransformError> {
        let document: DefinitionsDto = serde_json::from_slice(resource)
            .map_err(|err| TransformError::Parse(err.to_string()))?;

        let mut issues = Vec::new();
        let mut workflows = Vec::new();
        for process in document.processes {
            if !process.executable {
                log::debug!("skipping non-executable process '{}'", process.id);
                continue;
            }
            if let Some(workflow) = compile_process(process, &mut issues) {
                workflows.push(workflow);
            }
        }

        if issues.iter().any(|issue| issue.severity == Severity::Error) {
            return Err(TransformError::Invalid(issues));
        }
        for issue in &issues {
            log::warn!("{issue}");
        }
        if workflows.is_empty() {
            return Err(TransformError::NoExecutableProcess);
        }
        Ok(workflows)
    }
}

#[derive(Debug, Deserialize)]
struct DefinitionsDto {
    #[serde(default)]
    processes: Vec<ProcessDto>,
}

#[derive(Debug, Deserialize)]
struct ProcessDto {
    id: String,
    #[serde(default = "default_executable")]
    executable: bool,
    #[serde(default)]
    elements: Vec<ElementDto>,
}

fn default_executable() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum ElementDto {
    StartEvent {
        id: String,
    },
    EndEvent {
        id: String,
    },
    ServiceTask {
        id: String,
        #[serde(default)]
        task_type: String,
        retries: Option<i32>,
        #[serde(default)]
        headers: IndexMap<String, String>,
        #[serde(default)]
        io_mapping: IoMappingDto,
    },
    SequenceFlow {
        id: String,
        source: String,
        target: String,
    },
    UserTask {
        id: String,
    },
    ExclusiveGateway {
        id: String,
    },
}

impl ElementDto {
    fn id(&self) -> &str {
        match self {
            ElementDto::StartEvent { id }
            | ElementDto::EndEvent { id }
            | ElementDto::ServiceTask { id, .. }
            | ElementDto::SequenceFlow { id, .. }
            | ElementDto::UserTask { id }
            | ElementDto::ExclusiveGateway { id } => id,
        }
    }

    fn kind(&self) -> ElementKind {
        match self {
            ElementDto::StartEvent { .. } => ElementKind::StartEvent,
            ElementDto::EndEvent { .. } => ElementKind::EndEvent,
            ElementDto::ServiceTask { .. } => ElementKind::ServiceTask,
            ElementDto::SequenceFlow { .. } => ElementKind::SequenceFlow,
            ElementDto::UserTask { .. } => ElementKind::UserTask,
            ElementDto::ExclusiveGateway { .. } => ElementKind::ExclusiveGateway,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct IoMappingDto {
    #[serde(default)]
    inputs: Vec<MappingSpec>,
    #[serde(default)]
    outputs: Vec<MappingSpec>,
}

fn compile_process(
    process: ProcessDto,
    issues: &mut Vec<ValidationIssue>,
) -> Option<CompiledWorkflow> {
    let process_id = process.id.as_str();
    let errors_before = error_count(issues);

    if process_id.is_empty() {
        issues.push(ValidationIssue::error(process_id, None, "process id must not be empty"));
    } else if process_id.chars().count() > MAX_PROCESS_ID_LENGTH {
        issues.push(ValidationIssue::error(
            process_id,
            None,
            format!("process id must not be longer than {MAX_PROCESS_ID_LENGTH} characters"),
        ));
    }

    let mut elements: IndexMap<String, FlowElement> = IndexMap::new();
    for dto in &process.elements {
        let id = dto.id();
        if id.is_empty() {
            issues.push(ValidationIssue::error(process_id, None, "element id must not be empty"));
            continue;
        }
        if elements.contains_key(id) {
            issues.push(ValidationIssue::error(
                process_id,
                Some(id),
                "element id is not unique",
            ));
            continue;
        }
        let mut element = FlowElement::new(id, dto.kind());
        if let ElementDto::ServiceTask {
            task_type,
            retries,
            headers,
            io_mapping,
            ..
        } = dto
        {
            if task_type.trim().is_empty() {
                issues.push(ValidationIssue::error(
                    process_id,
                    Some(id),
                    "service task must have a task type",
                ));
            }
            let retries = retries.unwrap_or(DEFAULT_TASK_RETRIES);
            if retries < 0 {
                issues.push(ValidationIssue::error(
                    process_id,
                    Some(id),
                    "task retries must not be negative",
                ));
            }
            element.task = Some(TaskMetadata {
                task_type: task_type.clone(),
                retries,
                headers: headers
                    .iter()
                    .map(|(key, value)| TaskHeader {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            });
            element.io_mapping = IoMapping {
                inputs: compile_mappings(process_id, id, "input", &io_mapping.inputs, issues),
                outputs: compile_mappings(process_id, id, "output", &io_mapping.outputs, issues),
            };
        }
        elements.insert(id.to_string(), element);
    }

    for dto in &process.elements {
        let ElementDto::SequenceFlow { id, source, target } = dto else {
            continue;
        };
        let mut endpoints_valid = true;
        for (role, endpoint) in [("source", source), ("target", target)] {
            match elements.get(endpoint.as_str()) {
                None => {
                    issues.push(ValidationIssue::error(
                        process_id,
                        Some(id.as_str()),
                        format!("{role} element '{endpoint}' does not exist"),
                    ));
                    endpoints_valid = false;
                }
                Some(element) if element.kind == ElementKind::SequenceFlow => {
                    issues.push(ValidationIssue::error(
                        process_id,
                        Some(id.as_str()),
                        format!("{role} element '{endpoint}' is a sequence flow"),
                    ));
                    endpoints_valid = false;
                }
                Some(_) => {}
            }
        }
        if let Some(flow) = elements.get_mut(id.as_str()) {
            flow.target = Some(target.clone());
        }
        if endpoints_valid {
            if let Some(element) = elements.get_mut(source.as_str()) {
                element.outgoing.push(id.clone());
            }
        }
    }

    let start_events: Vec<&str> = elements
        .values()
        .filter(|element| element.kind == ElementKind::StartEvent)
        .map(|element| element.id.as_str())
        .collect();
    if start_events.len() != 1 {
        issues.push(ValidationIssue::error(
            process_id,
            None,
            format!(
                "process must have exactly one start event, found {}",
                start_events.len()
            ),
        ));
    }

    for element in elements.values() {
        let outgoing = element.outgoing.len();
        match element.kind {
            ElementKind::StartEvent | ElementKind::ServiceTask if outgoing != 1 => {
                issues.push(ValidationIssue::error(
                    process_id,
                    Some(element.id.as_str()),
                    format!(
                        "{} must have exactly one outgoing sequence flow, found {outgoing}",
                        element.kind.name()
                    ),
                ));
            }
            ElementKind::EndEvent if outgoing != 0 => {
                issues.push(ValidationIssue::error(
                    process_id,
                    Some(element.id.as_str()),
                    "end event must not have outgoing sequence flows",
                ));
            }
            _ => {}
        }
    }

    if let [start] = start_events.as_slice() {
        for id in unreachable_elements(&elements, *start) {
            issues.push(ValidationIssue::warning(
                process_id,
                Some(id.as_str()),
                "element is not reachable from the start event",
            ));
        }
    }

    if error_count(issues) > errors_before {
        return None;
    }
    let start_event = start_events.first()?.to_string();
    Some(CompiledWorkflow::new(process_id, elements, start_event))
}

fn compile_mappings(
    process_id: &str,
    element_id: &str,
    direction: &str,
    specs: &[MappingSpec],
    issues: &mut Vec<ValidationIssue>,
) -> Vec<Mapping> {
    let mut mappings = Vec::with_capacity(specs.len());
    for spec in specs {
        match Mapping::try_from(spec.clone()) {
            Ok(mapping) => {
                if mapping.source().has_wildcard() {
                    issues.push(ValidationIssue::error(
                        process_id,
                        Some(element_id),
                        format!(
                            "{direction} mapping source '{}' must address a single value",
                            spec.source
                        ),
                    ));
                }
                mappings.push(mapping);
            }
            Err(err) => issues.push(ValidationIssue::error(
                process_id,
                Some(element_id),
                format!("invalid {direction} mapping: {err}"),
            )),
        }
    }
    if mappings.len() > 1 && mappings.iter().any(|mapping| mapping.target().is_root()) {
        issues.push(ValidationIssue::error(
            process_id,
            Some(element_id),
            format!("a {direction} mapping that targets the root must be the only {direction} mapping"),
        ));
    }
    mappings
}

/// Non-flow elements that no path of sequence flows from `start` reaches.
fn unreachable_elements(elements: &IndexMap<String, FlowElement>, start: &str) -> Vec<String> {
    let mut graph = DiGraphMap::<&str, ()>::new();
    for element in elements.values() {
        if element.kind != ElementKind::SequenceFlow {
            graph.add_node(element.id.as_str());
        }
    }
    for element in elements.values() {
        for flow_id in &element.outgoing {
            if let Some(target) = elements.get(flow_id).and_then(|flow| flow.target.as_deref()) {
                graph.add_edge(element.id.as_str(), target, ());
            }
        }
    }

    let mut reached = HashSet::new();
    let mut bfs = Bfs::new(&graph, start);
    while let Some(node) = bfs.next(&graph) {
        reached.insert(node);
    }
    graph
        .nodes()
        .filter(|node| !reached.contains(node))
        .map(str::to_string)
        .collect()
}

fn error_count(issues: &[ValidationIssue]) -> usize {
    issues
        .iter()
        .filter(|issue| issue.severity == Severity::Error)
        .count()
}
