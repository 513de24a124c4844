//! Command implementations for the `lwgraph` binary.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tabled::Tabled;
use tracing::info;

use super::output::{print_items, print_kv, print_success, OutputMode};
use crate::ml::{NamedGraph, NodeKind, NodeMap, SeqNodeMap};

/// Call-time inputs as read from a JSON file.
#[derive(Debug, Default, Deserialize)]
pub struct InputsFile {
    #[serde(default)]
    pub inputs: NodeMap,
    #[serde(default)]
    pub sequences: SeqNodeMap,
}

impl InputsFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct NodeRow {
    pub index: usize,
    pub kind: String,
    pub width: usize,
    pub reads: String,
}

#[derive(Debug, Serialize, Tabled)]
pub struct OutputRow {
    pub name: String,
    pub labels: String,
    pub default: bool,
}

#[derive(Debug, Serialize, Tabled)]
pub struct ValueRow {
    pub label: String,
    pub value: f64,
}

pub fn check(graph: &NamedGraph, steps: usize) -> anyhow::Result<()> {
    graph.dry_run(steps)?;
    info!(steps, "dry run passed");
    print_success(&format!(
        "ok: {} nodes, {} outputs, default '{}'",
        graph.graph().nodes().len(),
        graph.output_names().count(),
        graph.default_output()
    ));
    Ok(())
}

pub fn eval(
    graph: &NamedGraph,
    inputs_path: &Path,
    output: Option<&str>,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let file = InputsFile::from_file(inputs_path)?;
    let values = match output {
        Some(name) => graph.evaluate_output(&file.inputs, &file.sequences, name)?,
        None => graph.evaluate(&file.inputs, &file.sequences)?,
    };

    match mode {
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(&values)?),
        OutputMode::Table => {
            let rows: Vec<ValueRow> = values
                .into_iter()
                .map(|(label, value)| ValueRow { label, value })
                .collect();
            print_items(&rows, mode)?;
        }
    }
    Ok(())
}

fn reads(kind: &NodeKind) -> String {
    match kind {
        NodeKind::Input { slot } | NodeKind::InputSequence { slot } => format!("slot {slot}"),
        NodeKind::Transform { stack, source } | NodeKind::RecurrentTransform { stack, source } => {
            format!("node {source} via stack {stack}")
        }
        NodeKind::Concatenate { sources } => format!("nodes {sources:?}"),
    }
}

pub fn describe(graph: &NamedGraph, mode: OutputMode) -> anyhow::Result<()> {
    if mode == OutputMode::Table {
        print_kv("inputs", &graph.input_names().collect::<Vec<_>>().join(", "));
        print_kv(
            "input sequences",
            &graph.sequence_names().collect::<Vec<_>>().join(", "),
        );
    }

    let nodes: Vec<NodeRow> = graph
        .graph()
        .nodes()
        .iter()
        .enumerate()
        .map(|(index, node)| NodeRow {
            index,
            kind: node.type_name().to_string(),
            width: node.width(),
            reads: reads(node.kind()),
        })
        .collect();
    print_items(&nodes, mode)?;

    let outputs: Vec<OutputRow> = graph
        .output_names()
        .map(|name| OutputRow {
            name: name.to_string(),
            labels: graph.output_labels(name).unwrap_or_default().join(", "),
            default: name == graph.default_output(),
        })
        .collect();
    print_items(&outputs, mode)?;
    Ok(())
}
