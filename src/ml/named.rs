//! Name-addressed front end over a `Graph`.
//!
//! `NamedGraph` owns the graph and one preprocessor per named input. A
//! call preprocesses every declared input (in declared order) into a
//! `VectorSource`, evaluates one output node and labels the result.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

use super::graph::Graph;
use super::model::{GraphConfig, InputConfig};
use super::node::NodeKind;
use super::preprocess::{InputPreprocessor, InputSequencePreprocessor};
use super::source::{DummySource, Source, VectorSource};
use crate::error::{GraphError, Result};

/// Raw variables of one input: variable name -> value.
pub type ValueMap = HashMap<String, f64>;
/// Input name -> raw variables.
pub type NodeMap = HashMap<String, ValueMap>;
/// Sequence input name -> raw variables per time step.
pub type SeqNodeMap = HashMap<String, Vec<ValueMap>>;
/// Output label -> value.
pub type OutputMap = BTreeMap<String, f64>;

#[derive(Debug, Clone)]
struct NamedOutput {
    name: String,
    node_index: usize,
    labels: Vec<String>,
}

#[derive(Debug)]
pub struct NamedGraph {
    graph: Graph,
    inputs: Vec<(String, InputPreprocessor)>,
    sequences: Vec<(String, InputSequencePreprocessor)>,
    outputs: Vec<NamedOutput>,
    output_indices: HashMap<String, usize>,
    default_output: usize,
}

fn with_input_context(name: &str, err: GraphError) -> GraphError {
    match err {
        GraphError::Configuration(msg) => {
            GraphError::Configuration(format!("input '{name}': {msg}"))
        }
        GraphError::Evaluation(msg) => GraphError::Evaluation(format!("input '{name}': {msg}")),
        other => other,
    }
}

fn build_preprocessors<P>(
    kind: &str,
    configs: &[InputConfig],
    build: impl Fn(&InputConfig) -> Result<P>,
) -> Result<Vec<(String, P)>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(configs.len());
    for config in configs {
        if !seen.insert(config.name.as_str()) {
            return Err(GraphError::Configuration(format!(
                "{kind} '{}' declared twice",
                config.name
            )));
        }
        let pre = build(config).map_err(|e| with_input_context(&config.name, e))?;
        out.push((config.name.clone(), pre));
    }
    Ok(out)
}

impl NamedGraph {
    /// Builds the graph, the preprocessors and the output table.
    ///
    /// `default_output` must name a declared output if given. Without it,
    /// exactly one output must be declared.
    pub fn new(config: &GraphConfig, default_output: Option<&str>) -> Result<Self> {
        let graph = Graph::new(&config.nodes, &config.stacks)?;

        let inputs = build_preprocessors("input", &config.inputs, |c| {
            InputPreprocessor::new(&c.variables)
        })?;
        let sequences = build_preprocessors("input sequence", &config.input_sequences, |c| {
            InputSequencePreprocessor::new(&c.variables)
        })?;

        for (idx, node) in graph.nodes().iter().enumerate() {
            let (slot, declared) = match node.kind() {
                NodeKind::Input { slot } => (
                    *slot,
                    inputs.get(*slot).map(|(name, pre)| (name, pre.width())),
                ),
                NodeKind::InputSequence { slot } => (
                    *slot,
                    sequences.get(*slot).map(|(name, pre)| (name, pre.width())),
                ),
                _ => continue,
            };
            match declared {
                None => {
                    return Err(GraphError::Configuration(format!(
                        "node[{idx}] ({}) reads slot {slot}, which has no named input",
                        node.type_name()
                    )))
                }
                Some((name, width)) if width != node.width() => {
                    return Err(GraphError::Configuration(format!(
                        "node[{idx}] width {} != {width} variables of input '{name}'",
                        node.width()
                    )))
                }
                Some(_) => {}
            }
        }

        let mut outputs = Vec::with_capacity(config.outputs.len());
        let mut output_indices = HashMap::new();
        for (name, output) in &config.outputs {
            let node = graph.node(output.node_index).ok_or_else(|| {
                GraphError::Configuration(format!(
                    "output '{name}' references node {}, only {} defined",
                    output.node_index,
                    graph.nodes().len()
                ))
            })?;
            if !node.produces_vector() {
                return Err(GraphError::Configuration(format!(
                    "output '{name}' node {} ({}) does not produce a vector",
                    output.node_index,
                    node.type_name()
                )));
            }
            if node.width() != output.labels.len() {
                return Err(GraphError::Configuration(format!(
                    "output '{name}' has {} labels, node {} has width {}",
                    output.labels.len(),
                    output.node_index,
                    node.width()
                )));
            }
            let unique: HashSet<&str> = output.labels.iter().map(String::as_str).collect();
            if unique.len() != output.labels.len() {
                return Err(GraphError::Configuration(format!(
                    "output '{name}' has duplicate labels"
                )));
            }
            output_indices.insert(name.clone(), outputs.len());
            outputs.push(NamedOutput {
                name: name.clone(),
                node_index: output.node_index,
                labels: output.labels.clone(),
            });
        }

        let default_output = match default_output {
            Some(name) => *output_indices.get(name).ok_or_else(|| {
                GraphError::Configuration(format!("no output node '{name}'"))
            })?,
            None if outputs.len() == 1 => 0,
            None if outputs.is_empty() => {
                return Err(GraphError::Configuration(
                    "graph declares no outputs".to_string(),
                ))
            }
            None => {
                return Err(GraphError::Configuration(format!(
                    "ambiguous default output: {} outputs declared, specify one",
                    outputs.len()
                )))
            }
        };

        info!(
            inputs = inputs.len(),
            sequences = sequences.len(),
            outputs = outputs.len(),
            default_output = %outputs[default_output].name,
            "named graph built"
        );

        Ok(Self {
            graph,
            inputs,
            sequences,
            outputs,
            output_indices,
            default_output,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P, default_output: Option<&str>) -> Result<Self> {
        let config = GraphConfig::from_file(path)?;
        Self::new(&config, default_output)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|(name, _)| name.as_str())
    }

    pub fn sequence_names(&self) -> impl Iterator<Item = &str> {
        self.sequences.iter().map(|(name, _)| name.as_str())
    }

    /// Output names in index order.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|o| o.name.as_str())
    }

    pub fn output_labels(&self, name: &str) -> Option<&[String]> {
        self.output_indices
            .get(name)
            .map(|&idx| self.outputs[idx].labels.as_slice())
    }

    pub fn default_output(&self) -> &str {
        &self.outputs[self.default_output].name
    }

    /// Evaluates the default output.
    pub fn evaluate(&self, inputs: &NodeMap, sequences: &SeqNodeMap) -> Result<OutputMap> {
        self.evaluate_index(inputs, sequences, self.default_output)
    }

    /// Evaluates the output called `output`; never falls back to the default.
    pub fn evaluate_output(
        &self,
        inputs: &NodeMap,
        sequences: &SeqNodeMap,
        output: &str,
    ) -> Result<OutputMap> {
        let idx = self
            .output_indices
            .get(output)
            .ok_or_else(|| GraphError::Evaluation(format!("no output node '{output}'")))?;
        self.evaluate_index(inputs, sequences, *idx)
    }

    pub fn evaluate_index(
        &self,
        inputs: &NodeMap,
        sequences: &SeqNodeMap,
        index: usize,
    ) -> Result<OutputMap> {
        let output = self.outputs.get(index).ok_or_else(|| {
            GraphError::Evaluation(format!(
                "output index {index} out of range ({} outputs)",
                self.outputs.len()
            ))
        })?;

        let vectors = self
            .inputs
            .iter()
            .map(|(name, pre)| {
                let raw = inputs.get(name).ok_or_else(|| {
                    GraphError::Evaluation(format!("input node not found: '{name}'"))
                })?;
                pre.apply(raw).map_err(|e| with_input_context(name, e))
            })
            .collect::<Result<Vec<_>>>()?;

        let matrices = self
            .sequences
            .iter()
            .map(|(name, pre)| {
                let steps = sequences.get(name).ok_or_else(|| {
                    GraphError::Evaluation(format!("input sequence not found: '{name}'"))
                })?;
                pre.apply(steps).map_err(|e| with_input_context(name, e))
            })
            .collect::<Result<Vec<_>>>()?;

        let source = VectorSource::new(vectors, matrices);
        self.label(output, &source)
    }

    fn label(&self, output: &NamedOutput, source: &dyn Source) -> Result<OutputMap> {
        let result = self.graph.compute_node(source, output.node_index)?;
        Ok(output
            .labels
            .iter()
            .cloned()
            .zip(result.iter().copied())
            .collect())
    }

    /// Evaluates every output against zero-filled inputs of the declared
    /// widths, with `time_steps` rows for every sequence input.
    pub fn dry_run(&self, time_steps: usize) -> Result<()> {
        let source = DummySource::new(
            self.inputs.iter().map(|(_, pre)| pre.width()).collect(),
            self.sequences
                .iter()
                .map(|(_, pre)| (time_steps, pre.width()))
                .collect(),
        );
        for output in &self.outputs {
            let values = self.label(output, &source)?;
            if values.len() != output.labels.len() {
                return Err(GraphError::Evaluation(format!(
                    "output '{}' produced {} values for {} labels",
                    output.name,
                    values.len(),
                    output.labels.len()
                )));
            }
            debug!(output = %output.name, width = values.len(), "dry run ok");
        }
        Ok(())
    }
}
