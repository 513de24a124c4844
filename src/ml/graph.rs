//! Graph arena and evaluation.
//!
//! The graph owns every node and every layer stack. Construction wires
//! node references by index and rejects anything pointing at itself or
//! forward, so the reference graph is acyclic by construction and the
//! recursive walk below always terminates.

use tracing::{debug, info, trace};

use super::model::{NodeConfig, StackConfig};
use super::node::{Node, NodeKind};
use super::source::Source;
use super::{Matrix, RecurrentStack, Stack, Vector};
use crate::error::{GraphError, Result};

#[derive(Debug, Clone)]
pub enum LayerStack {
    Plain(Stack),
    Recurrent(RecurrentStack),
}

impl LayerStack {
    fn build(idx: usize, config: &StackConfig) -> Result<Self> {
        let built = match config {
            StackConfig::Plain { layers } => Stack::new(layers).map(Self::Plain),
            StackConfig::Recurrent { layers } => RecurrentStack::new(layers).map(Self::Recurrent),
        };
        built.map_err(|e| match e {
            GraphError::Configuration(msg) => {
                GraphError::Configuration(format!("stack[{idx}]: {msg}"))
            }
            other => other,
        })
    }

    fn kind_name(&self) -> &'static str {
        match self {
            LayerStack::Plain(_) => "plain",
            LayerStack::Recurrent(_) => "recurrent",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    stacks: Vec<LayerStack>,
}

fn config_error(msg: String) -> GraphError {
    GraphError::Configuration(msg)
}

/// Resolves a reference from node `owner` to an already-built node.
fn referenced(built: &[Node], owner: usize, target: usize) -> Result<&Node> {
    built.get(target).ok_or_else(|| {
        config_error(format!(
            "node[{owner}] references node {target}, which is not defined before it"
        ))
    })
}

fn referenced_stack(stacks: &[LayerStack], owner: usize, target: usize) -> Result<&LayerStack> {
    stacks.get(target).ok_or_else(|| {
        config_error(format!(
            "node[{owner}] references stack {target}, only {} defined",
            stacks.len()
        ))
    })
}

fn build_node(
    idx: usize,
    config: &NodeConfig,
    built: &[Node],
    stacks: &[LayerStack],
) -> Result<Node> {
    match config {
        NodeConfig::Input { slot, width } => {
            if *width == 0 {
                return Err(config_error(format!("node[{idx}] input width must be > 0")));
            }
            Ok(Node::new(NodeKind::Input { slot: *slot }, *width))
        }
        NodeConfig::InputSequence { slot, width } => {
            if *width == 0 {
                return Err(config_error(format!(
                    "node[{idx}] input-sequence width must be > 0"
                )));
            }
            Ok(Node::new(NodeKind::InputSequence { slot: *slot }, *width))
        }
        NodeConfig::Transform { stack, source } => {
            let src = referenced(built, idx, *source)?;
            let plain = match referenced_stack(stacks, idx, *stack)? {
                LayerStack::Plain(plain) => plain,
                other => {
                    return Err(config_error(format!(
                        "node[{idx}] transform needs a plain stack, stack {stack} is {}",
                        other.kind_name()
                    )))
                }
            };
            if !src.produces_vector() {
                return Err(config_error(format!(
                    "node[{idx}] transform source {source} ({}) does not produce a vector",
                    src.type_name()
                )));
            }
            if src.width() != plain.input_width() {
                return Err(config_error(format!(
                    "node[{idx}] stack {stack} expects width {}, source {source} has width {}",
                    plain.input_width(),
                    src.width()
                )));
            }
            Ok(Node::new(
                NodeKind::Transform {
                    stack: *stack,
                    source: *source,
                },
                plain.output_width(),
            ))
        }
        NodeConfig::Concatenate { sources } => {
            if sources.is_empty() {
                return Err(config_error(format!(
                    "node[{idx}] concatenate needs at least one source"
                )));
            }
            let mut width = 0;
            for &source in sources {
                let src = referenced(built, idx, source)?;
                if !src.produces_vector() {
                    return Err(config_error(format!(
                        "node[{idx}] concatenate source {source} ({}) does not produce a vector",
                        src.type_name()
                    )));
                }
                width += src.width();
            }
            Ok(Node::new(
                NodeKind::Concatenate {
                    sources: sources.clone(),
                },
                width,
            ))
        }
        NodeConfig::RecurrentTransform { stack, source } => {
            let src = referenced(built, idx, *source)?;
            let recurrent = match referenced_stack(stacks, idx, *stack)? {
                LayerStack::Recurrent(recurrent) => recurrent,
                other => {
                    return Err(config_error(format!(
                        "node[{idx}] recurrent-transform needs a recurrent stack, stack {stack} is {}",
                        other.kind_name()
                    )))
                }
            };
            if !src.produces_sequence() {
                return Err(config_error(format!(
                    "node[{idx}] recurrent-transform source {source} ({}) does not produce a sequence",
                    src.type_name()
                )));
            }
            if src.width() != recurrent.input_width() {
                return Err(config_error(format!(
                    "node[{idx}] stack {stack} expects width {}, source {source} has width {}",
                    recurrent.input_width(),
                    src.width()
                )));
            }
            Ok(Node::new(
                NodeKind::RecurrentTransform {
                    stack: *stack,
                    source: *source,
                },
                recurrent.output_width(),
            ))
        }
    }
}

impl Graph {
    /// Builds every stack, then every node in declared order.
    pub fn new(nodes: &[NodeConfig], stacks: &[StackConfig]) -> Result<Self> {
        if nodes.is_empty() {
            return Err(config_error("graph must contain at least one node".to_string()));
        }

        let stacks = stacks
            .iter()
            .enumerate()
            .map(|(idx, config)| LayerStack::build(idx, config))
            .collect::<Result<Vec<_>>>()?;

        let mut built: Vec<Node> = Vec::with_capacity(nodes.len());
        for (idx, config) in nodes.iter().enumerate() {
            let node = build_node(idx, config, &built, &stacks)?;
            debug!(
                node = idx,
                kind = node.type_name(),
                width = node.width(),
                "graph node built"
            );
            built.push(node);
        }

        info!(nodes = built.len(), stacks = stacks.len(), "graph built");
        Ok(Self {
            nodes: built,
            stacks,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn stacks(&self) -> &[LayerStack] {
        &self.stacks
    }

    /// The implicit output: the last node in declared order.
    pub fn output_index(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Evaluates the implicit output node.
    pub fn compute(&self, source: &dyn Source) -> Result<Vector> {
        self.compute_node(source, self.output_index())
    }

    pub fn compute_node(&self, source: &dyn Source, index: usize) -> Result<Vector> {
        trace!(node = index, "compute");
        Evaluation::new(self, source).compute(index)
    }

    pub fn scan_node(&self, source: &dyn Source, index: usize) -> Result<Matrix> {
        trace!(node = index, "scan");
        Evaluation::new(self, source).scan(index)
    }
}

fn eval_error(msg: String) -> GraphError {
    GraphError::Evaluation(msg)
}

/// State for one call: the source plus a memo of every node result
/// produced so far, so shared dependencies are evaluated once.
struct Evaluation<'a> {
    graph: &'a Graph,
    source: &'a dyn Source,
    vectors: Vec<Option<Vector>>,
    sequences: Vec<Option<Matrix>>,
}

impl<'a> Evaluation<'a> {
    fn new(graph: &'a Graph, source: &'a dyn Source) -> Self {
        Self {
            graph,
            source,
            vectors: vec![None; graph.nodes.len()],
            sequences: vec![None; graph.nodes.len()],
        }
    }

    fn node(&self, index: usize) -> Result<&'a Node> {
        let graph: &'a Graph = self.graph;
        graph.nodes.get(index).ok_or_else(|| {
            eval_error(format!(
                "node index {index} out of range ({} nodes)",
                graph.nodes.len()
            ))
        })
    }

    fn plain_stack(&self, index: usize) -> Result<&'a Stack> {
        let graph: &'a Graph = self.graph;
        match graph.stacks.get(index) {
            Some(LayerStack::Plain(stack)) => Ok(stack),
            _ => Err(eval_error(format!("stack {index} is not a plain stack"))),
        }
    }

    fn recurrent_stack(&self, index: usize) -> Result<&'a RecurrentStack> {
        let graph: &'a Graph = self.graph;
        match graph.stacks.get(index) {
            Some(LayerStack::Recurrent(stack)) => Ok(stack),
            _ => Err(eval_error(format!("stack {index} is not a recurrent stack"))),
        }
    }

    fn compute(&mut self, index: usize) -> Result<Vector> {
        let node = self.node(index)?;
        if let Some(cached) = &self.vectors[index] {
            return Ok(cached.clone());
        }

        let out = match node.kind() {
            NodeKind::Input { slot } => {
                let v = self.source.vector_at(*slot)?;
                if v.len() != node.width() {
                    return Err(eval_error(format!(
                        "node[{index}] input slot {slot} supplied width {}, expected {}",
                        v.len(),
                        node.width()
                    )));
                }
                v
            }
            NodeKind::Transform { stack, source } => {
                let x = self.compute(*source)?;
                self.plain_stack(*stack)?.compute(&x)?
            }
            NodeKind::Concatenate { sources } => {
                let mut out = Vec::with_capacity(node.width());
                for &source in sources {
                    out.extend(self.compute(source)?.iter().copied());
                }
                Vector::from(out)
            }
            NodeKind::RecurrentTransform { .. } => {
                let scanned = self.scan(index)?;
                match scanned.nrows() {
                    0 => {
                        return Err(eval_error(format!(
                            "node[{index}] cannot reduce an empty sequence to a vector"
                        )))
                    }
                    n => scanned.row(n - 1).to_owned(),
                }
            }
            NodeKind::InputSequence { .. } => {
                return Err(eval_error(format!(
                    "node[{index}] ({}) does not produce a vector",
                    node.type_name()
                )))
            }
        };

        self.vectors[index] = Some(out.clone());
        Ok(out)
    }

    fn scan(&mut self, index: usize) -> Result<Matrix> {
        let node = self.node(index)?;
        if let Some(cached) = &self.sequences[index] {
            return Ok(cached.clone());
        }

        let out = match node.kind() {
            NodeKind::InputSequence { slot } => {
                let m = self.source.matrix_at(*slot)?;
                if m.ncols() != node.width() {
                    return Err(eval_error(format!(
                        "node[{index}] sequence slot {slot} supplied width {}, expected {}",
                        m.ncols(),
                        node.width()
                    )));
                }
                m
            }
            NodeKind::RecurrentTransform { stack, source } => {
                let x = self.scan(*source)?;
                self.recurrent_stack(*stack)?.scan(&x)?
            }
            NodeKind::Input { .. } | NodeKind::Transform { .. } | NodeKind::Concatenate { .. } => {
                return Err(eval_error(format!(
                    "node[{index}] ({}) does not produce a sequence",
                    node.type_name()
                )))
            }
        };

        self.sequences[index] = Some(out.clone());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::dense::{Activation, DenseLayer};
    use crate::ml::recurrent::RecurrentLayer;
    use crate::ml::source::{MockSource, VectorSource};
    use mockall::predicate::eq;
    use ndarray::array;

    fn identity(width: usize) -> StackConfig {
        let weights = (0..width)
            .map(|r| {
                (0..width)
                    .map(|c| if r == c { 1.0 } else { 0.0 })
                    .collect::<Vec<f64>>()
            })
            .collect();
        StackConfig::Plain {
            layers: vec![DenseLayer {
                weights,
                bias: vec![0.0; width],
                activation: Activation::Linear,
            }],
        }
    }

    fn doubler_sequence() -> StackConfig {
        StackConfig::Recurrent {
            layers: vec![RecurrentLayer::Dense(DenseLayer {
                weights: vec![vec![2.0]],
                bias: vec![0.0],
                activation: Activation::Linear,
            })],
        }
    }

    #[test]
    fn concatenation_keeps_source_order() {
        let graph = Graph::new(
            &[
                NodeConfig::Input { slot: 0, width: 2 },
                NodeConfig::Input { slot: 1, width: 3 },
                NodeConfig::Concatenate {
                    sources: vec![1, 0],
                },
            ],
            &[],
        )
        .unwrap();
        assert_eq!(graph.node(2).unwrap().width(), 5);

        let source = VectorSource::new(vec![array![1.0, 2.0], array![3.0, 4.0, 5.0]], vec![]);
        let out = graph.compute(&source).unwrap();
        assert_eq!(out, array![3.0, 4.0, 5.0, 1.0, 2.0]);
    }

    #[test]
    fn shared_node_is_read_once_per_call() {
        let graph = Graph::new(
            &[
                NodeConfig::Input { slot: 0, width: 2 },
                NodeConfig::Transform { stack: 0, source: 0 },
                NodeConfig::Transform { stack: 0, source: 0 },
                NodeConfig::Concatenate {
                    sources: vec![1, 2, 0],
                },
            ],
            &[identity(2)],
        )
        .unwrap();

        let mut source = MockSource::new();
        source
            .expect_vector_at()
            .with(eq(0))
            .times(1)
            .returning(|_| Ok(array![7.0, 8.0]));
        source.expect_matrix_at().never();

        let out = graph.compute(&source).unwrap();
        assert_eq!(out, array![7.0, 8.0, 7.0, 8.0, 7.0, 8.0]);
    }

    #[test]
    fn source_errors_propagate() {
        let graph = Graph::new(&[NodeConfig::Input { slot: 3, width: 1 }], &[]).unwrap();
        let mut source = MockSource::new();
        source
            .expect_vector_at()
            .with(eq(3))
            .returning(|_| Err(GraphError::Evaluation("slot 3 missing".to_string())));
        assert!(graph.compute(&source).unwrap_err().is_evaluation());
    }

    #[test]
    fn rejects_forward_and_self_references() {
        let forward = Graph::new(
            &[
                NodeConfig::Transform { stack: 0, source: 1 },
                NodeConfig::Input { slot: 0, width: 1 },
            ],
            &[identity(1)],
        );
        assert!(forward.unwrap_err().is_configuration());

        let self_ref = Graph::new(
            &[
                NodeConfig::Input { slot: 0, width: 1 },
                NodeConfig::Concatenate {
                    sources: vec![0, 1],
                },
            ],
            &[],
        );
        assert!(self_ref.unwrap_err().is_configuration());
    }

    #[test]
    fn rejects_bad_stack_references() {
        let out_of_range = Graph::new(
            &[
                NodeConfig::Input { slot: 0, width: 1 },
                NodeConfig::Transform { stack: 1, source: 0 },
            ],
            &[identity(1)],
        );
        assert!(out_of_range.unwrap_err().is_configuration());

        let wrong_kind = Graph::new(
            &[
                NodeConfig::Input { slot: 0, width: 1 },
                NodeConfig::Transform { stack: 0, source: 0 },
            ],
            &[doubler_sequence()],
        );
        assert!(wrong_kind.unwrap_err().is_configuration());

        let wrong_width = Graph::new(
            &[
                NodeConfig::Input { slot: 0, width: 3 },
                NodeConfig::Transform { stack: 0, source: 0 },
            ],
            &[identity(2)],
        );
        assert!(wrong_width.unwrap_err().is_configuration());
    }

    #[test]
    fn rejects_capability_mismatch_at_construction() {
        let seq_into_plain = Graph::new(
            &[
                NodeConfig::InputSequence { slot: 0, width: 1 },
                NodeConfig::Concatenate { sources: vec![0] },
            ],
            &[],
        );
        assert!(seq_into_plain.unwrap_err().is_configuration());

        let vec_into_recurrent = Graph::new(
            &[
                NodeConfig::Input { slot: 0, width: 1 },
                NodeConfig::RecurrentTransform { stack: 0, source: 0 },
            ],
            &[doubler_sequence()],
        );
        assert!(vec_into_recurrent.unwrap_err().is_configuration());
    }

    #[test]
    fn rejects_empty_graph_and_empty_concatenation() {
        assert!(Graph::new(&[], &[]).unwrap_err().is_configuration());
        assert!(Graph::new(&[NodeConfig::Concatenate { sources: vec![] }], &[])
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn recurrent_node_scans_and_reduces_to_last_step() {
        let graph = Graph::new(
            &[
                NodeConfig::InputSequence { slot: 0, width: 1 },
                NodeConfig::RecurrentTransform { stack: 0, source: 0 },
                NodeConfig::Input { slot: 0, width: 1 },
                NodeConfig::Concatenate {
                    sources: vec![2, 1],
                },
            ],
            &[doubler_sequence()],
        )
        .unwrap();
        let source = VectorSource::new(vec![array![9.0]], vec![array![[1.0], [2.0], [3.0]]]);

        let scanned = graph.scan_node(&source, 1).unwrap();
        assert_eq!(scanned, array![[2.0], [4.0], [6.0]]);
        assert_eq!(graph.compute_node(&source, 1).unwrap(), array![6.0]);
        assert_eq!(graph.compute(&source).unwrap(), array![9.0, 6.0]);
    }

    #[test]
    fn empty_sequence_cannot_reduce() {
        let graph = Graph::new(
            &[
                NodeConfig::InputSequence { slot: 0, width: 1 },
                NodeConfig::RecurrentTransform { stack: 0, source: 0 },
            ],
            &[doubler_sequence()],
        )
        .unwrap();
        let source = VectorSource::new(vec![], vec![Matrix::zeros((0, 1))]);
        assert_eq!(graph.scan_node(&source, 1).unwrap().nrows(), 0);
        assert!(graph.compute(&source).unwrap_err().is_evaluation());
    }

    #[test]
    fn capability_mismatch_at_evaluation() {
        let graph = Graph::new(
            &[
                NodeConfig::InputSequence { slot: 0, width: 1 },
                NodeConfig::Input { slot: 0, width: 1 },
            ],
            &[],
        )
        .unwrap();
        let source = VectorSource::new(vec![array![1.0]], vec![array![[1.0]]]);
        assert!(graph.compute_node(&source, 0).unwrap_err().is_evaluation());
        assert!(graph.scan_node(&source, 1).unwrap_err().is_evaluation());
        assert!(graph.compute_node(&source, 5).unwrap_err().is_evaluation());
    }

    #[test]
    fn input_width_is_checked_against_source() {
        let graph = Graph::new(&[NodeConfig::Input { slot: 0, width: 2 }], &[]).unwrap();
        let source = VectorSource::new(vec![array![1.0, 2.0, 3.0]], vec![]);
        assert!(graph.compute(&source).unwrap_err().is_evaluation());
    }

    #[test]
    fn repeated_evaluation_is_bit_identical() {
        let graph = Graph::new(
            &[
                NodeConfig::Input { slot: 0, width: 2 },
                NodeConfig::Transform { stack: 0, source: 0 },
            ],
            &[StackConfig::Plain {
                layers: vec![DenseLayer {
                    weights: vec![vec![0.3, -0.7], vec![1.1, 0.2]],
                    bias: vec![0.01, -0.02],
                    activation: Activation::Tanh,
                }],
            }],
        )
        .unwrap();
        let source = VectorSource::new(vec![array![0.123, 4.56]], vec![]);
        let a = graph.compute(&source).unwrap();
        let b = graph.compute(&source).unwrap();
        assert_eq!(
            a.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            b.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn graph_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Graph>();
    }
}
