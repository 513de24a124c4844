//! Graph nodes.
//!
//! References to other nodes and to stacks are arena indices into the
//! owning `Graph`. A node can only reference indices lower than its own,
//! so the arena order is always a valid evaluation order.

/// Closed set of node variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Vector leaf read from source slot `slot`.
    Input { slot: usize },
    /// Plain stack applied to a vector-producing node.
    Transform { stack: usize, source: usize },
    /// Vectors of `sources`, concatenated in listed order.
    Concatenate { sources: Vec<usize> },
    /// Sequence leaf read from source slot `slot`.
    InputSequence { slot: usize },
    /// Recurrent stack applied to a sequence-producing node. Scans to a
    /// matrix; computes to the final time step of that matrix.
    RecurrentTransform { stack: usize, source: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    kind: NodeKind,
    width: usize,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, width: usize) -> Self {
        Self { kind, width }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Vector length for vector output, column count for sequence output.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn produces_vector(&self) -> bool {
        !matches!(self.kind, NodeKind::InputSequence { .. })
    }

    pub fn produces_sequence(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::InputSequence { .. } | NodeKind::RecurrentTransform { .. }
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            NodeKind::Input { .. } => "input",
            NodeKind::Transform { .. } => "transform",
            NodeKind::Concatenate { .. } => "concatenate",
            NodeKind::InputSequence { .. } => "input-sequence",
            NodeKind::RecurrentTransform { .. } => "recurrent-transform",
        }
    }

    /// Indices of the nodes this one reads from.
    pub fn dependencies(&self) -> &[usize] {
        match &self.kind {
            NodeKind::Input { .. } | NodeKind::InputSequence { .. } => &[],
            NodeKind::Transform { source, .. } | NodeKind::RecurrentTransform { source, .. } => {
                std::slice::from_ref(source)
            }
            NodeKind::Concatenate { sources } => sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities() {
        let input = Node::new(NodeKind::Input { slot: 0 }, 3);
        let seq = Node::new(NodeKind::InputSequence { slot: 0 }, 3);
        let rnn = Node::new(NodeKind::RecurrentTransform { stack: 0, source: 1 }, 4);

        assert!(input.produces_vector() && !input.produces_sequence());
        assert!(!seq.produces_vector() && seq.produces_sequence());
        assert!(rnn.produces_vector() && rnn.produces_sequence());
    }

    #[test]
    fn dependencies_follow_kind() {
        let concat = Node::new(NodeKind::Concatenate { sources: vec![0, 2] }, 5);
        assert_eq!(concat.dependencies(), &[0, 2]);
        let ff = Node::new(NodeKind::Transform { stack: 0, source: 1 }, 1);
        assert_eq!(ff.dependencies(), &[1]);
        assert!(Node::new(NodeKind::Input { slot: 0 }, 1).dependencies().is_empty());
    }
}
