//! Frozen-network inference graph.
//!
//! A `Graph` owns an arena of nodes and layer stacks built once from a
//! declarative description; `NamedGraph` maps human-readable input and
//! output names onto it. Everything is immutable after construction, so
//! both can be shared across threads and evaluated concurrently.

pub mod dense;
pub mod graph;
pub mod model;
pub mod named;
pub mod node;
pub mod preprocess;
pub mod recurrent;
pub mod source;

use ndarray::{Array1, Array2};

/// Feature vector.
pub type Vector = Array1<f64>;

/// Rows are time steps, columns are features.
pub type Matrix = Array2<f64>;

pub use dense::{Activation, DenseLayer, Stack};
pub use graph::{Graph, LayerStack};
pub use model::{
    GraphConfig, InputConfig, InputVariable, NodeConfig, OutputConfig, StackConfig,
};
pub use named::{NamedGraph, NodeMap, OutputMap, SeqNodeMap, ValueMap};
pub use node::{Node, NodeKind};
pub use preprocess::{InputPreprocessor, InputSequencePreprocessor};
pub use recurrent::{Gate, GruLayer, LstmLayer, RecurrentLayer, RecurrentStack};
pub use source::{DummySource, Source, VectorSource};
