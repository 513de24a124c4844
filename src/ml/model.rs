//! Declarative model description.
//!
//! These types are only the *description* of a network; `Graph::new` and
//! `NamedGraph::new` turn them into the runtime arena.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use super::recurrent::RecurrentLayer;
use super::DenseLayer;
use crate::error::Result;

fn default_scale() -> f64 {
    1.0
}

/// One raw variable feeding a named input: `(value + offset) * scale`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputVariable {
    pub name: String,
    #[serde(default)]
    pub offset: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

impl InputVariable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            offset: 0.0,
            scale: 1.0,
        }
    }
}

/// A named input and the ordered variables that make up its vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub name: String,
    pub variables: Vec<InputVariable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NodeConfig {
    Input { slot: usize, width: usize },
    Transform { stack: usize, source: usize },
    Concatenate { sources: Vec<usize> },
    InputSequence { slot: usize, width: usize },
    RecurrentTransform { stack: usize, source: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StackConfig {
    Plain { layers: Vec<DenseLayer> },
    Recurrent { layers: Vec<RecurrentLayer> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub node_index: usize,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
    #[serde(default)]
    pub input_sequences: Vec<InputConfig>,
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub stacks: Vec<StackConfig>,
    /// Ordered by name; the position in this map is the output index.
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputConfig>,
}

impl GraphConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let config = Self::from_json(&content)?;
        debug!(path = %path.as_ref().display(), "loaded graph description");
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_description() {
        let json = r#"{
            "inputs": [{"name": "x", "variables": [{"name": "a"}, {"name": "b", "offset": -1.0, "scale": 0.5}]}],
            "input_sequences": [{"name": "trk", "variables": [{"name": "pt"}]}],
            "nodes": [
                {"type": "input", "slot": 0, "width": 2},
                {"type": "transform", "stack": 0, "source": 0},
                {"type": "input-sequence", "slot": 0, "width": 1},
                {"type": "recurrent-transform", "stack": 1, "source": 2},
                {"type": "concatenate", "sources": [1, 3]}
            ],
            "stacks": [
                {"type": "plain", "layers": [{"weights": [[1.0, 1.0]], "bias": [0.0], "activation": "relu"}]},
                {"type": "recurrent", "layers": [{"type": "dense", "weights": [[1.0]], "bias": [0.0]}]}
            ],
            "outputs": {"score": {"node_index": 4, "labels": ["p", "q"]}}
        }"#;

        let config = GraphConfig::from_json(json).unwrap();
        assert_eq!(config.inputs[0].variables[0].scale, 1.0);
        assert_eq!(config.inputs[0].variables[1].offset, -1.0);
        assert_eq!(
            config.nodes[3],
            NodeConfig::RecurrentTransform {
                stack: 1,
                source: 2
            }
        );
        assert!(matches!(config.stacks[1], StackConfig::Recurrent { .. }));
        assert_eq!(config.outputs["score"].labels, vec!["p", "q"]);
    }

    #[test]
    fn rejects_unknown_node_type() {
        let json = r#"{"nodes": [{"type": "convolution", "slot": 0}]}"#;
        assert!(GraphConfig::from_json(json).is_err());
    }
}
