//! lwgraph - lightweight evaluation of frozen neural network graphs.
//!
//! A trained network is described once (nodes, layer stacks, named inputs
//! and outputs) and then evaluated repeatedly with no training runtime:
//! - `ml::Graph`: arena of nodes and stacks, evaluated by node index
//! - `ml::NamedGraph`: name -> value front end with input preprocessing
//! - `ml::Source`: how leaf nodes read per-call data

pub mod cli;
pub mod config;
pub mod error;
pub mod ml;

pub use config::AppConfig;
pub use error::{GraphError, Result};
pub use ml::{Graph, GraphConfig, NamedGraph};
