use thiserror::Error;

/// Main error type for graph construction and evaluation
#[derive(Error, Debug)]
pub enum GraphError {
    // Raised only while building a Graph or NamedGraph
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Raised only while evaluating
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    // Application settings
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    // Model description loading
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, GraphError::Configuration(_))
    }

    pub fn is_evaluation(&self) -> bool {
        matches!(self, GraphError::Evaluation(_))
    }
}

/// Result type alias for GraphError
pub type Result<T> = std::result::Result<T, GraphError>;

/// Shape violations found while building a layer stack.
///
/// These carry enough context to point at the offending layer; they are
/// folded into `GraphError::Configuration` at the stack boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("layer[{layer}] has zero width")]
    ZeroWidth { layer: usize },

    #[error("layer[{layer}] {what} len {got} != expected {expected}")]
    LengthMismatch {
        layer: usize,
        what: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("layer[{layer}] {what} contain non-finite values")]
    NonFinite { layer: usize, what: &'static str },

    #[error("stack has no layers")]
    Empty,
}

impl From<ShapeError> for GraphError {
    fn from(err: ShapeError) -> Self {
        GraphError::Configuration(err.to_string())
    }
}
