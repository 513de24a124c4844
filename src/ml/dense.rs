//! Dense (feed-forward) layer stacks.
//!
//! Layers are described in JSON as plain nested vectors and compiled once
//! into `ndarray` matrices when the owning graph is built:
//! - shape validation happens at build time (configuration error)
//! - input width is re-checked per call (evaluation error)

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::{Matrix, Vector};
use crate::error::{GraphError, Result, ShapeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    Tanh,
    Sigmoid,
    HardSigmoid,
    /// Normalizes over the whole layer output rather than per element.
    Softmax,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Linear
    }
}

impl Activation {
    pub(crate) fn apply(self, v: &mut Vector) {
        match self {
            Activation::Linear => {}
            Activation::Relu => v.mapv_inplace(|x| x.max(0.0)),
            Activation::Tanh => v.mapv_inplace(f64::tanh),
            Activation::Sigmoid => v.mapv_inplace(sigmoid),
            Activation::HardSigmoid => v.mapv_inplace(|x| (0.2 * x + 0.5).clamp(0.0, 1.0)),
            Activation::Softmax => softmax(v),
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    // Numerically-stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

fn softmax(v: &mut Vector) {
    let max = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    v.mapv_inplace(|x| (x - max).exp());
    let sum = v.sum();
    if sum > 0.0 {
        v.mapv_inplace(|x| x / sum);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Weights shape: [out_dim][in_dim]
    pub weights: Vec<Vec<f64>>,
    /// Bias shape: [out_dim]
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseLayer {
    pub fn in_dim(&self) -> usize {
        self.weights.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn out_dim(&self) -> usize {
        self.weights.len()
    }
}

/// Checks a `[rows][cols]` weight block and copies it into a matrix.
pub(crate) fn weight_matrix(
    rows: &[Vec<f64>],
    layer: usize,
    what: &'static str,
    expected_rows: usize,
    expected_cols: usize,
) -> std::result::Result<Matrix, ShapeError> {
    if rows.len() != expected_rows {
        return Err(ShapeError::LengthMismatch {
            layer,
            what,
            got: rows.len(),
            expected: expected_rows,
        });
    }
    for row in rows {
        if row.len() != expected_cols {
            return Err(ShapeError::LengthMismatch {
                layer,
                what,
                got: row.len(),
                expected: expected_cols,
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(ShapeError::NonFinite { layer, what });
        }
    }
    Ok(Array2::from_shape_fn((expected_rows, expected_cols), |(r, c)| {
        rows[r][c]
    }))
}

pub(crate) fn bias_vector(
    bias: &[f64],
    layer: usize,
    what: &'static str,
    expected: usize,
) -> std::result::Result<Vector, ShapeError> {
    if bias.len() != expected {
        return Err(ShapeError::LengthMismatch {
            layer,
            what,
            got: bias.len(),
            expected,
        });
    }
    if bias.iter().any(|v| !v.is_finite()) {
        return Err(ShapeError::NonFinite { layer, what });
    }
    Ok(Vector::from(bias.to_vec()))
}

/// A compiled dense layer: `y = act(W x + b)`.
#[derive(Debug, Clone)]
pub(crate) struct Affine {
    weights: Matrix,
    bias: Vector,
    activation: Activation,
}

impl Affine {
    /// `expected_in` is the width produced by the previous layer, if any.
    pub(crate) fn build(
        layer: &DenseLayer,
        idx: usize,
        expected_in: Option<usize>,
    ) -> std::result::Result<Self, ShapeError> {
        let out_dim = layer.out_dim();
        let in_dim = expected_in.unwrap_or_else(|| layer.in_dim());
        if out_dim == 0 || in_dim == 0 {
            return Err(ShapeError::ZeroWidth { layer: idx });
        }
        Ok(Self {
            weights: weight_matrix(&layer.weights, idx, "weights", out_dim, in_dim)?,
            bias: bias_vector(&layer.bias, idx, "bias", out_dim)?,
            activation: layer.activation,
        })
    }

    pub(crate) fn in_dim(&self) -> usize {
        self.weights.ncols()
    }

    pub(crate) fn out_dim(&self) -> usize {
        self.weights.nrows()
    }

    pub(crate) fn forward(&self, x: &Vector) -> Vector {
        let mut y = self.weights.dot(x) + &self.bias;
        self.activation.apply(&mut y);
        y
    }
}

/// Plain layer stack: vector in, vector out.
#[derive(Debug, Clone)]
pub struct Stack {
    layers: Vec<Affine>,
}

impl Stack {
    pub fn new(layers: &[DenseLayer]) -> Result<Self> {
        if layers.is_empty() {
            return Err(ShapeError::Empty.into());
        }
        let mut compiled: Vec<Affine> = Vec::with_capacity(layers.len());
        for (idx, layer) in layers.iter().enumerate() {
            let expected_in = compiled.last().map(Affine::out_dim);
            compiled.push(Affine::build(layer, idx, expected_in)?);
        }
        Ok(Self { layers: compiled })
    }

    pub fn input_width(&self) -> usize {
        self.layers.first().map(Affine::in_dim).unwrap_or(0)
    }

    pub fn output_width(&self) -> usize {
        self.layers.last().map(Affine::out_dim).unwrap_or(0)
    }

    pub fn compute(&self, input: &Vector) -> Result<Vector> {
        if input.len() != self.input_width() {
            return Err(GraphError::Evaluation(format!(
                "stack input dim mismatch: got {}, expected {}",
                input.len(),
                self.input_width()
            )));
        }
        let mut x = input.clone();
        for layer in &self.layers {
            x = layer.forward(&x);
        }
        Ok(x)
    }
}
