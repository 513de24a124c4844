//! Recurrent layer stacks: matrix in, matrix out, one row per time step.
//!
//! Every layer keeps the number of rows. State starts at zero for each
//! scan and is never carried between calls.

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use super::dense::{bias_vector, weight_matrix, Affine};
use super::{Activation, DenseLayer, Matrix, Vector};
use crate::error::{GraphError, Result, ShapeError};

/// One gate's parameters: `W x + U h + b`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gate {
    /// Shape: [units][in_dim]
    pub weights: Vec<Vec<f64>>,
    /// Shape: [units][units]
    pub recurrent_weights: Vec<Vec<f64>>,
    /// Shape: [units]
    pub bias: Vec<f64>,
}

fn default_activation() -> Activation {
    Activation::Tanh
}

fn default_recurrent_activation() -> Activation {
    Activation::Sigmoid
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmLayer {
    pub input_gate: Gate,
    pub forget_gate: Gate,
    pub cell: Gate,
    pub output_gate: Gate,
    #[serde(default = "default_activation")]
    pub activation: Activation,
    #[serde(default = "default_recurrent_activation")]
    pub recurrent_activation: Activation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GruLayer {
    pub update_gate: Gate,
    pub reset_gate: Gate,
    pub candidate: Gate,
    #[serde(default = "default_activation")]
    pub activation: Activation,
    #[serde(default = "default_recurrent_activation")]
    pub recurrent_activation: Activation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurrentLayer {
    /// Applied independently to every time step.
    Dense(DenseLayer),
    Lstm(LstmLayer),
    Gru(GruLayer),
}

#[derive(Debug, Clone)]
struct CompiledGate {
    weights: Matrix,
    recurrent_weights: Matrix,
    bias: Vector,
}

impl CompiledGate {
    fn build(
        gate: &Gate,
        layer: usize,
        units: usize,
        in_dim: usize,
    ) -> std::result::Result<Self, ShapeError> {
        Ok(Self {
            weights: weight_matrix(&gate.weights, layer, "gate weights", units, in_dim)?,
            recurrent_weights: weight_matrix(
                &gate.recurrent_weights,
                layer,
                "gate recurrent_weights",
                units,
                units,
            )?,
            bias: bias_vector(&gate.bias, layer, "gate bias", units)?,
        })
    }

    fn pre_activation(&self, x: &ArrayView1<f64>, h: &Vector) -> Vector {
        self.weights.dot(x) + self.recurrent_weights.dot(h) + &self.bias
    }

    fn activate(&self, x: &ArrayView1<f64>, h: &Vector, activation: Activation) -> Vector {
        let mut v = self.pre_activation(x, h);
        activation.apply(&mut v);
        v
    }
}

#[derive(Debug, Clone)]
enum CompiledLayer {
    Dense(Affine),
    Lstm {
        input_gate: CompiledGate,
        forget_gate: CompiledGate,
        cell: CompiledGate,
        output_gate: CompiledGate,
        activation: Activation,
        recurrent_activation: Activation,
    },
    Gru {
        update_gate: CompiledGate,
        reset_gate: CompiledGate,
        candidate: CompiledGate,
        activation: Activation,
        recurrent_activation: Activation,
    },
}

fn gate_dims(
    gate: &Gate,
    layer: usize,
    expected_in: Option<usize>,
) -> std::result::Result<(usize, usize), ShapeError> {
    let units = gate.weights.len();
    let in_dim = expected_in.unwrap_or_else(|| gate.weights.first().map(|r| r.len()).unwrap_or(0));
    if units == 0 || in_dim == 0 {
        return Err(ShapeError::ZeroWidth { layer });
    }
    Ok((units, in_dim))
}

impl CompiledLayer {
    fn build(
        layer: &RecurrentLayer,
        idx: usize,
        expected_in: Option<usize>,
    ) -> std::result::Result<Self, ShapeError> {
        match layer {
            RecurrentLayer::Dense(dense) => Ok(Self::Dense(Affine::build(dense, idx, expected_in)?)),
            RecurrentLayer::Lstm(lstm) => {
                let (units, in_dim) = gate_dims(&lstm.input_gate, idx, expected_in)?;
                Ok(Self::Lstm {
                    input_gate: CompiledGate::build(&lstm.input_gate, idx, units, in_dim)?,
                    forget_gate: CompiledGate::build(&lstm.forget_gate, idx, units, in_dim)?,
                    cell: CompiledGate::build(&lstm.cell, idx, units, in_dim)?,
                    output_gate: CompiledGate::build(&lstm.output_gate, idx, units, in_dim)?,
                    activation: lstm.activation,
                    recurrent_activation: lstm.recurrent_activation,
                })
            }
            RecurrentLayer::Gru(gru) => {
                let (units, in_dim) = gate_dims(&gru.update_gate, idx, expected_in)?;
                Ok(Self::Gru {
                    update_gate: CompiledGate::build(&gru.update_gate, idx, units, in_dim)?,
                    reset_gate: CompiledGate::build(&gru.reset_gate, idx, units, in_dim)?,
                    candidate: CompiledGate::build(&gru.candidate, idx, units, in_dim)?,
                    activation: gru.activation,
                    recurrent_activation: gru.recurrent_activation,
                })
            }
        }
    }

    fn in_dim(&self) -> usize {
        match self {
            Self::Dense(affine) => affine.in_dim(),
            Self::Lstm { input_gate, .. } => input_gate.weights.ncols(),
            Self::Gru { update_gate, .. } => update_gate.weights.ncols(),
        }
    }

    fn out_dim(&self) -> usize {
        match self {
            Self::Dense(affine) => affine.out_dim(),
            Self::Lstm { input_gate, .. } => input_gate.weights.nrows(),
            Self::Gru { update_gate, .. } => update_gate.weights.nrows(),
        }
    }

    fn scan(&self, x: &Matrix) -> Matrix {
        let steps = x.nrows();
        let units = self.out_dim();
        let mut out = Array2::zeros((steps, units));

        match self {
            Self::Dense(affine) => {
                for (t, row) in x.rows().into_iter().enumerate() {
                    out.row_mut(t).assign(&affine.forward(&row.to_owned()));
                }
            }
            Self::Lstm {
                input_gate,
                forget_gate,
                cell,
                output_gate,
                activation,
                recurrent_activation,
            } => {
                let mut h = Vector::zeros(units);
                let mut c = Vector::zeros(units);
                for (t, row) in x.rows().into_iter().enumerate() {
                    let i = input_gate.activate(&row, &h, *recurrent_activation);
                    let f = forget_gate.activate(&row, &h, *recurrent_activation);
                    let g = cell.activate(&row, &h, *activation);
                    let o = output_gate.activate(&row, &h, *recurrent_activation);
                    c = &f * &c + &i * &g;
                    let mut c_act = c.clone();
                    activation.apply(&mut c_act);
                    h = &o * &c_act;
                    out.row_mut(t).assign(&h);
                }
            }
            Self::Gru {
                update_gate,
                reset_gate,
                candidate,
                activation,
                recurrent_activation,
            } => {
                let mut h = Vector::zeros(units);
                for (t, row) in x.rows().into_iter().enumerate() {
                    let z = update_gate.activate(&row, &h, *recurrent_activation);
                    let r = reset_gate.activate(&row, &h, *recurrent_activation);
                    let h_cand = candidate.activate(&row, &(&r * &h), *activation);
                    h = &z * &h + &z.mapv(|v| 1.0 - v) * &h_cand;
                    out.row_mut(t).assign(&h);
                }
            }
        }
        out
    }
}

/// Recurrent layer stack: `[T x in]` in, `[T x out]` out.
#[derive(Debug, Clone)]
pub struct RecurrentStack {
    layers: Vec<CompiledLayer>,
}

impl RecurrentStack {
    pub fn new(layers: &[RecurrentLayer]) -> Result<Self> {
        if layers.is_empty() {
            return Err(ShapeError::Empty.into());
        }
        let mut compiled: Vec<CompiledLayer> = Vec::with_capacity(layers.len());
        for (idx, layer) in layers.iter().enumerate() {
            let expected_in = compiled.last().map(CompiledLayer::out_dim);
            compiled.push(CompiledLayer::build(layer, idx, expected_in)?);
        }
        Ok(Self { layers: compiled })
    }

    pub fn input_width(&self) -> usize {
        self.layers.first().map(CompiledLayer::in_dim).unwrap_or(0)
    }

    pub fn output_width(&self) -> usize {
        self.layers.last().map(CompiledLayer::out_dim).unwrap_or(0)
    }

    pub fn scan(&self, input: &Matrix) -> Result<Matrix> {
        if input.ncols() != self.input_width() {
            return Err(GraphError::Evaluation(format!(
                "recurrent stack input dim mismatch: got {}, expected {}",
                input.ncols(),
                self.input_width()
            )));
        }
        let mut x = input.clone();
        for layer in &self.layers {
            x = layer.scan(&x);
        }
        Ok(x)
    }
}
