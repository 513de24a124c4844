//! Raw named variables -> normalized input vectors / matrices.
//!
//! Each variable is mapped to `(value + offset) * scale`, in the order
//! the variables were declared.

use std::collections::HashSet;

use super::model::InputVariable;
use super::named::ValueMap;
use super::{Matrix, Vector};
use crate::error::{GraphError, Result};

#[derive(Debug, Clone)]
pub struct InputPreprocessor {
    names: Vec<String>,
    offsets: Vector,
    scales: Vector,
}

impl InputPreprocessor {
    pub fn new(variables: &[InputVariable]) -> Result<Self> {
        let mut seen = HashSet::new();
        for var in variables {
            if !seen.insert(var.name.as_str()) {
                return Err(GraphError::Configuration(format!(
                    "variable '{}' declared twice",
                    var.name
                )));
            }
            if !var.offset.is_finite() || !var.scale.is_finite() {
                return Err(GraphError::Configuration(format!(
                    "variable '{}' offset and scale must be finite",
                    var.name
                )));
            }
        }

        Ok(Self {
            names: variables.iter().map(|v| v.name.clone()).collect(),
            offsets: variables.iter().map(|v| v.offset).collect(),
            scales: variables.iter().map(|v| v.scale).collect(),
        })
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn variable_names(&self) -> &[String] {
        &self.names
    }

    pub fn apply(&self, raw: &ValueMap) -> Result<Vector> {
        let mut out = Vector::zeros(self.width());
        for (i, name) in self.names.iter().enumerate() {
            let value = raw.get(name).ok_or_else(|| {
                GraphError::Evaluation(format!("variable '{name}' missing"))
            })?;
            out[i] = (value + self.offsets[i]) * self.scales[i];
        }
        Ok(out)
    }
}

/// Same normalization applied to every time step; rows are time steps.
#[derive(Debug, Clone)]
pub struct InputSequencePreprocessor {
    step: InputPreprocessor,
}

impl InputSequencePreprocessor {
    pub fn new(variables: &[InputVariable]) -> Result<Self> {
        Ok(Self {
            step: InputPreprocessor::new(variables)?,
        })
    }

    pub fn width(&self) -> usize {
        self.step.width()
    }

    pub fn variable_names(&self) -> &[String] {
        self.step.variable_names()
    }

    pub fn apply(&self, steps: &[ValueMap]) -> Result<Matrix> {
        let mut out = Matrix::zeros((steps.len(), self.width()));
        for (t, raw) in steps.iter().enumerate() {
            let row = self.step.apply(raw).map_err(|e| match e {
                GraphError::Evaluation(msg) => {
                    GraphError::Evaluation(format!("time step {t}: {msg}"))
                }
                other => other,
            })?;
            out.row_mut(t).assign(&row);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn vars() -> Vec<InputVariable> {
        vec![
            InputVariable::new("a"),
            InputVariable {
                name: "b".to_string(),
                offset: -1.0,
                scale: 0.5,
            },
        ]
    }

    fn raw(a: f64, b: f64) -> ValueMap {
        ValueMap::from([("a".to_string(), a), ("b".to_string(), b)])
    }

    #[test]
    fn applies_offset_then_scale_in_declared_order() {
        let pre = InputPreprocessor::new(&vars()).unwrap();
        assert_eq!(pre.apply(&raw(2.0, 5.0)).unwrap(), array![2.0, 2.0]);
    }

    #[test]
    fn ignores_undeclared_variables() {
        let pre = InputPreprocessor::new(&vars()).unwrap();
        let mut input = raw(1.0, 1.0);
        input.insert("extra".to_string(), 99.0);
        assert_eq!(pre.apply(&input).unwrap().len(), 2);
    }

    #[test]
    fn missing_variable_is_evaluation_error() {
        let pre = InputPreprocessor::new(&vars()).unwrap();
        let input = ValueMap::from([("a".to_string(), 1.0)]);
        assert!(pre.apply(&input).unwrap_err().is_evaluation());
    }

    #[test]
    fn rejects_duplicate_or_non_finite_variables() {
        let dup = vec![InputVariable::new("a"), InputVariable::new("a")];
        assert!(InputPreprocessor::new(&dup).unwrap_err().is_configuration());

        let mut bad = vars();
        bad[1].scale = f64::INFINITY;
        assert!(InputPreprocessor::new(&bad).unwrap_err().is_configuration());
    }

    #[test]
    fn sequence_rows_are_time_steps() {
        let pre = InputSequencePreprocessor::new(&vars()).unwrap();
        let m = pre.apply(&[raw(1.0, 1.0), raw(2.0, 3.0), raw(3.0, 5.0)]).unwrap();
        assert_eq!(m, array![[1.0, 0.0], [2.0, 1.0], [3.0, 2.0]]);

        let empty = pre.apply(&[]).unwrap();
        assert_eq!(empty.dim(), (0, 2));
    }

    #[test]
    fn sequence_reports_failing_step() {
        let pre = InputSequencePreprocessor::new(&vars()).unwrap();
        let err = pre
            .apply(&[raw(1.0, 1.0), ValueMap::new()])
            .unwrap_err();
        assert!(err.to_string().contains("time step 1"));
    }
}
