//! Layer normalization over the hidden dimension.

use ndarray::{Array1, Array3, Axis};

use crate::error::{EsmError, EsmResult};

/// Layer normalization
pub struct LayerNorm {
    pub weight: Array1<f32>,
    pub bias: Array1<f32>,
    pub eps: f32,
}

impl LayerNorm {
    pub fn new(weight: Array1<f32>, bias: Array1<f32>, eps: f32) -> EsmResult<Self> {
        if weight.len() != bias.len() {
            return Err(EsmError::shape("layer_norm.bias", weight.shape(), bias.shape()));
        }
        Ok(Self { weight, bias, eps })
    }

    /// Unit weight, zero bias.
    pub fn identity(hidden_size: usize, eps: f32) -> Self {
        Self {
            weight: Array1::ones(hidden_size),
            bias: Array1::zeros(hidden_size),
            eps,
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.weight.len()
    }

    /// Normalizes each [.., .., hidden] vector of `hidden_states`.
    pub fn forward(&self, hidden_states: &Array3<f32>) -> EsmResult<Array3<f32>> {
        let hidden_size = hidden_states.dim().2;
        if hidden_size != self.hidden_size() {
            return Err(EsmError::shape(
                "layer_norm input",
                &[hidden_states.dim().0, hidden_states.dim().1, self.hidden_size()],
                hidden_states.shape(),
            ));
        }

        let mean = hidden_states.mean_axis(Axis(2)).ok_or_else(|| {
            EsmError::InvalidConfig("layer norm over an empty hidden dimension".into())
        })?;
        let variance = hidden_states.var_axis(Axis(2), 0.0);

        let mean_expanded = mean.insert_axis(Axis(2));
        let var_expanded = variance.insert_axis(Axis(2));

        let inv_std = (&var_expanded + self.eps).mapv(|x| 1.0 / x.sqrt());
        let normalized = (hidden_states - &mean_expanded) * &inv_std;

        Ok(normalized * &self.weight + &self.bias)
    }
}
