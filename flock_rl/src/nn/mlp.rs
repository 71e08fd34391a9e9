//! Fully connected network with a configurable hidden block.
//!
//! Each hidden block is `Linear -> [Dropout] -> [LayerNorm] -> activation`;
//! dropout and layer norm are off unless configured.

use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{relu, tanh};
use serde::{Deserialize, Serialize};

/// Hidden-layer nonlinearity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activation {
    #[default]
    Tanh,
    Relu,
}

impl Activation {
    fn apply<B: Backend>(self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Self::Tanh => tanh(x),
            Self::Relu => relu(x),
        }
    }
}

// Activation carries no parameters; treat it as a constant module so it is
// kept as-is and not stored in records.
impl<B: Backend> Module<B> for Activation {
    burn::constant!(module);
}

impl<B: burn::tensor::backend::AutodiffBackend> burn::module::AutodiffModule<B> for Activation {
    burn::constant!(ad_module, Activation);
}

impl burn::module::ModuleDisplayDefault for Activation {
    fn content(&self, content: burn::module::Content) -> Option<burn::module::Content> {
        content.add_formatted(&format!("{self:?}")).optional()
    }
}

impl burn::module::ModuleDisplay for Activation {}

/// Configuration for [`Mlp`].
#[derive(Debug, Clone)]
pub struct MlpConfig {
    pub d_input: usize,
    pub d_output: usize,
    /// Width of every hidden layer.
    pub hidden_size: usize,
    /// Number of hidden layers.
    pub n_layers: usize,
    pub activation: Activation,
    /// Dropout probability after every hidden linear layer (0 disables it).
    pub dropout: f64,
    pub layer_norm: bool,
}

impl MlpConfig {
    pub fn new(d_input: usize, d_output: usize) -> Self {
        Self {
            d_input,
            d_output,
            hidden_size: 64,
            n_layers: 2,
            activation: Activation::Tanh,
            dropout: 0.0,
            layer_norm: false,
        }
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn with_n_layers(mut self, n_layers: usize) -> Self {
        self.n_layers = n_layers;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_layer_norm(mut self, layer_norm: bool) -> Self {
        self.layer_norm = layer_norm;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        let mut hidden = Vec::with_capacity(self.n_layers);
        let mut norms = Vec::new();
        let mut d_in = self.d_input;
        for _ in 0..self.n_layers {
            hidden.push(LinearConfig::new(d_in, self.hidden_size).init(device));
            if self.layer_norm {
                norms.push(LayerNormConfig::new(self.hidden_size).init(device));
            }
            d_in = self.hidden_size;
        }
        Mlp {
            hidden,
            norms,
            dropout: (self.dropout > 0.0).then(|| DropoutConfig::new(self.dropout).init()),
            output: LinearConfig::new(d_in, self.d_output).init(device),
            activation: self.activation,
        }
    }
}

/// Hidden blocks followed by a linear output layer.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    hidden: Vec<Linear<B>>,
    /// One per hidden layer, or empty.
    norms: Vec<LayerNorm<B>>,
    dropout: Option<Dropout>,
    output: Linear<B>,
    activation: Activation,
}

impl<B: Backend> Mlp<B> {
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = input;
        for (i, layer) in self.hidden.iter().enumerate() {
            x = layer.forward(x);
            if let Some(dropout) = &self.dropout {
                x = dropout.forward(x);
            }
            if let Some(norm) = self.norms.get(i) {
                x = norm.forward(x);
            }
            x = self.activation.apply(x);
        }
        self.output.forward(x)
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }
}
