//! Core types and traits for δ-CRAFT adversarial example crafting.
//!
//! This crate provides the foundational abstractions shared by the attack
//! implementations: the error taxonomy, the [`Classifier`] collaborator
//! contract, and the norm-order type used to bound perturbations.

use ndarray::{Array2, ArrayD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for δ-CRAFT operations.
#[derive(Error, Debug)]
pub enum CraftError {
    /// Configuration value outside its legal set or range. Raised at
    /// configuration time, never mid-computation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Inputs, labels, or gradients with inconsistent shapes. Indicates
    /// caller misuse; fatal to the current call.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Failure originating from the classifier collaborator, passed through
    /// without interpretation.
    #[error("classifier error: {0}")]
    Classifier(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CraftError {
    /// Create an InvalidParameter error from any message.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        CraftError::InvalidParameter(msg.into())
    }

    /// Wrap a classifier-side failure for propagation to the caller.
    pub fn classifier(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        CraftError::Classifier(err.into())
    }
}

pub type Result<T> = std::result::Result<T, CraftError>;

/// Order of the norm bounding a perturbation.
///
/// Parsing from a numeric order happens at configuration time; anything
/// outside {∞, 1, 2} is rejected there, so attack compute paths never see an
/// unsupported order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormOrder {
    /// Infinity norm: elementwise sign direction.
    Inf,
    /// L1 norm: direction scaled by the per-sample sum of absolute values.
    One,
    /// L2 norm: direction scaled by the per-sample Euclidean norm.
    Two,
}

impl TryFrom<f64> for NormOrder {
    type Error = CraftError;

    fn try_from(order: f64) -> Result<Self> {
        if order == f64::INFINITY {
            Ok(NormOrder::Inf)
        } else if order == 1.0 {
            Ok(NormOrder::One)
        } else if order == 2.0 {
            Ok(NormOrder::Two)
        } else {
            Err(CraftError::invalid_parameter(
                "norm order must be infinity, 1, or 2",
            ))
        }
    }
}

/// A trained differentiable classifier, the entire external surface the
/// attacks depend on.
///
/// Inputs are batches with axis 0 as the batch axis. Predictions are
/// per-sample class probabilities (or logits) of shape (N, C). All methods
/// are pure: implementations must support concurrent read-only queries from
/// multiple callers (the attacks may fan samples out across threads).
pub trait Classifier: Sync + Send {
    /// Class-probability predictions for a batch of inputs.
    fn predict(&self, inputs: &ArrayD<f32>) -> Result<Array2<f32>>;

    /// Gradient of the training loss with respect to the inputs, given
    /// per-sample label distributions. Same shape as `inputs`.
    fn loss_gradient(&self, inputs: &ArrayD<f32>, labels: &Array2<f32>) -> Result<ArrayD<f32>>;

    /// The valid input value range as (min, max).
    fn clip_values(&self) -> (f32, f32);
}
