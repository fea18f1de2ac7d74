//! Fast Gradient Method attack.
//!
//! Originally the Fast Gradient Sign Method of Goodfellow et al. (2015),
//! generalized here from the infinity norm to L1 and L2
//! (<https://arxiv.org/abs/1412.6572>). A minimal-perturbation mode grows the
//! step size until each sample's predicted label flips, yielding the smallest
//! tested step per sample at `eps_step` granularity.

use craft_core::{Classifier, CraftError, NormOrder, Result};
use ndarray::{Array2, ArrayD, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::norm;

/// Configuration for the Fast Gradient attack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastGradientConfig {
    /// Order of the norm bounding the perturbation.
    pub norm: NormOrder,
    /// Attack step size (input variation).
    pub eps: f32,
    /// Whether the attack targets a specific class instead of moving away
    /// from the correct one.
    pub targeted: bool,
    /// Step-size increment for minimal-perturbation search.
    pub eps_step: f32,
    /// Maximum accepted perturbation for minimal-perturbation search.
    pub eps_max: f32,
    /// Compute only the minimal perturbation per sample.
    pub minimal: bool,
}

impl Default for FastGradientConfig {
    fn default() -> Self {
        Self {
            norm: NormOrder::Inf,
            eps: 0.3,
            targeted: false,
            eps_step: 0.1,
            eps_max: 1.0,
            minimal: false,
        }
    }
}

/// Fast Gradient attacker over a classifier collaborator.
///
/// Holds configuration only; every [`generate`](FastGradient::generate) call
/// is stateless with respect to previous calls.
pub struct FastGradient<'c> {
    classifier: &'c dyn Classifier,
    config: FastGradientConfig,
}

impl<'c> FastGradient<'c> {
    /// Create a new attacker, validating the configuration against the
    /// classifier's clip range.
    pub fn new(classifier: &'c dyn Classifier, config: FastGradientConfig) -> Result<Self> {
        let mut attack = Self {
            classifier,
            config: FastGradientConfig::default(),
        };
        attack.set_params(config)?;
        Ok(attack)
    }

    /// Replace the configuration, re-running validation.
    ///
    /// The step size must lie within the classifier's declared data range:
    /// a perturbation larger than the range itself is not physically
    /// meaningful.
    pub fn set_params(&mut self, config: FastGradientConfig) -> Result<()> {
        let (clip_min, clip_max) = self.classifier.clip_values();
        if config.eps <= clip_min || config.eps > clip_max {
            return Err(CraftError::invalid_parameter(format!(
                "eps must lie in the data range ({clip_min}, {clip_max}], got {}",
                config.eps
            )));
        }
        if config.eps_step <= 0.0 {
            return Err(CraftError::invalid_parameter(format!(
                "eps_step must be positive, got {}",
                config.eps_step
            )));
        }
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &FastGradientConfig {
        &self.config
    }

    /// Generate adversarial samples for a batch.
    ///
    /// When `labels` is `None`, the classifier's own predictions are used as
    /// reference labels to avoid the label-leaking effect
    /// (<https://arxiv.org/abs/1611.01236>). Supplied labels are row-normalized
    /// on a private copy; the caller's array is never mutated.
    pub fn generate(
        &self,
        inputs: &ArrayD<f32>,
        labels: Option<&Array2<f32>>,
    ) -> Result<ArrayD<f32>> {
        let batch = inputs.len_of(Axis(0));
        let labels = match labels {
            Some(y) => {
                if y.nrows() != batch {
                    return Err(CraftError::ShapeMismatch {
                        expected: vec![batch, y.ncols()],
                        got: y.shape().to_vec(),
                    });
                }
                normalize_rows(y)
            }
            None => normalize_rows(&self.classifier.predict(inputs)?),
        };

        if self.config.minimal {
            self.minimal_perturbation(inputs, &labels)
        } else {
            self.compute(inputs, &labels, self.config.eps)
        }
    }

    /// Iteratively grow the step size until each sample's prediction flips,
    /// up to `eps_max` in increments of `eps_step`.
    ///
    /// Flipped samples freeze at their current perturbation; samples that
    /// never flip keep the last bounded one. Predictions are re-checked over
    /// the entire batch each iteration, not just the active rows.
    fn minimal_perturbation(
        &self,
        inputs: &ArrayD<f32>,
        labels: &Array2<f32>,
    ) -> Result<ArrayD<f32>> {
        let mut adv = inputs.clone();
        let mut active: Vec<usize> = (0..inputs.len_of(Axis(0))).collect();
        let max_steps = (self.config.eps_max / self.config.eps_step).ceil() as usize;

        for step in 1..=max_steps {
            if active.is_empty() {
                break;
            }
            let eps = step as f32 * self.config.eps_step;
            if eps > self.config.eps_max * (1.0 + 1e-6) {
                break;
            }

            let subset = inputs.select(Axis(0), &active);
            let subset_labels = labels.select(Axis(0), &active);
            let perturbed = self.compute(&subset, &subset_labels, eps)?;
            for (row, &idx) in active.iter().enumerate() {
                adv.index_axis_mut(Axis(0), idx)
                    .assign(&perturbed.index_axis(Axis(0), row));
            }

            let preds = self.classifier.predict(&adv)?;
            active.retain(|&idx| argmax(labels.row(idx)) == argmax(preds.row(idx)));
            trace!(
                "minimal perturbation step {}: eps = {}, {} samples still active",
                step,
                eps,
                active.len()
            );
        }

        debug!(
            "minimal perturbation search finished with {} unresolved samples",
            active.len()
        );
        Ok(adv)
    }

    /// Single-step perturbation: project the loss gradient onto the norm
    /// ball, step by `eps`, and clip into the valid data range.
    fn compute(&self, inputs: &ArrayD<f32>, labels: &Array2<f32>, eps: f32) -> Result<ArrayD<f32>> {
        let mut gradient = self.classifier.loss_gradient(inputs, labels)?;
        if gradient.shape() != inputs.shape() {
            return Err(CraftError::ShapeMismatch {
                expected: inputs.shape().to_vec(),
                got: gradient.shape().to_vec(),
            });
        }
        // Targeted attacks descend the loss toward the target label; the
        // untargeted case ascends the loss of the reference label.
        if self.config.targeted {
            gradient.mapv_inplace(|g| -g);
        }

        let direction = norm::project(&gradient, self.config.norm);
        let (clip_min, clip_max) = self.classifier.clip_values();
        let mut adv = inputs + &(direction * eps);
        adv.mapv_inplace(|v| v.clamp(clip_min, clip_max));
        Ok(adv)
    }
}

/// Row-normalize label distributions on a private copy.
fn normalize_rows(labels: &Array2<f32>) -> Array2<f32> {
    let mut out = labels.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let sum = row.sum();
        if sum.abs() > f32::EPSILON {
            row.mapv_inplace(|v| v / sum);
        }
    }
    out
}

fn argmax(row: ArrayView1<f32>) -> usize {
    let mut best = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in row.iter().enumerate() {
        if v > best_val {
            best = i;
            best_val = v;
        }
    }
    best
}
