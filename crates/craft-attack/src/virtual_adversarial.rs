//! Virtual Adversarial Method attack.
//!
//! Proposed by Miyato et al. (2016) for virtual adversarial training
//! (<https://arxiv.org/abs/1507.00677>). The attack is label-free: it refines
//! a random direction through finite-difference estimates of how strongly the
//! classifier's prediction diverges under small probes, then steps along the
//! most sensitive direction.

use craft_core::{Classifier, Result};
use ndarray::{Array2, ArrayD, ArrayView1, Axis, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Tolerance for the two-stage normalization rescale.
const NORM_TOL: f32 = 1e-12;

/// Configuration for the Virtual Adversarial attack.
///
/// Values are accepted as-is: unlike the Fast Gradient attack there are no
/// range constraints tied to the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualAdversarialConfig {
    /// Attack step (max input variation).
    pub eps: f32,
    /// Finite difference probe magnitude.
    pub finite_diff: f32,
    /// Direction refinement iterations per sample.
    pub max_iter: usize,
    /// Base random seed; sample `i` draws from a sub-stream seeded
    /// `seed + i`, so results are reproducible sequentially and in parallel.
    pub seed: u64,
    /// Whether to fan samples out across threads with Rayon.
    pub parallel: bool,
}

impl Default for VirtualAdversarialConfig {
    fn default() -> Self {
        Self {
            eps: 0.1,
            finite_diff: 1e-6,
            max_iter: 1,
            seed: 42,
            parallel: false,
        }
    }
}

/// Virtual Adversarial attacker over a classifier collaborator.
pub struct VirtualAdversarial<'c> {
    classifier: &'c dyn Classifier,
    config: VirtualAdversarialConfig,
}

impl<'c> VirtualAdversarial<'c> {
    pub fn new(classifier: &'c dyn Classifier, config: VirtualAdversarialConfig) -> Self {
        Self { classifier, config }
    }

    pub fn config(&self) -> &VirtualAdversarialConfig {
        &self.config
    }

    /// Generate adversarial samples for a batch. No labels are required.
    ///
    /// Each sample is optimized independently against the baseline
    /// predictions computed once for the whole batch; working tensors are
    /// private to a sample's iteration, so parallel execution needs no locks.
    pub fn generate(&self, inputs: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let baseline = self.classifier.predict(inputs)?;
        let n = inputs.len_of(Axis(0));

        let samples: Vec<ArrayD<f32>> = if self.config.parallel {
            (0..n)
                .into_par_iter()
                .map(|i| self.perturb_sample(inputs, &baseline, i))
                .collect::<Result<_>>()?
        } else {
            (0..n)
                .map(|i| self.perturb_sample(inputs, &baseline, i))
                .collect::<Result<_>>()?
        };

        let mut adv = inputs.clone();
        for (i, sample) in samples.iter().enumerate() {
            adv.index_axis_mut(Axis(0), i).assign(sample);
        }
        Ok(adv)
    }

    /// Refine a random direction for one sample and apply the perturbation.
    fn perturb_sample(
        &self,
        inputs: &ArrayD<f32>,
        baseline: &Array2<f32>,
        index: usize,
    ) -> Result<ArrayD<f32>> {
        let sample = inputs.index_axis(Axis(0), index);
        let dims = sample.shape().to_vec();
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(index as u64));

        let mut d: ArrayD<f32> =
            ArrayD::from_shape_fn(IxDyn(&dims), |_| rng.sample::<f32, _>(StandardNormal));
        let mut e: ArrayD<f32> =
            ArrayD::from_shape_fn(IxDyn(&dims), |_| rng.sample::<f32, _>(StandardNormal));

        for iter in 0..self.config.max_iter {
            d = normalize(&d) * self.config.finite_diff;
            e = normalize(&e) * self.config.finite_diff;

            let probes = ndarray::stack(Axis(0), &[(&sample + &d).view(), (&sample + &e).view()])
                .expect("probes share the sample shape");
            let probe_preds = self.classifier.predict(&probes)?;

            let kl_d = kl_divergence(baseline.row(index), probe_preds.row(0));
            let kl_e = kl_divergence(baseline.row(index), probe_preds.row(1));
            trace!(
                "sample {} iteration {}: kl_d = {}, kl_e = {}",
                index,
                iter,
                kl_d,
                kl_e
            );

            // Finite-difference update toward the direction of steepest
            // divergence. The elementwise |d - e| denominator is kept from
            // the source unguarded; it blows up when the probes coincide.
            let denom = (&d - &e).mapv(f32::abs);
            d = denom.mapv(|v| (kl_d - kl_e) / v);
        }

        let (clip_min, clip_max) = self.classifier.clip_values();
        let mut adv = &sample + &(normalize(&d) * self.config.eps);
        adv.mapv_inplace(|v| v.clamp(clip_min, clip_max));
        Ok(adv)
    }
}

/// Two-stage rescale to a unit-like L2 magnitude: divide by the maximum
/// absolute element plus a tolerance, then by the root of the sum of squares
/// plus a tolerance. A stability convention rather than a strict L2
/// normalization; kept verbatim for reproducibility.
pub fn normalize(x: &ArrayD<f32>) -> ArrayD<f32> {
    let max_abs = x.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
    let scaled = x.mapv(|v| v / (max_abs + NORM_TOL));
    let inverse = (scaled.iter().map(|v| v * v).sum::<f32>() + NORM_TOL.sqrt()).powf(-0.5);
    scaled * inverse
}

/// KL divergence between two unnormalized distributions, following the
/// scipy `entropy(p, q)` convention: both rows are sum-normalized first and
/// zero-probability terms of `p` contribute nothing.
fn kl_divergence(p: ArrayView1<f32>, q: ArrayView1<f32>) -> f32 {
    let p_sum = p.sum();
    let q_sum = q.sum();
    p.iter()
        .zip(q.iter())
        .map(|(&pi, &qi)| {
            let pi = pi / p_sum;
            let qi = qi / q_sum;
            if pi > 0.0 {
                pi * (pi / qi).ln()
            } else {
                0.0
            }
        })
        .sum()
}
