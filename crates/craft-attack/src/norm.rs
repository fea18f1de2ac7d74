//! Norm-ball projection of raw loss gradients.
//!
//! Converts a per-sample gradient into a perturbation direction consistent
//! with the chosen norm's dual: elementwise sign for the infinity norm, and
//! per-sample rescaling for L1/L2. The subsequent step-size multiply in the
//! attacks controls the perturbation magnitude.

use craft_core::NormOrder;
use ndarray::{ArrayD, Axis};

/// Per-sample denominators below this are treated as zero gradients; the
/// sample's direction is then all zeros rather than NaN/inf.
const DENOM_TOL: f32 = 1e-12;

/// Project a batch gradient into a direction for the given norm order.
///
/// Axis 0 is the batch axis; denominators are computed independently per
/// sample over all remaining axes. Output shape equals input shape.
pub fn project(gradient: &ArrayD<f32>, order: NormOrder) -> ArrayD<f32> {
    match order {
        NormOrder::Inf => gradient.mapv(|g| {
            if g > 0.0 {
                1.0
            } else if g < 0.0 {
                -1.0
            } else {
                0.0
            }
        }),
        NormOrder::One | NormOrder::Two => {
            let mut direction = gradient.clone();
            for mut sample in direction.axis_iter_mut(Axis(0)) {
                let denom = match order {
                    NormOrder::One => sample.iter().map(|g| g.abs()).sum::<f32>(),
                    _ => sample.iter().map(|g| g * g).sum::<f32>().sqrt(),
                };
                if denom > DENOM_TOL {
                    sample.mapv_inplace(|g| g / denom);
                } else {
                    sample.fill(0.0);
                }
            }
            direction
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, ArrayD, IxDyn};
    use proptest::prelude::*;

    fn sample_l2(sample: ndarray::ArrayViewD<f32>) -> f32 {
        sample.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    #[test]
    fn inf_norm_is_elementwise_sign() {
        let grad = arr2(&[[1.5, -0.2, 0.0, 7.0], [-3.0, 0.0, 0.1, -0.1]]).into_dyn();
        let dir = project(&grad, NormOrder::Inf);

        assert_eq!(dir.shape(), grad.shape());
        for &v in dir.iter() {
            assert!(v == -1.0 || v == 0.0 || v == 1.0);
        }
        assert_eq!(dir[[0, 0]], 1.0);
        assert_eq!(dir[[0, 1]], -1.0);
        assert_eq!(dir[[0, 2]], 0.0);
        assert_eq!(dir[[1, 0]], -1.0);
    }

    #[test]
    fn l1_norm_scales_to_unit_absolute_sum() {
        let grad = arr2(&[[1.0, -1.0, 2.0], [0.5, 0.5, 0.0]]).into_dyn();
        let dir = project(&grad, NormOrder::One);

        assert_eq!(dir.shape(), grad.shape());
        for sample in dir.axis_iter(Axis(0)) {
            let l1: f32 = sample.iter().map(|v| v.abs()).sum();
            assert!((l1 - 1.0).abs() < 1e-6, "per-sample L1 was {}", l1);
        }
    }

    #[test]
    fn l2_norm_scales_to_unit_euclidean_norm() {
        let grad = arr2(&[[3.0, 4.0], [-1.0, 1.0]]).into_dyn();
        let dir = project(&grad, NormOrder::Two);

        assert_eq!(dir.shape(), grad.shape());
        for sample in dir.axis_iter(Axis(0)) {
            assert!((sample_l2(sample) - 1.0).abs() < 1e-6);
        }
        // 3-4-5 triangle: first sample is exactly (0.6, 0.8)
        assert!((dir[[0, 0]] - 0.6).abs() < 1e-6);
        assert!((dir[[0, 1]] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn zero_gradient_sample_projects_to_zero() {
        // One live sample, one all-zero sample: denominators must not leak
        // across samples and the zero sample must stay zero for every norm.
        let grad = arr2(&[[1.0, -1.0, 0.0, 2.0], [0.0, 0.0, 0.0, 0.0]]).into_dyn();
        for order in [NormOrder::Inf, NormOrder::One, NormOrder::Two] {
            let dir = project(&grad, order);
            assert!(dir.index_axis(Axis(0), 1).iter().all(|&v| v == 0.0));
            assert!(dir.index_axis(Axis(0), 0).iter().any(|&v| v != 0.0));
            assert!(dir.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn projection_preserves_higher_rank_shapes() {
        let grad = ArrayD::from_shape_fn(IxDyn(&[2, 3, 4]), |idx| {
            (idx[0] + idx[1] + idx[2]) as f32 - 3.0
        });
        for order in [NormOrder::Inf, NormOrder::One, NormOrder::Two] {
            assert_eq!(project(&grad, order).shape(), grad.shape());
        }
    }

    proptest! {
        /// For any non-degenerate gradient, L2 projection yields unit-norm
        /// per-sample directions and the infinity norm stays in {-1, 0, 1}.
        #[test]
        fn projection_properties(values in proptest::collection::vec(-10.0f32..10.0, 8)) {
            let grad = ArrayD::from_shape_vec(IxDyn(&[2, 4]), values).unwrap();

            let sign_dir = project(&grad, NormOrder::Inf);
            for &v in sign_dir.iter() {
                prop_assert!(v == -1.0 || v == 0.0 || v == 1.0);
            }

            let dir = project(&grad, NormOrder::Two);
            prop_assert_eq!(dir.shape(), grad.shape());
            for (sample, dir_sample) in grad.axis_iter(Axis(0)).zip(dir.axis_iter(Axis(0))) {
                if sample_l2(sample) > 1e-6 {
                    prop_assert!((sample_l2(dir_sample) - 1.0).abs() < 1e-3);
                } else {
                    prop_assert!(dir_sample.iter().all(|v| v.is_finite()));
                }
            }
        }
    }
}
