//! Adversarial example crafting against differentiable classifiers.
//!
//! Two attack families over a shared [`Classifier`] contract:
//! - [`FastGradient`]: one-step gradient-sign/norm attack (FGM), with a
//!   minimal-perturbation search mode.
//! - [`VirtualAdversarial`]: label-free iterative attack refining a random
//!   direction via finite-difference divergence estimates (VAT).
//!
//! Attacks own their configuration and transient working tensors for one
//! `generate` call; they never retain state between calls. Perturbed outputs
//! always match the input batch shape and are clipped into the classifier's
//! declared valid range.

pub mod fast_gradient;
pub mod norm;
pub mod virtual_adversarial;

pub use fast_gradient::{FastGradient, FastGradientConfig};
pub use virtual_adversarial::{VirtualAdversarial, VirtualAdversarialConfig};

// Re-export core types for downstream use.
pub use craft_core::{Classifier, CraftError, NormOrder, Result};
