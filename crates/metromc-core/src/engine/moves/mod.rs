//! # Move Kernels
//!
//! Each submodule implements [`MoveKernel`](super::protocol::MoveKernel) for one family of
//! trial moves. Kernels only perturb the trial configuration and register what they touched in
//! the change record; the protocol owns the accept/reject decision.
//!
//! - [`atomic`] - Single-particle translation, rotation and sphere-surface translation
//! - [`rigid`] - Rigid-body translate/rotate of one, two or many molecules
//! - [`polymer`] - Crankshaft, pivot and reptation moves on chains
//! - [`cluster`] - Correlated multi-body moves with bias correction
//! - [`conformation`] - Library conformation swaps about a fixed mass center
//! - [`grand_canonical`] - Salt and molecule insertion and deletion at fixed chemical potential
//! - [`titration`] - Site protonation, alone or coupled to counter-ion exchange
//! - [`isobaric`] - Log-volume scaling at fixed pressure
//! - [`tempering`] - Configuration swaps between replicas
//! - [`polarize`] - Self-consistent induced dipoles around any inner move

pub mod atomic;
pub mod cluster;
pub mod conformation;
pub mod grand_canonical;
pub mod isobaric;
pub mod polarize;
pub mod polymer;
pub mod rigid;
pub mod tempering;
pub mod titration;

use crate::core::utils::geometry::rotation_from_axis_angle;
use crate::core::utils::random::RandomSource;
use nalgebra::{UnitQuaternion, Vector3};

/// Displacement bounds below this are treated as zero.
pub(crate) const MIN_DISPLACEMENT: f64 = 1e-6;

/// Per-axis displacement `dir_k * dp * (r - 0.5)`. Always draws three numbers.
pub(crate) fn masked_displacement(rng: &mut RandomSource, direction: &Vector3<f64>, dp: f64) -> Vector3<f64> {
    let x = rng.half();
    let y = rng.half();
    let z = rng.half();
    Vector3::new(x, y, z).component_mul(direction) * dp
}

/// Rotation about a random axis by `dprot * (r - 0.5)`, returned with its angle.
pub(crate) fn random_rotation(rng: &mut RandomSource, dprot: f64) -> (UnitQuaternion<f64>, f64) {
    let axis = rng.unit_vector();
    let angle = dprot * rng.half();
    let rotation = rotation_from_axis_angle(&axis, angle).unwrap_or_else(UnitQuaternion::identity);
    (rotation, angle)
}

/// First bound above [`MIN_DISPLACEMENT`], or zero.
pub(crate) fn first_bound(candidates: &[f64]) -> f64 {
    candidates
        .iter()
        .copied()
        .find(|&dp| dp > MIN_DISPLACEMENT)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_displacement_respects_direction_and_bound() {
        let mut rng = RandomSource::from_seed(1);
        let dir = Vector3::new(1.0, 0.0, 1.0);
        for _ in 0..200 {
            let d = masked_displacement(&mut rng, &dir, 2.0);
            assert_eq!(d.y, 0.0);
            assert!(d.x.abs() <= 1.0 && d.z.abs() <= 1.0);
        }
    }

    #[test]
    fn first_bound_skips_vanishing_values() {
        assert_eq!(first_bound(&[0.0, 1e-9, 0.3, 2.0]), 0.3);
        assert_eq!(first_bound(&[0.0]), 0.0);
    }
}
