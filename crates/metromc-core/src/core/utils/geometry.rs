use super::random::RandomSource;
use itertools::Itertools;
use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};
use std::f64::consts::PI;

/// Rotation by `angle` radians about `axis`, or `None` for a degenerate axis.
pub fn rotation_from_axis_angle(axis: &Vector3<f64>, angle: f64) -> Option<UnitQuaternion<f64>> {
    Unit::try_new(*axis, 1e-12).map(|axis| UnitQuaternion::from_axis_angle(&axis, angle))
}

/// Uniformly oriented rotation, used to place inserted multi-site molecules.
pub fn random_orientation(rng: &mut RandomSource) -> UnitQuaternion<f64> {
    let axis = Unit::new_normalize(rng.unit_vector());
    UnitQuaternion::from_axis_angle(&axis, 2.0 * PI * rng.uniform())
}

/// Largest change of any pairwise distance between two equally sized point sets.
pub fn max_pair_distance_deviation<F>(before: &[Point3<f64>], after: &[Point3<f64>], distance: F) -> f64
where
    F: Fn(&Point3<f64>, &Point3<f64>) -> f64,
{
    (0..before.len().min(after.len()))
        .tuple_combinations()
        .map(|(i, j)| (distance(&before[i], &before[j]) - distance(&after[i], &after[j])).abs())
        .fold(0.0, f64::max)
}
