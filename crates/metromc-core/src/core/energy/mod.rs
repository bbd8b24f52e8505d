//! # Energy Oracle
//!
//! Moves never know which interactions are present. They ask a [`Hamiltonian`] for pair,
//! external-field and volume terms, all in units of kT, and combine them through the sums in
//! this module: particle-to-all, group-to-group, group-internal, whole-system and the fast path
//! restricted to the particles listed in a [`Change`] record.
//!
//! Every sum over the static remainder of the system is a read-only reduction. With the
//! `parallel` feature enabled it is split across the rayon pool, each worker accumulating
//! privately before the partial sums are combined.

pub mod reference;

use crate::core::models::change::{Change, GroupChange};
use crate::core::models::group::Group;
use crate::core::models::particle::Particle;
use crate::core::space::Space;
use crate::core::space::geometry::Geometry;
use itertools::Itertools;
use nalgebra::Vector3;
use std::collections::HashMap;
use std::ops::Range;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Energy model consumed by every move. All energies are in kT.
pub trait Hamiltonian: Send + Sync {
    /// Interaction energy between two particles.
    fn pair(&self, geometry: &Geometry, a: &Particle, b: &Particle) -> f64;

    /// Energy of a particle in an external field.
    fn external(&self, _geometry: &Geometry, _particle: &Particle) -> f64 {
        0.0
    }

    /// Volume-dependent energy not captured by particle terms.
    fn volume_energy(&self, _volume: f64) -> f64 {
        0.0
    }

    /// Electric field acting on particle `index`, used to induce dipoles.
    fn field(&self, _geometry: &Geometry, _particles: &[Particle], _index: usize) -> Vector3<f64> {
        Vector3::zeros()
    }
}

fn sum_over<F>(range: Range<usize>, f: F) -> f64
where
    F: Fn(usize) -> f64 + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        range.into_par_iter().map(f).sum()
    }
    #[cfg(not(feature = "parallel"))]
    {
        range.map(f).sum()
    }
}

pub fn pair_energy(
    hamiltonian: &dyn Hamiltonian,
    geometry: &Geometry,
    particles: &[Particle],
    i: usize,
    j: usize,
) -> f64 {
    hamiltonian.pair(geometry, &particles[i], &particles[j])
}

/// Energy of `particle` with every particle of `particles`, skipping index `skip`.
pub fn energy_against(
    hamiltonian: &dyn Hamiltonian,
    geometry: &Geometry,
    particles: &[Particle],
    particle: &Particle,
    skip: Option<usize>,
) -> f64 {
    sum_over(0..particles.len(), |j| {
        if Some(j) == skip {
            0.0
        } else {
            hamiltonian.pair(geometry, particle, &particles[j])
        }
    })
}

/// Interaction of particle `i` with all other particles plus its external energy.
pub fn particle_energy(
    hamiltonian: &dyn Hamiltonian,
    geometry: &Geometry,
    particles: &[Particle],
    i: usize,
) -> f64 {
    energy_against(hamiltonian, geometry, particles, &particles[i], Some(i))
        + hamiltonian.external(geometry, &particles[i])
}

pub fn group_group_energy(
    hamiltonian: &dyn Hamiltonian,
    geometry: &Geometry,
    particles: &[Particle],
    a: &Group,
    b: &Group,
) -> f64 {
    let b_range = b.range();
    sum_over(a.range(), |i| {
        b_range
            .clone()
            .map(|j| hamiltonian.pair(geometry, &particles[i], &particles[j]))
            .sum::<f64>()
    })
}

pub fn group_internal_energy(
    hamiltonian: &dyn Hamiltonian,
    geometry: &Geometry,
    particles: &[Particle],
    group: &Group,
) -> f64 {
    group
        .range()
        .tuple_combinations()
        .map(|(i, j)| hamiltonian.pair(geometry, &particles[i], &particles[j]))
        .sum()
}

pub fn group_external_energy(
    hamiltonian: &dyn Hamiltonian,
    geometry: &Geometry,
    particles: &[Particle],
    group: &Group,
) -> f64 {
    group
        .range()
        .map(|i| hamiltonian.external(geometry, &particles[i]))
        .sum()
}

/// Total energy of a configuration: all pairs, all external terms and the volume term.
pub fn system_energy(hamiltonian: &dyn Hamiltonian, geometry: &Geometry, particles: &[Particle]) -> f64 {
    let n = particles.len();
    let pairs = sum_over(0..n, |i| {
        (i + 1..n)
            .map(|j| hamiltonian.pair(geometry, &particles[i], &particles[j]))
            .sum::<f64>()
            + hamiltonian.external(geometry, &particles[i])
    });
    pairs + hamiltonian.volume_energy(geometry.volume())
}

/// Energy difference (trial minus current) caused by moving the particles in `moved`.
///
/// `moved` maps each moved particle to a unit label; pairs within the same unit are treated as
/// rigid and skipped. Counts external terms, moved-static pairs and moved-moved pairs once.
pub fn moved_energy_change(
    hamiltonian: &dyn Hamiltonian,
    space: &Space,
    moved: &HashMap<usize, usize>,
) -> f64 {
    let (old, new) = (&space.current, &space.trial);
    let (geo_old, geo_new) = (&space.geometry, &space.trial_geometry);
    let indices: Vec<usize> = moved.keys().copied().sorted_unstable().collect();

    let external: f64 = indices
        .iter()
        .map(|&i| hamiltonian.external(geo_new, &new[i]) - hamiltonian.external(geo_old, &old[i]))
        .sum();

    let moved_static = sum_over(0..indices.len(), |k| {
        let i = indices[k];
        (0..new.len())
            .filter(|j| !moved.contains_key(j))
            .map(|j| {
                hamiltonian.pair(geo_new, &new[i], &new[j]) - hamiltonian.pair(geo_old, &old[i], &old[j])
            })
            .sum::<f64>()
    });

    let moved_moved: f64 = indices
        .iter()
        .tuple_combinations()
        .filter(|&(i, j)| moved[i] != moved[j] || moved[i] == usize::MAX)
        .map(|(&i, &j)| {
            hamiltonian.pair(geo_new, &new[i], &new[j]) - hamiltonian.pair(geo_old, &old[i], &old[j])
        })
        .sum();

    external + moved_static + moved_moved
}

/// Fast path: energy difference restricted to what `change` registered.
pub fn change_energy(hamiltonian: &dyn Hamiltonian, space: &Space, change: &Change) -> f64 {
    if change.geometry_changed {
        return system_energy(hamiltonian, &space.trial_geometry, &space.trial)
            - system_energy(hamiltonian, &space.geometry, &space.current);
    }
    let mut moved = HashMap::new();
    for (&g, touched) in &change.groups {
        match touched {
            GroupChange::Rigid => {
                for i in space.groups[g].range() {
                    moved.insert(i, g);
                }
            }
            GroupChange::Particles(indices) => {
                for &i in indices {
                    moved.insert(i, usize::MAX);
                }
            }
        }
    }
    moved_energy_change(hamiltonian, space, &moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::space::tests::salt_and_dimers;
    use nalgebra::Vector3;

    /// Harmonic attraction to the origin plus a soft 1/r repulsion between all pairs.
    struct Soft;

    impl Hamiltonian for Soft {
        fn pair(&self, geometry: &Geometry, a: &Particle, b: &Particle) -> f64 {
            1.0 / geometry.distance(&a.position, &b.position).max(0.1)
        }

        fn external(&self, _geometry: &Geometry, p: &Particle) -> f64 {
            0.1 * p.position.coords.norm_squared()
        }
    }

    fn assert_fast_path_matches_full(space: &Space, change: &Change) {
        let full = system_energy(&Soft, &space.trial_geometry, &space.trial)
            - system_energy(&Soft, &space.geometry, &space.current);
        let fast = change_energy(&Soft, space, change);
        assert!((full - fast).abs() < 1e-9, "full {full} fast {fast}");
    }

    #[test]
    fn rigid_change_matches_full_system_difference() {
        let mut space = salt_and_dimers(20.0, 6, 2);
        space.translate_group(0, &Vector3::new(0.3, -0.2, 0.7));
        space.translate_group(1, &Vector3::new(-1.0, 0.5, 0.0));
        let mut change = Change::new();
        change.add_rigid(0);
        change.add_rigid(1);
        assert_fast_path_matches_full(&space, &change);
    }

    #[test]
    fn particle_change_matches_full_system_difference() {
        let mut space = salt_and_dimers(20.0, 6, 2);
        let salt = space.groups().len() - 1;
        let start = space.groups()[salt].start;
        for i in [start, start + 3] {
            space.trial[i].position += Vector3::new(0.4, 0.4, -0.1);
        }
        space.trial[1].position += Vector3::new(0.1, 0.0, 0.0);
        let mut change = Change::new();
        change.add_particles(salt, [start, start + 3]);
        change.add_particle(0, 1);
        assert_fast_path_matches_full(&space, &change);
    }

    #[test]
    fn group_sums_add_up_to_system_energy() {
        let space = salt_and_dimers(20.0, 4, 2);
        let (geo, p) = (&space.geometry, &space.current);
        let groups = space.groups();
        let mut total = 0.0;
        for (a, ga) in groups.iter().enumerate() {
            total += group_internal_energy(&Soft, geo, p, ga) + group_external_energy(&Soft, geo, p, ga);
            for gb in &groups[a + 1..] {
                total += group_group_energy(&Soft, geo, p, ga, gb);
            }
        }
        assert!((total - system_energy(&Soft, geo, p)).abs() < 1e-9);
    }

    #[test]
    fn particle_energy_excludes_self_interaction() {
        let space = salt_and_dimers(20.0, 2, 0);
        let (geo, p) = (&space.geometry, &space.current);
        let expected = Soft.pair(geo, &p[0], &p[1]) + Soft.external(geo, &p[0]);
        assert!((particle_energy(&Soft, geo, p, 0) - expected).abs() < 1e-12);
    }
}
