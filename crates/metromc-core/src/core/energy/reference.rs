//! Reference Hamiltonians.
//!
//! None of these models describes specific physical interactions. [`Ideal`] is the zero-energy
//! landscape, [`HardSphere`] only reports overlaps and [`SoftSphere`] is a smooth inverse-power
//! repulsion, which makes them suitable for validating the statistical machinery of the moves.
//! [`Scaled`] multiplies any model by a constant, as a change of temperature would.

use super::Hamiltonian;
use crate::core::models::particle::Particle;
use crate::core::space::geometry::Geometry;
use nalgebra::Vector3;

/// Every configuration has zero energy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ideal;

impl Hamiltonian for Ideal {
    fn pair(&self, _geometry: &Geometry, _a: &Particle, _b: &Particle) -> f64 {
        0.0
    }
}

/// Overlapping particles have infinite energy, everything else zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardSphere;

impl Hamiltonian for HardSphere {
    fn pair(&self, geometry: &Geometry, a: &Particle, b: &Particle) -> f64 {
        let contact = a.radius + b.radius;
        if geometry.sqdist(&a.position, &b.position) < contact * contact {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

/// `epsilon * (sigma / r)^12` with `sigma` the sum of both radii.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftSphere {
    pub epsilon: f64,
}

impl Hamiltonian for SoftSphere {
    fn pair(&self, geometry: &Geometry, a: &Particle, b: &Particle) -> f64 {
        let sigma = a.radius + b.radius;
        if sigma <= 0.0 {
            return 0.0;
        }
        let r2 = geometry.sqdist(&a.position, &b.position);
        if r2 <= 0.0 {
            return f64::INFINITY;
        }
        self.epsilon * (sigma * sigma / r2).powi(6)
    }
}

/// Every term of `inner` multiplied by `factor`.
pub struct Scaled {
    pub inner: Box<dyn Hamiltonian>,
    pub factor: f64,
}

impl Scaled {
    pub fn new(inner: Box<dyn Hamiltonian>, factor: f64) -> Self {
        Self { inner, factor }
    }

    /// Zero times an overlap stays an overlap.
    fn scale(&self, energy: f64) -> f64 {
        if energy.is_infinite() { energy } else { self.factor * energy }
    }
}

impl Hamiltonian for Scaled {
    fn pair(&self, geometry: &Geometry, a: &Particle, b: &Particle) -> f64 {
        self.scale(self.inner.pair(geometry, a, b))
    }

    fn external(&self, geometry: &Geometry, particle: &Particle) -> f64 {
        self.scale(self.inner.external(geometry, particle))
    }

    fn volume_energy(&self, volume: f64) -> f64 {
        self.scale(self.inner.volume_energy(volume))
    }

    fn field(&self, geometry: &Geometry, particles: &[Particle], index: usize) -> Vector3<f64> {
        self.inner.field(geometry, particles, index) * self.factor
    }
}
