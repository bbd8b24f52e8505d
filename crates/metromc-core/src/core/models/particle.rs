use super::ids::SpeciesId;
use super::species::Species;
use nalgebra::{Point3, UnitQuaternion, Vector3};

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: Point3<f64>,
    pub species: SpeciesId,
    pub charge: f64,
    pub radius: f64,
    pub orientation: UnitQuaternion<f64>,
    /// Total dipole moment (permanent plus induced).
    pub dipole: Vector3<f64>,
    pub permanent_dipole: Vector3<f64>,
    pub polarizability: f64,
}

impl Particle {
    pub fn new(species: SpeciesId, position: Point3<f64>) -> Self {
        Self {
            position,
            species,
            charge: 0.0,
            radius: 0.0,
            orientation: UnitQuaternion::identity(),
            dipole: Vector3::zeros(),
            permanent_dipole: Vector3::zeros(),
            polarizability: 0.0,
        }
    }

    /// Creates a particle carrying every per-species property of `template`.
    pub fn from_species(id: SpeciesId, template: &Species, position: Point3<f64>) -> Self {
        Self {
            position,
            species: id,
            charge: template.charge,
            radius: template.radius,
            orientation: UnitQuaternion::identity(),
            dipole: template.dipole,
            permanent_dipole: template.dipole,
            polarizability: template.polarizability,
        }
    }

    /// Turns the particle into another species, keeping position and orientation.
    pub fn set_species(&mut self, id: SpeciesId, template: &Species) {
        self.species = id;
        self.charge = template.charge;
        self.radius = template.radius;
        self.polarizability = template.polarizability;
    }

    /// Rotates the particle's internal frame. The position is left untouched.
    pub fn rotate(&mut self, rotation: &UnitQuaternion<f64>) {
        self.orientation = rotation * self.orientation;
        self.dipole = rotation * self.dipole;
        self.permanent_dipole = rotation * self.permanent_dipole;
    }
}
