use super::ids::{MoleculeId, SpeciesId};
use crate::core::utils::random::RandomSource;
use nalgebra::Vector3;
use slotmap::SlotMap;
use std::f64::consts::LN_10;

/// Avogadro's constant in 1/mol.
pub const AVOGADRO: f64 = 6.022_140_76e23;

/// Activities below this value mark a species as not grand-canonical.
pub const MIN_ACTIVITY: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct Species {
    pub name: String,
    pub charge: f64,
    pub radius: f64,
    /// Translational displacement bound used by atomic moves.
    pub dp: f64,
    /// Rotational displacement bound (radians) used by atomic moves.
    pub dprot: f64,
    /// Activity in mol/l.
    pub activity: f64,
    pub polarizability: f64,
    pub dipole: Vector3<f64>,
}

impl Species {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            charge: 0.0,
            radius: 0.0,
            dp: 0.0,
            dprot: 0.0,
            activity: 0.0,
            polarizability: 0.0,
            dipole: Vector3::zeros(),
        }
    }

    /// Chemical potential in kT for a length unit of Ångström, `ln(a * N_A * 1e-27)`.
    pub fn chemical_potential(&self) -> f64 {
        chemical_potential(self.activity)
    }

    pub fn is_grand_canonical(&self) -> bool {
        self.activity > MIN_ACTIVITY
    }
}

/// `ln(a * N_A * 1e-27)` for an activity `a` in mol/l.
pub fn chemical_potential(activity: f64) -> f64 {
    (activity * AVOGADRO * 1e-27).ln()
}

/// An acid/base equilibrium between two species occupying the same site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TitrationProcess {
    pub protonated: SpeciesId,
    pub deprotonated: SpeciesId,
    pub pka: f64,
}

impl TitrationProcess {
    pub fn matches(&self, species: SpeciesId) -> bool {
        species == self.protonated || species == self.deprotonated
    }

    /// The species a site in state `species` turns into.
    pub fn swap(&self, species: SpeciesId) -> Option<SpeciesId> {
        if species == self.protonated {
            Some(self.deprotonated)
        } else if species == self.deprotonated {
            Some(self.protonated)
        } else {
            None
        }
    }

    /// Intrinsic free energy (kT) of a site state. The protonated state is the reference.
    pub fn intrinsic_energy(&self, species: SpeciesId, ph: f64) -> f64 {
        if species == self.deprotonated {
            LN_10 * (self.pka - ph)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoleculeKind {
    pub name: String,
    /// Atomic kinds are pools of independent particles rather than rigid molecules.
    pub atomic: bool,
    pub atoms: Vec<SpeciesId>,
    /// Reference coordinates relative to the mass center, one per atom.
    pub structure: Vec<Vector3<f64>>,
    /// Further conformations, each centered like `structure`.
    pub conformations: Vec<Vec<Vector3<f64>>>,
    /// Relative weights of `structure` followed by `conformations`. Empty means uniform.
    pub conformation_weights: Vec<f64>,
    /// Activity in mol/l of whole molecules, used when molecules are exchanged with a reservoir.
    pub activity: f64,
    pub titration: Vec<TitrationProcess>,
}

impl MoleculeKind {
    pub fn atomic(name: &str, atoms: Vec<SpeciesId>) -> Self {
        Self {
            name: name.to_string(),
            atomic: true,
            atoms,
            structure: Vec::new(),
            conformations: Vec::new(),
            conformation_weights: Vec::new(),
            activity: 0.0,
            titration: Vec::new(),
        }
    }

    pub fn molecular(name: &str, atoms: Vec<SpeciesId>, structure: Vec<Vector3<f64>>) -> Self {
        Self {
            name: name.to_string(),
            atomic: false,
            atoms,
            structure,
            conformations: Vec::new(),
            conformation_weights: Vec::new(),
            activity: 0.0,
            titration: Vec::new(),
        }
    }

    pub fn is_titratable(&self, species: SpeciesId) -> bool {
        self.titration.iter().any(|p| p.matches(species))
    }

    pub fn chemical_potential(&self) -> f64 {
        chemical_potential(self.activity)
    }

    pub fn is_grand_canonical(&self) -> bool {
        !self.atomic && self.activity > MIN_ACTIVITY
    }

    /// Number of library conformations, the reference structure included.
    pub fn conformation_count(&self) -> usize {
        1 + self.conformations.len()
    }

    pub fn conformation(&self, k: usize) -> Option<&[Vector3<f64>]> {
        match k {
            0 => Some(&self.structure),
            k => self.conformations.get(k - 1).map(Vec::as_slice),
        }
    }

    /// Draws a library conformation by weight. Always consumes exactly one number.
    pub fn random_conformation(&self, rng: &mut RandomSource) -> &[Vector3<f64>] {
        let r = rng.uniform();
        let n = self.conformation_count();
        let k = if self.conformation_weights.len() == n {
            let total: f64 = self.conformation_weights.iter().sum();
            let mut acc = 0.0;
            self.conformation_weights
                .iter()
                .position(|w| {
                    acc += w / total;
                    r < acc
                })
                .unwrap_or(n - 1)
        } else {
            ((r * n as f64) as usize).min(n - 1)
        };
        self.conformation(k).unwrap_or(&self.structure)
    }
}

/// Registry of every species and molecule kind known to a simulation.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    species: SlotMap<SpeciesId, Species>,
    molecules: SlotMap<MoleculeId, MoleculeKind>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_species(&mut self, species: Species) -> SpeciesId {
        self.species.insert(species)
    }

    pub fn add_molecule(&mut self, molecule: MoleculeKind) -> MoleculeId {
        self.molecules.insert(molecule)
    }

    pub fn species(&self, id: SpeciesId) -> Option<&Species> {
        self.species.get(id)
    }

    pub fn molecule(&self, id: MoleculeId) -> Option<&MoleculeKind> {
        self.molecules.get(id)
    }

    pub fn species_by_name(&self, name: &str) -> Option<SpeciesId> {
        self.species
            .iter()
            .find_map(|(id, s)| (s.name == name).then_some(id))
    }

    pub fn molecule_by_name(&self, name: &str) -> Option<MoleculeId> {
        self.molecules
            .iter()
            .find_map(|(id, m)| (m.name == name).then_some(id))
    }

    pub fn species_iter(&self) -> impl Iterator<Item = (SpeciesId, &Species)> {
        self.species.iter()
    }

    pub fn molecules_iter(&self) -> impl Iterator<Item = (MoleculeId, &MoleculeKind)> {
        self.molecules.iter()
    }

    pub fn species_name(&self, id: SpeciesId) -> &str {
        self.species(id).map_or("?", |s| s.name.as_str())
    }

    pub fn molecule_name(&self, id: MoleculeId) -> &str {
        self.molecule(id).map_or("?", |m| m.name.as_str())
    }
}
