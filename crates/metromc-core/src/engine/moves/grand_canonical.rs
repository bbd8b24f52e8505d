//! Particle and molecule insertion and deletion at constant chemical potential.
//!
//! Ions are always exchanged in electroneutral sets: for a drawn cation/anion pair with valencies
//! `z_a` and `z_b`, `|z_b|` cations and `|z_a|` anions enter or leave together. Multi-site
//! molecules enter as a library conformation with random orientation and leave as whole groups.
//! The space is not touched until the trial is accepted, so a rejected trial needs no
//! restoration.

use crate::core::energy::{Hamiltonian, group_internal_energy, particle_energy, energy_against};
use crate::core::models::ids::{MoleculeId, SpeciesId};
use crate::core::models::particle::Particle;
use crate::core::space::Space;
use crate::core::space::tracker::IndexTracker;
use crate::core::utils::average::Average;
use crate::core::utils::geometry::random_orientation;
use crate::core::utils::random::RandomSource;
use crate::engine::acceptance::AcceptanceTracker;
use crate::engine::config::ConfigError;
use crate::engine::error::TrialError;
use crate::engine::protocol::{EnergyChange, KernelReport, MoveKernel, Proposal, Trial};
use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

fn default_count() -> usize {
    1
}

fn default_molecule() -> String {
    "salt".to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SaltConfig {
    /// Atomic molecule kind whose charged, active species are exchanged.
    #[serde(default = "default_molecule")]
    pub molecule: String,
}

impl Default for SaltConfig {
    fn default() -> Self {
        Self {
            molecule: default_molecule(),
        }
    }
}

/// Grand-canonical ion species of one atomic group, with their running densities.
#[derive(Debug, Clone)]
pub(crate) struct IonPool {
    pub(crate) molecule: MoleculeId,
    pub(crate) cations: Vec<SpeciesId>,
    pub(crate) anions: Vec<SpeciesId>,
    density: Vec<(SpeciesId, String, Average)>,
}

impl IonPool {
    /// Resolves the pool, appending an empty group of its kind if the space has none.
    pub(crate) fn new(molecule: &str, space: &mut Space) -> Result<Self, ConfigError> {
        let kind = space
            .topology()
            .molecule_by_name(molecule)
            .ok_or_else(|| ConfigError::UnknownMolecule(molecule.to_string()))?;
        let atoms = match space.topology().molecule(kind) {
            Some(m) if m.atomic => m.atoms.clone(),
            _ => {
                return Err(ConfigError::invalid(
                    "molecule",
                    format!("'{molecule}' must be atomic to exchange ions"),
                ));
            }
        };
        let mut cations = Vec::new();
        let mut anions = Vec::new();
        for id in atoms.into_iter().unique() {
            let Some(species) = space.topology().species(id) else {
                continue;
            };
            if !species.is_grand_canonical() || species.charge == 0.0 {
                continue;
            }
            if species.charge > 0.0 {
                cations.push(id);
            } else {
                anions.push(id);
            }
        }
        if cations.is_empty() || anions.is_empty() {
            return Err(ConfigError::invalid(
                "molecule",
                format!("'{molecule}' needs at least one active cation and one active anion"),
            ));
        }
        if space.find_groups(kind).next().is_none() {
            space.add_group(kind, Vec::new());
        }
        let density = cations
            .iter()
            .chain(&anions)
            .map(|&id| (id, space.topology().species_name(id).to_string(), Average::new()))
            .collect();
        Ok(Self {
            molecule: kind,
            cations,
            anions,
            density,
        })
    }

    pub(crate) fn group(&self, space: &Space) -> Option<usize> {
        space.find_groups(self.molecule).next()
    }

    pub(crate) fn ions(&self) -> impl Iterator<Item = SpeciesId> + '_ {
        self.cations.iter().chain(&self.anions).copied()
    }

    pub(crate) fn sample_density(&mut self, space: &Space) {
        let volume = space.geometry().volume();
        for (id, _, average) in &mut self.density {
            average.push(space.free_count(*id) as f64 / volume);
        }
    }

    /// Mean number density per species name, in particles per cubic Ångström.
    pub(crate) fn densities(&self) -> BTreeMap<String, f64> {
        self.density
            .iter()
            .map(|(_, name, average)| (name.clone(), average.mean()))
            .collect()
    }
}

/// `n` new particles of `species` at random positions and orientations.
pub(crate) fn new_ions(space: &Space, species: SpeciesId, n: usize, rng: &mut RandomSource) -> Vec<Particle> {
    let Some(template) = space.topology().species(species) else {
        return Vec::new();
    };
    (0..n)
        .map(|_| {
            let mut p = Particle::from_species(species, template, space.geometry().random_position(rng));
            p.rotate(&random_orientation(rng));
            p
        })
        .collect()
}

/// Draws `n` distinct free particles of `species`, consuming `n` numbers either way.
pub(crate) fn sample_free(space: &Space, species: SpeciesId, n: usize, rng: &mut RandomSource) -> Option<Vec<usize>> {
    match space.tracker(species) {
        Some(tracker) => tracker.sample(n, rng),
        None => {
            for _ in 0..n {
                rng.uniform();
            }
            None
        }
    }
}

/// Energy of adding `particles` to `existing`, mutual pairs included.
pub(crate) fn insertion_energy(
    hamiltonian: &dyn Hamiltonian,
    space: &Space,
    existing: &[Particle],
    particles: &[Particle],
) -> f64 {
    let geo = space.trial_geometry();
    let with_existing: f64 = particles
        .iter()
        .map(|p| energy_against(hamiltonian, geo, existing, p, None) + hamiltonian.external(geo, p))
        .sum();
    let mutual: f64 = particles
        .iter()
        .tuple_combinations()
        .map(|(a, b)| hamiltonian.pair(geo, a, b))
        .sum();
    with_existing + mutual
}

/// Energy that leaves the system with the particles at `indices`, counting their mutual pairs
/// once.
pub(crate) fn removal_energy(hamiltonian: &dyn Hamiltonian, space: &Space, particles: &[Particle], indices: &[usize]) -> f64 {
    let geo = space.trial_geometry();
    let total: f64 = indices
        .iter()
        .map(|&i| particle_energy(hamiltonian, geo, particles, i))
        .sum();
    let mutual: f64 = indices
        .iter()
        .tuple_combinations()
        .map(|(&i, &j)| hamiltonian.pair(geo, &particles[i], &particles[j]))
        .sum();
    total - mutual
}

/// Reservoir chemical potential of `species` in kT.
pub(crate) fn chemical_potential(space: &Space, species: SpeciesId) -> f64 {
    space
        .topology()
        .species(species)
        .map_or(f64::NEG_INFINITY, |s| s.chemical_potential())
}

/// `ln Π_{k<n} (first + k) / V`.
pub(crate) fn log_ideal_factor(first: usize, n: usize, volume: f64) -> f64 {
    (0..n).map(|k| ((first + k) as f64 / volume).ln()).sum()
}

#[derive(Debug, Clone)]
enum SaltTrial {
    Insert { particles: Vec<Particle> },
    Delete { indices: Vec<usize> },
}

/// Exchanges electroneutral sets of ions with an implicit reservoir.
pub struct GrandCanonicalSalt {
    pool: IonPool,
    pending: Option<SaltTrial>,
    key: String,
    stats: AcceptanceTracker<String>,
}

impl GrandCanonicalSalt {
    pub fn new(config: SaltConfig, space: &mut Space) -> Result<Self, ConfigError> {
        Ok(Self {
            pool: IonPool::new(&config.molecule, space)?,
            pending: None,
            key: String::new(),
            stats: AcceptanceTracker::new(),
        })
    }

    pub(crate) fn pool(&self) -> &IonPool {
        &self.pool
    }

    fn valency(space: &Space, species: SpeciesId) -> usize {
        space
            .topology()
            .species(species)
            .map_or(0, |s| s.charge.abs().round() as usize)
    }
}

impl MoveKernel for GrandCanonicalSalt {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        let space = &*trial.space;
        let (Some(&cation), Some(&anion)) = (trial.rng.pick(&self.pool.cations), trial.rng.pick(&self.pool.anions))
        else {
            return Ok(Proposal::Skipped);
        };
        let insert = trial.rng.coin();
        let n_cations = Self::valency(space, anion);
        let n_anions = Self::valency(space, cation);
        let topology = space.topology();
        let pair = format!("{}/{}", topology.species_name(cation), topology.species_name(anion));

        let pending = if insert {
            self.key = format!("insert {pair}");
            let mut particles = new_ions(space, cation, n_cations, trial.rng);
            particles.extend(new_ions(space, anion, n_anions, trial.rng));
            SaltTrial::Insert { particles }
        } else {
            self.key = format!("delete {pair}");
            let cations = sample_free(space, cation, n_cations, trial.rng);
            let anions = sample_free(space, anion, n_anions, trial.rng);
            let (Some(mut indices), Some(anions)) = (cations, anions) else {
                debug!(pair, "Too few free ions to delete.");
                return Ok(Proposal::Skipped);
            };
            indices.extend(anions);
            SaltTrial::Delete { indices }
        };
        self.pending = Some(pending);
        Ok(Proposal::Proposed)
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        let Some(pending) = &self.pending else {
            return Ok(EnergyChange::new(0.0));
        };
        let space = &*trial.space;
        let volume = space.geometry().volume();
        match pending {
            SaltTrial::Insert { particles } => {
                if particles.iter().any(|p| space.geometry().collision(&p.position)) {
                    return Ok(EnergyChange::infinite());
                }
                let mut ideal = 0.0;
                let by_species = particles.iter().chunk_by(|p| p.species);
                for (species, group) in &by_species {
                    let n = group.count();
                    ideal += log_ideal_factor(space.free_count(species) + 1, n, volume)
                        - n as f64 * chemical_potential(space, species);
                }
                let du = insertion_energy(trial.hamiltonian, space, space.current(), particles);
                Ok(EnergyChange::with_reported(ideal + du, du))
            }
            SaltTrial::Delete { indices } => {
                let mut ideal = 0.0;
                let by_species = indices.iter().chunk_by(|&&i| space.current()[i].species);
                for (species, group) in &by_species {
                    let n = group.count();
                    let existing = space.free_count(species);
                    ideal += -log_ideal_factor(existing + 1 - n, n, volume)
                        + n as f64 * chemical_potential(space, species);
                }
                let removed = removal_energy(trial.hamiltonian, space, space.current(), indices);
                Ok(EnergyChange::with_reported(ideal - removed, -removed))
            }
        }
    }

    fn accept(&mut self, trial: &mut Trial<'_>) {
        match self.pending.take() {
            Some(SaltTrial::Insert { particles }) => {
                if let Some(g) = self.pool.group(trial.space) {
                    trial.space.insert_into_group(g, particles);
                }
            }
            Some(SaltTrial::Delete { indices }) => trial.space.erase_particles(&indices),
            None => {}
        }
        self.stats.accept(&self.key, 0.0);
    }

    fn reject(&mut self, _trial: &mut Trial<'_>) {
        self.pending = None;
        self.stats.reject(&self.key);
    }

    fn sample(&mut self, space: &Space) {
        self.pool.sample_density(space);
    }

    fn describe(&self) -> String {
        format!(
            "grand-canonical salt exchange, {} cation(s) and {} anion(s)",
            self.pool.cations.len(),
            self.pool.anions.len()
        )
    }

    fn report(&self) -> KernelReport {
        let mut report = KernelReport::default().acceptance(self.stats.named());
        for (name, density) in self.pool.densities() {
            report = report.value(&format!("density {name}"), density);
        }
        report
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct MoleculeExchangeConfig {
    /// Molecular kinds to exchange. Empty selects every kind with a non-zero activity.
    #[serde(default)]
    pub molecules: Vec<String>,
    /// Molecules inserted or deleted together per trial.
    #[serde(default = "default_count")]
    pub count: usize,
}

impl Default for MoleculeExchangeConfig {
    fn default() -> Self {
        Self {
            molecules: Vec::new(),
            count: default_count(),
        }
    }
}

/// One exchangeable molecular kind and its running number density.
#[derive(Debug, Clone)]
struct Reservoir {
    kind: MoleculeId,
    name: String,
    density: Average,
}

#[derive(Debug, Clone)]
enum MoleculeTrial {
    /// Flattened sites of the new molecules, `count` blocks of the kind's atom count.
    Insert { reservoir: usize, particles: Vec<Particle> },
    Delete { reservoir: usize, groups: Vec<usize> },
}

/// Exchanges whole rigid molecules with an implicit reservoir.
///
/// The internal energy of the exchanged molecules is left out of the acceptance weight, since
/// the reservoir holds the same conformations. It is still part of the reported energy change.
pub struct GrandCanonicalMolecule {
    reservoirs: Vec<Reservoir>,
    count: usize,
    pending: Option<MoleculeTrial>,
    key: String,
    stats: AcceptanceTracker<String>,
}

impl GrandCanonicalMolecule {
    pub fn new(config: MoleculeExchangeConfig, space: &Space) -> Result<Self, ConfigError> {
        if config.count == 0 {
            return Err(ConfigError::invalid("count", "at least one molecule per trial"));
        }
        let topology = space.topology();
        let kinds: Vec<MoleculeId> = if config.molecules.is_empty() {
            topology
                .molecules_iter()
                .filter(|(_, kind)| kind.is_grand_canonical())
                .map(|(id, _)| id)
                .collect()
        } else {
            config
                .molecules
                .iter()
                .map(|name| {
                    topology
                        .molecule_by_name(name)
                        .ok_or_else(|| ConfigError::UnknownMolecule(name.clone()))
                })
                .collect::<Result<_, _>>()?
        };
        let mut reservoirs = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let name = topology.molecule_name(kind).to_string();
            match topology.molecule(kind) {
                Some(m) if m.is_grand_canonical() && !m.atoms.is_empty() => {}
                _ => {
                    return Err(ConfigError::invalid(
                        "molecules",
                        format!("'{name}' must be a molecular kind with an activity"),
                    ));
                }
            }
            reservoirs.push(Reservoir {
                kind,
                name,
                density: Average::new(),
            });
        }
        if reservoirs.is_empty() {
            return Err(ConfigError::invalid("molecules", "no molecular kind has an activity"));
        }
        Ok(Self {
            reservoirs,
            count: config.count,
            pending: None,
            key: String::new(),
            stats: AcceptanceTracker::new(),
        })
    }

    /// Sites of `count` randomly placed and oriented molecules of `kind`, folded into the cell.
    fn new_molecules(&self, space: &Space, kind: MoleculeId, rng: &mut RandomSource) -> Vec<Particle> {
        let Some(molecule) = space.topology().molecule(kind) else {
            return Vec::new();
        };
        let geometry = space.geometry();
        let mut particles = Vec::with_capacity(self.count * molecule.atoms.len());
        for _ in 0..self.count {
            let conformation = molecule.random_conformation(rng);
            let cm = geometry.random_position(rng);
            let rotation = random_orientation(rng);
            for (&id, offset) in molecule.atoms.iter().zip(conformation) {
                let Some(template) = space.topology().species(id) else {
                    continue;
                };
                let mut p = Particle::from_species(id, template, cm + rotation.transform_vector(offset));
                p.rotate(&rotation);
                geometry.boundary(&mut p.position);
                particles.push(p);
            }
        }
        particles
    }

    /// Internal energy of consecutive `size`-site blocks of `particles`.
    fn internal_energy(hamiltonian: &dyn Hamiltonian, space: &Space, particles: &[Particle], size: usize) -> f64 {
        particles
            .chunks(size.max(1))
            .map(|block| {
                block
                    .iter()
                    .tuple_combinations()
                    .map(|(a, b)| hamiltonian.pair(space.trial_geometry(), a, b))
                    .sum::<f64>()
            })
            .sum()
    }
}

impl MoveKernel for GrandCanonicalMolecule {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        let space = &*trial.space;
        let reservoir = trial.rng.below(self.reservoirs.len());
        let insert = trial.rng.coin();
        let kind = self.reservoirs[reservoir].kind;
        let name = self.reservoirs[reservoir].name.clone();

        let pending = if insert {
            self.key = format!("insert {name}");
            MoleculeTrial::Insert {
                reservoir,
                particles: self.new_molecules(space, kind, trial.rng),
            }
        } else {
            self.key = format!("delete {name}");
            let present: IndexTracker = space.find_groups(kind).collect();
            let Some(groups) = present.sample(self.count, trial.rng) else {
                debug!(molecule = %name, "Too few molecules to delete.");
                return Ok(Proposal::Skipped);
            };
            MoleculeTrial::Delete { reservoir, groups }
        };
        self.pending = Some(pending);
        Ok(Proposal::Proposed)
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        let Some(pending) = &self.pending else {
            return Ok(EnergyChange::new(0.0));
        };
        let space = &*trial.space;
        let volume = space.geometry().volume();
        let n = self.count;
        match pending {
            MoleculeTrial::Insert { reservoir, particles } => {
                if particles.iter().any(|p| space.geometry().collision(&p.position)) {
                    return Ok(EnergyChange::infinite());
                }
                let kind = self.reservoirs[*reservoir].kind;
                let Some(molecule) = space.topology().molecule(kind) else {
                    return Ok(EnergyChange::infinite());
                };
                let existing = space.find_groups(kind).count();
                let ideal = log_ideal_factor(existing + 1, n, volume) - n as f64 * molecule.chemical_potential();
                let du = insertion_energy(trial.hamiltonian, space, space.current(), particles);
                let internal = Self::internal_energy(trial.hamiltonian, space, particles, molecule.atoms.len());
                Ok(EnergyChange::with_reported(ideal + du - internal, du))
            }
            MoleculeTrial::Delete { reservoir, groups } => {
                let kind = self.reservoirs[*reservoir].kind;
                let Some(molecule) = space.topology().molecule(kind) else {
                    return Ok(EnergyChange::infinite());
                };
                let existing = space.find_groups(kind).count();
                let ideal = -log_ideal_factor(existing + 1 - n, n, volume) + n as f64 * molecule.chemical_potential();
                let indices: Vec<usize> = groups.iter().flat_map(|&g| space.groups()[g].range()).collect();
                let removed = removal_energy(trial.hamiltonian, space, space.current(), &indices);
                let internal: f64 = groups
                    .iter()
                    .map(|&g| {
                        group_internal_energy(trial.hamiltonian, space.trial_geometry(), space.current(), &space.groups()[g])
                    })
                    .sum();
                Ok(EnergyChange::with_reported(ideal - removed + internal, -removed))
            }
        }
    }

    fn accept(&mut self, trial: &mut Trial<'_>) {
        match self.pending.take() {
            Some(MoleculeTrial::Insert { reservoir, particles }) => {
                let kind = self.reservoirs[reservoir].kind;
                let size = particles.len() / self.count;
                for block in particles.chunks(size.max(1)) {
                    trial.space.add_group(kind, block.to_vec());
                }
            }
            Some(MoleculeTrial::Delete { groups, .. }) => trial.space.erase_groups(&groups),
            None => {}
        }
        self.stats.accept(&self.key, 0.0);
    }

    fn reject(&mut self, _trial: &mut Trial<'_>) {
        self.pending = None;
        self.stats.reject(&self.key);
    }

    fn sample(&mut self, space: &Space) {
        let volume = space.geometry().volume();
        for reservoir in &mut self.reservoirs {
            let n = space.find_groups(reservoir.kind).count();
            reservoir.density.push(n as f64 / volume);
        }
    }

    fn describe(&self) -> String {
        let names = self.reservoirs.iter().map(|r| r.name.as_str()).join(", ");
        format!("grand-canonical molecule exchange of {names}, {} per trial", self.count)
    }

    fn report(&self) -> KernelReport {
        let mut report = KernelReport::default().acceptance(self.stats.named());
        for reservoir in &self.reservoirs {
            report = report.value(&format!("density {}", reservoir.name), reservoir.density.mean());
        }
        report
    }
}
