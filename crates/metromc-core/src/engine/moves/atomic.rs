use super::{first_bound, masked_displacement, random_rotation};
use crate::core::energy::change_energy;
use crate::engine::acceptance::AcceptanceTracker;
use crate::engine::error::TrialError;
use crate::engine::protocol::{EnergyChange, KernelReport, MoveKernel, Proposal, Trial};
use nalgebra::{Point3, Vector3};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AtomicMode {
    Translate,
    Rotate,
    /// Translation confined to a sphere surface of the given radius, centred on the origin.
    Surface { radius: f64 },
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AtomicConfig {
    /// Generic translation bound, used when neither species nor target set one.
    #[serde(default)]
    pub dp: f64,
    /// Generic rotation bound in radians.
    #[serde(default)]
    pub dprot: f64,
    /// Always move this particle instead of drawing one.
    #[serde(default)]
    pub particle: Option<usize>,
    /// Surface radius for sphere-surface translation. Defaults to the container radius.
    #[serde(default)]
    pub radius: Option<f64>,
}

struct Selected {
    group: usize,
    index: usize,
    msq: f64,
}

/// Moves one particle at a time.
pub struct AtomicDisplacement {
    mode: AtomicMode,
    config: AtomicConfig,
    selected: Option<Selected>,
    stats: AcceptanceTracker<String>,
}

impl AtomicDisplacement {
    pub fn new(mode: AtomicMode, config: AtomicConfig) -> Self {
        Self {
            mode,
            config,
            selected: None,
            stats: AcceptanceTracker::new(),
        }
    }

    fn pick(&self, trial: &mut Trial<'_>) -> Option<(usize, usize)> {
        let space = &*trial.space;
        if let Some(index) = self.config.particle {
            return space.group_of(index).map(|g| (g, index));
        }
        match trial.target {
            Some(target) => {
                let g = space.random_group(target.molecule, trial.rng)?;
                let index = space.group(g)?.random_index(trial.rng)?;
                Some((g, index))
            }
            None => {
                if space.is_empty() {
                    return None;
                }
                let index = trial.rng.below(space.len());
                space.group_of(index).map(|g| (g, index))
            }
        }
    }

    fn species_name(&self, trial: &Trial<'_>) -> String {
        self.selected
            .as_ref()
            .map(|s| {
                let species = trial.space.current()[s.index].species;
                trial.space.topology().species_name(species).to_string()
            })
            .unwrap_or_default()
    }
}

impl MoveKernel for AtomicDisplacement {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        let Some((group, index)) = self.pick(trial) else {
            return Ok(Proposal::Skipped);
        };
        let species = trial
            .space
            .topology()
            .species(trial.space.current()[index].species)
            .cloned();
        let (species_dp, species_dprot) = species.map_or((0.0, 0.0), |s| (s.dp, s.dprot));
        let (target_dp, target_dprot, direction) = trial
            .target
            .map_or((0.0, 0.0, Vector3::repeat(1.0)), |t| (t.dp1, t.dp2, t.direction));

        let msq = match self.mode {
            AtomicMode::Translate => {
                let dp = first_bound(&[species_dp, target_dp, self.config.dp]);
                let displacement = masked_displacement(trial.rng, &direction, dp);
                let space = &mut *trial.space;
                let p = &mut space.trial[index];
                p.position += displacement;
                space.trial_geometry.boundary(&mut p.position);
                displacement.norm_squared()
            }
            AtomicMode::Rotate => {
                let dprot = first_bound(&[species_dprot, target_dprot, self.config.dprot]);
                let (rotation, angle) = random_rotation(trial.rng, dprot);
                trial.space.trial[index].rotate(&rotation);
                angle * angle
            }
            AtomicMode::Surface { radius } => {
                // Arc length dp turned into an angle about a random axis through the origin.
                let dp = first_bound(&[species_dp, self.config.dp]);
                let (rotation, _) = random_rotation(trial.rng, dp / radius);
                let p = &mut trial.space.trial[index];
                let old = p.position;
                let turned = rotation.transform_vector(&old.coords);
                let direction = turned.try_normalize(1e-12).unwrap_or_else(Vector3::z);
                p.position = Point3::from(direction * radius);
                (p.position - old).norm_squared()
            }
        };

        if !trial.space.groups()[group].atomic {
            trial.space.update_trial_mass_center(group);
        }
        trial.change.add_particle(group, index);
        self.selected = Some(Selected { group, index, msq });
        Ok(Proposal::Proposed)
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        let Some(selected) = &self.selected else {
            return Ok(EnergyChange::new(0.0));
        };
        if trial.space.collides([selected.index]) {
            return Ok(EnergyChange::infinite());
        }
        Ok(EnergyChange::new(change_energy(
            trial.hamiltonian,
            trial.space,
            trial.change,
        )))
    }

    fn accept(&mut self, trial: &mut Trial<'_>) {
        trial.space.accept_change(trial.change);
        let name = self.species_name(trial);
        if let Some(selected) = self.selected.take() {
            self.stats.accept(&name, selected.msq);
        }
    }

    fn reject(&mut self, trial: &mut Trial<'_>) {
        trial.space.reject_change(trial.change);
        let name = self.species_name(trial);
        if let Some(selected) = self.selected.take() {
            debug_assert_eq!(trial.space.group_of(selected.index), Some(selected.group));
            self.stats.reject(&name);
        }
    }

    fn describe(&self) -> String {
        match self.mode {
            AtomicMode::Translate => format!("single-particle translation, generic dp = {}", self.config.dp),
            AtomicMode::Rotate => format!("single-particle rotation, generic dprot = {}", self.config.dprot),
            AtomicMode::Surface { radius } => format!(
                "single-particle translation on a sphere surface of radius {radius}, generic dp = {}",
                self.config.dp
            ),
        }
    }

    fn report(&self) -> KernelReport {
        KernelReport::default()
            .value("mean-square-displacement", self.stats.total().msd.mean())
            .acceptance(self.stats.named())
    }
}
