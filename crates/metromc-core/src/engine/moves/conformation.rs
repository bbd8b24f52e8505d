//! Replaces a molecule's shape by another conformation from its kind's library.
//!
//! The new conformation is placed on the molecule's current mass center with a random
//! orientation. The acceptance weight only sees the molecule's interactions with everything
//! else; the internal energy difference is added to the reported energy change.

use crate::core::energy::{change_energy, group_internal_energy};
use crate::core::utils::geometry::random_orientation;
use crate::engine::acceptance::AcceptanceTracker;
use crate::engine::error::TrialError;
use crate::engine::protocol::{EnergyChange, KernelReport, MoveKernel, Proposal, Trial};

/// Swaps the conformation of one molecule per trial.
pub struct ConformationSwap {
    swapped: Option<(usize, String)>,
    stats: AcceptanceTracker<String>,
}

impl ConformationSwap {
    pub fn new() -> Self {
        Self {
            swapped: None,
            stats: AcceptanceTracker::new(),
        }
    }

    /// A random molecular group of the target kind, or of any kind without a target.
    fn pick(trial: &mut Trial<'_>) -> Option<usize> {
        let space = &*trial.space;
        let g = match trial.target {
            Some(target) => space.random_group(target.molecule, trial.rng)?,
            None => {
                let candidates: Vec<usize> = (0..space.groups().len())
                    .filter(|&g| !space.groups()[g].atomic)
                    .collect();
                *trial.rng.pick(&candidates)?
            }
        };
        let group = space.group(g)?;
        (!group.atomic && !group.is_empty()).then_some(g)
    }
}

impl Default for ConformationSwap {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveKernel for ConformationSwap {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        let Some(g) = Self::pick(trial) else {
            return Ok(Proposal::Skipped);
        };
        let space = &mut *trial.space;
        let group = space.groups()[g].clone();
        let Some(kind) = space.topology().molecule(group.kind) else {
            return Ok(Proposal::Skipped);
        };
        let name = kind.name.clone();
        let conformation = kind.random_conformation(trial.rng).to_vec();
        if conformation.len() != group.len {
            return Ok(Proposal::Skipped);
        }
        let rotation = random_orientation(trial.rng);
        for (p, offset) in space.trial[group.range()].iter_mut().zip(&conformation) {
            p.position = group.cm + rotation.transform_vector(offset);
            space.trial_geometry.boundary(&mut p.position);
        }
        space.update_trial_mass_center(g);

        trial.change.add_rigid(g);
        self.swapped = Some((g, name));
        Ok(Proposal::Proposed)
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        let Some((g, _)) = &self.swapped else {
            return Ok(EnergyChange::new(0.0));
        };
        let space = &*trial.space;
        let group = &space.groups()[*g];
        if space.collides(group.range()) {
            return Ok(EnergyChange::infinite());
        }
        let du = change_energy(trial.hamiltonian, space, trial.change);
        let internal = group_internal_energy(trial.hamiltonian, space.trial_geometry(), space.trial(), group)
            - group_internal_energy(trial.hamiltonian, space.geometry(), space.current(), group);
        Ok(EnergyChange::with_reported(du, du + internal))
    }

    fn accept(&mut self, trial: &mut Trial<'_>) {
        trial.space.accept_change(trial.change);
        if let Some((_, name)) = self.swapped.take() {
            self.stats.accept(&name, 0.0);
        }
    }

    fn reject(&mut self, trial: &mut Trial<'_>) {
        trial.space.reject_change(trial.change);
        if let Some((_, name)) = self.swapped.take() {
            self.stats.reject(&name);
        }
    }

    fn describe(&self) -> String {
        "conformation swap about the mass center".to_string()
    }

    fn report(&self) -> KernelReport {
        KernelReport::default().acceptance(self.stats.named())
    }
}
