use crate::core::energy::change_energy;
use crate::core::models::species::AVOGADRO;
use crate::core::utils::average::Average;
use crate::engine::acceptance::AcceptanceTracker;
use crate::engine::config::ConfigError;
use crate::engine::error::TrialError;
use crate::engine::protocol::{EnergyChange, KernelReport, MoveKernel, Proposal, Trial};
use serde::Deserialize;

/// Volumes below this are never proposed.
const MIN_VOLUME: f64 = 1e-6;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct IsobaricConfig {
    /// Step size in `ln V`.
    pub dp: f64,
    /// External pressure in mM.
    pub pressure: f64,
}

/// Isotropic volume fluctuations at constant pressure.
///
/// Molecules move rigidly with their scaled mass centers while free particles are scaled
/// individually, so the ideal term counts molecules plus free particles.
pub struct IsobaricVolume {
    config: IsobaricConfig,
    /// Pressure in kT per cubic Ångström.
    pressure: f64,
    old_volume: f64,
    new_volume: f64,
    volume: Average,
    cube_root: Average,
    stats: AcceptanceTracker<String>,
}

impl IsobaricVolume {
    pub fn new(config: IsobaricConfig) -> Result<Self, ConfigError> {
        if !(config.pressure >= 0.0) {
            return Err(ConfigError::invalid("pressure", "must be non-negative"));
        }
        let pressure = config.pressure * 1e-3 * AVOGADRO * 1e-27;
        Ok(Self {
            config,
            pressure,
            old_volume: 0.0,
            new_volume: 0.0,
            volume: Average::new(),
            cube_root: Average::new(),
            stats: AcceptanceTracker::new(),
        })
    }

    fn sample(&mut self, volume: f64) {
        self.volume.push(volume);
        self.cube_root.push(volume.cbrt());
    }
}

impl MoveKernel for IsobaricVolume {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        let old = trial.space.geometry().volume();
        let new = (old.ln() + self.config.dp * trial.rng.half()).exp();
        if !(new > MIN_VOLUME) {
            return Ok(Proposal::Skipped);
        }
        let factor = (new / old).cbrt();

        let space = &mut *trial.space;
        space.trial_geometry.set_volume(new);
        for g in 0..space.groups.len() {
            let group = &space.groups[g];
            if group.is_empty() {
                continue;
            }
            if group.atomic {
                for i in group.range() {
                    let p = &mut space.trial[i].position;
                    *p = (p.coords * factor).into();
                    space.trial_geometry.boundary(p);
                }
                space.update_trial_mass_center(g);
            } else {
                let cm = group.cm;
                space.translate_group(g, &(cm.coords * (factor - 1.0)));
            }
        }
        trial.change.geometry_changed = true;
        trial.change.volume_delta = new - old;
        self.old_volume = old;
        self.new_volume = new;
        Ok(Proposal::Proposed)
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        if trial.space.collides(0..trial.space.len()) {
            return Ok(EnergyChange::infinite());
        }
        let du = change_energy(trial.hamiltonian, trial.space, trial.change);
        let n = trial.space.molecule_count() as f64;
        let (old, new) = (self.old_volume, self.new_volume);
        let ideal = self.pressure * (new - old) - (n + 1.0) * (new / old).ln();
        Ok(EnergyChange::with_reported(du + ideal, du))
    }

    fn accept(&mut self, trial: &mut Trial<'_>) {
        trial.space.accept_change(trial.change);
        let delta = self.new_volume - self.old_volume;
        self.stats.accept(&"volume".to_string(), delta * delta);
        self.sample(self.new_volume);
    }

    fn reject(&mut self, trial: &mut Trial<'_>) {
        trial.space.reject_change(trial.change);
        self.stats.reject(&"volume".to_string());
        self.sample(self.old_volume);
    }

    fn describe(&self) -> String {
        format!(
            "isobaric volume move, dp = {}, pressure = {} mM",
            self.config.dp, self.config.pressure
        )
    }

    fn report(&self) -> KernelReport {
        KernelReport::default()
            .value("average-volume", self.volume.mean())
            .value("average-cube-root-volume", self.cube_root.mean())
            .value("volume-msd", self.stats.total().msd.mean())
            .acceptance(self.stats.named())
    }
}
