use crate::core::energy::system_energy;
use crate::core::space::Space;
use crate::core::utils::average::Average;
use crate::engine::error::TrialError;
use crate::engine::protocol::{EnergyChange, KernelReport, MoveKernel, Proposal, Trial};
use nalgebra::Vector3;
use serde::Deserialize;
use tracing::trace;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PolarizeConfig {
    #[serde(default = "PolarizeConfig::default_max_iterations")]
    pub max_iterations: usize,
    /// Largest tolerated dipole change between two sweeps.
    #[serde(default = "PolarizeConfig::default_threshold")]
    pub threshold: f64,
}

impl PolarizeConfig {
    fn default_max_iterations() -> usize {
        40
    }

    fn default_threshold() -> f64 {
        0.001
    }
}

impl Default for PolarizeConfig {
    fn default() -> Self {
        Self {
            max_iterations: Self::default_max_iterations(),
            threshold: Self::default_threshold(),
        }
    }
}

/// Wraps any move and relaxes induced dipoles on the trial configuration after it proposes.
///
/// Because every dipole may change, the energy is the full system difference and commits cover
/// the whole configuration.
pub struct Polarize<K> {
    inner: K,
    config: PolarizeConfig,
    sweeps: Average,
}

impl<K: MoveKernel> Polarize<K> {
    pub fn new(inner: K, config: PolarizeConfig) -> Self {
        Self {
            inner,
            config,
            sweeps: Average::new(),
        }
    }

    /// One sweep `mu_i = mu0_i + alpha_i * E_i`. Returns the largest dipole change.
    fn sweep(trial: &mut Trial<'_>) -> f64 {
        let space = &mut *trial.space;
        let fields: Vec<Vector3<f64>> = (0..space.len())
            .map(|i| {
                if space.trial[i].polarizability == 0.0 {
                    Vector3::zeros()
                } else {
                    trial.hamiltonian.field(&space.trial_geometry, &space.trial, i)
                }
            })
            .collect();
        let mut largest: f64 = 0.0;
        for (p, field) in space.trial.iter_mut().zip(fields) {
            if p.polarizability == 0.0 {
                continue;
            }
            let induced = p.permanent_dipole + field * p.polarizability;
            largest = largest.max((induced - p.dipole).norm());
            p.dipole = induced;
        }
        largest
    }
}

impl<K: MoveKernel> MoveKernel for Polarize<K> {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        if self.inner.propose(trial)? == Proposal::Skipped {
            return Ok(Proposal::Skipped);
        }
        let mut sweeps = 0;
        loop {
            let change = Self::sweep(trial);
            trace!(sweeps, change, "Dipole sweep");
            if change < self.config.threshold {
                break;
            }
            sweeps += 1;
            if sweeps >= self.config.max_iterations {
                self.inner.reject(trial);
                trial.space.reject_all();
                return Err(TrialError::Convergence {
                    iterations: self.config.max_iterations,
                });
            }
        }
        self.sweeps.push(sweeps as f64);
        Ok(Proposal::Proposed)
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        let inner = self.inner.energy_change(trial)?;
        if inner.du == f64::INFINITY {
            return Ok(inner);
        }
        let space = &*trial.space;
        let full = system_energy(trial.hamiltonian, space.trial_geometry(), space.trial())
            - system_energy(trial.hamiltonian, space.geometry(), space.current());
        // Keep any bias the inner move folds into its acceptance energy.
        let bias = inner.reported.map_or(0.0, |reported| inner.du - reported);
        Ok(EnergyChange::with_reported(full + bias, full))
    }

    fn accept(&mut self, trial: &mut Trial<'_>) {
        self.inner.accept(trial);
        trial.space.accept_all();
    }

    fn reject(&mut self, trial: &mut Trial<'_>) {
        self.inner.reject(trial);
        trial.space.reject_all();
    }

    fn describe(&self) -> String {
        format!(
            "{} with induced dipoles (threshold {}, at most {} sweeps)",
            self.inner.describe(),
            self.config.threshold,
            self.config.max_iterations
        )
    }

    fn sample(&mut self, space: &Space) {
        self.inner.sample(space);
    }

    fn report(&self) -> KernelReport {
        self.inner.report().value("average-polarization-sweeps", self.sweeps.mean())
    }
}
