//! The Metropolis accept/reject cycle shared by every move.
//!
//! A [`Move`] owns a [`MoveKernel`] together with its own random stream, run fraction, optional
//! molecule targets and bookkeeping. Each trial walks through the same states in the same order:
//!
//! 1. **Gate**: a uniform draw decides whether the trial runs at all.
//! 2. **Propose**: the kernel perturbs the trial configuration and fills the [`Change`] record,
//!    or reports a [`Proposal::Skipped`] no-op when a precondition fails.
//! 3. **Evaluate**: the kernel returns the energy change used for acceptance.
//! 4. **Decide**: accept iff `r <= exp(-du)`, with `r` always drawn.
//! 5. **Commit**: the kernel's accept or reject hook restores synchronization.
//!
//! Draws in the gate and decide phases happen on every path so that replicas seeded alike stay in
//! lockstep no matter which branches they take.

use super::acceptance::AcceptanceRecord;
use super::config::{ConfigError, Target};
use super::error::{MoveError, TrialError};
use crate::core::energy::Hamiltonian;
use crate::core::models::change::Change;
use crate::core::space::{InvariantError, Space};
use crate::core::utils::random::RandomSource;
use rand::distributions::{Distribution, WeightedIndex};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Everything a kernel may touch during one trial.
pub struct Trial<'a> {
    pub space: &'a mut Space,
    pub hamiltonian: &'a dyn Hamiltonian,
    pub rng: &'a mut RandomSource,
    pub change: &'a mut Change,
    /// The molecule key drawn for this `perform` call, if the move is targeted.
    pub target: Option<&'a Target>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proposal {
    Proposed,
    /// Precondition failed before anything was mutated.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyChange {
    /// Energy change in kT entering the Metropolis test.
    pub du: f64,
    /// Energy change reported to the caller instead of `du` when accepted.
    pub reported: Option<f64>,
}

impl EnergyChange {
    pub fn new(du: f64) -> Self {
        Self { du, reported: None }
    }

    pub fn with_reported(du: f64, reported: f64) -> Self {
        Self {
            du,
            reported: Some(reported),
        }
    }

    pub fn infinite() -> Self {
        Self::new(f64::INFINITY)
    }
}

/// Kernel-specific statistics attached to [`MoveStatistics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KernelReport {
    pub values: BTreeMap<String, f64>,
    pub acceptance: BTreeMap<String, AcceptanceRecord>,
}

impl KernelReport {
    pub fn value(mut self, key: &str, value: f64) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    pub fn acceptance(mut self, records: BTreeMap<String, AcceptanceRecord>) -> Self {
        self.acceptance.extend(records);
        self
    }
}

/// The hooks of one move kind. The protocol calls them strictly in the order
/// propose, energy_change, then exactly one of accept or reject.
pub trait MoveKernel: Send {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError>;

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError>;

    fn accept(&mut self, trial: &mut Trial<'_>);

    fn reject(&mut self, trial: &mut Trial<'_>);

    fn describe(&self) -> String;

    fn report(&self) -> KernelReport {
        KernelReport::default()
    }

    /// Called once per scheduled trial after it finished, including trials the run-fraction
    /// gate left out. Kernels collect ensemble averages here.
    fn sample(&mut self, _space: &Space) {}
}

impl<K: MoveKernel + ?Sized> MoveKernel for Box<K> {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        (**self).propose(trial)
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        (**self).energy_change(trial)
    }

    fn accept(&mut self, trial: &mut Trial<'_>) {
        (**self).accept(trial)
    }

    fn reject(&mut self, trial: &mut Trial<'_>) {
        (**self).reject(trial)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn report(&self) -> KernelReport {
        (**self).report()
    }

    fn sample(&mut self, space: &Space) {
        (**self).sample(space)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveStatistics {
    pub title: String,
    pub trials: u64,
    pub accepted: u64,
    pub skipped: u64,
    pub acceptance: f64,
    pub run_fraction: f64,
    /// Sum of reported energy changes of all accepted trials (kT).
    pub energy_change: f64,
    /// Fraction of the move's lifetime spent inside `perform`.
    pub relative_time: f64,
    pub details: KernelReport,
}

#[derive(Debug, Default)]
struct Counters {
    trials: u64,
    accepted: u64,
    skipped: u64,
    energy_change: f64,
}

pub struct Move {
    title: String,
    kernel: Box<dyn MoveKernel>,
    rng: RandomSource,
    run_fraction: f64,
    targets: Vec<Target>,
    selector: Option<WeightedIndex<f64>>,
    change: Change,
    counters: Counters,
    busy: Duration,
    created: Instant,
}

impl Move {
    pub fn new(title: &str, kernel: Box<dyn MoveKernel>, seed: u64) -> Self {
        Self {
            title: title.to_string(),
            kernel,
            rng: RandomSource::from_seed(seed),
            run_fraction: 1.0,
            targets: Vec::new(),
            selector: None,
            change: Change::new(),
            counters: Counters::default(),
            busy: Duration::ZERO,
            created: Instant::now(),
        }
    }

    pub fn with_run_fraction(mut self, run_fraction: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&run_fraction) {
            return Err(ConfigError::invalid(&self.title, "run fraction must lie in [0, 1]"));
        }
        self.run_fraction = run_fraction;
        Ok(self)
    }

    pub fn with_targets(mut self, targets: Vec<Target>) -> Result<Self, ConfigError> {
        if !targets.is_empty() {
            let weights = targets.iter().map(|t| t.probability);
            let selector = WeightedIndex::new(weights)
                .map_err(|e| ConfigError::invalid(&self.title, format!("target weights: {e}")))?;
            self.selector = Some(selector);
        }
        self.targets = targets;
        Ok(self)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Seed of the move's random stream.
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Runs `n` trials (times the drawn target's repeat count) and returns the summed energy
    /// change of the accepted ones in kT.
    #[instrument(level = "trace", skip_all, fields(name = %self.title))]
    pub fn perform(
        &mut self,
        space: &mut Space,
        hamiltonian: &dyn Hamiltonian,
        n: usize,
    ) -> Result<f64, MoveError> {
        let started = Instant::now();
        let Self {
            title,
            kernel,
            rng,
            run_fraction,
            targets,
            selector,
            change,
            counters,
            ..
        } = self;

        let target = selector.as_ref().map(|s| &targets[s.sample(rng)]);
        let repeat = n * target.map_or(1, |t| t.repeat(space));

        let mut du_sum = 0.0;
        for _ in 0..repeat {
            if rng.uniform() < *run_fraction {
                let mut trial = Trial {
                    space: &mut *space,
                    hamiltonian,
                    rng: &mut *rng,
                    change: &mut *change,
                    target,
                };
                let result = cycle(kernel.as_mut(), &mut trial, counters, title);
                change.clear();
                du_sum += result?;
            }
            kernel.sample(space);
        }
        self.busy += started.elapsed();
        Ok(du_sum)
    }

    /// Attempted and accepted trials so far.
    pub fn counts(&self) -> (u64, u64) {
        (self.counters.trials, self.counters.accepted)
    }

    pub fn statistics(&self) -> MoveStatistics {
        let c = &self.counters;
        let lifetime = self.created.elapsed().as_secs_f64();
        MoveStatistics {
            title: self.title.clone(),
            trials: c.trials,
            accepted: c.accepted,
            skipped: c.skipped,
            acceptance: if c.trials > 0 {
                c.accepted as f64 / c.trials as f64
            } else {
                0.0
            },
            run_fraction: self.run_fraction,
            energy_change: c.energy_change,
            relative_time: if lifetime > 0.0 {
                self.busy.as_secs_f64() / lifetime
            } else {
                0.0
            },
            details: self.kernel.report(),
        }
    }

    pub fn info(&self) -> String {
        let s = self.statistics();
        let mut out = String::new();
        let _ = writeln!(out, "# {}", self.title);
        let _ = writeln!(out, "  {}", self.kernel.describe());
        let _ = writeln!(
            out,
            "  trials {}, accepted {:.2}%, skipped {}, run fraction {:.3}",
            s.trials,
            100.0 * s.acceptance,
            s.skipped,
            s.run_fraction
        );
        let _ = writeln!(
            out,
            "  energy change {:.6e} kT, relative time {:.4}",
            s.energy_change, s.relative_time
        );
        for (key, value) in &s.details.values {
            let _ = writeln!(out, "  {key} = {value:.6e}");
        }
        for (key, r) in &s.details.acceptance {
            let _ = writeln!(
                out,
                "  [{key}] trials {}, acc. {:.2}%, msd {:.4e}",
                r.trials,
                100.0 * r.ratio(),
                r.msd.mean()
            );
        }
        out
    }

    /// Test hook: the space must be synchronized and no change may be pending.
    pub fn check_invariants(&self, space: &Space) -> Result<(), InvariantError> {
        if !self.change.is_empty() {
            return Err(InvariantError::PendingChange);
        }
        space.verify()
    }
}

fn cycle(
    kernel: &mut dyn MoveKernel,
    trial: &mut Trial<'_>,
    counters: &mut Counters,
    title: &str,
) -> Result<f64, MoveError> {
    counters.trials += 1;
    let proposal = kernel
        .propose(trial)
        .map_err(|e| MoveError::from_trial(title, e))?;

    if proposal == Proposal::Skipped {
        trial.rng.uniform();
        counters.skipped += 1;
        debug!(name = title, "Precondition failed; trial skipped.");
        return Ok(0.0);
    }

    let energy = match kernel.energy_change(trial) {
        Ok(energy) => energy,
        Err(e) => {
            kernel.reject(trial);
            return Err(MoveError::from_trial(title, e));
        }
    };

    if energy.du.is_nan() {
        warn!(name = title, "Energy change is NaN; trial rejected.");
    }
    let r = trial.rng.uniform();
    let accepted = !energy.du.is_nan() && energy.du != f64::INFINITY && r <= (-energy.du).exp();

    if accepted {
        kernel.accept(trial);
        counters.accepted += 1;
        let du = energy.reported.unwrap_or(energy.du);
        counters.energy_change += du;
        Ok(du)
    } else {
        kernel.reject(trial);
        Ok(0.0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::energy::reference::Ideal;
    use crate::core::space::tests::salt_and_dimers;
    use crate::engine::config::TargetConfig;

    /// Proposes nothing and returns a fixed energy change.
    #[derive(Default)]
    struct Fixed {
        du: f64,
        skip: bool,
        accepted: usize,
        rejected: usize,
        samples: usize,
    }

    impl MoveKernel for Fixed {
        fn propose(&mut self, _trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
            Ok(if self.skip {
                Proposal::Skipped
            } else {
                Proposal::Proposed
            })
        }

        fn energy_change(&mut self, _trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
            Ok(EnergyChange::new(self.du))
        }

        fn accept(&mut self, _trial: &mut Trial<'_>) {
            self.accepted += 1;
        }

        fn reject(&mut self, _trial: &mut Trial<'_>) {
            self.rejected += 1;
        }

        fn describe(&self) -> String {
            format!("fixed du = {}", self.du)
        }

        fn report(&self) -> KernelReport {
            KernelReport::default().value("samples", self.samples as f64)
        }

        fn sample(&mut self, _space: &Space) {
            self.samples += 1;
        }
    }

    fn fixed(du: f64) -> Box<Fixed> {
        Box::new(Fixed {
            du,
            ..Fixed::default()
        })
    }

    /// Runs `n` single-trial cycles of `mv` and checks synchronization after each.
    pub(crate) fn run_checked(mv: &mut Move, space: &mut Space, hamiltonian: &dyn Hamiltonian, n: usize) {
        for _ in 0..n {
            mv.perform(space, hamiltonian, 1).unwrap();
            mv.check_invariants(space).unwrap();
        }
    }

    #[test]
    fn infinite_energy_is_always_rejected() {
        let mut space = salt_and_dimers(20.0, 2, 0);
        let mut mv = Move::new("wall", fixed(f64::INFINITY), 1);
        run_checked(&mut mv, &mut space, &Ideal, 500);
        let s = mv.statistics();
        assert_eq!(s.trials, 500);
        assert_eq!(s.accepted, 0);
    }

    #[test]
    fn negative_infinite_energy_is_always_accepted() {
        let mut space = salt_and_dimers(20.0, 2, 0);
        let mut mv = Move::new("sink", fixed(f64::NEG_INFINITY), 1);
        run_checked(&mut mv, &mut space, &Ideal, 500);
        assert_eq!(mv.statistics().acceptance, 1.0);
    }

    #[test]
    fn zero_energy_is_always_accepted() {
        let mut space = salt_and_dimers(20.0, 2, 0);
        let mut mv = Move::new("flat", fixed(0.0), 5);
        run_checked(&mut mv, &mut space, &Ideal, 200);
        assert_eq!(mv.statistics().acceptance, 1.0);
    }

    #[test]
    fn nan_energy_is_rejected() {
        let mut space = salt_and_dimers(20.0, 2, 0);
        let mut mv = Move::new("nan", fixed(f64::NAN), 5);
        mv.perform(&mut space, &Ideal, 50).unwrap();
        assert_eq!(mv.statistics().accepted, 0);
        assert_eq!(mv.statistics().trials, 50);
    }

    #[test]
    fn metropolis_acceptance_matches_boltzmann_factor() {
        let mut space = salt_and_dimers(20.0, 2, 0);
        let mut mv = Move::new("uphill", fixed(1.0), 11);
        mv.perform(&mut space, &Ideal, 20_000).unwrap();
        let ratio = mv.statistics().acceptance;
        assert!((ratio - (-1.0f64).exp()).abs() < 0.02, "ratio {ratio}");
    }

    #[test]
    fn zero_run_fraction_runs_no_trials() {
        let mut space = salt_and_dimers(20.0, 2, 0);
        let mut mv = Move::new("off", fixed(0.0), 3)
            .with_run_fraction(0.0)
            .unwrap();
        mv.perform(&mut space, &Ideal, 100).unwrap();
        assert_eq!(mv.statistics().trials, 0);
    }

    #[test]
    fn every_scheduled_trial_is_sampled_even_when_gated_out() {
        let mut space = salt_and_dimers(20.0, 2, 0);
        let mut mv = Move::new("half", fixed(0.0), 21)
            .with_run_fraction(0.5)
            .unwrap();
        mv.perform(&mut space, &Ideal, 400).unwrap();
        let s = mv.statistics();
        assert!(s.trials > 100 && s.trials < 300, "trials {}", s.trials);
        assert_eq!(s.details.values["samples"], 400.0);
    }

    #[test]
    fn run_fraction_outside_unit_interval_is_rejected() {
        let result = Move::new("bad", fixed(0.0), 3).with_run_fraction(1.5);
        assert!(matches!(result, Err(ConfigError::InvalidParameter { .. })));
    }

    #[test]
    fn skipped_trials_count_but_call_no_hooks() {
        let mut space = salt_and_dimers(20.0, 2, 0);
        let kernel = Box::new(Fixed {
            skip: true,
            ..Fixed::default()
        });
        let mut mv = Move::new("noop", kernel, 3);
        mv.perform(&mut space, &Ideal, 10).unwrap();
        let s = mv.statistics();
        assert_eq!((s.trials, s.skipped, s.accepted), (10, 10, 0));
    }

    #[test]
    fn skipped_and_performed_trials_consume_the_same_draws() {
        let mut space = salt_and_dimers(20.0, 2, 0);
        let skipping = Box::new(Fixed {
            skip: true,
            ..Fixed::default()
        });
        let mut a = Move::new("a", skipping, 9);
        let mut b = Move::new("b", fixed(0.0), 9);
        a.perform(&mut space, &Ideal, 25).unwrap();
        b.perform(&mut space, &Ideal, 25).unwrap();
        assert_eq!(a.rng.uniform().to_bits(), b.rng.uniform().to_bits());
    }

    #[test]
    fn targeted_move_repeats_per_molecule() {
        let mut space = salt_and_dimers(20.0, 2, 3);
        let mut config = TargetConfig::new("dimer");
        config.per_molecule = true;
        let target = Target::resolve(&config, space.topology()).unwrap();
        let mut mv = Move::new("targeted", fixed(0.0), 3)
            .with_targets(vec![target])
            .unwrap();
        mv.perform(&mut space, &Ideal, 2).unwrap();
        assert_eq!(mv.statistics().trials, 6);
    }

    #[test]
    fn all_zero_target_weights_are_rejected() {
        let space = salt_and_dimers(20.0, 2, 1);
        let mut config = TargetConfig::new("dimer");
        config.probability = 0.0;
        let target = Target::resolve(&config, space.topology()).unwrap();
        let result = Move::new("weights", fixed(0.0), 3).with_targets(vec![target]);
        assert!(result.is_err());
    }

    #[test]
    fn info_mentions_title_and_kernel() {
        let mv = Move::new("flat", fixed(0.0), 5);
        let info = mv.info();
        assert!(info.starts_with("# flat"));
        assert!(info.contains("fixed du = 0"));
    }
}
