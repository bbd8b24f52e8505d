//! Rigid-body moves of whole molecules.
//!
//! All three kernels rotate a molecular group about its own trial mass center and then translate
//! it, so intramolecular distances never change. They differ in how many groups move at once and
//! how the translation is drawn.

use super::{MIN_DISPLACEMENT, first_bound, masked_displacement, random_rotation};
use crate::core::energy::change_energy;
use crate::core::models::ids::MoleculeId;
use crate::core::space::Space;
use crate::core::utils::geometry::max_pair_distance_deviation;
use crate::engine::acceptance::AcceptanceTracker;
use crate::engine::config::{ConfigError, Target};
use crate::engine::error::TrialError;
use crate::engine::protocol::{EnergyChange, KernelReport, MoveKernel, Proposal, Trial};
use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use std::f64::consts::PI;

/// Largest tolerated change of an intramolecular distance.
const RIGIDITY_TOLERANCE: f64 = 1e-7;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RigidConfig {
    /// Fallback translation bound for targets without one.
    #[serde(default)]
    pub dp: f64,
    /// Fallback rotation bound for targets without one.
    #[serde(default)]
    pub dprot: f64,
}

fn molecular_groups(space: &Space, kind: MoleculeId) -> Vec<usize> {
    space
        .find_groups(kind)
        .filter(|&g| space.group(g).is_some_and(|group| !group.atomic && !group.is_empty()))
        .collect()
}

fn collides_any(space: &Space, groups: &[usize]) -> bool {
    groups
        .iter()
        .filter_map(|&g| space.group(g))
        .any(|group| space.collides(group.range()))
}

fn is_rigid(space: &Space, g: usize) -> bool {
    let Some(group) = space.group(g) else {
        return true;
    };
    let before: Vec<Point3<f64>> = space.current()[group.range()].iter().map(|p| p.position).collect();
    let after: Vec<Point3<f64>> = space.trial()[group.range()].iter().map(|p| p.position).collect();
    let geo = space.trial_geometry();
    max_pair_distance_deviation(&before, &after, |a, b| geo.distance(a, b)) < RIGIDITY_TOLERANCE
}

struct Moved {
    name: String,
    translation: f64,
    rotation: f64,
}

/// Rotates and translates one molecule.
pub struct TranslateRotate {
    config: RigidConfig,
    moved: Option<Moved>,
    idle: bool,
    translation: AcceptanceTracker<String>,
    rotation: AcceptanceTracker<String>,
}

impl TranslateRotate {
    pub fn new(config: RigidConfig) -> Self {
        Self {
            config,
            moved: None,
            idle: false,
            translation: AcceptanceTracker::new(),
            rotation: AcceptanceTracker::new(),
        }
    }

    fn pick(&self, trial: &mut Trial<'_>) -> Option<usize> {
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

impl MoveKernel for TranslateRotate {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        let Some(g) = self.pick(trial) else {
            return Ok(Proposal::Skipped);
        };
        let (target_dp, target_dprot, direction) = trial
            .target
            .map_or((0.0, 0.0, Vector3::repeat(1.0)), |t| (t.dp1, t.dp2, t.direction));
        let dp = first_bound(&[target_dp, self.config.dp]);
        let dprot = first_bound(&[target_dprot, self.config.dprot]).min(4.0 * PI);
        let space = &mut *trial.space;
        let name = space.topology().molecule_name(space.groups()[g].kind).to_string();

        let mut moved = Moved {
            name,
            translation: 0.0,
            rotation: 0.0,
        };
        self.idle = dp < MIN_DISPLACEMENT && dprot < MIN_DISPLACEMENT;
        if dprot > MIN_DISPLACEMENT {
            let (rotation, angle) = random_rotation(trial.rng, dprot);
            let pivot = space.groups()[g].cm_trial;
            space.rotate_group(g, &pivot, &rotation);
            moved.rotation = angle * angle;
        }
        if dp > MIN_DISPLACEMENT {
            let displacement = masked_displacement(trial.rng, &direction, dp);
            space.translate_group(g, &displacement);
            moved.translation = displacement.norm_squared();
        }
        debug_assert!(is_rigid(space, g), "rigid-body move deformed group {g}");

        trial.change.add_rigid(g);
        self.moved = Some(moved);
        Ok(Proposal::Proposed)
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        if self.idle {
            return Ok(EnergyChange::new(0.0));
        }
        let groups: Vec<usize> = trial.change.groups.keys().copied().collect();
        if collides_any(trial.space, &groups) {
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
        if let Some(m) = self.moved.take() {
            self.translation.accept(&m.name, m.translation);
            self.rotation.accept(&m.name, m.rotation);
        }
    }

    fn reject(&mut self, trial: &mut Trial<'_>) {
        trial.space.reject_change(trial.change);
        if let Some(m) = self.moved.take() {
            self.translation.reject(&m.name);
            self.rotation.reject(&m.name);
        }
    }

    fn describe(&self) -> String {
        format!(
            "rigid-body translate/rotate, fallback dp = {}, dprot = {}",
            self.config.dp, self.config.dprot
        )
    }

    fn report(&self) -> KernelReport {
        let rotation = self
            .rotation
            .named()
            .into_iter()
            .map(|(k, r)| (format!("{k}/rotation"), r))
            .collect();
        KernelReport::default()
            .value("translation-msd", self.translation.total().msd.mean())
            .value("rotation-msd", self.rotation.total().msd.mean())
            .acceptance(self.translation.named())
            .acceptance(rotation)
    }
}

/// Rotates and translates every molecule of the targeted kinds at once.
pub struct Nbody {
    targets: Vec<Target>,
    moved_msq: f64,
    stats: AcceptanceTracker<String>,
}

impl Nbody {
    pub fn new(targets: Vec<Target>) -> Result<Self, ConfigError> {
        if targets.is_empty() {
            return Err(ConfigError::MissingParameter("targets"));
        }
        Ok(Self {
            targets,
            moved_msq: 0.0,
            stats: AcceptanceTracker::new(),
        })
    }

    fn key(&self) -> String {
        self.targets
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl MoveKernel for Nbody {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        let space = &mut *trial.space;
        let work: Vec<(usize, &Target)> = self
            .targets
            .iter()
            .flat_map(|t| molecular_groups(space, t.molecule).into_iter().map(move |g| (g, t)))
            .collect();
        if work.is_empty() {
            return Ok(Proposal::Skipped);
        }

        let mut msq = 0.0;
        for &(g, target) in &work {
            if target.dp2 > MIN_DISPLACEMENT {
                let (rotation, _) = random_rotation(trial.rng, target.dp2.min(4.0 * PI));
                let pivot = space.groups()[g].cm_trial;
                space.rotate_group(g, &pivot, &rotation);
            }
            let displacement = target.dp1 * trial.rng.unit_vector().component_mul(&target.direction);
            space.translate_group(g, &displacement);
            msq += displacement.norm_squared();
            trial.change.add_rigid(g);
        }
        self.moved_msq = msq / work.len() as f64;
        Ok(Proposal::Proposed)
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        let groups: Vec<usize> = trial.change.groups.keys().copied().collect();
        if collides_any(trial.space, &groups) {
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
        self.stats.accept(&self.key(), self.moved_msq);
    }

    fn reject(&mut self, trial: &mut Trial<'_>) {
        trial.space.reject_change(trial.change);
        self.stats.reject(&self.key());
    }

    fn describe(&self) -> String {
        format!("simultaneous rigid-body move of all '{}' molecules", self.key())
    }

    fn report(&self) -> KernelReport {
        KernelReport::default().acceptance(self.stats.named())
    }
}

/// Moves two molecules by equal and opposite steps along their connecting line.
pub struct Twobody {
    first: Target,
    second: Target,
    /// Translation applied to the first group in the last proposal.
    last_step: Vector3<f64>,
    stats: AcceptanceTracker<String>,
}

impl Twobody {
    pub fn new(targets: Vec<Target>) -> Result<Self, ConfigError> {
        let [first, second]: [Target; 2] = targets
            .try_into()
            .map_err(|_| ConfigError::invalid("mol-twobody", "exactly two targets are required"))?;
        Ok(Self {
            first,
            second,
            last_step: Vector3::zeros(),
            stats: AcceptanceTracker::new(),
        })
    }

    fn key(&self) -> String {
        format!("{}+{}", self.first.name, self.second.name)
    }

    fn pair(&self, space: &Space) -> Option<(usize, usize)> {
        let first = molecular_groups(space, self.first.molecule);
        let g0 = *first.first()?;
        let g1 = if self.first.molecule == self.second.molecule {
            *first.get(1)?
        } else {
            *molecular_groups(space, self.second.molecule).first()?
        };
        Some((g0, g1))
    }
}

impl MoveKernel for Twobody {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        let Some((g0, g1)) = self.pair(trial.space) else {
            return Ok(Proposal::Skipped);
        };
        let space = &mut *trial.space;
        let (cm0, cm1) = (space.groups()[g0].cm_trial, space.groups()[g1].cm_trial);
        let Some(axis) = space.trial_geometry().vdist(&cm0, &cm1).try_normalize(1e-12) else {
            return Ok(Proposal::Skipped);
        };
        let dp = self.first.dp1.min(self.second.dp1);
        let step = axis * dp * trial.rng.half();

        for (g, target, displacement) in [(g0, &self.first, step), (g1, &self.second, -step)] {
            if target.dp2 > MIN_DISPLACEMENT {
                let (rotation, _) = random_rotation(trial.rng, target.dp2.min(4.0 * PI));
                let pivot = space.groups()[g].cm_trial;
                space.rotate_group(g, &pivot, &rotation);
            }
            space.translate_group(g, &displacement);
            trial.change.add_rigid(g);
        }
        self.last_step = step;
        Ok(Proposal::Proposed)
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        let groups: Vec<usize> = trial.change.groups.keys().copied().collect();
        if collides_any(trial.space, &groups) {
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
        self.stats.accept(&self.key(), self.last_step.norm_squared());
    }

    fn reject(&mut self, trial: &mut Trial<'_>) {
        trial.space.reject_change(trial.change);
        self.stats.reject(&self.key());
    }

    fn describe(&self) -> String {
        format!(
            "two-body move of '{}' and '{}', dp = {}",
            self.first.name,
            self.second.name,
            self.first.dp1.min(self.second.dp1)
        )
    }

    fn report(&self) -> KernelReport {
        KernelReport::default().acceptance(self.stats.named())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy::reference::{HardSphere, Ideal};
    use crate::core::models::change::Change;
    use crate::core::space::tests::salt_and_dimers;
    use crate::core::utils::random::RandomSource;
    use crate::engine::config::TargetConfig;
    use crate::engine::protocol::Move;
    use crate::engine::protocol::tests::run_checked;

    fn dimer_target(space: &Space, dp: f64, dprot: f64) -> Target {
        let mut config = TargetConfig::new("dimer");
        config.dp = dp;
        config.dprot = dprot;
        Target::resolve(&config, space.topology()).unwrap()
    }

    #[test]
    fn translate_rotate_keeps_molecules_rigid_and_synchronized() {
        let mut space = salt_and_dimers(30.0, 4, 3);
        let target = dimer_target(&space, 2.0, 1.0);
        let mut mv = Move::new("mol-translate-rotate", Box::new(TranslateRotate::new(RigidConfig::default())), 4)
            .with_targets(vec![target])
            .unwrap();
        run_checked(&mut mv, &mut space, &HardSphere, 500);

        for group in space.groups().iter().filter(|g| !g.atomic) {
            let p = space.current();
            let d = space.geometry().distance(&p[group.start].position, &p[group.start + 1].position);
            assert!((d - 1.0).abs() < 1e-9);
        }
        let s = mv.statistics();
        assert!(s.accepted > 0);
        assert!(s.details.acceptance.contains_key("dimer/rotation"));
    }

    #[test]
    fn vanishing_bounds_give_zero_energy_and_full_acceptance() {
        let mut space = salt_and_dimers(30.0, 0, 2);
        let target = dimer_target(&space, 0.0, 0.0);
        let mut mv = Move::new("mol-translate-rotate", Box::new(TranslateRotate::new(RigidConfig::default())), 4)
            .with_targets(vec![target])
            .unwrap();
        run_checked(&mut mv, &mut space, &HardSphere, 100);
        assert_eq!(mv.statistics().acceptance, 1.0);
    }

    #[test]
    fn nbody_moves_every_targeted_molecule() {
        let mut space = salt_and_dimers(40.0, 0, 3);
        let before: Vec<Point3<f64>> = space.groups().iter().map(|g| g.cm).collect();
        let kernel = Nbody::new(vec![dimer_target(&space, 1.0, 0.5)]).unwrap();
        let mut mv = Move::new("mol-nbody", Box::new(kernel), 2);
        run_checked(&mut mv, &mut space, &Ideal, 1);

        for (group, old) in space.groups().iter().zip(&before).filter(|(g, _)| !g.atomic) {
            let shift = space.geometry().distance(&group.cm, old);
            assert!((shift - 1.0).abs() < 1e-9, "shift {shift}");
        }
    }

    #[test]
    fn twobody_steps_are_equal_and_opposite_along_the_connecting_line() {
        let mut space = salt_and_dimers(60.0, 0, 2);
        let target = dimer_target(&space, 5.0, 0.0);
        let mut kernel = Twobody::new(vec![target.clone(), target]).unwrap();
        let mut rng = RandomSource::from_seed(21);

        for _ in 0..50 {
            let old: Vec<Point3<f64>> = space.groups().iter().map(|g| g.cm).collect();
            let axis = space.geometry().vdist(&old[0], &old[1]).normalize();
            let mut change = Change::new();
            let mut trial = Trial {
                space: &mut space,
                hamiltonian: &Ideal,
                rng: &mut rng,
                change: &mut change,
                target: None,
            };
            assert_eq!(kernel.propose(&mut trial).unwrap(), Proposal::Proposed);
            kernel.accept(&mut trial);

            let geo = space.geometry();
            let d0 = geo.vdist(&space.groups()[0].cm, &old[0]);
            let d1 = geo.vdist(&space.groups()[1].cm, &old[1]);
            assert!((d0 + d1).norm() < 1e-9);
            assert!(d0.cross(&axis).norm() < 1e-9);
            assert!(d0.norm() <= 2.5 + 1e-9);
            space.verify().unwrap();
        }
    }

    #[test]
    fn twobody_requires_exactly_two_targets() {
        let space = salt_and_dimers(20.0, 0, 2);
        let target = dimer_target(&space, 1.0, 0.0);
        assert!(Twobody::new(vec![target]).is_err());
    }
}
