use crate::core::energy::change_energy;
use crate::core::utils::geometry::rotation_from_axis_angle;
use crate::engine::acceptance::AcceptanceTracker;
use crate::engine::config::ConfigError;
use crate::engine::error::TrialError;
use crate::engine::protocol::{EnergyChange, KernelReport, MoveKernel, Proposal, Trial};
use nalgebra::UnitQuaternion;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentRule {
    /// Rotate the monomers strictly between two anchors about the axis joining them.
    CrankShaft,
    /// Rotate everything on one side of an anchor about the axis through two monomers.
    Pivot,
}

fn default_minlen() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SegmentConfig {
    /// Rotation bound in radians.
    pub dp: f64,
    #[serde(default = "default_minlen")]
    pub minlen: usize,
    /// Defaults to the longest segment the chain allows.
    #[serde(default)]
    pub maxlen: Option<usize>,
}

impl SegmentConfig {
    pub fn new(dp: f64) -> Self {
        Self {
            dp,
            minlen: default_minlen(),
            maxlen: None,
        }
    }
}

fn pick_chain(trial: &mut Trial<'_>) -> Option<usize> {
    let space = &*trial.space;
    let g = match trial.target {
        Some(target) => space.random_group(target.molecule, trial.rng)?,
        None => {
            let chains: Vec<usize> = (0..space.groups().len())
                .filter(|&g| !space.groups()[g].atomic)
                .collect();
            *trial.rng.pick(&chains)?
        }
    };
    space.group(g).filter(|group| !group.atomic).map(|_| g)
}

struct Moved {
    group: usize,
    indices: Vec<usize>,
}

fn moved_cm_msq(trial: &Trial<'_>, group: usize) -> f64 {
    let g = &trial.space.groups()[group];
    trial.space.geometry().sqdist(&g.cm_trial, &g.cm)
}

fn polymer_energy(trial: &Trial<'_>, moved: &Moved) -> EnergyChange {
    if trial.space.collides(moved.indices.iter().copied()) {
        return EnergyChange::infinite();
    }
    EnergyChange::new(change_energy(trial.hamiltonian, trial.space, trial.change))
}

/// Crankshaft and pivot moves on linear chains.
pub struct SegmentRotation {
    rule: SegmentRule,
    config: SegmentConfig,
    moved: Option<Moved>,
    msq: f64,
    stats: AcceptanceTracker<String>,
}

impl SegmentRotation {
    pub fn new(rule: SegmentRule, config: SegmentConfig) -> Result<Self, ConfigError> {
        if config.maxlen.is_some_and(|max| max < config.minlen) {
            return Err(ConfigError::invalid("segment", "maxlen must not be below minlen"));
        }
        Ok(Self {
            rule,
            config,
            moved: None,
            msq: 0.0,
            stats: AcceptanceTracker::new(),
        })
    }

    /// Segment-length bounds for a chain of `len` monomers, `None` if no segment fits.
    fn bounds(&self, len: usize) -> Option<(usize, usize)> {
        let longest = match self.rule {
            SegmentRule::CrankShaft => len.checked_sub(2)?,
            SegmentRule::Pivot => len.checked_sub(1)?,
        };
        let min = match self.rule {
            SegmentRule::CrankShaft => self.config.minlen,
            SegmentRule::Pivot => self.config.minlen.max(1),
        };
        let max = self.config.maxlen.map_or(longest, |m| m.min(longest));
        (min <= max).then_some((min, max))
    }

    fn segment_length(&self, beg: usize, end: usize) -> usize {
        let span = beg.abs_diff(end);
        match self.rule {
            SegmentRule::CrankShaft => span.saturating_sub(1),
            SegmentRule::Pivot => span,
        }
    }

    fn name(&self) -> &'static str {
        match self.rule {
            SegmentRule::CrankShaft => "crankshaft",
            SegmentRule::Pivot => "pivot",
        }
    }
}

impl MoveKernel for SegmentRotation {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        let Some(g) = pick_chain(trial) else {
            return Ok(Proposal::Skipped);
        };
        let group = trial.space.groups()[g].clone();
        let Some((min, max)) = self.bounds(group.len) else {
            return Ok(Proposal::Skipped);
        };

        let (beg, end) = loop {
            let beg = group.start + trial.rng.below(group.len);
            let end = group.start + trial.rng.below(group.len);
            let length = self.segment_length(beg, end);
            if beg != end && (min..=max).contains(&length) {
                break (beg, end);
            }
        };

        let indices: Vec<usize> = match self.rule {
            SegmentRule::CrankShaft => (beg.min(end) + 1..beg.max(end)).collect(),
            SegmentRule::Pivot => {
                if trial.rng.half() > 0.0 {
                    (end + 1..group.end()).collect()
                } else {
                    (group.start..end).collect()
                }
            }
        };

        let space = &mut *trial.space;
        let pivot = space.trial()[beg].position;
        let axis = space.trial_geometry().vdist(&space.trial()[end].position, &pivot);
        let angle = self.config.dp * trial.rng.half();
        let rotation = rotation_from_axis_angle(&axis, angle).unwrap_or_else(UnitQuaternion::identity);
        for &i in &indices {
            space.rotate_particle(i, &pivot, &rotation);
        }
        space.update_trial_mass_center(g);
        trial.change.add_particles(g, indices.iter().copied());
        self.msq = moved_cm_msq(trial, g);
        self.moved = Some(Moved { group: g, indices });
        Ok(Proposal::Proposed)
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        Ok(self
            .moved
            .as_ref()
            .map_or(EnergyChange::new(0.0), |moved| polymer_energy(trial, moved)))
    }

    fn accept(&mut self, trial: &mut Trial<'_>) {
        trial.space.accept_change(trial.change);
        if let Some(moved) = self.moved.take() {
            let name = trial.space.topology().molecule_name(trial.space.groups()[moved.group].kind);
            self.stats.accept(&name.to_string(), self.msq);
        }
    }

    fn reject(&mut self, trial: &mut Trial<'_>) {
        trial.space.reject_change(trial.change);
        if let Some(moved) = self.moved.take() {
            let name = trial.space.topology().molecule_name(trial.space.groups()[moved.group].kind);
            self.stats.reject(&name.to_string());
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} move, dp = {}, segment length {}..{}",
            self.name(),
            self.config.dp,
            self.config.minlen,
            self.config.maxlen.map_or("chain".to_string(), |m| m.to_string())
        )
    }

    fn report(&self) -> KernelReport {
        KernelReport::default()
            .value("mass-center-msd", self.stats.total().msd.mean())
            .acceptance(self.stats.named())
    }
}

fn default_bond_length() -> f64 {
    -1.0
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ReptationConfig {
    /// Length of the regrown bond. Negative values reuse the chain's first bond length.
    #[serde(default = "default_bond_length")]
    pub bond_length: f64,
}

impl Default for ReptationConfig {
    fn default() -> Self {
        Self {
            bond_length: default_bond_length(),
        }
    }
}

/// Slithering-snake move: the chain advances by one bond at a random end.
pub struct Reptation {
    config: ReptationConfig,
    moved: Option<Moved>,
    msq: f64,
    stats: AcceptanceTracker<String>,
}

impl Reptation {
    pub fn new(config: ReptationConfig) -> Self {
        Self {
            config,
            moved: None,
            msq: 0.0,
            stats: AcceptanceTracker::new(),
        }
    }
}

impl MoveKernel for Reptation {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        let Some(g) = pick_chain(trial) else {
            return Ok(Proposal::Skipped);
        };
        let group = trial.space.groups()[g].clone();
        if group.len < 2 {
            return Ok(Proposal::Skipped);
        }
        let forward = trial.rng.half() > 0.0;
        let direction = trial.rng.unit_vector();

        let space = &mut *trial.space;
        let bond = if self.config.bond_length >= 0.0 {
            self.config.bond_length
        } else {
            let p = space.current();
            space.geometry().distance(&p[group.start].position, &p[group.start + 1].position)
        };

        let (first, last) = (group.start, group.end() - 1);
        let head = if forward { first } else { last };
        let mut grown = space.trial()[head].position + direction * bond;
        space.trial_geometry().boundary(&mut grown);

        let positions: Vec<_> = space.trial()[group.range()].iter().map(|p| p.position).collect();
        for i in group.range() {
            let k = i - group.start;
            let shifted = if forward { k.checked_sub(1) } else { Some(k + 1).filter(|&k| k < group.len) };
            space.trial[i].position = shifted.map_or(grown, |k| positions[k]);
        }
        debug_assert_eq!(space.trial()[head].position, grown);

        space.update_trial_mass_center(g);
        trial.change.add_particles(g, group.range());
        self.msq = moved_cm_msq(trial, g);
        self.moved = Some(Moved {
            group: g,
            indices: group.range().collect(),
        });
        Ok(Proposal::Proposed)
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        Ok(self
            .moved
            .as_ref()
            .map_or(EnergyChange::new(0.0), |moved| polymer_energy(trial, moved)))
    }

    fn accept(&mut self, trial: &mut Trial<'_>) {
        trial.space.accept_change(trial.change);
        if let Some(moved) = self.moved.take() {
            let name = trial.space.topology().molecule_name(trial.space.groups()[moved.group].kind);
            self.stats.accept(&name.to_string(), self.msq);
        }
    }

    fn reject(&mut self, trial: &mut Trial<'_>) {
        trial.space.reject_change(trial.change);
        if let Some(moved) = self.moved.take() {
            let name = trial.space.topology().molecule_name(trial.space.groups()[moved.group].kind);
            self.stats.reject(&name.to_string());
        }
    }

    fn describe(&self) -> String {
        if self.config.bond_length >= 0.0 {
            format!("reptation, bond length {}", self.config.bond_length)
        } else {
            "reptation, bond length from first bond".to_string()
        }
    }

    fn report(&self) -> KernelReport {
        KernelReport::default()
            .value("mass-center-msd", self.stats.total().msd.mean())
            .acceptance(self.stats.named())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy::reference::Ideal;
    use crate::core::models::change::Change;
    use crate::core::models::particle::Particle;
    use crate::core::models::species::{MoleculeKind, Species, Topology};
    use crate::core::space::Space;
    use crate::core::space::geometry::Geometry;
    use crate::core::utils::random::RandomSource;
    use crate::engine::protocol::Move;
    use crate::engine::protocol::tests::run_checked;
    use nalgebra::{Point3, Vector3};

    /// One straight chain of `n` monomers with unit bonds along x.
    fn chain(n: usize) -> Space {
        let mut topology = Topology::new();
        let mut b = Species::new("B");
        b.radius = 0.4;
        let id = topology.add_species(b.clone());
        let offset = (n as f64 - 1.0) / 2.0;
        let structure: Vec<Vector3<f64>> = (0..n).map(|k| Vector3::new(k as f64 - offset, 0.0, 0.0)).collect();
        let kind = topology.add_molecule(MoleculeKind::molecular("chain", vec![id; n], structure.clone()));
        let mut space = Space::new(topology, Geometry::cube(50.0));
        let particles = structure
            .iter()
            .map(|r| Particle::from_species(id, &b, Point3::from(*r)))
            .collect();
        space.add_group(kind, particles);
        space
    }

    fn assert_unit_bonds(space: &Space) {
        let p = space.current();
        for w in p.windows(2) {
            let d = space.geometry().distance(&w[0].position, &w[1].position);
            assert!((d - 1.0).abs() < 1e-9, "bond {d}");
        }
    }

    #[test]
    fn crankshaft_and_pivot_preserve_bond_lengths() {
        for rule in [SegmentRule::CrankShaft, SegmentRule::Pivot] {
            let mut space = chain(8);
            let kernel = SegmentRotation::new(rule, SegmentConfig::new(3.0)).unwrap();
            let mut mv = Move::new("segment", Box::new(kernel), 17);
            run_checked(&mut mv, &mut space, &Ideal, 300);
            assert_unit_bonds(&space);
            assert_eq!(mv.statistics().acceptance, 1.0);
        }
    }

    #[test]
    fn crankshaft_rotates_only_interior_monomers() {
        let mut space = chain(5);
        let mut config = SegmentConfig::new(2.0);
        config.minlen = 3;
        let mut kernel = SegmentRotation::new(SegmentRule::CrankShaft, config).unwrap();
        let mut rng = RandomSource::from_seed(3);
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
        // Only the segment 0..4 has three interior monomers, so both ends stay.
        assert_eq!(space.current()[0].position, Point3::new(-2.0, 0.0, 0.0));
        assert_eq!(space.current()[4].position, Point3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn chains_too_short_for_the_segment_are_skipped() {
        let mut space = chain(2);
        let kernel = SegmentRotation::new(SegmentRule::CrankShaft, SegmentConfig::new(1.0)).unwrap();
        let mut mv = Move::new("crankshaft", Box::new(kernel), 1);
        run_checked(&mut mv, &mut space, &Ideal, 10);
        assert_eq!(mv.statistics().skipped, 10);
    }

    #[test]
    fn maxlen_below_minlen_is_rejected() {
        let mut config = SegmentConfig::new(1.0);
        config.minlen = 4;
        config.maxlen = Some(2);
        assert!(SegmentRotation::new(SegmentRule::Pivot, config).is_err());
    }

    #[test]
    fn reptation_keeps_measured_bond_length() {
        let mut space = chain(6);
        let mut mv = Move::new("reptate", Box::new(Reptation::new(ReptationConfig::default())), 9);
        run_checked(&mut mv, &mut space, &Ideal, 200);
        assert_unit_bonds(&space);
        assert_eq!(mv.statistics().acceptance, 1.0);
    }

    #[test]
    fn reptation_shifts_positions_but_not_species() {
        let mut space = chain(4);
        let before: Vec<Point3<f64>> = space.current().iter().map(|p| p.position).collect();
        let mut kernel = Reptation::new(ReptationConfig { bond_length: 2.0 });
        let mut rng = RandomSource::from_seed(12);
        let mut change = Change::new();
        let mut trial = Trial {
            space: &mut space,
            hamiltonian: &Ideal,
            rng: &mut rng,
            change: &mut change,
            target: None,
        };
        kernel.propose(&mut trial).unwrap();
        kernel.accept(&mut trial);

        let after: Vec<Point3<f64>> = space.current().iter().map(|p| p.position).collect();
        let shifted_forward = after[1..] == before[..3];
        let shifted_backward = after[..3] == before[1..];
        assert!(shifted_forward || shifted_backward);
        let (new_end, old_end) = if shifted_forward { (after[0], before[0]) } else { (after[3], before[3]) };
        assert!((space.geometry().distance(&new_end, &old_end) - 2.0).abs() < 1e-9);
        space.verify().unwrap();
    }

    #[test]
    fn single_monomer_cannot_reptate() {
        let mut space = chain(1);
        let mut mv = Move::new("reptate", Box::new(Reptation::new(ReptationConfig::default())), 9);
        run_checked(&mut mv, &mut space, &Ideal, 5);
        assert_eq!(mv.statistics().skipped, 5);
    }
}
