//! Correlated cluster moves.
//!
//! A primary molecule is moved together with every candidate that joins it according to a
//! [`ClusterProbability`] rule. Because membership depends on the configuration, the reverse move
//! would in general build a different cluster. Detailed balance is restored by the bias factor of
//! Frenkel and Smit: for every candidate left out of the cluster, the ratio of its probability of
//! staying out in the trial and in the current configuration.

use super::{MIN_DISPLACEMENT, first_bound, masked_displacement, random_rotation};
use crate::core::energy::change_energy;
use crate::core::models::ids::MoleculeId;
use crate::core::models::particle::Particle;
use crate::core::models::species::Topology;
use crate::core::space::Space;
use crate::core::space::geometry::Geometry;
use crate::core::utils::average::Average;
use crate::core::utils::random::RandomSource;
use crate::engine::acceptance::AcceptanceTracker;
use crate::engine::config::ConfigError;
use crate::engine::error::TrialError;
use crate::engine::protocol::{EnergyChange, KernelReport, MoveKernel, Proposal, Trial};
use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use std::collections::HashSet;
use std::f64::consts::PI;
use tracing::debug;

/// Bias factors below this reject the trial without evaluating the energy.
const MIN_BIAS: f64 = 1e-7;

/// `1 - P` below this marks a candidate that should have joined the cluster.
const CERTAIN: f64 = 1e-9;

/// Probability that `candidate` joins a cluster because of the anchor particles.
pub trait ClusterProbability: Send {
    fn probability(&self, geometry: &Geometry, particles: &[Particle], anchor: &[usize], candidate: usize) -> f64;
}

/// Joins with certainty if any anchor particle lies within `threshold` of the candidate's surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceThreshold {
    pub threshold: f64,
}

impl ClusterProbability for DistanceThreshold {
    fn probability(&self, geometry: &Geometry, particles: &[Particle], anchor: &[usize], candidate: usize) -> f64 {
        let c = &particles[candidate];
        let near = anchor.iter().any(|&j| {
            let a = &particles[j];
            let reach = self.threshold + a.radius + c.radius;
            geometry.sqdist(&a.position, &c.position) < reach * reach
        });
        if near { 1.0 } else { 0.0 }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ClusterConfig {
    /// Atomic molecule whose particles are candidates. Without it, other molecules are.
    #[serde(default)]
    pub pool: Option<String>,
    /// Molecule kinds that never join a cluster.
    #[serde(default)]
    pub static_molecules: Vec<String>,
    /// New members act as anchors themselves.
    #[serde(default)]
    pub transitive: bool,
    /// Fallback inclusion distance for targets without a threshold.
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub dp: f64,
    #[serde(default)]
    pub dprot: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum CandidateMode {
    Atoms { pool: MoleculeId },
    Molecules { excluded: Vec<MoleculeId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Candidate {
    Atom(usize),
    Molecule(usize),
}

/// Members of the cluster built for the current trial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterSet {
    /// Particle index lists whose neighbours were tested for membership.
    pub anchors: Vec<Vec<usize>>,
    /// Molecular groups, the primary first.
    pub groups: Vec<usize>,
    /// Free particles from the atomic pool.
    pub atoms: Vec<usize>,
}

impl ClusterSet {
    pub fn len(&self) -> usize {
        self.groups.len() + self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.atoms.is_empty()
    }

    fn particles<'a>(&'a self, space: &'a Space) -> impl Iterator<Item = usize> + 'a {
        self.groups
            .iter()
            .filter_map(|&g| space.group(g))
            .flat_map(|g| g.range())
            .chain(self.atoms.iter().copied())
    }
}

pub struct Cluster {
    config: ClusterConfig,
    mode: CandidateMode,
    rule: Option<Box<dyn ClusterProbability>>,
    set: Option<ClusterSet>,
    threshold: f64,
    primary: String,
    translation: f64,
    bias: f64,
    size: Average,
    bias_average: Average,
    fallbacks: u64,
    stats: AcceptanceTracker<String>,
}

impl Cluster {
    pub fn new(config: ClusterConfig, topology: &Topology) -> Result<Self, ConfigError> {
        let resolve = |name: &String| {
            topology
                .molecule_by_name(name)
                .ok_or_else(|| ConfigError::UnknownMolecule(name.clone()))
        };
        let mode = match &config.pool {
            Some(pool) => {
                let pool = resolve(pool)?;
                if !topology.molecule(pool).is_some_and(|m| m.atomic) {
                    return Err(ConfigError::invalid("cluster", "the candidate pool must be atomic"));
                }
                CandidateMode::Atoms { pool }
            }
            None => CandidateMode::Molecules {
                excluded: config.static_molecules.iter().map(resolve).collect::<Result<_, _>>()?,
            },
        };
        Ok(Self {
            config,
            mode,
            rule: None,
            set: None,
            threshold: 0.0,
            primary: String::new(),
            translation: 0.0,
            bias: 1.0,
            size: Average::new(),
            bias_average: Average::new(),
            fallbacks: 0,
            stats: AcceptanceTracker::new(),
        })
    }

    /// Replaces the distance-threshold rule.
    pub fn with_rule(mut self, rule: Box<dyn ClusterProbability>) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn cluster(&self) -> Option<&ClusterSet> {
        self.set.as_ref()
    }

    /// Bias factor of the last evaluated trial.
    pub fn last_bias(&self) -> f64 {
        self.bias
    }

    fn probability(&self, geometry: &Geometry, particles: &[Particle], anchor: &[usize], candidate: usize) -> f64 {
        match &self.rule {
            Some(rule) => rule.probability(geometry, particles, anchor, candidate),
            None => DistanceThreshold {
                threshold: self.threshold,
            }
            .probability(geometry, particles, anchor, candidate),
        }
    }

    /// Joint probability that `candidate` joins because of `anchor`.
    fn join_probability(
        &self,
        space: &Space,
        geometry: &Geometry,
        particles: &[Particle],
        anchor: &[usize],
        candidate: Candidate,
    ) -> f64 {
        match candidate {
            Candidate::Atom(i) => self.probability(geometry, particles, anchor, i),
            Candidate::Molecule(g) => {
                let stay_out: f64 = space.groups()[g]
                    .range()
                    .map(|t| 1.0 - self.probability(geometry, particles, anchor, t))
                    .product();
                1.0 - stay_out
            }
        }
    }

    fn candidates(&self, space: &Space, primary: usize) -> Vec<Candidate> {
        match &self.mode {
            CandidateMode::Atoms { pool } => space
                .find_groups(*pool)
                .filter_map(|g| space.group(g))
                .flat_map(|g| g.range())
                .map(Candidate::Atom)
                .collect(),
            CandidateMode::Molecules { excluded } => space
                .groups()
                .iter()
                .enumerate()
                .filter(|&(g, group)| {
                    g != primary && !group.atomic && !group.is_empty() && !excluded.contains(&group.kind)
                })
                .map(|(g, _)| Candidate::Molecule(g))
                .collect(),
        }
    }

    fn indices(space: &Space, candidate: Candidate) -> Vec<usize> {
        match candidate {
            Candidate::Atom(i) => vec![i],
            Candidate::Molecule(g) => space.groups()[g].range().collect(),
        }
    }

    /// Grows the cluster around `primary` in the current configuration.
    fn build(&self, space: &Space, primary: usize, rng: &mut RandomSource) -> ClusterSet {
        let mut set = ClusterSet {
            anchors: vec![space.groups()[primary].range().collect()],
            groups: vec![primary],
            atoms: Vec::new(),
        };
        let mut pending: Vec<Candidate> = self.candidates(space, primary);
        let mut next = 0;
        while next < set.anchors.len() {
            let anchor = set.anchors[next].clone();
            next += 1;
            let mut left = Vec::with_capacity(pending.len());
            for candidate in pending {
                let p = self.join_probability(space, space.geometry(), space.current(), &anchor, candidate);
                let joins = p >= 1.0 || (p > 0.0 && rng.uniform() < p);
                if !joins {
                    left.push(candidate);
                    continue;
                }
                match candidate {
                    Candidate::Atom(i) => set.atoms.push(i),
                    Candidate::Molecule(g) => set.groups.push(g),
                }
                if self.config.transitive {
                    set.anchors.push(Self::indices(space, candidate));
                }
            }
            pending = left;
        }
        set
    }

    /// Product over anchors and left-out candidates of `(1 - P_trial) / (1 - P_current)`.
    fn bias_factor(&self, space: &Space, set: &ClusterSet) -> f64 {
        let primary = set.groups[0];
        let members: HashSet<Candidate> = set
            .groups
            .iter()
            .map(|&g| Candidate::Molecule(g))
            .chain(set.atoms.iter().map(|&i| Candidate::Atom(i)))
            .collect();
        let outsiders: Vec<Candidate> = self
            .candidates(space, primary)
            .into_iter()
            .filter(|c| !members.contains(c))
            .collect();

        let mut bias = 1.0;
        for anchor in &set.anchors {
            for &candidate in &outsiders {
                let old = self.join_probability(space, space.geometry(), space.current(), anchor, candidate);
                let new = self.join_probability(space, space.trial_geometry(), space.trial(), anchor, candidate);
                if old == new {
                    continue;
                }
                if 1.0 - old < CERTAIN {
                    return f64::INFINITY;
                }
                bias *= (1.0 - new) / (1.0 - old);
            }
        }
        bias
    }

    /// Minimum-image centroid of all members about the primary's mass center, and the largest
    /// member distance from it.
    fn pivot(space: &Space, set: &ClusterSet) -> (Point3<f64>, f64) {
        let geo = space.trial_geometry();
        let origin = space.groups()[set.groups[0]].cm_trial;
        let offsets: Vec<Vector3<f64>> = set
            .particles(space)
            .map(|i| geo.vdist(&space.trial()[i].position, &origin))
            .collect();
        let mean = offsets.iter().sum::<Vector3<f64>>() / offsets.len().max(1) as f64;
        let mut pivot = origin + mean;
        geo.boundary(&mut pivot);
        let radius = offsets.iter().map(|d| (d - mean).norm()).fold(0.0, f64::max);
        (pivot, radius)
    }
}

impl MoveKernel for Cluster {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        let Some(target) = trial.target else {
            return Ok(Proposal::Skipped);
        };
        let Some(primary) = trial.space.random_group(target.molecule, trial.rng) else {
            return Ok(Proposal::Skipped);
        };
        if trial.space.groups()[primary].is_empty() || trial.space.groups()[primary].atomic {
            return Ok(Proposal::Skipped);
        }
        self.threshold = first_bound(&[target.threshold, self.config.threshold]);
        let dp = first_bound(&[target.dp1, self.config.dp]);
        let dprot = first_bound(&[target.dp2, self.config.dprot]).min(4.0 * PI);

        let set = self.build(trial.space, primary, trial.rng);
        let (pivot, radius) = Self::pivot(trial.space, &set);
        let fallback = trial
            .space
            .trial_geometry()
            .periodic_length()
            .is_some_and(|len| 2.0 * radius > 0.5 * len);
        if fallback {
            self.fallbacks += 1;
            debug!(size = set.len(), radius, "Cluster too large to rotate; translating only.");
        }

        let space = &mut *trial.space;
        if dprot > MIN_DISPLACEMENT && !fallback {
            let (rotation, _) = random_rotation(trial.rng, dprot);
            for &g in &set.groups {
                space.rotate_group(g, &pivot, &rotation);
            }
            for &i in &set.atoms {
                space.rotate_particle(i, &pivot, &rotation);
            }
        }
        let displacement = masked_displacement(trial.rng, &target.direction, dp);
        for &g in &set.groups {
            space.translate_group(g, &displacement);
            trial.change.add_rigid(g);
        }
        for &i in &set.atoms {
            let p = &mut space.trial[i];
            p.position += displacement;
            space.trial_geometry.boundary(&mut p.position);
            if let Some(g) = space.group_of(i) {
                trial.change.add_particle(g, i);
            }
        }

        self.primary = target.name.clone();
        self.translation = displacement.norm_squared();
        self.size.push(set.len() as f64);
        self.set = Some(set);
        Ok(Proposal::Proposed)
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        let Some(set) = &self.set else {
            return Ok(EnergyChange::new(0.0));
        };
        if trial.space.collides(set.particles(trial.space)) {
            self.bias = 1.0;
            return Ok(EnergyChange::infinite());
        }
        let bias = self.bias_factor(trial.space, set);
        self.bias = bias;
        if bias.is_finite() {
            self.bias_average.push(bias);
        }
        if !(bias >= MIN_BIAS) || bias.is_infinite() {
            return Ok(EnergyChange::infinite());
        }
        let du = change_energy(trial.hamiltonian, trial.space, trial.change);
        Ok(EnergyChange::with_reported(du - bias.ln(), du))
    }

    fn accept(&mut self, trial: &mut Trial<'_>) {
        trial.space.accept_change(trial.change);
        self.stats.accept(&self.primary, self.translation);
        self.set = None;
    }

    fn reject(&mut self, trial: &mut Trial<'_>) {
        trial.space.reject_change(trial.change);
        self.stats.reject(&self.primary);
        self.set = None;
    }

    fn describe(&self) -> String {
        let candidates = match (&self.mode, &self.config.pool) {
            (CandidateMode::Atoms { .. }, Some(pool)) => format!("particles of '{pool}'"),
            _ => "other molecules".to_string(),
        };
        format!(
            "cluster move over {candidates}{}",
            if self.config.transitive { ", transitive" } else { "" }
        )
    }

    fn report(&self) -> KernelReport {
        KernelReport::default()
            .value("average-size", self.size.mean())
            .value("average-bias", self.bias_average.mean())
            .value("translation-only-fallbacks", self.fallbacks as f64)
            .acceptance(self.stats.named())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy::Hamiltonian;
    use crate::core::energy::reference::{HardSphere, Ideal};
    use crate::core::models::change::Change;
    use crate::core::models::species::{MoleculeKind, Species};
    use crate::core::space::tests::salt_and_dimers;
    use crate::engine::config::{Target, TargetConfig};
    use crate::engine::protocol::Move;
    use crate::engine::protocol::tests::run_checked;

    fn dimer_target(space: &Space, threshold: f64, dp: f64, dprot: f64) -> Target {
        let mut config = TargetConfig::new("dimer");
        config.threshold = threshold;
        config.dp = dp;
        config.dprot = dprot;
        Target::resolve(&config, space.topology()).unwrap()
    }

    fn pool_config() -> ClusterConfig {
        ClusterConfig {
            pool: Some("salt".to_string()),
            ..ClusterConfig::default()
        }
    }

    /// One dimer at the origin and a salt pool with one ion next to it and one far away.
    fn dimer_with_ions(side: f64) -> Space {
        let mut topology = Topology::new();
        let mut m = Species::new("M");
        m.radius = 0.5;
        let mut na = Species::new("Na");
        na.radius = 0.5;
        let m_id = topology.add_species(m.clone());
        let na_id = topology.add_species(na.clone());
        let dimer = topology.add_molecule(MoleculeKind::molecular(
            "dimer",
            vec![m_id, m_id],
            vec![Vector3::new(-0.5, 0.0, 0.0), Vector3::new(0.5, 0.0, 0.0)],
        ));
        let salt = topology.add_molecule(MoleculeKind::atomic("salt", vec![na_id]));
        let mut space = Space::new(topology, Geometry::cube(side));
        space.add_group(
            dimer,
            vec![
                Particle::from_species(m_id, &m, Point3::new(-0.5, 0.0, 0.0)),
                Particle::from_species(m_id, &m, Point3::new(0.5, 0.0, 0.0)),
            ],
        );
        space.add_group(
            salt,
            vec![
                Particle::from_species(na_id, &na, Point3::new(0.0, 1.5, 0.0)),
                Particle::from_species(na_id, &na, Point3::new(0.0, -side / 3.0, 0.0)),
            ],
        );
        space
    }

    fn propose_once(kernel: &mut Cluster, space: &mut Space, target: &Target, seed: u64) -> EnergyChange {
        let mut rng = RandomSource::from_seed(seed);
        let mut change = Change::new();
        let mut trial = Trial {
            space,
            hamiltonian: &Ideal,
            rng: &mut rng,
            change: &mut change,
            target: Some(target),
        };
        assert_eq!(kernel.propose(&mut trial).unwrap(), Proposal::Proposed);
        let energy = kernel.energy_change(&mut trial).unwrap();
        kernel.accept(&mut trial);
        energy
    }

    #[test]
    fn nearby_ion_joins_and_moves_rigidly() {
        let mut space = dimer_with_ions(40.0);
        let target = dimer_target(&space, 0.6, 2.0, 1.0);
        let mut kernel = Cluster::new(pool_config(), space.topology()).unwrap();
        let before = space.geometry().distance(&space.current()[0].position, &space.current()[2].position);

        propose_once(&mut kernel, &mut space, &target, 3);

        let after = space.geometry().distance(&space.current()[0].position, &space.current()[2].position);
        assert!((before - after).abs() < 1e-9);
        assert_eq!(kernel.report().values["average-size"], 2.0);
        space.verify().unwrap();
    }

    #[test]
    fn bias_is_exactly_one_when_no_outsider_changes_probability() {
        let mut space = dimer_with_ions(40.0);
        let target = dimer_target(&space, 0.6, 0.5, 0.3);
        let mut kernel = Cluster::new(pool_config(), space.topology()).unwrap();
        let energy = propose_once(&mut kernel, &mut space, &target, 8);
        assert_eq!(kernel.last_bias(), 1.0);
        assert_eq!(energy.du, energy.reported.unwrap());
    }

    #[test]
    fn distance_threshold_counts_radii() {
        let space = dimer_with_ions(40.0);
        let rule = DistanceThreshold { threshold: 0.6 };
        let geo = space.geometry();
        assert_eq!(rule.probability(geo, space.current(), &[0, 1], 2), 1.0);
        assert_eq!(rule.probability(geo, space.current(), &[0, 1], 3), 0.0);
    }

    #[test]
    fn oversized_cluster_falls_back_to_translation() {
        let mut space = salt_and_dimers(1.8, 0, 1);
        let target = dimer_target(&space, 0.0, 0.2, 2.0);
        let config = ClusterConfig::default();
        let mut kernel = Cluster::new(config, space.topology()).unwrap();
        let bond = |s: &Space| s.geometry().vdist(&s.current()[1].position, &s.current()[0].position);
        let before = bond(&space);

        propose_once(&mut kernel, &mut space, &target, 5);

        assert!((bond(&space) - before).norm() < 1e-9);
        assert_eq!(kernel.report().values["translation-only-fallbacks"], 1.0);
    }

    #[test]
    fn molecular_clusters_keep_space_consistent() {
        let mut space = salt_and_dimers(25.0, 6, 4);
        let target = dimer_target(&space, 2.5, 1.0, 0.5);
        let config = ClusterConfig {
            transitive: true,
            ..ClusterConfig::default()
        };
        let kernel = Cluster::new(config, space.topology()).unwrap();
        let mut mv = Move::new("cluster", Box::new(kernel), 31)
            .with_targets(vec![target])
            .unwrap();
        run_checked(&mut mv, &mut space, &HardSphere, 300);
        assert!(mv.statistics().details.values["average-size"] >= 1.0);
    }

    /// Joins with probability `exp(-d)`, `d` being the shortest anchor-candidate distance.
    struct Decay;

    impl ClusterProbability for Decay {
        fn probability(&self, geometry: &Geometry, particles: &[Particle], anchor: &[usize], candidate: usize) -> f64 {
            let d = anchor
                .iter()
                .map(|&j| geometry.distance(&particles[j].position, &particles[candidate].position))
                .fold(f64::INFINITY, f64::min);
            (-d).exp()
        }
    }

    /// External field along y, so that a rigid shift by `dy` costs `dy` per particle.
    struct Field;

    impl Hamiltonian for Field {
        fn pair(&self, _geometry: &Geometry, _a: &Particle, _b: &Particle) -> f64 {
            0.0
        }

        fn external(&self, _geometry: &Geometry, p: &Particle) -> f64 {
            p.position.y
        }
    }

    /// Shifts the dimer of [`dimer_with_ions`] in the trial configuration and registers it as a
    /// lone cluster, as a proposal that recruited nobody would.
    fn shifted_dimer(kernel: &mut Cluster, space: &mut Space, change: &mut Change, shift: Vector3<f64>) {
        space.translate_group(0, &shift);
        change.add_rigid(0);
        kernel.set = Some(ClusterSet {
            anchors: vec![vec![0, 1]],
            groups: vec![0],
            atoms: Vec::new(),
        });
    }

    #[test]
    fn smooth_rule_bias_is_the_ratio_of_staying_out() {
        let mut space = dimer_with_ions(40.0);
        let mut kernel = Cluster::new(pool_config(), space.topology()).unwrap().with_rule(Box::new(Decay));
        let mut change = Change::new();
        shifted_dimer(&mut kernel, &mut space, &mut change, Vector3::new(0.0, 1.0, 0.0));

        // Closest dimer site to each ion, before and after the shift by one along y.
        let far: f64 = 40.0 / 3.0;
        let near_old = (0.25f64 + 1.5 * 1.5).sqrt();
        let near_new = (0.25f64 + 0.5 * 0.5).sqrt();
        let far_old = (0.25 + far * far).sqrt();
        let far_new = (0.25 + (far + 1.0) * (far + 1.0)).sqrt();
        let stay = |d: f64| 1.0 - (-d).exp();
        let expected = stay(near_new) / stay(near_old) * stay(far_new) / stay(far_old);

        let set = kernel.set.clone().unwrap();
        let bias = kernel.bias_factor(&space, &set);
        assert!((bias - expected).abs() < 1e-12, "bias {bias} vs {expected}");
        assert!(bias < 1.0);
    }

    #[test]
    fn bias_enters_the_weight_but_not_the_reported_energy() {
        let mut space = dimer_with_ions(40.0);
        let mut kernel = Cluster::new(pool_config(), space.topology()).unwrap().with_rule(Box::new(Decay));
        let mut change = Change::new();
        shifted_dimer(&mut kernel, &mut space, &mut change, Vector3::new(0.0, 1.0, 0.0));
        let set = kernel.set.clone().unwrap();
        let bias = kernel.bias_factor(&space, &set);

        let mut rng = RandomSource::from_seed(1);
        let mut trial = Trial {
            space: &mut space,
            hamiltonian: &Field,
            rng: &mut rng,
            change: &mut change,
            target: None,
        };
        let energy = kernel.energy_change(&mut trial).unwrap();
        let reported = energy.reported.unwrap();
        assert!((reported - 2.0).abs() < 1e-12);
        assert!((energy.du - (reported - bias.ln())).abs() < 1e-12);
        assert_eq!(kernel.last_bias(), bias);
    }

    #[test]
    fn vanishing_bias_forces_rejection() {
        let mut space = dimer_with_ions(40.0);
        let mut kernel = Cluster::new(pool_config(), space.topology()).unwrap().with_rule(Box::new(Decay));
        let mut change = Change::new();
        // Lands the second dimer site on the nearby ion, which then should have joined.
        shifted_dimer(&mut kernel, &mut space, &mut change, Vector3::new(-0.5, 1.5, 0.0));

        let mut rng = RandomSource::from_seed(1);
        let mut trial = Trial {
            space: &mut space,
            hamiltonian: &Field,
            rng: &mut rng,
            change: &mut change,
            target: None,
        };
        let energy = kernel.energy_change(&mut trial).unwrap();
        assert!(kernel.last_bias() < MIN_BIAS);
        assert_eq!(energy.du, f64::INFINITY);
        kernel.reject(&mut trial);
        space.verify().unwrap();
    }

    #[test]
    fn static_molecules_must_exist() {
        let space = salt_and_dimers(20.0, 0, 1);
        let config = ClusterConfig {
            static_molecules: vec!["membrane".to_string()],
            ..ClusterConfig::default()
        };
        assert!(matches!(
            Cluster::new(config, space.topology()),
            Err(ConfigError::UnknownMolecule(name)) if name == "membrane"
        ));
    }
}
