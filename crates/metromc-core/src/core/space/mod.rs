//! # Configuration Store
//!
//! [`Space`] owns the two index-aligned particle arrays every move works on: the accepted
//! *current* configuration and the *trial* configuration a move perturbs. Outside of a running
//! trial both arrays, both geometries and both mass centers of every group are identical.
//!
//! Particles of atomic groups are additionally indexed per species by an [`IndexTracker`], which
//! grand-canonical moves use to draw particles for deletion. Trackers are relabelled whenever an
//! insertion or deletion shifts absolute indices, so every species stays consistent.

pub mod geometry;
pub mod tracker;

use crate::core::models::change::{Change, GroupChange};
use crate::core::models::group::Group;
use crate::core::models::ids::{MoleculeId, SpeciesId};
use crate::core::models::particle::Particle;
use crate::core::models::species::Topology;
use crate::core::utils::random::RandomSource;
use geometry::Geometry;
use nalgebra::{Point3, UnitQuaternion, Vector3};
use slotmap::SecondaryMap;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use tracker::IndexTracker;

/// Largest tolerated distance between a stored mass center and the recomputed one.
const MASS_CENTER_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error, PartialEq)]
pub enum InvariantError {
    #[error("Current and trial configurations differ at particle {0}")]
    Desynchronized(usize),
    #[error("Current and trial geometries differ")]
    GeometryMismatch,
    #[error("Mass center of group {group} is off by {deviation:.3e}")]
    MassCenter { group: usize, deviation: f64 },
    #[error("Species tracker is stale at particle {0}")]
    StaleTracker(usize),
    #[error("Change record was not cleared after the cycle")]
    PendingChange,
    #[error("Energy drift of {drift:.4e} kT exceeds the tolerance")]
    Drift { drift: f64 },
}

#[derive(Debug, Clone)]
pub struct Space {
    topology: Topology,
    pub(crate) geometry: Geometry,
    pub(crate) trial_geometry: Geometry,
    pub(crate) current: Vec<Particle>,
    pub(crate) trial: Vec<Particle>,
    pub(crate) groups: Vec<Group>,
    trackers: SecondaryMap<SpeciesId, IndexTracker>,
}

impl Space {
    pub fn new(topology: Topology, geometry: Geometry) -> Self {
        let trackers = topology
            .species_iter()
            .map(|(id, _)| (id, IndexTracker::new()))
            .collect();
        Self {
            topology,
            trial_geometry: geometry.clone(),
            geometry,
            current: Vec::new(),
            trial: Vec::new(),
            groups: Vec::new(),
            trackers,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn trial_geometry(&self) -> &Geometry {
        &self.trial_geometry
    }

    pub fn current(&self) -> &[Particle] {
        &self.current
    }

    pub fn trial(&self) -> &[Particle] {
        &self.trial
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, g: usize) -> Option<&Group> {
        self.groups.get(g)
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn tracker(&self, species: SpeciesId) -> Option<&IndexTracker> {
        self.trackers.get(species)
    }

    /// Number of free (atomic-group) particles of `species`.
    pub fn free_count(&self, species: SpeciesId) -> usize {
        self.tracker(species).map_or(0, IndexTracker::len)
    }

    /// Appends a new group of kind `kind` holding `particles` and returns its index.
    pub fn add_group(&mut self, kind: MoleculeId, particles: Vec<Particle>) -> usize {
        let atomic = self.topology.molecule(kind).is_some_and(|m| m.atomic);
        let start = self.current.len();
        let mut group = Group::new(kind, start, particles.len(), atomic);
        for mut p in particles {
            self.geometry.boundary(&mut p.position);
            if atomic {
                self.track(p.species, self.current.len());
            }
            self.trial.push(p.clone());
            self.current.push(p);
        }
        if let Some(cm) = self.geometry.centroid(self.current[group.range()].iter().map(|p| &p.position)) {
            group.cm = cm;
            group.cm_trial = cm;
        }
        self.groups.push(group);
        self.groups.len() - 1
    }

    pub fn find_groups(&self, kind: MoleculeId) -> impl Iterator<Item = usize> + '_ {
        self.groups
            .iter()
            .enumerate()
            .filter(move |(_, g)| g.kind == kind)
            .map(|(i, _)| i)
    }

    /// Uniformly drawn group of `kind`. Consumes one draw even when no group exists.
    pub fn random_group(&self, kind: MoleculeId, rng: &mut RandomSource) -> Option<usize> {
        let candidates: Vec<usize> = self.find_groups(kind).collect();
        rng.pick(&candidates).copied()
    }

    /// Index of the group owning particle `index`.
    pub fn group_of(&self, index: usize) -> Option<usize> {
        let g = self.groups.partition_point(|g| g.end() <= index);
        self.groups.get(g).filter(|group| group.contains(index)).map(|_| g)
    }

    /// Number of independently moving units: molecular groups plus free particles.
    pub fn molecule_count(&self) -> usize {
        self.groups
            .iter()
            .map(|g| if g.atomic { g.len } else { 1 })
            .sum()
    }

    /// Mass center of group `g` recomputed from the current or trial positions.
    pub fn mass_center(&self, g: usize, trial: bool) -> Option<Point3<f64>> {
        let group = self.groups.get(g)?;
        let (particles, geometry) = if trial {
            (&self.trial, &self.trial_geometry)
        } else {
            (&self.current, &self.geometry)
        };
        geometry.centroid(particles[group.range()].iter().map(|p| &p.position))
    }

    pub fn update_trial_mass_center(&mut self, g: usize) {
        if let Some(cm) = self.mass_center(g, true) {
            self.groups[g].cm_trial = cm;
        }
    }

    /// Appends `particles` to the end of group `g` in both configurations.
    ///
    /// Returns the absolute indices of the new particles. Every group stored behind `g` shifts
    /// by the number of inserted particles.
    pub fn insert_into_group(&mut self, g: usize, particles: Vec<Particle>) -> Vec<usize> {
        let n = particles.len();
        let pos = self.groups[g].end();
        self.relabel_trackers(|i| Some(if i >= pos { i + n } else { i }));

        let mut inserted = Vec::with_capacity(n);
        for (k, mut p) in particles.into_iter().enumerate() {
            self.geometry.boundary(&mut p.position);
            self.current.insert(pos + k, p.clone());
            self.trial.insert(pos + k, p);
            inserted.push(pos + k);
        }
        self.groups[g].len += n;
        for group in &mut self.groups[g + 1..] {
            group.start += n;
        }
        if self.groups[g].atomic {
            for &i in &inserted {
                self.track(self.current[i].species, i);
            }
        }
        inserted
    }

    /// Removes the given particles from both configurations.
    ///
    /// Inside each group the erased particles are first swapped to the group's tail, so the
    /// surviving members of a group may change order. Storage, group offsets and every species
    /// tracker are then compacted in a single pass.
    pub fn erase_particles(&mut self, indices: &[usize]) {
        let mut by_group: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &i in indices {
            if let Some(g) = self.group_of(i) {
                by_group.entry(g).or_default().push(i);
            }
        }
        if by_group.is_empty() {
            return;
        }

        let mut cuts = Vec::with_capacity(by_group.len());
        let mut erased = HashSet::new();
        // Position -> original index, for survivors swapped out of a group's tail.
        let mut origin: HashMap<usize, usize> = HashMap::new();
        let mut dead = vec![false; self.current.len()];
        for (&g, members) in &mut by_group {
            members.sort_unstable_by(|a, b| b.cmp(a));
            members.dedup();
            let end = self.groups[g].end();
            let mut tail = end;
            for &index in members.iter() {
                tail -= 1;
                if index != tail {
                    self.current.swap(index, tail);
                    self.trial.swap(index, tail);
                    let survivor = origin.remove(&tail).unwrap_or(tail);
                    origin.insert(index, survivor);
                }
                erased.insert(index);
                dead[tail] = true;
            }
            cuts.push(Cut { group: g, end, count: members.len() });
        }

        let relocated: HashMap<usize, usize> = origin.into_iter().map(|(pos, i)| (i, pos)).collect();
        let shift = removed_before(&cuts);
        self.relabel_trackers(|i| {
            if erased.contains(&i) {
                return None;
            }
            let moved = relocated.get(&i).copied().unwrap_or(i);
            Some(moved - shift(i))
        });
        self.compact(&dead, &cuts);
    }

    /// Removes whole groups, their particles included, from both configurations.
    ///
    /// Groups stored behind an erased group move down in the group list.
    pub fn erase_groups(&mut self, groups: &[usize]) {
        let mut doomed: Vec<usize> = groups.iter().copied().filter(|&g| g < self.groups.len()).collect();
        doomed.sort_unstable();
        doomed.dedup();
        if doomed.is_empty() {
            return;
        }

        let mut dead = vec![false; self.current.len()];
        let cuts: Vec<Cut> = doomed
            .iter()
            .map(|&g| {
                let range = self.groups[g].range();
                dead[range.clone()].fill(true);
                Cut {
                    group: g,
                    end: range.end,
                    count: range.len(),
                }
            })
            .collect();
        let shift = removed_before(&cuts);
        self.relabel_trackers(|i| (!dead[i]).then(|| i - shift(i)));
        self.compact(&dead, &cuts);

        let mut g = 0;
        self.groups.retain(|_| {
            g += 1;
            doomed.binary_search(&(g - 1)).is_err()
        });
    }

    /// Drops the `dead` slots from both arrays and updates group offsets and lengths.
    fn compact(&mut self, dead: &[bool], cuts: &[Cut]) {
        let mut k = 0;
        self.current.retain(|_| {
            k += 1;
            !dead[k - 1]
        });
        let mut k = 0;
        self.trial.retain(|_| {
            k += 1;
            !dead[k - 1]
        });
        let mut shift = 0;
        let mut pending = cuts.iter().peekable();
        for (g, group) in self.groups.iter_mut().enumerate() {
            group.start -= shift;
            if let Some(cut) = pending.next_if(|cut| cut.group == g) {
                group.len -= cut.count;
                shift += cut.count;
            }
        }
    }

    /// Moves group `g` in the trial configuration by `displacement`.
    pub fn translate_group(&mut self, g: usize, displacement: &Vector3<f64>) {
        let range = self.groups[g].range();
        for p in &mut self.trial[range] {
            p.position += displacement;
            self.trial_geometry.boundary(&mut p.position);
        }
        let group = &mut self.groups[g];
        group.cm_trial += displacement;
        self.trial_geometry.boundary(&mut group.cm_trial);
    }

    /// Rotates group `g` in the trial configuration about `pivot`.
    pub fn rotate_group(&mut self, g: usize, pivot: &Point3<f64>, rotation: &UnitQuaternion<f64>) {
        for i in self.groups[g].range() {
            self.rotate_particle(i, pivot, rotation);
        }
        let cm = self
            .trial_geometry
            .rotate_about(&self.groups[g].cm_trial, pivot, rotation);
        self.groups[g].cm_trial = cm;
    }

    /// Rotates a single trial particle about `pivot`, turning its orientation with it.
    pub fn rotate_particle(&mut self, i: usize, pivot: &Point3<f64>, rotation: &UnitQuaternion<f64>) {
        let p = &mut self.trial[i];
        p.position = self.trial_geometry.rotate_about(&p.position, pivot, rotation);
        p.rotate(rotation);
    }

    /// True if any of the trial particles lies outside the trial container.
    pub fn collides(&self, indices: impl IntoIterator<Item = usize>) -> bool {
        indices
            .into_iter()
            .any(|i| self.trial_geometry.collision(&self.trial[i].position))
    }

    pub fn accept_particles(&mut self, indices: &[usize]) {
        for &i in indices {
            self.accept_particle(i);
        }
    }

    pub fn reject_particles(&mut self, indices: &[usize]) {
        for &i in indices {
            self.trial[i] = self.current[i].clone();
        }
    }

    pub fn accept_group(&mut self, g: usize) {
        for i in self.groups[g].range() {
            self.accept_particle(i);
        }
        let group = &mut self.groups[g];
        group.cm = group.cm_trial;
    }

    pub fn reject_group(&mut self, g: usize) {
        let range = self.groups[g].range();
        self.trial[range.clone()].clone_from_slice(&self.current[range]);
        let group = &mut self.groups[g];
        group.cm_trial = group.cm;
    }

    /// Copies the whole trial state, geometry included, into the current state.
    pub fn accept_all(&mut self) {
        self.geometry = self.trial_geometry.clone();
        for i in 0..self.trial.len() {
            self.accept_particle(i);
        }
        for group in &mut self.groups {
            group.cm = group.cm_trial;
        }
    }

    /// Restores the whole trial state, geometry included, from the current state.
    pub fn reject_all(&mut self) {
        self.trial_geometry = self.geometry.clone();
        self.trial.clone_from_slice(&self.current);
        for group in &mut self.groups {
            group.cm_trial = group.cm;
        }
    }

    /// Commits everything registered in `change`.
    pub fn accept_change(&mut self, change: &Change) {
        if change.geometry_changed {
            self.accept_all();
            return;
        }
        for (&g, touched) in &change.groups {
            match touched {
                GroupChange::Rigid => self.accept_group(g),
                GroupChange::Particles(indices) => {
                    self.accept_particles(indices);
                    let group = &mut self.groups[g];
                    group.cm = group.cm_trial;
                }
            }
        }
    }

    /// Reverts everything registered in `change`.
    pub fn reject_change(&mut self, change: &Change) {
        if change.geometry_changed {
            self.reject_all();
            return;
        }
        for (&g, touched) in &change.groups {
            match touched {
                GroupChange::Rigid => self.reject_group(g),
                GroupChange::Particles(indices) => {
                    self.reject_particles(indices);
                    let group = &mut self.groups[g];
                    group.cm_trial = group.cm;
                }
            }
        }
    }

    /// Checks that current and trial agree and that mass centers and trackers are consistent.
    pub fn verify(&self) -> Result<(), InvariantError> {
        if self.geometry != self.trial_geometry {
            return Err(InvariantError::GeometryMismatch);
        }
        if let Some(i) = (0..self.current.len()).find(|&i| self.current[i] != self.trial[i]) {
            return Err(InvariantError::Desynchronized(i));
        }
        for (g, group) in self.groups.iter().enumerate() {
            if group.atomic || group.is_empty() {
                continue;
            }
            let recomputed = self.mass_center(g, false).unwrap_or(group.cm);
            let deviation = self
                .geometry
                .distance(&recomputed, &group.cm)
                .max(self.geometry.distance(&group.cm, &group.cm_trial));
            if deviation > MASS_CENTER_TOLERANCE {
                return Err(InvariantError::MassCenter { group: g, deviation });
            }
        }
        for (species, tracker) in &self.trackers {
            if let Some(i) = tracker
                .iter()
                .find(|&i| self.current.get(i).is_none_or(|p| p.species != species))
            {
                return Err(InvariantError::StaleTracker(i));
            }
        }
        Ok(())
    }

    fn accept_particle(&mut self, i: usize) {
        let old = self.current[i].species;
        let new = self.trial[i].species;
        if old != new && self.group_of(i).is_some_and(|g| self.groups[g].atomic) {
            if let Some(t) = self.trackers.get_mut(old) {
                t.erase(i);
            }
            self.track(new, i);
        }
        self.current[i] = self.trial[i].clone();
    }

    fn track(&mut self, species: SpeciesId, index: usize) {
        if let Some(tracker) = self.trackers.get_mut(species) {
            tracker.insert(index);
        } else {
            let mut tracker = IndexTracker::new();
            tracker.insert(index);
            self.trackers.insert(species, tracker);
        }
    }

    fn relabel_trackers(&mut self, map: impl Fn(usize) -> Option<usize>) {
        for (_, tracker) in self.trackers.iter_mut() {
            tracker.relabel(&map);
        }
    }
}

/// Particles removed from one group, in the layout before removal.
struct Cut {
    group: usize,
    end: usize,
    count: usize,
}

/// Maps an index of the layout before removal to the number of particles removed in front of
/// its group. `cuts` must be sorted by group.
fn removed_before(cuts: &[Cut]) -> impl Fn(usize) -> usize + use<> {
    let mut total = 0;
    let ends: Vec<(usize, usize)> = cuts
        .iter()
        .map(|cut| {
            total += cut.count;
            (cut.end, total)
        })
        .collect();
    move |i| {
        let k = ends.partition_point(|&(end, _)| end <= i);
        if k == 0 { 0 } else { ends[k - 1].1 }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::models::species::{MoleculeKind, Species};

    /// Periodic cube holding one atomic salt pool and `molecules` rigid dimers.
    pub(crate) fn salt_and_dimers(side: f64, ions: usize, molecules: usize) -> Space {
        let mut topology = Topology::new();
        let mut na = Species::new("Na");
        na.charge = 1.0;
        na.radius = 1.0;
        na.activity = 0.1;
        let mut cl = Species::new("Cl");
        cl.charge = -1.0;
        cl.radius = 1.0;
        cl.activity = 0.1;
        let mut m = Species::new("M");
        m.radius = 0.5;
        let na_id = topology.add_species(na.clone());
        let cl_id = topology.add_species(cl.clone());
        let m_id = topology.add_species(m.clone());
        let salt = topology.add_molecule(MoleculeKind::atomic("salt", vec![na_id, cl_id]));
        let dimer = topology.add_molecule(MoleculeKind::molecular(
            "dimer",
            vec![m_id, m_id],
            vec![Vector3::new(-0.5, 0.0, 0.0), Vector3::new(0.5, 0.0, 0.0)],
        ));

        let mut space = Space::new(topology, Geometry::cube(side));
        let mut rng = RandomSource::from_seed(1234);
        for k in 0..molecules {
            let cm = Point3::new(-side / 4.0 + k as f64 * 3.0, 0.0, 0.0);
            let particles = vec![
                Particle::from_species(m_id, &m, cm + Vector3::new(-0.5, 0.0, 0.0)),
                Particle::from_species(m_id, &m, cm + Vector3::new(0.5, 0.0, 0.0)),
            ];
            space.add_group(dimer, particles);
        }
        let particles = (0..ions)
            .map(|k| {
                let (id, s) = if k % 2 == 0 { (na_id, &na) } else { (cl_id, &cl) };
                Particle::from_species(id, s, space.geometry.random_position(&mut rng))
            })
            .collect();
        space.add_group(salt, particles);
        space
    }

    #[test]
    fn new_space_is_synchronized() {
        let space = salt_and_dimers(20.0, 6, 2);
        assert_eq!(space.len(), 10);
        assert_eq!(space.groups().len(), 3);
        assert_eq!(space.molecule_count(), 2 + 6);
        space.verify().unwrap();
    }

    #[test]
    fn group_of_finds_owning_group() {
        let space = salt_and_dimers(20.0, 4, 2);
        assert_eq!(space.group_of(0), Some(0));
        assert_eq!(space.group_of(3), Some(1));
        assert_eq!(space.group_of(4), Some(2));
        assert_eq!(space.group_of(8), None);
    }

    #[test]
    fn insert_then_erase_restores_population_and_trackers() {
        let mut space = salt_and_dimers(20.0, 4, 1);
        let na = space.topology().species_by_name("Na").unwrap();
        let na_template = space.topology().species(na).unwrap().clone();
        let salt = space.topology().molecule_by_name("salt").unwrap();
        let g = space.find_groups(salt).next().unwrap();
        let before = space.free_count(na);
        let snapshot = space.current().to_vec();

        let new = vec![
            Particle::from_species(na, &na_template, Point3::new(1.0, 1.0, 1.0)),
            Particle::from_species(na, &na_template, Point3::new(-1.0, 2.0, 1.0)),
        ];
        let inserted = space.insert_into_group(g, new);
        assert_eq!(space.free_count(na), before + 2);
        space.verify().unwrap();

        space.erase_particles(&inserted);
        assert_eq!(space.free_count(na), before);
        assert_eq!(space.current(), snapshot.as_slice());
        space.verify().unwrap();
    }

    #[test]
    fn inserting_into_earlier_group_shifts_later_trackers() {
        let mut topology = Topology::new();
        let a = topology.add_species(Species::new("A"));
        let b = topology.add_species(Species::new("B"));
        let pool_a = topology.add_molecule(MoleculeKind::atomic("pool-a", vec![a]));
        let pool_b = topology.add_molecule(MoleculeKind::atomic("pool-b", vec![b]));
        let mut space = Space::new(topology, Geometry::cube(10.0));
        let ga = space.add_group(pool_a, vec![Particle::new(a, Point3::origin())]);
        space.add_group(pool_b, vec![Particle::new(b, Point3::new(1.0, 0.0, 0.0))]);

        space.insert_into_group(ga, vec![Particle::new(a, Point3::new(2.0, 0.0, 0.0))]);

        assert!(space.tracker(b).unwrap().contains(2));
        assert!(!space.tracker(b).unwrap().contains(1));
        space.verify().unwrap();
    }

    /// Two atomic pools of alternating species with a dimer between them.
    fn two_pools() -> (Space, SpeciesId, SpeciesId) {
        let mut topology = Topology::new();
        let a = topology.add_species(Species::new("A"));
        let b = topology.add_species(Species::new("B"));
        let m = topology.add_species(Species::new("M"));
        let pool = topology.add_molecule(MoleculeKind::atomic("pool", vec![a, b]));
        let dimer = topology.add_molecule(MoleculeKind::molecular(
            "dimer",
            vec![m, m],
            vec![Vector3::new(-0.5, 0.0, 0.0), Vector3::new(0.5, 0.0, 0.0)],
        ));
        let mut space = Space::new(topology, Geometry::cube(30.0));
        let mut rng = RandomSource::from_seed(3);
        let particles = |n: usize, rng: &mut RandomSource| -> Vec<Particle> {
            (0..n)
                .map(|k| Particle::new(if k % 2 == 0 { a } else { b }, space_position(rng)))
                .collect()
        };
        let first = particles(10, &mut rng);
        let second = particles(4, &mut rng);
        space.add_group(pool, first);
        space.add_group(
            dimer,
            vec![
                Particle::new(m, Point3::new(-0.5, 0.0, 0.0)),
                Particle::new(m, Point3::new(0.5, 0.0, 0.0)),
            ],
        );
        space.add_group(pool, second);
        (space, a, b)
    }

    fn space_position(rng: &mut RandomSource) -> Point3<f64> {
        Geometry::cube(30.0).random_position(rng)
    }

    #[test]
    fn erasing_scattered_particles_keeps_every_tracker_consistent() {
        let (mut space, a, b) = two_pools();
        let survivors: Vec<Point3<f64>> = space
            .current()
            .iter()
            .enumerate()
            .filter(|(i, _)| ![2, 8, 13].contains(i))
            .map(|(_, p)| p.position)
            .collect();

        // The last particle of the first pool fills slot 8, then moves on into slot 2.
        space.erase_particles(&[8, 2, 13, 2]);

        assert_eq!(space.len(), 13);
        assert_eq!(space.groups()[0].len, 8);
        assert_eq!(space.groups()[1].start, 8);
        assert_eq!(space.groups()[2].start, 10);
        assert_eq!(space.groups()[2].len, 3);
        assert_eq!(space.free_count(a), 3 + 2);
        assert_eq!(space.free_count(b), 5 + 1);
        for p in &survivors {
            assert!(space.current().iter().any(|q| q.position == *p));
        }
        space.verify().unwrap();
    }

    #[test]
    fn erasing_a_group_shifts_the_groups_behind_it() {
        let (mut space, a, _) = two_pools();
        let tail_pool = space.groups()[2].clone();
        let before = space.free_count(a);

        space.erase_groups(&[1]);

        assert_eq!(space.groups().len(), 2);
        assert_eq!(space.len(), 14);
        assert_eq!(space.groups()[1].start, tail_pool.start - 2);
        assert_eq!(space.groups()[1].kind, tail_pool.kind);
        assert_eq!(space.free_count(a), before);
        space.verify().unwrap();

        space.erase_groups(&[0, 1]);
        assert!(space.is_empty());
        assert!(space.groups().is_empty());
        assert_eq!(space.free_count(a), 0);
        space.verify().unwrap();
    }

    #[test]
    fn rejected_rigid_move_restores_trial_state() {
        let mut space = salt_and_dimers(20.0, 0, 1);
        space.translate_group(0, &Vector3::new(1.0, 0.0, 0.0));
        assert!(space.verify().is_err());

        let mut change = Change::new();
        change.add_rigid(0);
        space.reject_change(&change);
        space.verify().unwrap();
    }

    #[test]
    fn accepted_rotation_keeps_mass_center_consistent() {
        let mut space = salt_and_dimers(20.0, 0, 1);
        let cm = space.groups()[0].cm;
        let q = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.7);
        space.rotate_group(0, &cm, &q);
        space.translate_group(0, &Vector3::new(0.0, 9.5, 0.0));

        let mut change = Change::new();
        change.add_rigid(0);
        space.accept_change(&change);
        space.verify().unwrap();
    }
}
