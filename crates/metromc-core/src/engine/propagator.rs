use super::config::ConfigError;
use super::error::MoveError;
use super::protocol::{Move, MoveStatistics};
use crate::core::energy::{Hamiltonian, system_energy};
use crate::core::space::{InvariantError, Space};
use crate::core::utils::average::Average;
use crate::core::utils::random::RandomSource;
use serde::Serialize;
use std::fmt::Write;
use tracing::trace;

/// Energy bookkeeping of a propagator, in kT.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropagatorStatistics {
    pub steps: u64,
    pub initial_energy: f64,
    /// Sum of the accepted energy changes reported by all moves.
    pub energy_change: f64,
    pub average_energy: f64,
    pub moves: Vec<MoveStatistics>,
}

/// Runs one uniformly drawn move per step and tracks the energy they report.
///
/// The selection stream is seeded once for all replicas so that every replica picks the same
/// move at the same step, which keeps synchronized moves paired.
pub struct Propagator {
    moves: Vec<Move>,
    rng: RandomSource,
    steps: u64,
    initial_energy: f64,
    energy_change: f64,
    average: Average,
}

impl Propagator {
    pub fn new(moves: Vec<Move>, seed: u64, space: &Space, hamiltonian: &dyn Hamiltonian) -> Result<Self, ConfigError> {
        if moves.is_empty() {
            return Err(ConfigError::MissingParameter("moves"));
        }
        let initial_energy = system_energy(hamiltonian, space.geometry(), space.current());
        Ok(Self {
            moves,
            rng: RandomSource::from_seed(seed),
            steps: 0,
            initial_energy,
            energy_change: 0.0,
            average: Average::new(),
        })
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    /// Draws one move and runs a single trial of it. Returns the accepted energy change.
    pub fn step(&mut self, space: &mut Space, hamiltonian: &dyn Hamiltonian) -> Result<f64, MoveError> {
        let index = self.rng.below(self.moves.len());
        let mv = &mut self.moves[index];
        trace!(step = self.steps, name = mv.title(), "Dispatching move.");
        let du = mv.perform(space, hamiltonian, 1)?;
        self.steps += 1;
        self.energy_change += du;
        self.average.push(self.current_energy());
        Ok(du)
    }

    /// Initial energy plus everything the moves reported since.
    pub fn current_energy(&self) -> f64 {
        self.initial_energy + self.energy_change
    }

    /// Difference between a full recomputation and the tracked energy.
    pub fn drift(&self, space: &Space, hamiltonian: &dyn Hamiltonian) -> f64 {
        system_energy(hamiltonian, space.geometry(), space.current()) - self.current_energy()
    }

    /// Accepted over attempted trials, pooled across all moves.
    pub fn acceptance(&self) -> f64 {
        let (trials, accepted) = self
            .moves
            .iter()
            .map(Move::counts)
            .fold((0, 0), |(t, a), (dt, da)| (t + dt, a + da));
        if trials > 0 { accepted as f64 / trials as f64 } else { 0.0 }
    }

    pub fn statistics(&self) -> PropagatorStatistics {
        PropagatorStatistics {
            steps: self.steps,
            initial_energy: self.initial_energy,
            energy_change: self.energy_change,
            average_energy: self.average.mean(),
            moves: self.moves.iter().map(Move::statistics).collect(),
        }
    }

    pub fn info(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Propagator: {} moves, {} steps", self.moves.len(), self.steps);
        let _ = writeln!(
            out,
            "  initial energy {:.6e} kT, change {:.6e} kT, average {:.6e} kT",
            self.initial_energy,
            self.energy_change,
            self.average.mean()
        );
        for mv in &self.moves {
            out.push_str(&mv.info());
        }
        out
    }

    pub fn check_invariants(&self, space: &Space) -> Result<(), InvariantError> {
        self.moves.iter().try_for_each(|mv| mv.check_invariants(space))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy::reference::HardSphere;
    use crate::core::models::particle::Particle;
    use crate::core::space::geometry::Geometry;
    use crate::core::space::tests::salt_and_dimers;
    use crate::engine::registry::{BuildContext, MoveDefinition, build_moves};
    use approx::assert_abs_diff_eq;
    use serde::Deserialize;

    /// Bounded repulsion, so every move type produces finite energy changes.
    struct Soft;

    impl Hamiltonian for Soft {
        fn pair(&self, geometry: &Geometry, a: &Particle, b: &Particle) -> f64 {
            a.charge * b.charge / geometry.distance(&a.position, &b.position).max(0.5)
        }
    }

    #[derive(Deserialize)]
    struct Moves {
        moves: Vec<MoveDefinition>,
    }

    fn mixed_moves(space: &mut Space) -> Vec<Move> {
        let defs = toml::from_str::<Moves>(
            r#"
            [[moves]]
            type = "atom-translate"
            dp = 1.0

            [[moves]]
            type = "mol-translate-rotate"
            [[moves.targets]]
            molecule = "dimer"
            dp = 1.0
            dprot = 0.5

            [[moves]]
            type = "gc-salt"

            [[moves]]
            type = "isobaric"
            dp = 0.02
            pressure = 20.0
            "#,
        )
        .unwrap()
        .moves;
        build_moves(&defs, space, &mut BuildContext::new(3)).unwrap()
    }

    #[test]
    fn tracked_energy_matches_recomputation() {
        let mut space = salt_and_dimers(20.0, 6, 2);
        let moves = mixed_moves(&mut space);
        let mut propagator = Propagator::new(moves, 11, &space, &Soft).unwrap();
        for _ in 0..2000 {
            propagator.step(&mut space, &Soft).unwrap();
        }
        propagator.check_invariants(&space).unwrap();
        assert_abs_diff_eq!(propagator.drift(&space, &Soft), 0.0, epsilon = 1e-8);
    }

    #[test]
    fn every_move_gets_dispatched() {
        let mut space = salt_and_dimers(20.0, 6, 2);
        let moves = mixed_moves(&mut space);
        let mut propagator = Propagator::new(moves, 5, &space, &HardSphere).unwrap();
        for _ in 0..400 {
            propagator.step(&mut space, &HardSphere).unwrap();
        }
        let stats = propagator.statistics();
        assert_eq!(stats.steps, 400);
        assert_eq!(stats.moves.iter().map(|m| m.trials).sum::<u64>(), 400);
        assert!(stats.moves.iter().all(|m| m.trials > 50));
        assert!(propagator.info().contains("gc-salt"));
        let accepted: u64 = stats.moves.iter().map(|m| m.accepted).sum();
        assert_abs_diff_eq!(propagator.acceptance(), accepted as f64 / 400.0, epsilon = 1e-12);
    }

    #[test]
    fn acceptance_is_zero_before_any_trial() {
        let mut space = salt_and_dimers(20.0, 6, 2);
        let moves = mixed_moves(&mut space);
        let propagator = Propagator::new(moves, 5, &space, &HardSphere).unwrap();
        assert_eq!(propagator.acceptance(), 0.0);
    }

    #[test]
    fn propagator_needs_moves() {
        let space = salt_and_dimers(20.0, 2, 0);
        assert_eq!(
            Propagator::new(Vec::new(), 1, &space, &HardSphere).err(),
            Some(ConfigError::MissingParameter("moves"))
        );
    }
}
