//! Configuration swaps between replicas (parallel tempering).
//!
//! Partners are paired by rank parity and a shared random offset. Each side evaluates the
//! received configuration with its own Hamiltonian and the two local energy changes are summed,
//! so both replicas reach the same decision from the same Metropolis draw. The move must be
//! seeded identically on every replica.

use crate::core::energy::change_energy;
use crate::engine::acceptance::AcceptanceTracker;
use crate::engine::error::TrialError;
use crate::engine::protocol::{EnergyChange, KernelReport, MoveKernel, Proposal, Trial};
use crate::engine::replica::{ReplicaError, ReplicaPayload, ReplicaTransport};
use tracing::debug;

/// Received volumes below this mean the partner is corrupt.
const MIN_VOLUME: f64 = 1e-6;

pub struct ParallelTempering {
    transport: Box<dyn ReplicaTransport>,
    partner: Option<usize>,
    stats: AcceptanceTracker<String>,
}

impl ParallelTempering {
    pub fn new(transport: Box<dyn ReplicaTransport>) -> Self {
        Self {
            transport,
            partner: None,
            stats: AcceptanceTracker::new(),
        }
    }

    /// Partner for this round, `None` if it falls outside the replica range.
    fn choose_partner(&self, up: bool) -> Option<usize> {
        let rank = self.transport.rank() as i64;
        let dr = if up { 1 } else { -1 };
        let partner = if rank % 2 == 0 { rank + dr } else { rank - dr };
        (partner >= 0 && partner < self.transport.size() as i64 && partner != rank).then_some(partner as usize)
    }

    fn key(&self) -> String {
        let rank = self.transport.rank();
        let partner = self.partner.unwrap_or(rank);
        format!("{} <-> {}", rank.min(partner), rank.max(partner))
    }
}

impl MoveKernel for ParallelTempering {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        let up = trial.rng.uniform() > 0.5;
        self.partner = self.choose_partner(up);
        let Some(partner) = self.partner else {
            debug!(rank = self.transport.rank(), "No exchange partner this round.");
            return Ok(Proposal::Skipped);
        };

        let space = &mut *trial.space;
        let payload = ReplicaPayload {
            particles: space.current().to_vec(),
            volume: space.geometry().volume(),
        };
        let received = self.transport.exchange_configuration(partner, payload)?;
        if !(received.volume >= MIN_VOLUME) {
            return Err(ReplicaError::VolumeOutOfRange {
                partner,
                volume: received.volume,
            }
            .into());
        }
        if received.particles.len() != space.len() {
            return Err(ReplicaError::ParticleCountMismatch {
                partner,
                expected: space.len(),
                received: received.particles.len(),
            }
            .into());
        }

        space.trial_geometry.set_volume(received.volume);
        space.trial = received.particles;
        for g in 0..space.groups().len() {
            space.update_trial_mass_center(g);
        }
        trial.change.geometry_changed = true;
        trial.change.volume_delta = received.volume - space.geometry().volume();
        Ok(Proposal::Proposed)
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        let Some(partner) = self.partner else {
            return Ok(EnergyChange::new(0.0));
        };
        let local = change_energy(trial.hamiltonian, trial.space, trial.change);
        let remote = self.transport.exchange_scalar(partner, local)?;
        Ok(EnergyChange::with_reported(local + remote, local))
    }

    fn accept(&mut self, trial: &mut Trial<'_>) {
        trial.space.accept_change(trial.change);
        self.stats.accept(&self.key(), 0.0);
    }

    fn reject(&mut self, trial: &mut Trial<'_>) {
        trial.space.reject_change(trial.change);
        self.stats.reject(&self.key());
    }

    fn describe(&self) -> String {
        format!(
            "replica exchange, rank {} of {}",
            self.transport.rank(),
            self.transport.size()
        )
    }

    fn report(&self) -> KernelReport {
        KernelReport::default().acceptance(self.stats.named())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy::Hamiltonian;
    use crate::core::energy::reference::Ideal;
    use crate::core::models::particle::Particle;
    use crate::core::space::Space;
    use crate::core::space::geometry::Geometry;
    use crate::core::space::tests::salt_and_dimers;
    use crate::engine::error::MoveError;
    use crate::engine::moves::atomic::{AtomicConfig, AtomicDisplacement, AtomicMode};
    use crate::engine::protocol::{Move, MoveStatistics};
    use crate::engine::replica::ChannelTransport;
    use std::thread;
    use std::time::Duration;

    /// Harmonic trap whose stiffness plays the role of an inverse temperature.
    struct Trap(f64);

    impl Hamiltonian for Trap {
        fn pair(&self, _geometry: &Geometry, _a: &Particle, _b: &Particle) -> f64 {
            0.0
        }

        fn external(&self, _geometry: &Geometry, p: &Particle) -> f64 {
            self.0 * p.position.coords.norm_squared()
        }
    }

    fn scrambled(ions: usize, seed: u64) -> Space {
        let mut space = salt_and_dimers(20.0, ions, 0);
        let kernel = AtomicDisplacement::new(
            AtomicMode::Translate,
            AtomicConfig {
                dp: 4.0,
                ..AtomicConfig::default()
            },
        );
        let mut mv = Move::new("scramble", Box::new(kernel), seed);
        mv.perform(&mut space, &Ideal, 200).unwrap();
        space
    }

    fn run_pair(stiffness: [f64; 2], exchanges: usize) -> Vec<MoveStatistics> {
        let mesh = ChannelTransport::mesh(2, Some(Duration::from_secs(10)));
        thread::scope(|scope| {
            let handles: Vec<_> = mesh
                .into_iter()
                .map(|transport| {
                    scope.spawn(move || {
                        let rank = transport.rank();
                        let mut space = scrambled(6, 100 + rank as u64);
                        let hamiltonian = Trap(stiffness[rank]);
                        let mut mv = Move::new("temper", Box::new(ParallelTempering::new(Box::new(transport))), 77);
                        for _ in 0..exchanges {
                            mv.perform(&mut space, &hamiltonian, 1).unwrap();
                            mv.check_invariants(&space).unwrap();
                        }
                        mv.statistics()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn identical_replicas_always_swap() {
        let stats = run_pair([0.01, 0.01], 200);
        for s in &stats {
            assert!(s.skipped > 0 && s.skipped < s.trials);
            assert_eq!(s.accepted, s.trials - s.skipped);
        }
        assert_eq!(stats[0].details.acceptance["0 <-> 1"].trials, stats[0].trials - stats[0].skipped);
    }

    #[test]
    fn both_sides_reach_identical_decisions() {
        let stats = run_pair([0.001, 0.05], 300);
        assert_eq!(stats[0].accepted, stats[1].accepted);
        assert_eq!(stats[0].skipped, stats[1].skipped);
        assert!(stats[0].accepted < stats[0].trials - stats[0].skipped);
    }

    #[test]
    fn lone_replica_never_exchanges() {
        let transport = ChannelTransport::mesh(1, None).pop().unwrap();
        let mut space = salt_and_dimers(20.0, 4, 1);
        let mut mv = Move::new("temper", Box::new(ParallelTempering::new(Box::new(transport))), 1);
        mv.perform(&mut space, &Ideal, 50).unwrap();
        let s = mv.statistics();
        assert_eq!((s.trials, s.skipped), (50, 50));
    }

    #[test]
    fn mismatched_particle_counts_abort_both_sides() {
        let mesh = ChannelTransport::mesh(2, Some(Duration::from_secs(10)));
        let errors: Vec<MoveError> = thread::scope(|scope| {
            let handles: Vec<_> = mesh
                .into_iter()
                .map(|transport| {
                    scope.spawn(move || {
                        let rank = transport.rank();
                        let mut space = salt_and_dimers(20.0, 4 + 2 * rank, 0);
                        let mut mv = Move::new("temper", Box::new(ParallelTempering::new(Box::new(transport))), 9);
                        loop {
                            if let Err(e) = mv.perform(&mut space, &Ideal, 1) {
                                return e;
                            }
                        }
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for e in errors {
            assert!(matches!(
                e,
                MoveError::Replica {
                    source: ReplicaError::ParticleCountMismatch { .. },
                    ..
                }
            ));
        }
    }
}
