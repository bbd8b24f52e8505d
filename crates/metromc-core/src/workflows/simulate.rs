use crate::core::energy::{Hamiltonian, system_energy};
use crate::core::space::Space;
use crate::engine::config::SimulationConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{MacroStepReport, Progress, ProgressReporter};
use crate::engine::propagator::{Propagator, PropagatorStatistics};
use crate::engine::protocol::Move;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub macro_steps: u64,
    pub micro_steps: u64,
    pub particles: usize,
    pub volume: f64,
    /// Energy of the final configuration, recomputed from scratch (kT).
    pub final_energy: f64,
    /// Largest absolute drift seen at any macro step (kT).
    pub max_drift: f64,
    pub propagator: PropagatorStatistics,
}

#[instrument(skip_all, name = "simulation_workflow")]
pub fn run(
    space: &mut Space,
    hamiltonian: &dyn Hamiltonian,
    moves: Vec<Move>,
    config: &SimulationConfig,
    reporter: &ProgressReporter,
) -> Result<SimulationResult, EngineError> {
    // === Phase 0: Preparation ===
    reporter.report(Progress::StageStart { name: "Preparation" });
    info!(
        moves = moves.len(),
        particles = space.len(),
        "Starting simulation: {} macro x {} micro steps.",
        config.macro_steps,
        config.micro_steps
    );
    space.verify()?;
    let mut propagator = Propagator::new(moves, config.seed, space, hamiltonian)?;
    for mv in propagator.moves() {
        debug!(name = mv.title(), targets = mv.targets().len(), "Move ready.");
    }
    reporter.report(Progress::StageFinish);

    // === Phase 1: Sampling ===
    let max_drift = sample(&mut propagator, space, hamiltonian, config, reporter)?;

    // === Phase 2: Final checks and statistics ===
    reporter.report(Progress::StageStart { name: "Finalization" });
    propagator.check_invariants(space)?;
    let result = SimulationResult {
        macro_steps: config.macro_steps,
        micro_steps: config.micro_steps,
        particles: space.len(),
        volume: space.geometry().volume(),
        final_energy: system_energy(hamiltonian, space.geometry(), space.current()),
        max_drift,
        propagator: propagator.statistics(),
    };
    reporter.report(Progress::Message(propagator.info()));
    reporter.report(Progress::StageFinish);

    info!(
        final_energy = result.final_energy,
        max_drift = result.max_drift,
        "Simulation complete."
    );
    Ok(result)
}

fn sample(
    propagator: &mut Propagator,
    space: &mut Space,
    hamiltonian: &dyn Hamiltonian,
    config: &SimulationConfig,
    reporter: &ProgressReporter,
) -> Result<f64, EngineError> {
    reporter.report(Progress::SamplingStart {
        macro_steps: config.macro_steps,
        micro_steps: config.micro_steps,
    });

    let mut max_drift: f64 = 0.0;
    for step in 0..config.macro_steps {
        for _ in 0..config.micro_steps {
            propagator.step(space, hamiltonian)?;
        }

        let drift = propagator.drift(space, hamiltonian);
        if !drift.is_finite() {
            return Err(EngineError::PhaseFailed {
                phase: "Sampling",
                reason: format!("energy drift is {drift} after macro step {}", step + 1),
            });
        }
        let report = MacroStepReport {
            step: step + 1,
            energy: propagator.current_energy(),
            drift,
            acceptance: propagator.acceptance(),
            particles: space.len(),
            volume: space.geometry().volume(),
        };
        if report.drifted(config.drift_tolerance) {
            warn!(
                step = report.step,
                drift,
                tolerance = config.drift_tolerance,
                "Energy drift exceeds tolerance."
            );
        }
        debug!(step = report.step, "{report}");
        max_drift = max_drift.max(drift.abs());
        reporter.report(Progress::MacroStep(report));
    }

    reporter.report(Progress::SamplingFinish);
    Ok(max_drift)
}
