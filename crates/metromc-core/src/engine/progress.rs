//! Events a simulation emits while it runs, for front ends that want to show them.

use std::fmt;

/// Energy, acceptance and system size after one macro step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacroStepReport {
    /// One-based index of the finished macro step.
    pub step: u64,
    /// Tracked energy in kT.
    pub energy: f64,
    /// Full recomputation minus the tracked energy, in kT.
    pub drift: f64,
    /// Accepted over attempted trials of all moves so far.
    pub acceptance: f64,
    pub particles: usize,
    pub volume: f64,
}

impl MacroStepReport {
    pub fn drifted(&self, tolerance: f64) -> bool {
        self.drift.abs() > tolerance
    }
}

impl fmt::Display for MacroStepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "U = {:.4e} kT, drift {:.1e}, acceptance {:.1}%, N = {}",
            self.energy,
            self.drift,
            100.0 * self.acceptance,
            self.particles
        )
    }
}

#[derive(Debug, Clone)]
pub enum Progress {
    StageStart { name: &'static str },
    StageFinish,

    /// Sampling begins; one [`Progress::MacroStep`] follows per macro step.
    SamplingStart { macro_steps: u64, micro_steps: u64 },
    MacroStep(MacroStepReport),
    SamplingFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

/// Forwards events to an optional callback. Without one, reporting is a no-op.
#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}
