pub mod defaults;

use crate::cli::SimulationOverrides;
use crate::error::{CliError, Result};
use defaults::DefaultsConfig;
use metromc::core::energy::Hamiltonian;
use metromc::core::energy::reference::{HardSphere, Ideal, Scaled, SoftSphere};
use metromc::core::io::system::SystemDescription;
use metromc::engine::config::{SimulationConfig, SimulationConfigBuilder};
use metromc::engine::registry::MoveDefinition;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Energy model the CLI evaluates configurations with.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HamiltonianKind {
    Ideal,
    HardSphere,
    SoftSphere,
}

impl FromStr for HamiltonianKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ideal" => Ok(HamiltonianKind::Ideal),
            "hard-sphere" => Ok(HamiltonianKind::HardSphere),
            "soft-sphere" => Ok(HamiltonianKind::SoftSphere),
            other => Err(format!("unknown hamiltonian '{other}'")),
        }
    }
}

/// Energy model of one replica.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PotentialConfig {
    pub kind: HamiltonianKind,
    /// Soft-sphere strength in kT at contact.
    pub epsilon: f64,
    /// Temperature relative to the one energies are expressed at.
    pub temperature: f64,
}

impl PotentialConfig {
    pub fn build(&self) -> Box<dyn Hamiltonian> {
        let inner: Box<dyn Hamiltonian> = match self.kind {
            HamiltonianKind::Ideal => Box::new(Ideal),
            HamiltonianKind::HardSphere => Box::new(HardSphere),
            HamiltonianKind::SoftSphere => Box::new(SoftSphere { epsilon: self.epsilon }),
        };
        if self.temperature == 1.0 {
            inner
        } else {
            Box::new(Scaled::new(inner, 1.0 / self.temperature))
        }
    }
}

/// One `[[replicas]]` entry. Unset values fall back to the base configuration.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ReplicaOverrides {
    pub temperature: Option<f64>,
    /// Replaces the pressure of every isobaric move.
    pub pressure: Option<f64>,
    pub hamiltonian: Option<HamiltonianKind>,
    pub epsilon: Option<f64>,
}

/// Potential and move definitions of one replica after its overrides are applied.
#[derive(Debug, Clone)]
pub struct ReplicaSettings {
    pub potential: PotentialConfig,
    pub moves: Vec<MoveDefinition>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialSimulationConfig {
    macro_steps: Option<u64>,
    micro_steps: Option<u64>,
    seed: Option<u64>,
    drift_tolerance: Option<f64>,
    replicas: Option<usize>,
    timeout_ms: Option<u64>,
    hamiltonian: Option<HamiltonianKind>,
    epsilon: Option<f64>,
    temperature: Option<f64>,
}

/// Everything an input file may contain. The system description sits at the top level.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct InputFile {
    #[serde(flatten)]
    system: SystemDescription,
    #[serde(default)]
    simulation: Option<PartialSimulationConfig>,
    #[serde(default)]
    moves: Vec<MoveDefinition>,
    /// Per-replica overrides, by rank.
    #[serde(default)]
    replicas: Vec<ReplicaOverrides>,
}

/// Fully merged settings for one invocation.
#[derive(Debug)]
pub struct RunConfig {
    pub system: SystemDescription,
    pub moves: Vec<MoveDefinition>,
    pub simulation: SimulationConfig,
    pub replicas: usize,
    pub timeout: Duration,
    pub potential: PotentialConfig,
    pub replica_overrides: Vec<ReplicaOverrides>,
}

impl RunConfig {
    /// Settings of replica `rank`. Ranks without a `[[replicas]]` entry use the base values.
    pub fn replica(&self, rank: usize) -> ReplicaSettings {
        let mut potential = self.potential;
        let mut moves = self.moves.clone();
        if let Some(overrides) = self.replica_overrides.get(rank) {
            potential.kind = overrides.hamiltonian.unwrap_or(potential.kind);
            potential.epsilon = overrides.epsilon.unwrap_or(potential.epsilon);
            potential.temperature = overrides.temperature.unwrap_or(potential.temperature);
            if let Some(pressure) = overrides.pressure {
                for def in moves.iter_mut().filter(|def| def.kind == "isobaric") {
                    def.params.insert("pressure".to_string(), toml::Value::Float(pressure));
                }
            }
        }
        ReplicaSettings { potential, moves }
    }
}

impl InputFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading input file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Merges, in increasing priority: built-in defaults, the input file, `--set` values and
    /// dedicated flags.
    pub fn merge_with_cli(mut self, overrides: &SimulationOverrides) -> Result<RunConfig> {
        self.apply_set_values(&overrides.set_values)?;
        let defaults = DefaultsConfig::default();
        let file = self.simulation.take().unwrap_or_default();

        let replicas = overrides
            .replicas
            .or(file.replicas)
            .unwrap_or(defaults.replicas);
        if replicas == 0 {
            return Err(CliError::Argument("at least one replica is required".to_string()));
        }
        if self.moves.is_empty() {
            return Err(CliError::Config(
                "the input file defines no [[moves]]".to_string(),
            ));
        }

        let mut builder = SimulationConfigBuilder::new()
            .macro_steps(
                overrides
                    .macro_steps
                    .or(file.macro_steps)
                    .unwrap_or(defaults.macro_steps),
            )
            .micro_steps(
                overrides
                    .micro_steps
                    .or(file.micro_steps)
                    .unwrap_or(defaults.micro_steps),
            )
            .seed(overrides.seed.or(file.seed).unwrap_or(defaults.seed));
        if let Some(tolerance) = file.drift_tolerance {
            builder = builder.drift_tolerance(tolerance);
        }
        if self.replicas.len() > replicas {
            return Err(CliError::Config(format!(
                "{} [[replicas]] entries for {replicas} replica(s)",
                self.replicas.len()
            )));
        }
        let potential = PotentialConfig {
            kind: file.hamiltonian.unwrap_or(defaults.hamiltonian),
            epsilon: file.epsilon.unwrap_or(defaults.epsilon),
            temperature: file.temperature.unwrap_or(defaults.temperature),
        };
        let temperatures = std::iter::once(potential.temperature)
            .chain(self.replicas.iter().filter_map(|r| r.temperature));
        for temperature in temperatures {
            if !(temperature > 0.0) {
                return Err(CliError::Config(format!("temperature must be positive, got {temperature}")));
            }
        }

        Ok(RunConfig {
            system: self.system,
            moves: self.moves,
            simulation: builder.build()?,
            replicas,
            timeout: Duration::from_millis(
                overrides
                    .timeout_ms
                    .or(file.timeout_ms)
                    .unwrap_or(defaults.timeout_ms),
            ),
            potential,
            replica_overrides: self.replicas,
        })
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value) = kv_pair.split_once('=').ok_or_else(|| {
                CliError::Config(format!("Invalid --set format: '{kv_pair}'. Expected KEY=VALUE."))
            })?;
            let simulation = self.simulation.get_or_insert_with(Default::default);
            match key {
                "simulation.macro-steps" => simulation.macro_steps = Some(parse_value(key, value)?),
                "simulation.micro-steps" => simulation.micro_steps = Some(parse_value(key, value)?),
                "simulation.seed" => simulation.seed = Some(parse_value(key, value)?),
                "simulation.drift-tolerance" => {
                    simulation.drift_tolerance = Some(parse_value(key, value)?)
                }
                "simulation.replicas" => simulation.replicas = Some(parse_value(key, value)?),
                "simulation.timeout-ms" => simulation.timeout_ms = Some(parse_value(key, value)?),
                "simulation.hamiltonian" => {
                    simulation.hamiltonian =
                        Some(value.parse().map_err(|e: String| CliError::Config(e))?)
                }
                "simulation.epsilon" => simulation.epsilon = Some(parse_value(key, value)?),
                "simulation.temperature" => simulation.temperature = Some(parse_value(key, value)?),
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{key}'"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {key}: {value}")))
}
