use crate::core::models::ids::MoleculeId;
use crate::core::models::species::Topology;
use crate::core::space::Space;
use nalgebra::Vector3;
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_DRIFT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Undefined species: '{0}'")]
    UnknownSpecies(String),

    #[error("Undefined molecule: '{0}'")]
    UnknownMolecule(String),

    #[error("Unknown move type: '{0}'")]
    UnknownMove(String),

    #[error("Invalid parameter for '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
}

impl ConfigError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

fn default_probability() -> f64 {
    1.0
}

fn default_direction() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

/// One molecule-type key a move is aimed at, as written in the move definition.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TargetConfig {
    pub molecule: String,
    #[serde(default = "default_probability")]
    pub probability: f64,
    /// Repeat the move once per atom of this kind.
    #[serde(default)]
    pub per_atom: bool,
    /// Repeat the move once per molecule of this kind.
    #[serde(default)]
    pub per_molecule: bool,
    #[serde(default = "default_direction")]
    pub direction: [f64; 3],
    #[serde(default)]
    pub dp: f64,
    #[serde(default)]
    pub dprot: f64,
    /// Cluster inclusion distance, only read by cluster moves.
    #[serde(default)]
    pub threshold: f64,
}

impl TargetConfig {
    pub fn new(molecule: &str) -> Self {
        Self {
            molecule: molecule.to_string(),
            probability: default_probability(),
            per_atom: false,
            per_molecule: false,
            direction: default_direction(),
            dp: 0.0,
            dprot: 0.0,
            threshold: 0.0,
        }
    }
}

/// A [`TargetConfig`] resolved against the topology.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub molecule: MoleculeId,
    pub name: String,
    pub probability: f64,
    pub per_atom: bool,
    pub per_molecule: bool,
    pub direction: Vector3<f64>,
    pub dp1: f64,
    pub dp2: f64,
    pub threshold: f64,
}

impl Target {
    pub fn resolve(config: &TargetConfig, topology: &Topology) -> Result<Self, ConfigError> {
        let molecule = topology
            .molecule_by_name(&config.molecule)
            .ok_or_else(|| ConfigError::UnknownMolecule(config.molecule.clone()))?;
        if !(config.probability >= 0.0) {
            return Err(ConfigError::invalid(
                &config.molecule,
                "probability must be non-negative",
            ));
        }
        Ok(Self {
            molecule,
            name: config.molecule.clone(),
            probability: config.probability,
            per_atom: config.per_atom,
            per_molecule: config.per_molecule,
            direction: Vector3::from(config.direction),
            dp1: config.dp,
            dp2: config.dprot,
            threshold: config.threshold,
        })
    }

    /// Number of trials one `perform` call runs for this target.
    pub fn repeat(&self, space: &Space) -> usize {
        let groups = space.find_groups(self.molecule).filter_map(|g| space.group(g));
        if self.per_atom {
            groups.map(|g| g.len).sum()
        } else if self.per_molecule {
            groups.map(|g| if g.atomic { g.len } else { 1 }).sum()
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub macro_steps: u64,
    pub micro_steps: u64,
    pub seed: u64,
    /// Largest tolerated |U - (U0 + sum of du)| in kT before a warning is logged.
    pub drift_tolerance: f64,
}

#[derive(Default)]
pub struct SimulationConfigBuilder {
    macro_steps: Option<u64>,
    micro_steps: Option<u64>,
    seed: Option<u64>,
    drift_tolerance: Option<f64>,
}

impl SimulationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn macro_steps(mut self, steps: u64) -> Self {
        self.macro_steps = Some(steps);
        self
    }
    pub fn micro_steps(mut self, steps: u64) -> Self {
        self.micro_steps = Some(steps);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn drift_tolerance(mut self, tolerance: f64) -> Self {
        self.drift_tolerance = Some(tolerance);
        self
    }

    pub fn build(self) -> Result<SimulationConfig, ConfigError> {
        Ok(SimulationConfig {
            macro_steps: self
                .macro_steps
                .ok_or(ConfigError::MissingParameter("macro_steps"))?,
            micro_steps: self
                .micro_steps
                .ok_or(ConfigError::MissingParameter("micro_steps"))?,
            seed: self.seed.ok_or(ConfigError::MissingParameter("seed"))?,
            drift_tolerance: self.drift_tolerance.unwrap_or(DEFAULT_DRIFT_TOLERANCE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::space::tests::salt_and_dimers;

    #[test]
    fn builder_reports_first_missing_parameter() {
        let result = SimulationConfigBuilder::new().macro_steps(10).seed(1).build();
        assert_eq!(result, Err(ConfigError::MissingParameter("micro_steps")));
    }

    #[test]
    fn builder_applies_default_drift_tolerance() {
        let config = SimulationConfigBuilder::new()
            .macro_steps(2)
            .micro_steps(100)
            .seed(7)
            .build()
            .unwrap();
        assert_eq!(config.drift_tolerance, DEFAULT_DRIFT_TOLERANCE);
    }

    #[test]
    fn target_config_fills_defaults_from_toml() {
        let config: TargetConfig = toml::from_str(r#"molecule = "salt""#).unwrap();
        assert_eq!(config, TargetConfig::new("salt"));
    }

    #[test]
    fn target_rejects_unknown_molecule() {
        let space = salt_and_dimers(20.0, 2, 1);
        let result = Target::resolve(&TargetConfig::new("protein"), space.topology());
        assert_eq!(result, Err(ConfigError::UnknownMolecule("protein".into())));
    }

    #[test]
    fn target_repeat_counts_atoms_or_molecules() {
        let space = salt_and_dimers(20.0, 6, 3);
        let mut config = TargetConfig::new("dimer");
        config.per_atom = true;
        let per_atom = Target::resolve(&config, space.topology()).unwrap();
        assert_eq!(per_atom.repeat(&space), 6);

        config.per_atom = false;
        config.per_molecule = true;
        let per_molecule = Target::resolve(&config, space.topology()).unwrap();
        assert_eq!(per_molecule.repeat(&space), 3);

        let salt = Target::resolve(&TargetConfig::new("salt"), space.topology()).unwrap();
        assert_eq!(salt.repeat(&space), 1);
    }
}
