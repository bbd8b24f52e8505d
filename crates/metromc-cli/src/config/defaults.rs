use super::HamiltonianKind;

pub struct DefaultsConfig {
    pub macro_steps: u64,
    pub micro_steps: u64,
    pub seed: u64,
    pub replicas: usize,
    pub timeout_ms: u64,
    pub hamiltonian: HamiltonianKind,
    pub epsilon: f64,
    pub temperature: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            macro_steps: 10,
            micro_steps: 1000,
            seed: 0,
            replicas: 1,
            timeout_ms: 60_000,
            hamiltonian: HamiltonianKind::HardSphere,
            epsilon: 1.0,
            temperature: 1.0,
        }
    }
}
