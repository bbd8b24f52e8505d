use nalgebra::Vector3;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, UnitSphere};

/// Deterministic random stream owned by a single consumer.
///
/// Every move and the dispatcher carry their own source, seeded at construction, so a run is
/// reproducible from its seeds alone and replicas seeded alike draw identical sequences.
#[derive(Debug, Clone)]
pub struct RandomSource {
    seed: u64,
    rng: ChaCha8Rng,
}

impl RandomSource {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform number in `[0, 1)`.
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen_range(0.0..1.0)
    }

    /// Uniform number in `[-0.5, 0.5)`.
    #[inline]
    pub fn half(&mut self) -> f64 {
        self.uniform() - 0.5
    }

    /// Uniform integer in `[0, n)`. Returns 0 for `n == 0` after consuming a draw.
    pub fn below(&mut self, n: usize) -> usize {
        let r = self.uniform();
        ((r * n as f64) as usize).min(n.saturating_sub(1))
    }

    /// Fair coin, true with probability one half.
    pub fn coin(&mut self) -> bool {
        self.below(2) == 1
    }

    pub fn unit_vector(&mut self) -> Vector3<f64> {
        let [x, y, z]: [f64; 3] = UnitSphere.sample(&mut self.rng);
        Vector3::new(x, y, z)
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        let k = self.below(items.len());
        items.get(k)
    }
}

impl RngCore for RandomSource {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}
