use crate::domain::user_config::RunPolicy;
use rand::Rng;
use std::sync::Arc;

/// Source of uniform draws in `[0, 100)`.
pub trait RandomSource: Send + Sync {
    fn percentile(&self) -> f64;
}

pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn percentile(&self) -> f64 {
        rand::thread_rng().gen_range(0.0..100.0)
    }
}

/// Deterministic draws for tests.
#[cfg(test)]
pub struct SeededSource(std::sync::Mutex<rand::rngs::StdRng>);

#[cfg(test)]
impl SeededSource {
    pub fn new(seed: u64) -> Self {
        use rand::SeedableRng;
        Self(std::sync::Mutex::new(rand::rngs::StdRng::seed_from_u64(seed)))
    }
}

#[cfg(test)]
impl RandomSource for SeededSource {
    fn percentile(&self) -> f64 {
        let mut rng = self.0.lock().unwrap();
        rng.gen_range(0.0..100.0)
    }
}

/// Decides whether an accepted event is persisted.
pub struct SamplingDecider {
    source: Arc<dyn RandomSource>,
}

impl SamplingDecider {
    pub fn new(source: Arc<dyn RandomSource>) -> Self {
        Self { source }
    }

    pub fn thread_rng() -> Self {
        Self::new(Arc::new(ThreadRngSource))
    }

    /// `Always` persists without drawing. `Sampled` persists when a draw in
    /// `[0, 100)` falls below `sample_rate_pct`, so 0 never persists and 100 always does.
    pub fn should_persist(&self, policy: RunPolicy, sample_rate_pct: i32) -> bool {
        match policy {
            RunPolicy::Always => true,
            RunPolicy::Sampled => self.source.percentile() < f64::from(sample_rate_pct),
        }
    }
}
