use rand::Rng;

/// Source of the noise mixed into volume and trend estimates.
pub trait VolumeEstimator: Send + Sync {
    /// A value in `0..spread`; zero when `spread` is zero.
    fn jitter(&self, spread: u64) -> u64;

    /// A value in `[0, 1)`.
    fn roll(&self) -> f64;
}

/// Production estimator backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomEstimator;

impl VolumeEstimator for RandomEstimator {
    fn jitter(&self, spread: u64) -> u64 {
        if spread == 0 {
            return 0;
        }
        rand::rng().random_range(0..spread)
    }

    fn roll(&self) -> f64 {
        rand::rng().random::<f64>()
    }
}

/// Deterministic estimator for tests and reproducible runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedEstimator {
    pub jitter: u64,
    pub roll: f64,
}

impl Default for FixedEstimator {
    fn default() -> Self {
        Self {
            jitter: 0,
            roll: 0.5,
        }
    }
}

impl VolumeEstimator for FixedEstimator {
    fn jitter(&self, spread: u64) -> u64 {
        self.jitter.min(spread.saturating_sub(1))
    }

    fn roll(&self) -> f64 {
        self.roll.clamp(0.0, 0.999_999)
    }
}
