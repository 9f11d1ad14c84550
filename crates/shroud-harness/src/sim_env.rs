//! Simulated environment: virtual clock and seeded RNG.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use shroud_core::Environment;

/// Environment for deterministic simulation.
///
/// Time is a [`Duration`] since the start of the simulation and only moves
/// when [`SimEnv::advance`] or [`Environment::sleep`] is called. Clones share
/// the clock and the RNG stream.
#[derive(Clone)]
pub struct SimEnv {
    clock: Arc<Mutex<Duration>>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimEnv {
    /// Create an environment at time zero with the given RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            clock: Arc::new(Mutex::new(Duration::ZERO)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Move virtual time forward.
    pub fn advance(&self, by: Duration) {
        #[allow(clippy::expect_used)]
        let mut clock = self.clock.lock().expect("SimEnv clock mutex poisoned");
        *clock += by;
    }

    /// Virtual time since the simulation started.
    pub fn elapsed(&self) -> Duration {
        self.now()
    }
}

impl Environment for SimEnv {
    type Instant = Duration;

    fn now(&self) -> Duration {
        #[allow(clippy::expect_used)]
        *self.clock.lock().expect("SimEnv clock mutex poisoned")
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        #[allow(clippy::expect_used)]
        self.rng.lock().expect("SimEnv rng mutex poisoned").fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_bytes() {
        let a = SimEnv::with_seed(42);
        let b = SimEnv::with_seed(42);
        assert_eq!(a.random_array::<32>(), b.random_array::<32>());
    }

    #[test]
    fn different_seed_different_bytes() {
        let a = SimEnv::with_seed(1);
        let b = SimEnv::with_seed(2);
        assert_ne!(a.random_array::<32>(), b.random_array::<32>());
    }

    #[test]
    fn clones_share_clock() {
        let env = SimEnv::with_seed(0);
        let other = env.clone();

        env.advance(Duration::from_secs(3));
        assert_eq!(other.now(), Duration::from_secs(3));
    }

    #[test]
    fn sleep_advances_virtual_time() {
        let env = SimEnv::with_seed(0);
        drop(env.sleep(Duration::from_millis(250)));
        assert_eq!(env.elapsed(), Duration::from_millis(250));
    }
}
