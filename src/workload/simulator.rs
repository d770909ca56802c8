//! Workload Primitives
//!
//! Deliberately wasteful CPU and wall-clock consumers. Nothing here
//! produces a useful result; the side effect is CPU utilization and elapsed
//! time that the resource sampler can observe.

use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use rand::Rng;

/// Bit width of the random prime candidates.
const CANDIDATE_BITS: u32 = 24;

/// A unit of synthetic work performed by a pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Workload {
    /// Busy-loop on prime searches for at least this long
    Burn(Duration),
    /// Sleep for a random duration within the range
    Idle { min: Duration, max: Duration },
}

impl Workload {
    /// Performs the workload, blocking the calling thread until it finishes.
    pub fn perform(&self) {
        match self {
            Workload::Burn(duration) => burn_cpu(*duration),
            Workload::Idle { min, max } => idle(*min, *max),
        }
    }

    /// Lower bound on how long [`perform`](Self::perform) takes.
    pub fn min_duration(&self) -> Duration {
        match self {
            Workload::Burn(duration) => *duration,
            Workload::Idle { min, .. } => *min,
        }
    }
}

/// Keeps the CPU busy until `duration` has elapsed on the monotonic clock.
///
/// Each iteration searches for a random 24-bit prime and throws it away.
/// The loop only checks the clock between searches, so it may overshoot by
/// the cost of one search.
pub fn burn_cpu(duration: Duration) {
    let start = Instant::now();
    let mut searches: u64 = 0;

    while start.elapsed() < duration {
        let _ = find_large_prime();
        searches += 1;
    }

    debug!(
        "Burned CPU for {:.2?} ({} prime searches)",
        start.elapsed(),
        searches
    );
}

/// Sleeps for a duration drawn uniformly from `[min, max]`.
///
/// A degenerate range (`max <= min`) sleeps for exactly `min`.
pub fn idle(min: Duration, max: Duration) {
    let pause = if max <= min {
        min
    } else {
        let secs = rand::thread_rng().gen_range(min.as_secs_f64()..=max.as_secs_f64());
        Duration::from_secs_f64(secs)
    };

    debug!("Idling for {:.2?}", pause);
    thread::sleep(pause);
}

/// Draws random 24-bit numbers until one is prime and returns it.
pub fn find_large_prime() -> u32 {
    let mut rng = rand::thread_rng();
    loop {
        let candidate: u32 = rng.gen_range(0..1u32 << CANDIDATE_BITS);
        if is_prime(candidate) {
            return candidate;
        }
    }
}

/// Deterministic primality test by 6k ± 1 trial division.
pub fn is_prime(n: u32) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }

    let n = u64::from(n);
    let mut i: u64 = 5;
    while i * i <= n {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}
