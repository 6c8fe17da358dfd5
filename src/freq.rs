//! Clock domains and global cycle arithmetic.
//!
//! Every clock domain registers its frequency with a [`FrequencyRegistry`].
//! The registry keeps a global frequency equal to the least common multiple
//! of all registered frequencies, so one global cycle is the largest period
//! that divides every domain's period. Simulation time ([`SimTime`]) is
//! counted in global cycles and each domain ticks every `stride` of them.
//!
//! # Example
//!
//! ```
//! use chronokern::freq::FrequencyRegistry;
//! use chronokern::types::MHZ;
//!
//! let registry = FrequencyRegistry::new();
//! let slow = registry.register_frequency(1000 * MHZ).unwrap();
//! let fast = registry.register_frequency(2500 * MHZ).unwrap();
//!
//! assert_eq!(registry.global_frequency().unwrap(), 5000 * MHZ);
//! assert_eq!(slow.stride(), 5);
//! assert_eq!(fast.stride(), 2);
//! assert_eq!(fast.this_tick(5), 6);
//! assert_eq!(fast.next_tick(6), 8);
//! assert_eq!(slow.n_ticks_later(0, 3), 15);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::types::{Freq, SimTime, CYCLE_MAX};

/// Relative tolerance for second/cycle conversions.
const REL_TOLERANCE: f64 = 1e-9;

/// Errors from frequency arithmetic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FreqError {
    #[error("frequency must be non-zero")]
    ZeroFrequency,

    #[error("registering {requested} Hz would push the global frequency past u64 (current {current} Hz)")]
    FrequencyOverflow { current: Freq, requested: Freq },

    #[error("{value} does not land on a whole cycle (nearest {nearest})")]
    TickPrecisionLoss { value: f64, nearest: f64 },

    #[error("no frequency domain has been registered")]
    NoFrequencyDomains,

    #[error("{seconds} s is more global cycles than fit in u64")]
    CycleOverflow { seconds: f64 },

    #[error("invalid duration: {0} s")]
    InvalidDuration(f64),
}

/// Result type for frequency operations.
pub type FreqResult<T> = Result<T, FreqError>;

/// State shared by a registry and the domains it hands out.
#[derive(Debug, Default)]
struct GlobalClock {
    /// Global frequency in Hz; 0 until the first registration.
    hz: AtomicU64,
}

/// Registry of clock domains sharing one global cycle resolution.
#[derive(Debug, Default)]
pub struct FrequencyRegistry {
    clock: Arc<GlobalClock>,
    domains: RwLock<BTreeMap<Freq, Arc<FreqDomain>>>,
}

impl FrequencyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a clock domain running at `hz`.
    ///
    /// Registering an already known frequency returns the existing domain.
    /// Strides of previously returned domains follow the new global
    /// frequency, so register every domain before computing any tick.
    pub fn register_frequency(&self, hz: Freq) -> FreqResult<Arc<FreqDomain>> {
        if hz == 0 {
            return Err(FreqError::ZeroFrequency);
        }

        let mut domains = self.domains.write();
        if let Some(domain) = domains.get(&hz) {
            return Ok(Arc::clone(domain));
        }

        let current = self.clock.hz.load(Ordering::SeqCst);
        let global = if current == 0 {
            hz
        } else {
            lcm(current, hz).ok_or(FreqError::FrequencyOverflow {
                current,
                requested: hz,
            })?
        };

        self.clock.hz.store(global, Ordering::SeqCst);
        let domain = Arc::new(FreqDomain {
            hz,
            clock: Arc::clone(&self.clock),
        });
        domains.insert(hz, Arc::clone(&domain));

        tracing::debug!(hz, global, "registered frequency domain");
        Ok(domain)
    }

    /// Returns the domain for `hz` if it has been registered.
    pub fn domain(&self, hz: Freq) -> Option<Arc<FreqDomain>> {
        self.domains.read().get(&hz).cloned()
    }

    /// Number of registered domains.
    pub fn domain_count(&self) -> usize {
        self.domains.read().len()
    }

    /// The global frequency (LCM of every registered frequency).
    pub fn global_frequency(&self) -> FreqResult<Freq> {
        match self.clock.hz.load(Ordering::SeqCst) {
            0 => Err(FreqError::NoFrequencyDomains),
            hz => Ok(hz),
        }
    }

    /// Converts a duration in seconds to global cycles.
    ///
    /// Fails with [`FreqError::TickPrecisionLoss`] when the duration is not a
    /// whole number of global cycles.
    pub fn seconds_to_cycles(&self, seconds: f64) -> FreqResult<SimTime> {
        let global = self.global_frequency()?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(FreqError::InvalidDuration(seconds));
        }

        let cycles = seconds * global as f64;
        // 2^64 is the first value that does not fit.
        if cycles >= u64::MAX as f64 {
            return Err(FreqError::CycleOverflow { seconds });
        }

        let nearest = cycles.round();
        if (cycles - nearest).abs() > tolerance(cycles) {
            return Err(FreqError::TickPrecisionLoss {
                value: cycles,
                nearest,
            });
        }
        Ok(nearest as SimTime)
    }

    /// Converts global cycles to seconds.
    ///
    /// Fails with [`FreqError::TickPrecisionLoss`] when `cycles` cannot be
    /// represented exactly enough as a float.
    pub fn cycles_to_seconds(&self, cycles: SimTime) -> FreqResult<f64> {
        let global = self.global_frequency()?;

        let as_float = cycles as f64;
        if as_float as u128 != u128::from(cycles) {
            return Err(FreqError::TickPrecisionLoss {
                value: cycles as f64,
                nearest: as_float,
            });
        }

        let seconds = as_float / global as f64;
        let back = seconds * global as f64;
        if (back - as_float).abs() > tolerance(as_float) {
            return Err(FreqError::TickPrecisionLoss {
                value: back,
                nearest: as_float,
            });
        }
        Ok(seconds)
    }
}

/// A clock domain: one frequency expressed in global cycles.
pub struct FreqDomain {
    hz: Freq,
    clock: Arc<GlobalClock>,
}

impl FreqDomain {
    /// Frequency of this domain in Hz.
    pub fn hz(&self) -> Freq {
        self.hz
    }

    /// Global cycles per local tick.
    pub fn stride(&self) -> SimTime {
        // The global frequency is a multiple of every registered frequency.
        self.clock.hz.load(Ordering::SeqCst) / self.hz
    }

    /// Period of one local tick in seconds.
    pub fn period_seconds(&self) -> f64 {
        1.0 / self.hz as f64
    }

    /// Rounds `now` up to the nearest tick boundary of this domain.
    pub fn this_tick(&self, now: SimTime) -> SimTime {
        let stride = self.stride();
        match now % stride {
            0 => now,
            rem => now.checked_add(stride - rem).unwrap_or(CYCLE_MAX),
        }
    }

    /// The first tick boundary strictly after `now`.
    pub fn next_tick(&self, now: SimTime) -> SimTime {
        let stride = self.stride();
        (now / stride)
            .checked_add(1)
            .and_then(|ticks| ticks.checked_mul(stride))
            .unwrap_or(CYCLE_MAX)
    }

    /// The tick boundary `n` ticks after [`this_tick(now)`](Self::this_tick).
    pub fn n_ticks_later(&self, now: SimTime, n: u64) -> SimTime {
        let base = self.this_tick(now);
        if base == CYCLE_MAX {
            return CYCLE_MAX;
        }
        n.checked_mul(self.stride())
            .and_then(|offset| base.checked_add(offset))
            .unwrap_or(CYCLE_MAX)
    }

    /// Number of whole local ticks elapsed at global cycle `now`.
    pub fn local_ticks(&self, now: SimTime) -> u64 {
        now / self.stride()
    }

    /// Global cycle at which local tick number `ticks` begins.
    pub fn global_cycles(&self, ticks: u64) -> SimTime {
        ticks.checked_mul(self.stride()).unwrap_or(CYCLE_MAX)
    }
}

impl fmt::Debug for FreqDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreqDomain")
            .field("hz", &self.hz)
            .field("stride", &self.stride())
            .finish()
    }
}

fn tolerance(magnitude: f64) -> f64 {
    REL_TOLERANCE * magnitude.abs().max(1.0)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Least common multiple, or `None` on overflow.
fn lcm(a: u64, b: u64) -> Option<u64> {
    (a / gcd(a, b)).checked_mul(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GHZ, MHZ};

    #[test]
    fn test_gcd_lcm() {
        assert_eq!(gcd(12, 18), 6);
        assert_eq!(lcm(4, 6), Some(12));
        assert_eq!(lcm(GHZ, 2500 * MHZ), Some(5 * GHZ));
        assert_eq!(lcm(u64::MAX, u64::MAX - 1), None);
    }

    #[test]
    fn test_zero_frequency() {
        let registry = FrequencyRegistry::new();
        assert_eq!(registry.register_frequency(0).unwrap_err(), FreqError::ZeroFrequency);
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = FrequencyRegistry::new();
        let a = registry.register_frequency(GHZ).unwrap();
        let b = registry.register_frequency(GHZ).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.domain_count(), 1);
    }

    #[test]
    fn test_overflow_leaves_registry_unchanged() {
        let registry = FrequencyRegistry::new();
        registry.register_frequency(u64::MAX).unwrap();

        let err = registry.register_frequency(u64::MAX - 1).unwrap_err();
        assert!(matches!(err, FreqError::FrequencyOverflow { .. }));
        assert_eq!(registry.global_frequency().unwrap(), u64::MAX);
        assert_eq!(registry.domain_count(), 1);
    }

    #[test]
    fn test_no_domains() {
        let registry = FrequencyRegistry::new();
        assert_eq!(registry.global_frequency().unwrap_err(), FreqError::NoFrequencyDomains);
        assert_eq!(registry.seconds_to_cycles(1.0).unwrap_err(), FreqError::NoFrequencyDomains);
        assert_eq!(registry.cycles_to_seconds(1).unwrap_err(), FreqError::NoFrequencyDomains);
    }

    #[test]
    fn test_tick_saturates() {
        let registry = FrequencyRegistry::new();
        registry.register_frequency(GHZ).unwrap();
        let fast = registry.register_frequency(2500 * MHZ).unwrap();

        assert_eq!(fast.this_tick(CYCLE_MAX), CYCLE_MAX);
        assert_eq!(fast.next_tick(CYCLE_MAX - 1), CYCLE_MAX);
        assert_eq!(fast.n_ticks_later(0, u64::MAX), CYCLE_MAX);
        assert_eq!(fast.global_cycles(u64::MAX), CYCLE_MAX);
    }

    #[test]
    fn test_local_and_global_ticks() {
        let registry = FrequencyRegistry::new();
        registry.register_frequency(GHZ).unwrap();
        let fast = registry.register_frequency(2500 * MHZ).unwrap();

        assert_eq!(fast.local_ticks(9), 4);
        assert_eq!(fast.global_cycles(4), 8);
        assert!((fast.period_seconds() - 0.4e-9).abs() < 1e-20);
    }

    #[test]
    fn test_seconds_to_cycles() {
        let registry = FrequencyRegistry::new();
        registry.register_frequency(GHZ).unwrap();
        registry.register_frequency(2500 * MHZ).unwrap();

        assert_eq!(registry.seconds_to_cycles(1e-9).unwrap(), 5);
        assert_eq!(registry.seconds_to_cycles(1.0).unwrap(), 5 * GHZ);
        assert!(matches!(
            registry.seconds_to_cycles(0.1e-9),
            Err(FreqError::TickPrecisionLoss { .. })
        ));
        assert!(matches!(
            registry.seconds_to_cycles(-1.0),
            Err(FreqError::InvalidDuration(_))
        ));
        assert!(matches!(
            registry.seconds_to_cycles(1e12),
            Err(FreqError::CycleOverflow { .. })
        ));
    }

    #[test]
    fn test_cycles_to_seconds() {
        let registry = FrequencyRegistry::new();
        registry.register_frequency(GHZ).unwrap();

        let seconds = registry.cycles_to_seconds(3).unwrap();
        assert!((seconds - 3e-9).abs() < 1e-20);
        assert!(matches!(
            registry.cycles_to_seconds(u64::MAX),
            Err(FreqError::TickPrecisionLoss { .. })
        ));
    }
}
