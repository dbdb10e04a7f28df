//! Queue sizing and wait-tuning parameters.
//!
//! # Invariants
//! - `capacity` is a hard logical bound on resident elements; the ring
//!   allocation rounds it up to the next power of two.
//! - Indices are free-running `u64` counters, so the ring may not exceed
//!   `2^63` slots; past that, wrap-safe index differences lose their meaning.
//!
//! # Design Notes
//! - Defaults match the steady-state tuning the queue was profiled with:
//!   1024 slots, 1 µs consumer pre-park pause.
//! - Hosts embed [`SpscConfig`] in their own configuration; validation runs
//!   at queue construction, not at deserialization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hard ceiling on the ring allocation, in slots.
pub const MAX_CAPACITY: u64 = 1 << 63;

/// Logical capacity used when the host does not choose one.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Construction-time tuning for an SPSC queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpscConfig {
    /// Maximum number of live elements (logical capacity `C`).
    ///
    /// The ring itself holds `C.next_power_of_two()` slots, but occupancy
    /// never exceeds `C`.
    pub capacity: usize,

    /// Consumer pre-park pause, in microseconds.
    ///
    /// An empty-handed consumer sleeps this long once before requesting a
    /// wake-up and parking, which soaks up producer microbursts without a
    /// semaphore round-trip. Zero degrades the pause to a spin hint.
    pub cons_sleep_us: u64,
}

impl Default for SpscConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            cons_sleep_us: 1,
        }
    }
}

impl SpscConfig {
    /// Default tuning with an explicit logical capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Check the hard bounds. Called by the queue constructors.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.capacity == 0 {
            return Err(BuildError::CapacityZero);
        }
        if self.capacity as u64 > MAX_CAPACITY {
            return Err(BuildError::CapacityTooLarge {
                requested: self.capacity,
            });
        }
        Ok(())
    }
}

/// Errors from queue construction.
///
/// Runtime operations (`push`, `pop`) never fail; only construction
/// validates input and allocates.
#[derive(Debug)]
#[non_exhaustive]
pub enum BuildError {
    /// A zero-capacity queue cannot hold an element.
    CapacityZero,
    /// Requested capacity exceeds the `2^63`-slot index ceiling.
    CapacityTooLarge { requested: usize },
    /// The ring allocation failed.
    OutOfMemory { slots: usize, slot_bytes: usize },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityZero => write!(f, "queue capacity must be at least 1"),
            Self::CapacityTooLarge { requested } => {
                write!(f, "queue capacity {} exceeds the 2^63 slot ceiling", requested)
            }
            Self::OutOfMemory { slots, slot_bytes } => write!(
                f,
                "failed to allocate ring of {} slots ({} bytes each)",
                slots, slot_bytes
            ),
        }
    }
}

impl std::error::Error for BuildError {}
