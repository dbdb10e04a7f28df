//! Low-latency bounded SPSC queueing for packet-processing pipelines.
//!
//! # Scope
//! One producer thread hands owned items to one consumer thread across a
//! fixed power-of-two ring. Both sides prefer lock-free progress, fall back
//! to a short sub-scheduler pause, and only as a last resort park on a
//! latching semaphore. Tuned for sustained, bursty traffic where cross-core
//! cache-line ping-pong dominates latency.
//!
//! # Design themes
//! - Wait-free steady state: the hot path is one acquire load and one
//!   release store per side, against shadow-cached indices.
//! - Adaptive blocking: advisory wake thresholds with drain hysteresis keep
//!   semaphore traffic sublinear in throughput.
//! - Lazy publication: burst producers may defer the index publish and
//!   amortize the release store and wake-up check over a whole burst.
//! - Fixed, upfront capacity; occupancy is bounded by construction.
//!
//! # Module map
//! - `spsc`: the queue core — ring storage, index protocol, endpoints.
//! - `semaphore`: single-slot latching park primitive for the slow paths.
//! - `config`: construction tuning and validation.
//!
//! # Safety
//! `spsc` uses `unsafe` for `MaybeUninit` slot access and relies on the
//! index-protocol invariants documented there. Read those before extending
//! the internals.

pub mod config;
pub mod semaphore;
pub mod spsc;
#[cfg(test)]
pub mod test_utils;

pub use config::{BuildError, SpscConfig, DEFAULT_CAPACITY, MAX_CAPACITY};
pub use semaphore::Semaphore;
pub use spsc::{channel, channel_with, Consumer, Producer, SignalCounters};
