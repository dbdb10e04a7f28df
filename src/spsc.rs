//! Bounded single-producer/single-consumer queue with adaptive blocking.
//!
//! # Design
//!
//! One producer thread hands owned values to one consumer thread across a
//! fixed, power-of-two ring. Both sides prefer lock-free progress, fall back
//! to a short sub-scheduler pause (consumer only), and park on a latching
//! [`Semaphore`] as a last resort. The protocol is built to keep the
//! steady-state free of cross-core writes:
//!
//! - **Free-running indices**: the producer index `P` and consumer index `Q`
//!   are monotonically non-decreasing `u64` counters; occupancy is `P - Q`
//!   in wrapping arithmetic, so no sentinel slot is needed and the ring's
//!   logical capacity may sit below its power-of-two slot count.
//! - **Shadow indices**: each endpoint caches its own index and the
//!   counterpart's last observed index locally, touching the shared atomics
//!   only when the cached view runs out.
//! - **Wake thresholds**: a stalling side publishes an advisory threshold
//!   ("signal me once you cross X") and parks. The counterpart checks the
//!   threshold on each publishing advance. The producer's threshold carries
//!   hysteresis: it asks to be woken only after the oldest quarter of the
//!   backlog drains, so a full queue does not wake the producer once per
//!   consumed element.
//! - **Lazy publication**: [`Producer::push_lazy`] defers the index publish
//!   so bursts amortize the release store and the wake-up check; a later
//!   forced push or [`Producer::flush`] makes the whole prefix visible.
//!
//! # Ordering rationale
//!
//! ```text
//! producer writes slot, then Release-stores P  →  consumer Acquire-loads P, then reads slot
//! consumer reads slot, then Release-stores Q   →  producer Acquire-loads Q, then reuses slot
//! ```
//!
//! The wake thresholds are loaded and stored with Relaxed ordering: they are
//! pure hints. Every park site re-checks occupancy after publishing its
//! threshold, and every wake passes through the semaphore's mutex, so a
//! stale threshold read costs at most a deferred or duplicate signal, never
//! a lost element. Do not strengthen the threshold orderings; the protocol
//! is designed around the re-check windows, not around hint visibility.
//!
//! # Safety
//!
//! Slot storage is `UnsafeCell<MaybeUninit<T>>`. A slot at `i & mask` is
//! initialized exactly when `Q <= i < P` (plus slots the producer has filled
//! but not yet published, which only the producer can see). Exclusive slot
//! access follows from that invariant; invariants are restated at each
//! `unsafe` site.

#[cfg(loom)]
use loom::sync::atomic::{AtomicU64, Ordering};
#[cfg(not(loom))]
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(loom)]
use loom::sync::Arc;
#[cfg(not(loom))]
use std::sync::Arc;

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::time::Duration;

use crossbeam_utils::CachePadded;

use crate::config::{BuildError, SpscConfig};
use crate::semaphore::Semaphore;

/// Producer wake hysteresis: ask to be woken once the oldest quarter of the
/// outstanding backlog has drained, not on every consumed element.
const PROD_WAKE_DIVISOR: u64 = 4;

/// Threshold value meaning "no wake requested". Both sides store a real
/// threshold before parking, so the initial value only has to stay inert
/// under the crossing test.
const EVENT_IDLE: u64 = u64::MAX;

/// Wrap-safe threshold crossing test: did the advance from `old` to `new`
/// move the index past `event`?
///
/// Equality with `new - 1` counts as crossed, equality with `old - 1` does
/// not; computed with unsigned wrap-around subtraction so the comparison
/// stays exact across a 64-bit wrap.
#[inline]
fn crossed(event: u64, old: u64, new: u64) -> bool {
    new.wrapping_sub(event).wrapping_sub(1) < new.wrapping_sub(old)
}

// ============================================================================
// Shared State
// ============================================================================

/// Producer-published cache line: written only by the producer.
struct ProdShared {
    /// Next slot the producer will fill; slots below it are published.
    index: AtomicU64,
    /// Wake request: signal the producer once the consumer index crosses this.
    event: AtomicU64,
}

/// Consumer-published cache line: written only by the consumer.
struct ConsShared {
    /// Next slot the consumer will read; slots below it are free.
    index: AtomicU64,
    /// Wake request: signal the consumer once the producer index crosses this.
    event: AtomicU64,
}

/// Semaphore signal counters, shared read-only with diagnostics threads.
struct SignalStats {
    /// Signals performed by the producer (on the consumer semaphore).
    prod: CachePadded<AtomicU64>,
    /// Signals performed by the consumer (on the producer semaphore).
    cons: CachePadded<AtomicU64>,
}

/// Shared core of the queue: ring storage, published indices, and the park
/// primitives. Heap-allocated once and address-stable behind `Arc`; the
/// endpoints are the only handles to it.
///
/// # Invariants
///
/// - `buf.len()` is a power of two with `capacity <= buf.len() <= 2^63`.
/// - Slot `i & mask` holds an initialized element exactly when
///   `cons.index <= i < prod.index` (wrap-safe), plus any producer-local
///   unpublished tail.
/// - Only the producer stores `prod.index` / `prod.event`; only the consumer
///   stores `cons.index` / `cons.event`. Shared fields written by different
///   threads sit on distinct padded cache lines.
struct Shared<T> {
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// `buf.len() - 1`; a counter maps to its slot via `i & mask`.
    mask: u64,
    /// Logical capacity `C`; occupancy never exceeds it.
    capacity: u64,
    /// Consumer pre-park pause.
    cons_sleep: Duration,
    prod: CachePadded<ProdShared>,
    cons: CachePadded<ConsShared>,
    /// Parks the producer; signaled by the consumer.
    prod_sem: CachePadded<Semaphore>,
    /// Parks the consumer; signaled by the producer.
    cons_sem: CachePadded<Semaphore>,
    stats: Arc<SignalStats>,
}

// SAFETY: The index protocol guarantees the producer and consumer touch
// disjoint slots, and each shared atomic has a single writer. Handles move
// across threads (Send) and both endpoints alias the core (Sync); element
// values themselves cross threads, hence T: Send.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        // Both endpoints are gone, so the published indices are final; the
        // producer's endpoint publishes its unpublished tail on drop.
        let mut index = self.cons.index.load(Ordering::Relaxed);
        let end = self.prod.index.load(Ordering::Relaxed);
        while index != end {
            let slot = (index & self.mask) as usize;
            // SAFETY: slots in [cons.index, prod.index) are initialized and
            // no other thread can touch them anymore.
            unsafe { self.buf[slot].get_mut().assume_init_drop() };
            index = index.wrapping_add(1);
        }
    }
}

// ============================================================================
// Construction
// ============================================================================

/// Create a queue with default tuning and the given logical capacity.
///
/// The ring allocation rounds `capacity` up to the next power of two; the
/// logical capacity stays as requested.
///
/// # Examples
///
/// ```
/// let (mut tx, mut rx) = pipeq::channel::<u64>(8)?;
/// tx.push(42);
/// assert_eq!(rx.pop(), 42);
/// # Ok::<(), pipeq::BuildError>(())
/// ```
pub fn channel<T>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), BuildError> {
    channel_with(SpscConfig::with_capacity(capacity))
}

/// Create a queue from an explicit [`SpscConfig`].
pub fn channel_with<T>(config: SpscConfig) -> Result<(Producer<T>, Consumer<T>), BuildError> {
    config.validate()?;

    let slots = (config.capacity as u64).next_power_of_two() as usize;
    let mut buf: Vec<UnsafeCell<MaybeUninit<T>>> = Vec::new();
    buf.try_reserve_exact(slots).map_err(|_| BuildError::OutOfMemory {
        slots,
        slot_bytes: std::mem::size_of::<T>(),
    })?;
    buf.resize_with(slots, || UnsafeCell::new(MaybeUninit::uninit()));

    let stats = Arc::new(SignalStats {
        prod: CachePadded::new(AtomicU64::new(0)),
        cons: CachePadded::new(AtomicU64::new(0)),
    });

    let shared = Arc::new(Shared {
        buf: buf.into_boxed_slice(),
        mask: slots as u64 - 1,
        capacity: config.capacity as u64,
        cons_sleep: Duration::from_micros(config.cons_sleep_us),
        prod: CachePadded::new(ProdShared {
            index: AtomicU64::new(0),
            event: AtomicU64::new(EVENT_IDLE),
        }),
        cons: CachePadded::new(ConsShared {
            index: AtomicU64::new(0),
            event: AtomicU64::new(EVENT_IDLE),
        }),
        prod_sem: CachePadded::new(Semaphore::new()),
        cons_sem: CachePadded::new(Semaphore::new()),
        stats,
    });

    let producer = Producer {
        shared: shared.clone(),
        pi: 0,
        published: 0,
        ci: 0,
    };
    let consumer = Consumer {
        shared,
        ci: 0,
        published: 0,
        pi: 0,
    };
    Ok((producer, consumer))
}

// ============================================================================
// Observability
// ============================================================================

/// Read-only view of the queue's semaphore signal counters.
///
/// Cloneable and shareable with a diagnostics thread. Both counts are
/// monotonically non-decreasing and grow only on the slow path, so under
/// steady traffic they rise sublinearly with throughput.
#[derive(Clone)]
pub struct SignalCounters {
    stats: Arc<SignalStats>,
}

impl SignalCounters {
    /// Times the producer signaled the consumer semaphore.
    pub fn producer_signals(&self) -> u64 {
        self.stats.prod.load(Ordering::Relaxed)
    }

    /// Times the consumer signaled the producer semaphore.
    pub fn consumer_signals(&self) -> u64 {
        self.stats.cons.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Producer
// ============================================================================

/// Write end of the queue.
///
/// `Send` for `T: Send`; all operations take `&mut self`, so exactly one
/// thread can drive it at a time — the single-producer discipline is
/// enforced statically.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    /// Local producer index; runs ahead of `published` under lazy pushes.
    pi: u64,
    /// Last value of `pi` made visible to the consumer.
    published: u64,
    /// Shadow of the consumer's published index.
    ci: u64,
}

impl<T> Producer<T> {
    /// Push `value` and publish it to the consumer immediately.
    ///
    /// Blocks while the queue is full. Never fails and never drops.
    pub fn push(&mut self, value: T) {
        self.push_with(value, true);
    }

    /// Push `value` without publishing it.
    ///
    /// The item (and any lazily pushed items before it) becomes visible to
    /// the consumer only at the next [`push`](Self::push), [`flush`](Self::flush),
    /// or slow-path publish. Blocks while the queue is full.
    pub fn push_lazy(&mut self, value: T) {
        self.push_with(value, false);
    }

    fn push_with(&mut self, value: T, force: bool) {
        self.wait_space(1);
        let slot = (self.pi & self.shared.mask) as usize;
        // SAFETY: wait_space guarantees slot `pi` is vacant: the consumer
        // only reads indices below the published producer index, and `pi`
        // has not been published yet.
        unsafe { (*self.shared.buf[slot].get()).write(value) };
        self.pi = self.pi.wrapping_add(1);
        if force {
            self.notify();
        }
    }

    /// Publish every lazily pushed item and run the wake-up check.
    pub fn flush(&mut self) {
        if self.published != self.pi {
            self.notify();
        }
    }

    /// Logical capacity of the queue.
    pub fn capacity(&self) -> usize {
        self.shared.capacity as usize
    }

    /// Handle to the queue's signal counters.
    pub fn counters(&self) -> SignalCounters {
        SignalCounters {
            stats: self.shared.stats.clone(),
        }
    }

    /// Block until at least `want` slots are free.
    fn wait_space(&mut self, want: u64) {
        debug_assert!(want >= 1 && want <= self.shared.capacity);
        loop {
            if self.has_space(want) {
                return;
            }
            // Ask to be woken once the oldest quarter of the backlog drains.
            let backlog = self.pi.wrapping_sub(self.ci);
            let event = self.ci.wrapping_add(backlog / PROD_WAKE_DIVISOR);
            self.shared.prod.event.store(event, Ordering::Relaxed);
            // Publish before parking: the consumer may itself be parked
            // behind an unpublished lazy tail, and the publish hands it
            // everything pushed so far.
            self.notify();
            if self.has_space(want) {
                return;
            }
            self.shared.prod_sem.wait();
        }
    }

    /// Refresh the shadow of the consumer index and test for `want` free
    /// slots.
    #[inline]
    fn has_space(&mut self, want: u64) -> bool {
        self.ci = self.shared.cons.index.load(Ordering::Acquire);
        self.pi.wrapping_sub(self.ci) <= self.shared.capacity - want
    }

    /// Publish the local producer index; signal the consumer if this advance
    /// crossed its wake threshold.
    fn notify(&mut self) {
        let old = self.published;
        self.shared.prod.index.store(self.pi, Ordering::Release);
        self.published = self.pi;

        let event = self.shared.cons.event.load(Ordering::Relaxed);
        if crossed(event, old, self.pi) {
            self.shared.cons_sem.signal();
            self.shared.stats.prod.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        // Hand any lazily pushed tail to the consumer; the shared drop
        // accounting walks the published range only.
        self.flush();
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Read end of the queue.
///
/// `Send` for `T: Send`; all operations take `&mut self`, mirroring
/// [`Producer`]'s single-thread discipline.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    /// Local consumer index.
    ci: u64,
    /// Last value of `ci` made visible to the producer.
    published: u64,
    /// Shadow of the producer's published index.
    pi: u64,
}

impl<T> Consumer<T> {
    /// Pop the oldest element. Blocks while the queue is empty.
    pub fn pop(&mut self) -> T {
        self.wait_data(1);
        let slot = (self.ci & self.shared.mask) as usize;
        // SAFETY: wait_data observed a published producer index beyond `ci`,
        // so the slot holds an initialized element the producer will not
        // touch again until `ci` advances past it.
        let value = unsafe { (*self.shared.buf[slot].get()).assume_init_read() };
        self.advance(1);
        value
    }

    /// Drain every currently available element into `out`.
    ///
    /// Blocks until at least one element is available; returns the number
    /// appended, which is at least 1.
    pub fn pop_batch(&mut self, out: &mut Vec<T>) -> usize {
        self.pop_batch_capped(out, usize::MAX)
    }

    /// Drain up to `max` currently available elements into `out`.
    ///
    /// Blocks until at least one element is available. A `max` of zero
    /// returns 0 immediately without blocking.
    pub fn pop_batch_capped(&mut self, out: &mut Vec<T>, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        let available = self.wait_data(1);
        let take = available.min(max as u64);
        out.reserve(take as usize);
        for i in 0..take {
            let slot = (self.ci.wrapping_add(i) & self.shared.mask) as usize;
            // SAFETY: wait_data returned `available`, so slots in
            // [ci, ci + available) are published and initialized.
            out.push(unsafe { (*self.shared.buf[slot].get()).assume_init_read() });
        }
        self.advance(take);
        take as usize
    }

    /// Number of elements currently visible, without blocking.
    ///
    /// Refreshes the shadow of the producer index. Says nothing about items
    /// the producer has pushed lazily but not yet published.
    pub fn available(&mut self) -> u64 {
        self.pi = self.shared.prod.index.load(Ordering::Acquire);
        self.pi.wrapping_sub(self.ci)
    }

    /// Logical capacity of the queue.
    pub fn capacity(&self) -> usize {
        self.shared.capacity as usize
    }

    /// Handle to the queue's signal counters.
    pub fn counters(&self) -> SignalCounters {
        SignalCounters {
            stats: self.shared.stats.clone(),
        }
    }

    /// Block until at least `want` elements are visible; returns how many
    /// actually are.
    fn wait_data(&mut self, want: u64) -> u64 {
        debug_assert!(want >= 1 && want <= self.shared.capacity);
        loop {
            if self.has_data(want) {
                break;
            }
            // Sub-scheduler pause: soak up a producer microburst without a
            // semaphore round-trip.
            self.pause();
            if self.has_data(want) {
                break;
            }
            self.shared
                .cons
                .event
                .store(self.ci.wrapping_add(want).wrapping_sub(1), Ordering::Relaxed);
            self.notify();
            // Mandatory re-check: the producer either sees the threshold
            // just stored and will signal, or has already advanced past it
            // and this check sees the data.
            if self.has_data(want) {
                break;
            }
            self.shared.cons_sem.wait();
        }
        self.pi.wrapping_sub(self.ci)
    }

    /// Refresh the shadow of the producer index and test for `want`
    /// visible elements.
    #[inline]
    fn has_data(&mut self, want: u64) -> bool {
        self.pi = self.shared.prod.index.load(Ordering::Acquire);
        self.pi.wrapping_sub(self.ci) >= want
    }

    /// Advance the consumer index by `have` consumed elements and publish
    /// the advance.
    ///
    /// Publishing on every advance (rather than only when the view drains
    /// empty) bounds a blocked producer's wake latency by its hysteresis
    /// threshold instead of by a full drain; the threshold still gates the
    /// actual signal.
    fn advance(&mut self, have: u64) {
        self.ci = self.ci.wrapping_add(have);
        self.notify();
    }

    /// Publish the local consumer index; signal the producer if this advance
    /// crossed its wake threshold.
    fn notify(&mut self) {
        let old = self.published;
        self.shared.cons.index.store(self.ci, Ordering::Release);
        self.published = self.ci;

        let event = self.shared.prod.event.load(Ordering::Relaxed);
        if crossed(event, old, self.ci) {
            self.shared.prod_sem.signal();
            self.shared.stats.cons.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[cfg(not(loom))]
    fn pause(&self) {
        if self.shared.cons_sleep.is_zero() {
            std::hint::spin_loop();
        } else {
            std::thread::sleep(self.shared.cons_sleep);
        }
    }

    #[cfg(loom)]
    fn pause(&self) {
        loom::thread::yield_now();
    }
}

// ============================================================================
// Tests
// ============================================================================


// Threaded scenario tests and property tests live in the sibling module.
#[cfg(all(test, not(loom)))]
#[path = "spsc_tests.rs"]
mod spsc_tests;

// ============================================================================
// Loom Tests
// ============================================================================
