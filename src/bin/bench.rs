//! Queue rate harness.
//!
//! Drives one producer/consumer pair as hard as possible and prints
//! per-interval throughput and semaphore signal rates, so the adaptive
//! blocking behavior can be eyeballed under different tunings.
//!
//! ```bash
//! cargo run --release --bin bench -- --items 50000000 --capacity 1024
//! cargo run --release --bin bench -- --burst 64 --sleep-us 2
//! ```

use std::process;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pipeq::{channel_with, SpscConfig};

// ============================================================================
// Argument Parsing
// ============================================================================

#[derive(Debug)]
struct Args {
    /// Logical queue capacity.
    capacity: usize,
    /// Total items to move through the queue.
    items: u64,
    /// Lazy-publication burst size; 1 publishes every push.
    burst: u64,
    /// Consumer pre-park pause in microseconds.
    sleep_us: u64,
    /// Stats printing interval in milliseconds.
    interval_ms: u64,
    help: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            capacity: 1024,
            items: 10_000_000,
            burst: 1,
            sleep_us: 1,
            interval_ms: 1000,
            help: false,
        }
    }
}

fn usage() {
    println!(
        "bench — SPSC queue rate harness

USAGE:
    bench [OPTIONS]

OPTIONS:
    --capacity N       logical queue capacity (default 1024)
    --items N          total items to transfer (default 10000000)
    --burst N          publish every N-th push lazily batched (default 1)
    --sleep-us N       consumer pre-park pause in microseconds (default 1)
    --interval-ms N    stats print interval (default 1000)
    --help             print this help"
    );
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--help" | "-h" => args.help = true,
            "--capacity" => args.capacity = parse_value(&flag, iter.next())?,
            "--items" => args.items = parse_value(&flag, iter.next())?,
            "--burst" => args.burst = parse_value(&flag, iter.next())?,
            "--sleep-us" => args.sleep_us = parse_value(&flag, iter.next())?,
            "--interval-ms" => args.interval_ms = parse_value(&flag, iter.next())?,
            other => return Err(format!("unknown flag: {}", other)),
        }
    }
    if args.burst == 0 {
        return Err("--burst must be at least 1".to_string());
    }
    Ok(args)
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("{} requires a value", flag))?;
    value
        .parse()
        .map_err(|_| format!("{}: invalid value '{}'", flag, value))
}

// ============================================================================
// Harness
// ============================================================================

/// How often the worker threads refresh their shared progress counters.
/// Coarse on purpose: the counters are for the stats printer, and updating
/// them per item would perturb the measurement.
const PROGRESS_STRIDE: u64 = 1024;

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("error: {}", message);
            usage();
            process::exit(2);
        }
    };
    if args.help {
        usage();
        return;
    }

    let config = SpscConfig {
        capacity: args.capacity,
        cons_sleep_us: args.sleep_us,
    };
    let (mut tx, mut rx) = match channel_with::<u64>(config) {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("error: {}", err);
            process::exit(2);
        }
    };
    let counters = rx.counters();

    let produced = Arc::new(AtomicU64::new(0));
    let consumed = Arc::new(AtomicU64::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let items = args.items;
    let burst = args.burst;

    let producer = {
        let produced = produced.clone();
        thread::spawn(move || {
            for v in 0..items {
                if burst > 1 && (v + 1) % burst != 0 {
                    tx.push_lazy(v);
                } else {
                    tx.push(v);
                }
                if (v + 1) % PROGRESS_STRIDE == 0 {
                    produced.store(v + 1, Ordering::Relaxed);
                }
            }
            tx.flush();
            produced.store(items, Ordering::Relaxed);
        })
    };

    let consumer = {
        let consumed = consumed.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut out = Vec::new();
            let mut expected = 0u64;
            while expected < items {
                rx.pop_batch(&mut out);
                for &v in &out {
                    assert_eq!(v, expected, "FIFO violation");
                    expected += 1;
                }
                out.clear();
                consumed.store(expected, Ordering::Relaxed);
            }
            done.store(true, Ordering::Relaxed);
        })
    };

    // Stats loop, fashioned after the switch target's rate printer: per
    // interval, items/s in each direction and semaphore signals/s.
    let start = Instant::now();
    let mut last = start;
    let mut last_in = 0u64;
    let mut last_out = 0u64;
    let mut last_prod_sig = 0u64;
    let mut last_cons_sig = 0u64;

    while !done.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(args.interval_ms));
        let now = Instant::now();
        let secs = now.duration_since(last).as_secs_f64();
        last = now;

        let total_in = produced.load(Ordering::Relaxed);
        let total_out = consumed.load(Ordering::Relaxed);
        let prod_sig = counters.producer_signals();
        let cons_sig = counters.consumer_signals();

        println!(
            "-- in {:>12.0}/s   out {:>12.0}/s   prod_sig {:>9.1}/s   cons_sig {:>9.1}/s",
            (total_in - last_in) as f64 / secs,
            (total_out - last_out) as f64 / secs,
            (prod_sig - last_prod_sig) as f64 / secs,
            (cons_sig - last_cons_sig) as f64 / secs,
        );

        last_in = total_in;
        last_out = total_out;
        last_prod_sig = prod_sig;
        last_cons_sig = cons_sig;
    }

    producer.join().expect("producer thread panicked");
    consumer.join().expect("consumer thread panicked");

    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "== {} items in {:.2}s  ({:.0} items/s, {:.1} ns/item)  prod_signals {}  cons_signals {}",
        args.items,
        elapsed,
        args.items as f64 / elapsed,
        elapsed * 1e9 / args.items as f64,
        counters.producer_signals(),
        counters.consumer_signals(),
    );
}
