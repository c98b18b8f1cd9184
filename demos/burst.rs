//! Burst walkthrough: what a remote controller sees when it spams commands.
//!
//! Run with: `cargo run --example burst`

use keyrelay::{
    report, ActionExecutor, Command, DryRunExecutor, ExecutionError, Outcome, RelayBuilder,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_thread_names(true)
        .init();

    println!("=== KeyRelay Burst Example ===\n");

    // Example 1: Button mashing
    mashing_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 2: Sustained flood
    flood_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 3: Fallback queue
    fallback_example();
}

fn label(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Accepted { method, .. } => format!("ok ({})", method.as_str()),
        Outcome::Throttled => "throttled".to_string(),
        Outcome::RateLimited => "rate_limited".to_string(),
        Outcome::Busy => "busy".to_string(),
        Outcome::InvalidCommand(_) => "comando_no_reconocido".to_string(),
        Outcome::Malformed(_) => "error".to_string(),
    }
}

fn tally(outcomes: &[Outcome]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for outcome in outcomes {
        *counts.entry(label(outcome)).or_insert(0) += 1;
    }
    counts
}

fn mashing_example() {
    println!("1. Button mashing (press every 8ms, 20ms cooldown):");

    let dispatcher = RelayBuilder::new()
        .build(Arc::new(DryRunExecutor))
        .unwrap();

    let t0 = Instant::now();
    for i in 0..10u64 {
        let at = Duration::from_millis(i * 8);
        let outcome = dispatcher.handle_at("saltar", t0 + at);
        println!("   t={:>3}ms  saltar  -> {}", at.as_millis(), label(&outcome));
    }

    println!("\n{}", dispatcher.stats().summary());
}

fn flood_example() {
    println!("2. Sustained flood (50 presses in 500ms, ceiling 40/s):");

    let dispatcher = RelayBuilder::new()
        .min_interval(Duration::from_millis(1))
        .build(Arc::new(DryRunExecutor))
        .unwrap();

    let t0 = Instant::now();
    let outcomes: Vec<Outcome> = (0..50u64)
        .map(|i| dispatcher.handle_at("agachar", t0 + Duration::from_millis(i * 10)))
        .collect();

    for (status, count) in tally(&outcomes) {
        println!("   {:<14} {}", status, count);
    }

    let stats = dispatcher.stats();
    println!("\n   Health: {} ({})", stats.health_status(), stats.health_status().suggested_action());
}

/// Fails every other direct attempt; workers always succeed.
#[derive(Debug, Default)]
struct FlakyExecutor {
    calls: AtomicUsize,
}

impl ActionExecutor for FlakyExecutor {
    fn execute(&self, cmd: Command) -> Result<(), ExecutionError> {
        let on_worker = thread::current()
            .name()
            .is_some_and(|name| name.starts_with("keypress-"));
        let call = self.calls.fetch_add(1, Ordering::Relaxed);

        if !on_worker && call % 2 == 0 {
            return Err(ExecutionError::Unavailable(format!("display busy for {}", cmd)));
        }
        thread::sleep(Duration::from_millis(20));
        Ok(())
    }
}

fn fallback_example() {
    println!("3. Fallback queue (flaky injector, queue of 2, 1 worker):");

    let dispatcher = RelayBuilder::new()
        .min_interval(Duration::from_millis(1))
        .queue_capacity(2)
        .workers(1)
        .build(Arc::new(FlakyExecutor::default()))
        .unwrap();
    dispatcher.start().unwrap();

    let t0 = Instant::now();
    for i in 0..12u64 {
        let outcome = dispatcher.handle_at("primary", t0 + Duration::from_millis(i * 5));
        println!(
            "   #{:<2} primary -> {:<12} (queue {}/{})",
            i + 1,
            label(&outcome),
            dispatcher.queue_depth(),
            dispatcher.config().queue_capacity
        );
    }

    thread::sleep(Duration::from_millis(200));
    dispatcher.shutdown();

    println!();
    report(&dispatcher);
    println!("{}", dispatcher.stats().summary());
}
