//! Stress test - many coroutines
//!
//! Submits large numbers of small coroutines from the main thread, each
//! parking once on a retry timer, yielding a few times and nesting one
//! child, then waits for all of them.
//!
//! Usage: `stress [coroutines] [yields]`

use corun::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Spin {
    yields: u32,
    parked: bool,
    completed: Arc<AtomicU64>,
}

impl Spin {
    fn spin(&mut self) -> Action<Self> {
        if self.yields == 0 {
            return Action::start(Leaf, Self::leaf_done);
        }
        self.yields -= 1;
        Action::yield_to(Self::spin)
    }

    fn leaf_done(&mut self, outcome: Outcome) -> Action<Self> {
        match outcome.into_result() {
            Ok(_) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                Action::finish()
            }
            Err(e) => Action::error(e),
        }
    }
}

impl Coroutine for Spin {
    fn act(&mut self) -> Action<Self> {
        if !self.parked {
            self.parked = true;
            return Action::wait_retry();
        }
        Action::yield_to(Self::spin)
    }
}

struct Leaf;

impl Coroutine for Leaf {
    fn act(&mut self) -> Action<Self> {
        Action::finish()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    corun::init_logging();
    println!("=== corun Stress Test ===\n");

    let num_coroutines: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(100_000);
    let yields: u32 = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let config = ExecutorConfig::from_env();
    config.print();
    let executor = Executor::new(config)?;

    println!("Submitting {} coroutines...", num_coroutines);
    let completed = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let mut handles = Vec::with_capacity(num_coroutines);
    for i in 0..num_coroutines {
        let completed = completed.clone();
        handles.push(executor.submit(move || Spin {
            yields,
            parked: false,
            completed,
        })?);

        if (i + 1) % 10_000 == 0 {
            print!("\rSubmitted: {}/{}", i + 1, num_coroutines);
        }
    }

    let submit_time = start.elapsed();
    println!("\n\nSubmit time: {:?}", submit_time);
    println!(
        "Submit rate: {:.0} coroutines/sec",
        num_coroutines as f64 / submit_time.as_secs_f64()
    );

    println!("\nWaiting for completion...");
    let run_start = Instant::now();
    let mut failed = 0;
    let mut timed_out = 0;
    for h in &handles {
        match h.wait_timeout(Duration::from_secs(30)) {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                eprintln!("task {} failed: {}", h.id(), e);
                failed += 1;
            }
            None => timed_out += 1,
        }
    }

    let total_time = start.elapsed();
    let run_time = run_start.elapsed();

    executor.stop();
    executor.join()?;

    println!("\n=== Results ===");
    println!("Total coroutines: {}", num_coroutines);
    println!("Completed:        {}", completed.load(Ordering::Relaxed));
    println!("Failed:           {}", failed);
    println!("Timed out:        {}", timed_out);
    println!("Submit time:      {:?}", submit_time);
    println!("Run time:         {:?}", run_time);
    println!("Total time:       {:?}", total_time);
    println!(
        "Throughput:       {:.0} coroutines/sec",
        num_coroutines as f64 / total_time.as_secs_f64()
    );

    println!("\n=== Stress Test Complete ===");
    Ok(())
}
