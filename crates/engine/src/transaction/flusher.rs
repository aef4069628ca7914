//! Background flusher for the transaction scheduler
//!
//! One named thread that calls
//! [`sequential_commit`](TransactionScheduler::sequential_commit) every
//! interval. Shutdown wakes it, waits for the pass in flight, and runs one
//! final pass so nothing appended before shutdown is left behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use dataaccess_core::DataResult;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error};

use super::TransactionScheduler;

#[derive(Default)]
struct FlushSignal {
    stop: bool,
    requested: bool,
}

struct FlusherShared {
    signal: Mutex<FlushSignal>,
    wake: Condvar,
    passes: AtomicU64,
}

/// Periodic flush of a [`TransactionScheduler`] on a background thread
pub struct SchedulerFlusher {
    shared: Arc<FlusherShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerFlusher {
    /// Start flushing `scheduler` every `interval`
    ///
    /// # Errors
    ///
    /// Returns `Io` if the thread cannot be spawned.
    pub fn spawn(scheduler: Arc<TransactionScheduler>, interval: Duration) -> DataResult<Self> {
        let shared = Arc::new(FlusherShared {
            signal: Mutex::new(FlushSignal::default()),
            wake: Condvar::new(),
            passes: AtomicU64::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("dataaccess-flusher".to_string())
            .spawn(move || flush_loop(&worker_shared, &scheduler, interval))?;

        debug!(
            target: "dataaccess::scheduler",
            interval_ms = interval.as_millis() as u64,
            "Flusher started"
        );
        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Run a pass now instead of waiting for the interval
    pub fn flush_now(&self) {
        self.shared.signal.lock().requested = true;
        self.shared.wake.notify_one();
    }

    /// Completed flush passes
    pub fn passes(&self) -> u64 {
        self.shared.passes.load(Ordering::Acquire)
    }

    /// Stop the thread after a final pass; later calls do nothing
    pub fn shutdown(&self) {
        self.shared.signal.lock().stop = true;
        self.shared.wake.notify_all();

        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                error!(target: "dataaccess::scheduler", "Flusher thread panicked");
            }
            debug!(target: "dataaccess::scheduler", "Flusher stopped");
        }
    }
}

impl Drop for SchedulerFlusher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn flush_loop(shared: &FlusherShared, scheduler: &TransactionScheduler, interval: Duration) {
    // Flags are checked under the lock before waiting, so a stop or flush
    // request made while a pass runs is never missed.
    let mut signal = shared.signal.lock();
    while !signal.stop {
        if !signal.requested {
            shared.wake.wait_for(&mut signal, interval);
        }
        if signal.stop {
            break;
        }
        signal.requested = false;
        MutexGuard::unlocked(&mut signal, || run_pass(shared, scheduler));
    }
    drop(signal);
    run_pass(shared, scheduler);
}

fn run_pass(shared: &FlusherShared, scheduler: &TransactionScheduler) {
    // A panicking backend must not kill the flusher.
    let outcome =
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| scheduler.sequential_commit()));
    match outcome {
        Ok(all_committed) => {
            if !all_committed {
                debug!(
                    target: "dataaccess::scheduler",
                    pending = scheduler.pending_len(),
                    "Flush left transactions pending"
                );
            }
        }
        Err(e) => error!(
            target: "dataaccess::scheduler",
            "flush pass panicked: {:?}",
            e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
        ),
    }
    shared.passes.fetch_add(1, Ordering::Release);
}
