//! Many files through [`convert`], in sequential batches of bounded concurrency.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::convert::convert;
use crate::error::ConvertError;
use crate::request::ConversionRequest;
use crate::services::ContextProvider;

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const MAX_CONCURRENCY: usize = 16;
pub const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_millis(100);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking conversion must not take the bookkeeping down with it.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Cooperative cancellation, checked before each batch starts.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Conversions in flight at once, and the size of each batch. Clamped to `[1, MAX_CONCURRENCY]`.
    pub concurrency: usize,
    /// Pause between the end of one batch and the start of the next.
    pub inter_batch_delay: Duration,
    pub cancel: Option<CancellationToken>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            inter_batch_delay: DEFAULT_INTER_BATCH_DELAY,
            cancel: None,
        }
    }
}

impl BatchConfig {
    pub fn workers(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Consecutive groups of at most `width` paths, in input order.
pub fn plan_batches(paths: &[PathBuf], width: usize) -> Vec<&[PathBuf]> {
    paths.chunks(width.max(1)).collect()
}

/// Counting semaphore. A [`Permit`] gives its slot back when dropped, however the holder exits.
#[derive(Debug)]
pub struct AdmissionGate {
    available: Mutex<usize>,
    released: Condvar,
}

#[derive(Debug)]
pub struct Permit<'a> {
    gate: &'a AdmissionGate,
}

impl AdmissionGate {
    pub fn new(permits: usize) -> Self {
        Self {
            available: Mutex::new(permits),
            released: Condvar::new(),
        }
    }

    /// Blocks until a slot is free.
    pub fn acquire(&self) -> Permit<'_> {
        let mut available = lock(&self.available);
        while *available == 0 {
            available = self.released.wait(available).unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        Permit { gate: self }
    }

    pub fn available(&self) -> usize {
        *lock(&self.available)
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        *lock(&self.gate.available) += 1;
        self.gate.released.notify_one();
    }
}

/// Progress of a running batch operation.
#[derive(Debug)]
pub struct BatchState {
    total: usize,
    completed: usize,
    batches: Vec<usize>,
    succeeded: Vec<PathBuf>,
    failed: Vec<(PathBuf, ConvertError)>,
}

impl BatchState {
    fn new(total: usize, batches: Vec<usize>) -> Self {
        Self {
            total,
            completed: 0,
            batches,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Finished conversion attempts, successful or not. Never decreases.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Size of every planned batch, in order.
    pub fn batches(&self) -> &[usize] {
        &self.batches
    }

    fn record(&mut self, source: PathBuf, result: Result<PathBuf, ConvertError>) {
        self.completed += 1;
        match result {
            Ok(destination) => self.succeeded.push(destination),
            Err(e) => self.failed.push((source, e)),
        }
    }
}

/// Outcome of [`run_batch`].
#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub completed: usize,
    /// Written files, in completion order.
    pub succeeded: Vec<PathBuf>,
    /// Sources that failed, with why.
    pub failed: Vec<(PathBuf, ConvertError)>,
    /// Whether cancellation stopped the run before every batch started.
    pub cancelled: bool,
}

impl BatchReport {
    fn from_state(state: BatchState, cancelled: bool) -> Self {
        Self {
            total: state.total,
            completed: state.completed,
            succeeded: state.succeeded,
            failed: state.failed,
            cancelled,
        }
    }
}

/// Converts every path with `template`'s settings.
///
/// Batches run strictly one after another; within a batch at most `config.workers()` conversions
/// are in flight. A conversion that panics is recorded as failed like any other. `on_progress` receives the completed count after every attempt, one call at a time.
/// `on_done` runs exactly once, after the last batch or after cancellation.
pub fn run_batch<P, D>(
    paths: &[PathBuf],
    template: &ConversionRequest,
    config: &BatchConfig,
    provider: &ContextProvider,
    on_progress: P,
    on_done: D,
) -> BatchReport
where
    P: Fn(usize) + Sync,
    D: FnOnce(&BatchReport),
{
    let workers = config.workers();
    let batches = plan_batches(paths, workers);
    info!(
        "Converting {} files in {} batches of up to {} ({} context)",
        paths.len(),
        batches.len(),
        workers,
        provider.policy(),
    );

    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("convert-{}", index))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!("Failed to build a thread pool, converting sequentially: {}", e);
            None
        },
    };

    let gate = AdmissionGate::new(workers);
    let state = Mutex::new(BatchState::new(paths.len(), batches.iter().map(|batch| batch.len()).collect()));

    let convert_one = |source: &PathBuf| {
        let _permit = gate.acquire();
        let services = provider.get();
        let request = template.with_source(source);
        let result = panic::catch_unwind(AssertUnwindSafe(|| convert(&request, services.as_ref())))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                error!("{}: conversion panicked: {}", source.display(), message);
                Err(ConvertError::Panicked { path: source.clone(), message })
            });

        let mut state = lock(&state);
        state.record(source.clone(), result);
        on_progress(state.completed);
    };

    let mut cancelled = false;
    for (index, batch) in batches.iter().enumerate() {
        if config.is_cancelled() {
            info!("Cancelled before batch {} of {}", index + 1, batches.len());
            cancelled = true;
            break;
        }
        if index > 0 && !config.inter_batch_delay.is_zero() {
            thread::sleep(config.inter_batch_delay);
        }

        debug!("Batch {} of {}: {} files", index + 1, batches.len(), batch.len());
        match &pool {
            Some(pool) => pool.scope(|scope| {
                let convert_one = &convert_one;
                for source in batch.iter() {
                    scope.spawn(move |_| convert_one(source));
                }
            }),
            None => batch.iter().for_each(&convert_one),
        }
    }

    let state = state.into_inner().unwrap_or_else(PoisonError::into_inner);
    let report = BatchReport::from_state(state, cancelled);
    info!(
        "Converted {} of {} files, {} failed{}",
        report.succeeded.len(),
        report.total,
        report.failed.len(),
        if report.cancelled { " (cancelled)" } else { "" },
    );

    on_done(&report);
    report
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("{}.png", i))).collect()
    }

    #[test]
    fn thirty_seven_files_in_batches_of_eight() {
        let paths = paths(37);
        let sizes: Vec<usize> = plan_batches(&paths, 8).iter().map(|batch| batch.len()).collect();
        assert_eq!(sizes, vec![8, 8, 8, 8, 5]);
    }

    #[test]
    fn batches_keep_input_order() {
        let paths = paths(5);
        let batches = plan_batches(&paths, 2);
        let flattened: Vec<&PathBuf> = batches.iter().flat_map(|batch| batch.iter()).collect();
        assert_eq!(flattened, paths.iter().collect::<Vec<_>>());
        assert!(plan_batches(&[], 4).is_empty());
        assert_eq!(plan_batches(&paths, 0).len(), 5);
    }

    #[test]
    fn concurrency_is_clamped() {
        let config = |concurrency| BatchConfig { concurrency, ..BatchConfig::default() };
        assert_eq!(config(0).workers(), 1);
        assert_eq!(config(64).workers(), MAX_CONCURRENCY);
        assert_eq!(BatchConfig::default().workers(), 8);
    }

    #[test]
    fn permits_come_back_on_drop() {
        let gate = AdmissionGate::new(2);
        {
            let _a = gate.acquire();
            let _b = gate.acquire();
            assert_eq!(gate.available(), 0);
        }
        assert_eq!(gate.available(), 2);
    }

    #[test]
    fn permits_come_back_on_panic() {
        let gate = AdmissionGate::new(1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _permit = gate.acquire();
            panic!("conversion blew up");
        }));
        assert!(result.is_err());
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn gate_bounds_concurrency() {
        let gate = AdmissionGate::new(3);
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..12 {
                scope.spawn(|| {
                    let _permit = gate.acquire();
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(gate.available(), 3);
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload = std::panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static message");
        let payload = std::panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 7");
    }

    #[test]
    fn cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let config = BatchConfig { cancel: Some(token.clone()), ..BatchConfig::default() };
        assert!(!config.is_cancelled());
        token.cancel();
        assert!(config.is_cancelled());
    }
}
