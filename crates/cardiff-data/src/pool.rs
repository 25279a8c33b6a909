//! Ordered worker pool for CPU-bound document extraction.
//!
//! Documents are submitted in archive member order and results are released
//! in the same order, with at most `workers` documents in flight between
//! submission and in-order release. The feeder takes a permit per document
//! and the collector returns it once the result has been handed to the
//! sink, so a slow head-of-line document stalls submission after `workers`
//! successors rather than letting completed results pile up unboundedly.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, mpsc};
use std::thread;

/// Worker count for CPU-bound extraction: every core but one, at least one.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|cores| cores.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Counted permits for documents in flight, closable on shutdown so a
/// blocked feeder always wakes up.
struct FlightPermits {
    state: Mutex<PermitState>,
    returned: Condvar,
}

struct PermitState {
    available: usize,
    closed: bool,
}

impl FlightPermits {
    fn new(count: usize) -> Self {
        Self {
            state: Mutex::new(PermitState {
                available: count,
                closed: false,
            }),
            returned: Condvar::new(),
        }
    }

    /// Take a permit, blocking until one is returned. `false` once closed.
    fn acquire(&self) -> bool {
        let mut state = self.state.lock().expect("permit state poisoned");
        loop {
            if state.closed {
                return false;
            }
            if state.available > 0 {
                state.available -= 1;
                return true;
            }
            state = self.returned.wait(state).expect("permit state poisoned");
        }
    }

    fn release(&self) {
        let mut state = self.state.lock().expect("permit state poisoned");
        state.available += 1;
        drop(state);
        self.returned.notify_one();
    }

    fn close(&self) {
        let mut state = self.state.lock().expect("permit state poisoned");
        state.closed = true;
        drop(state);
        self.returned.notify_all();
    }
}

/// Run `work` over `jobs` on a pool of `workers` threads, handing results
/// to `sink` strictly in submission order.
///
/// A sink error stops the pool: remaining jobs are abandoned, in-flight
/// results are discarded, and all threads are joined before returning.
pub fn map_ordered<I, J, R, E, F, S>(
    jobs: I,
    workers: usize,
    work: F,
    mut sink: S,
) -> std::result::Result<(), E>
where
    I: Iterator<Item = J> + Send,
    J: Send,
    R: Send,
    F: Fn(J) -> R + Sync,
    S: FnMut(R) -> std::result::Result<(), E>,
{
    let workers = workers.max(1);
    let (job_tx, job_rx) = mpsc::sync_channel::<(usize, J)>(workers);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (result_tx, result_rx) = mpsc::channel::<(usize, R)>();
    let permits = FlightPermits::new(workers);

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let work = &work;
            scope.spawn(move || {
                loop {
                    let next = job_rx.lock().expect("job queue poisoned").recv();
                    let Ok((seq, job)) = next else { break };
                    if result_tx.send((seq, work(job))).is_err() {
                        break;
                    }
                }
            });
        }
        // The workers hold the only receiver handles now; when they exit,
        // the feeder's send fails instead of blocking forever.
        drop(job_rx);
        drop(result_tx);

        let permits = &permits;
        let feeder = scope.spawn(move || {
            for (seq, job) in jobs.enumerate() {
                if !permits.acquire() {
                    break;
                }
                if job_tx.send((seq, job)).is_err() {
                    break;
                }
            }
        });

        let mut pending: HashMap<usize, R> = HashMap::new();
        let mut next_seq = 0usize;
        let mut failure: Option<E> = None;
        'collect: while let Ok((seq, result)) = result_rx.recv() {
            pending.insert(seq, result);
            while let Some(result) = pending.remove(&next_seq) {
                next_seq += 1;
                let delivered = sink(result);
                permits.release();
                if let Err(err) = delivered {
                    failure = Some(err);
                    break 'collect;
                }
            }
        }

        permits.close();
        drop(result_rx);
        let _ = feeder.join();
        failure.map_or(Ok(()), Err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_results_arrive_in_submission_order() {
        let jobs = 0..100u64;
        let mut seen = Vec::new();
        map_ordered(
            jobs,
            4,
            |n| {
                // Make earlier jobs slower so out-of-order completion is
                // the common case.
                thread::sleep(Duration::from_micros(1000 - n * 10));
                n * 2
            },
            |result| {
                seen.push(result);
                Ok::<(), ()>(())
            },
        )
        .unwrap();
        assert_eq!(seen, (0..100u64).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_in_flight_bounded_by_worker_count() {
        let workers = 4;
        let started = AtomicUsize::new(0);
        let mut delivered = 0usize;
        let mut max_outstanding = 0usize;
        map_ordered(
            0..64u64,
            workers,
            |n| {
                started.fetch_add(1, Ordering::SeqCst);
                // A slow head-of-line document must stall submission, not
                // buffer every later result.
                if n == 0 {
                    thread::sleep(Duration::from_millis(50));
                }
                n
            },
            |_result| {
                let outstanding = started.load(Ordering::SeqCst) - delivered;
                max_outstanding = max_outstanding.max(outstanding);
                delivered += 1;
                Ok::<(), ()>(())
            },
        )
        .unwrap();
        assert!(
            max_outstanding <= workers,
            "{max_outstanding} documents were in flight with {workers} workers"
        );
    }

    #[test]
    fn test_sink_error_stops_the_pool() {
        let mut delivered = 0;
        let result = map_ordered(
            0..1_000_000u64,
            2,
            |n| n,
            |n| {
                delivered += 1;
                if n == 5 { Err("enough") } else { Ok(()) }
            },
        );
        assert_eq!(result, Err("enough"));
        assert_eq!(delivered, 6);
    }

    #[test]
    fn test_single_worker_still_completes() {
        let mut total = 0u64;
        map_ordered(1..=10u64, 1, |n| n, |n| {
            total += n;
            Ok::<(), ()>(())
        })
        .unwrap();
        assert_eq!(total, 55);
    }

    #[test]
    fn test_default_workers_at_least_one() {
        assert!(default_workers() >= 1);
    }
}
