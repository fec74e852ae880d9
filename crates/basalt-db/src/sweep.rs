use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use tracing::trace;

/// A background ticker driving periodic maintenance (TTL expiry, cursor
/// expiry).
///
/// The worker sleeps on a shutdown channel with the interval as its
/// timeout, so stopping interrupts a mid-sleep worker instead of waiting
/// the interval out. Dropping the handle stops the worker.
pub(crate) struct SweeperHandle {
    stop_tx: Option<Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl SweeperHandle {
    pub(crate) fn stop(&mut self) {
        // Dropping the sender disconnects the channel; the worker's next
        // recv_timeout wakes immediately and exits.
        self.stop_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn a cooperative ticker that runs `tick` every `interval`.
/// Returns `None` when the interval is zero (sweeping disabled).
pub(crate) fn spawn(
    name: &'static str,
    interval: Duration,
    mut tick: impl FnMut() + Send + 'static,
) -> Option<SweeperHandle> {
    if interval.is_zero() {
        return None;
    }

    let (stop_tx, stop_rx) = bounded::<()>(0);
    let worker = thread::Builder::new()
        .name(format!("basalt-{name}"))
        .spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        trace!(sweeper = name, "tick");
                        tick();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
        .expect("failed to spawn sweeper thread");

    Some(SweeperHandle {
        stop_tx: Some(stop_tx),
        worker: Some(worker),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn zero_interval_disables_sweeping() {
        assert!(spawn("noop", Duration::ZERO, || {}).is_none());
    }

    #[test]
    fn ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut handle = spawn("counter", Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(60));
        handle.stop();
        let ticked = count.load(Ordering::Relaxed);
        assert!(ticked >= 2, "expected at least 2 ticks, saw {ticked}");

        // No more ticks after stop.
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::Relaxed), ticked);
    }

    #[test]
    fn dropping_the_handle_stops_the_worker() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handle = spawn("dropper", Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(25));
        drop(handle);
        let ticked = count.load(Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::Relaxed), ticked);
    }
}
