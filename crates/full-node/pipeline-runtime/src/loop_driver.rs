//! The cooperative ticker loop shared by the four pipeline workers (spec
//! §4.4–§4.7: "Single-threaded cooperative loop driven by a N-second
//! ticker"), with cancellation on a shared shutdown signal (spec §5).

use std::time::Duration;

use tokio::sync::watch;

/// A shutdown signal shared by every worker in the pipeline (spec §5:
/// "Workers share a single cancellation signal from the sequencer's
/// lifecycle").
#[derive(Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

/// The sending half of a [`ShutdownSignal`], held by whatever drives the
/// sequencer's overall lifecycle.
pub struct Shutdown(watch::Sender<bool>);

/// Creates a linked [`Shutdown`]/[`ShutdownSignal`] pair.
pub fn shutdown_channel() -> (Shutdown, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (Shutdown(tx), ShutdownSignal(rx))
}

impl Shutdown {
    /// Signals every worker holding a [`ShutdownSignal`] to exit at its next
    /// suspension point.
    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

impl ShutdownSignal {
    /// Whether shutdown has been triggered.
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Runs `step` once per `period`, skipping immediately to the next tick
    /// when `step` returns `false` (used by workers that "await ticker" on an
    /// empty queue, spec §4.4 step 1), until shutdown is triggered.
    pub async fn run_ticked<F, Fut>(&mut self, period: Duration, mut step: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    step().await;
                }
                _ = self.0.changed() => {
                    if *self.0.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn run_ticked_stops_once_shutdown_is_triggered() {
        let (shutdown, mut signal) = shutdown_channel();
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_clone = ticks.clone();

        let task = tokio::spawn(async move {
            signal
                .run_ticked(Duration::from_millis(10), || {
                    let ticks = ticks_clone.clone();
                    async move {
                        ticks.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(35)).await;
        shutdown.trigger();
        task.await.unwrap();

        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }
}
