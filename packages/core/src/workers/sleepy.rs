//! Interruptible periodic-worker primitive.
//!
//! A background task wraps its cycle in `busy()` ... `sleep(d)`. `sleep`
//! returns `false` once `finish()` has been requested, ending the loop;
//! `wake_up()` cancels the current sleep early so the next cycle runs now.
//! `finish(timeout)` requests shutdown and waits for the current cycle to
//! clear the busy flag.

use std::time::Duration;

use tokio::sync::watch;

pub struct SleepyWorker {
    alive: watch::Sender<bool>,
    busy: watch::Sender<bool>,
}

impl Default for SleepyWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl SleepyWorker {
    pub fn new() -> Self {
        let (alive, _) = watch::channel(false);
        let (busy, _) = watch::channel(false);
        Self { alive, busy }
    }

    /// Mark the worker alive. Call once before the cycle loop.
    pub fn start(&self) {
        self.alive.send_replace(true);
    }

    /// Mark a cycle as running.
    pub fn busy(&self) {
        self.busy.send_replace(true);
    }

    /// Cancel the current sleep so the next cycle starts immediately.
    pub fn wake_up(&self) {
        if *self.alive.borrow() && !*self.busy.borrow() {
            self.alive.send_replace(true);
        }
    }

    /// Clear the busy flag and sleep up to `duration`. Returns `true` to
    /// run another cycle and `false` once shutdown was requested.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let mut rx = self.alive.subscribe();
        self.busy.send_replace(false);
        if !*rx.borrow() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => *self.alive.borrow(),
            changed = rx.changed() => match changed {
                Ok(()) => *rx.borrow(),
                Err(_) => false,
            },
        }
    }

    /// Request shutdown and wait up to `timeout` for the current cycle to
    /// finish. Returns `true` if the worker is still busy after the wait.
    pub async fn finish(&self, timeout: Duration) -> bool {
        self.alive.send_replace(false);
        let mut rx = self.busy.subscribe();
        if !*rx.borrow() {
            return false;
        }
        let quiesced = async {
            while *rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        };
        tokio::time::timeout(timeout, quiesced).await.is_err()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::SleepyWorker;

    #[tokio::test]
    async fn sleep_before_start_ends_the_loop() {
        let worker = SleepyWorker::new();
        assert!(!worker.sleep(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn sleep_continues_while_alive() {
        let worker = SleepyWorker::new();
        worker.start();
        assert!(worker.sleep(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn finish_interrupts_a_long_sleep() {
        let worker = Arc::new(SleepyWorker::new());
        worker.start();
        let sleeper = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.sleep(Duration::from_secs(3600)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let still_busy = worker.finish(Duration::from_millis(100)).await;
        assert!(!still_busy);
        assert!(!sleeper.await.unwrap());
    }

    #[tokio::test]
    async fn wake_up_cancels_the_sleep_but_keeps_running() {
        let worker = Arc::new(SleepyWorker::new());
        worker.start();
        let sleeper = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.sleep(Duration::from_secs(3600)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        worker.wake_up();
        assert!(sleeper.await.unwrap());
    }

    #[tokio::test]
    async fn finish_waits_for_a_busy_cycle() {
        let worker = Arc::new(SleepyWorker::new());
        worker.start();
        worker.busy();
        let cycle = {
            let worker = worker.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                worker.sleep(Duration::from_millis(1)).await
            })
        };
        let still_busy = worker.finish(Duration::from_millis(500)).await;
        assert!(!still_busy);
        assert!(!cycle.await.unwrap());
    }
}
