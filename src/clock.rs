// =============================================================================
// Clock & stop signal — the only suspension points of both trading loops
// =============================================================================
//
// Loops never call `tokio::time::sleep` directly. They go through a `Sleeper`
// so tests can record requested waits without waiting, and they race every
// sleep against a `StopSignal` so an operator can end the loop cleanly.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

/// Timed delay between loop iterations.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Raises the stop signal. Dropping it without calling `stop` leaves the
/// signal unraised forever.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        // send_replace never fails, even with no receivers left.
        self.tx.send_replace(true);
    }
}

/// Receiving side of the stop signal.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn channel() -> (StopHandle, StopSignal) {
        let (tx, rx) = watch::channel(false);
        (StopHandle { tx }, StopSignal { rx })
    }

    /// A signal nobody can raise.
    #[cfg(test)]
    pub fn never() -> Self {
        Self::channel().1
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal is raised; pends forever if it never can be.
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
