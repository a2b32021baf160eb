//! Periodic reading-time tick for an open session.

use super::ReaderSession;
use crate::renderer::Renderer;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Background task ticking a session once per period.
///
/// Dropping the clock cancels the task; [`ReadingClock::stop`] also waits
/// for it to finish.
pub struct ReadingClock {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ReadingClock {
    /// Start ticking `session` every `period`.
    pub fn start<R>(session: Arc<Mutex<ReaderSession<R>>>, period: Duration) -> Self
    where
        R: Renderer + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => session.lock().tick(),
                }
            }

            tracing::debug!("Reading clock stopped");
        });

        tracing::debug!(period = ?period, "Reading clock started");
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Whether the task is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the task and wait for it to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "Reading clock task failed");
        }
    }
}

impl Drop for ReadingClock {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
