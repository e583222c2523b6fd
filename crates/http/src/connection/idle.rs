//! Idle-connection supervision.
//!
//! Each connection shares one [`ActivityMonitor`] between the reader, the
//! pipeline, and a watcher task. The watcher runs a fixed-interval re-arming
//! timer: every tick it checks whether the connection has been quiet (no
//! in-flight message in either direction) for at least the idle threshold,
//! and if so cancels the connection's token. Activity at any point therefore
//! resets the effective deadline.
//!
//! An outstanding read spans from a parsed start line to the end of that
//! message; an outstanding write spans a response from its registration in
//! the pipeline to its retirement. A read that is merely parked waiting for
//! the next request does not count, so keep-alive connections between
//! messages are exactly the ones eligible for closure.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Shared record of a connection's recent activity.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    inner: Arc<State>,
}

#[derive(Debug)]
struct State {
    last_activity: Mutex<Instant>,
    outstanding_reads: AtomicUsize,
    outstanding_writes: AtomicUsize,
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityMonitor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(State {
                last_activity: Mutex::new(Instant::now()),
                outstanding_reads: AtomicUsize::new(0),
                outstanding_writes: AtomicUsize::new(0),
            }),
        }
    }

    /// Refreshes the activity timestamp without touching the counters.
    pub fn touch(&self) {
        *self.inner.last_activity.lock().unwrap() = Instant::now();
    }

    pub fn begin_read(&self) {
        self.inner.outstanding_reads.fetch_add(1, Ordering::SeqCst);
        self.touch();
    }

    pub fn end_read(&self) {
        self.inner.outstanding_reads.fetch_sub(1, Ordering::SeqCst);
        self.touch();
    }

    pub fn begin_write(&self) {
        self.inner.outstanding_writes.fetch_add(1, Ordering::SeqCst);
        self.touch();
    }

    pub fn end_write(&self) {
        self.inner.outstanding_writes.fetch_sub(1, Ordering::SeqCst);
        self.touch();
    }

    /// True when no message is in flight in either direction.
    pub fn is_quiet(&self) -> bool {
        self.inner.outstanding_reads.load(Ordering::SeqCst) == 0
            && self.inner.outstanding_writes.load(Ordering::SeqCst) == 0
    }

    pub fn idle_for(&self) -> Duration {
        self.inner.last_activity.lock().unwrap().elapsed()
    }
}

/// Spawns the re-arming watcher for one connection.
///
/// Cancels `token` once the connection has been quiet for at least
/// `idle_timeout`; stops silently when someone else cancels the token first.
pub fn spawn_idle_watcher(
    monitor: ActivityMonitor,
    idle_timeout: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(idle_timeout) => {}
            }

            if monitor.is_quiet() && monitor.idle_for() >= idle_timeout {
                info!(idle = ?monitor.idle_for(), "connection idle beyond threshold, closing");
                token.cancel();
                return;
            }
            debug!("connection still active, re-arming idle timer");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn quiet_connection_is_cancelled_after_threshold() {
        let monitor = ActivityMonitor::new();
        let token = CancellationToken::new();
        let watcher = spawn_idle_watcher(monitor, Duration::from_secs(5), token.clone());

        token.cancelled().await;
        watcher.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn outstanding_work_defers_closure() {
        let monitor = ActivityMonitor::new();
        let token = CancellationToken::new();
        let _watcher = spawn_idle_watcher(monitor.clone(), Duration::from_secs(5), token.clone());

        monitor.begin_write();
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(!token.is_cancelled());

        monitor.end_write();
        token.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn activity_resets_the_effective_deadline() {
        let monitor = ActivityMonitor::new();
        let token = CancellationToken::new();
        let _watcher = spawn_idle_watcher(monitor.clone(), Duration::from_secs(10), token.clone());

        tokio::time::sleep(Duration::from_secs(8)).await;
        monitor.touch();
        tokio::time::sleep(Duration::from_secs(4)).await;
        // 12s since start but only 4s since the touch
        assert!(!token.is_cancelled());

        token.cancelled().await;
    }
}
