use std::{sync::Arc, time::Duration};

use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::application::handlers::message_dispatcher::MessageDispatcher;

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the single background dispatch loop.
///
/// `running` is only held for bookkeeping, never across an await on the
/// loop, so `is_running` answers immediately. `lifecycle` serializes `start`
/// and `stop`, and `stop` keeps it until the old loop has exited, so a new
/// loop never overlaps one that is still finishing its cycle.
pub struct DispatchScheduler {
    dispatcher: Arc<MessageDispatcher>,
    interval: Duration,
    running: Mutex<Option<RunningLoop>>,
    lifecycle: Mutex<()>,
}

impl DispatchScheduler {
    pub fn new(dispatcher: Arc<MessageDispatcher>, interval: Duration) -> Self {
        Self {
            dispatcher,
            interval: interval.max(Duration::from_millis(1)),
            running: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    /// Spawns the loop, which runs a cycle right away and then once per
    /// interval. Returns `false` when a loop is already running.
    pub async fn start(&self) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("scheduler already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            self.dispatcher.clone(),
            self.interval,
            cancel.clone(),
        ));
        *running = Some(RunningLoop { cancel, handle });
        true
    }

    /// Signals the loop and waits for it to exit. A cycle already under way
    /// finishes first; `is_running` reports `false` from the moment the loop
    /// is signalled. Returns `false` when nothing was running.
    pub async fn stop(&self) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        let Some(RunningLoop { cancel, handle }) = self.running.lock().await.take() else {
            debug!("scheduler not running");
            return false;
        };

        cancel.cancel();
        if let Err(err) = handle.await {
            error!(error = %err, "scheduler loop terminated abnormally");
        }
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

async fn run_loop(dispatcher: Arc<MessageDispatcher>, period: Duration, cancel: CancellationToken) {
    info!(interval_seconds = period.as_secs(), "scheduler started");

    // The first tick completes immediately.
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                dispatcher.run_once().await;
            }
        }
    }

    info!("scheduler stopped");
}
