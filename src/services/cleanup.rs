use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::tokens::TokenService;

pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// How the scheduler will be woken up, before it is started.
enum TriggerSource {
    Every(Duration),
    Manual(mpsc::UnboundedReceiver<()>),
}

impl TriggerSource {
    /// The interval is created here, at start, so the first tick lands one
    /// full period after `start` no matter when the scheduler was built.
    fn arm(self) -> Trigger {
        match self {
            TriggerSource::Every(period) => {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Trigger::Interval(interval)
            }
            TriggerSource::Manual(rx) => Trigger::Manual(rx),
        }
    }
}

/// What wakes the running scheduler up.
enum Trigger {
    Interval(tokio::time::Interval),
    Manual(mpsc::UnboundedReceiver<()>),
}

impl Trigger {
    /// Wait for the next tick. Returns false once a manual trigger is dropped.
    async fn next(&mut self) -> bool {
        match self {
            Trigger::Interval(interval) => {
                interval.tick().await;
                true
            }
            Trigger::Manual(rx) => rx.recv().await.is_some(),
        }
    }
}

/// Fires scheduler ticks on demand. Handed out by [`CleanupScheduler::manual`].
#[derive(Clone)]
pub struct ManualTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualTrigger {
    /// Request one eviction pass. Returns false if the scheduler has stopped.
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Background task that periodically bulk-evicts idle session tokens.
///
/// Created once at startup and owned by whoever owns the process lifecycle.
/// `start` is idempotent; `stop` ends the loop and waits for it.
pub struct CleanupScheduler {
    tokens: TokenService,
    trigger: Mutex<Option<TriggerSource>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    passes: Arc<watch::Sender<u64>>,
}

impl CleanupScheduler {
    /// Scheduler ticking every `period`, first tick one period after start.
    pub fn new(tokens: TokenService, period: Duration) -> Self {
        Self::with_trigger(tokens, TriggerSource::Every(period))
    }

    /// Scheduler that only ticks when the returned trigger fires.
    pub fn manual(tokens: TokenService) -> (Self, ManualTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self::with_trigger(tokens, TriggerSource::Manual(rx)),
            ManualTrigger { tx },
        )
    }

    fn with_trigger(tokens: TokenService, trigger: TriggerSource) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (passes, _) = watch::channel(0);
        Self {
            tokens,
            trigger: Mutex::new(Some(trigger)),
            handle: Mutex::new(None),
            shutdown,
            passes: Arc::new(passes),
        }
    }

    /// Spawn the background loop. Returns false if it was already started.
    pub fn start(&self) -> bool {
        let Some(trigger) = self.trigger.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            tracing::debug!("Token cleanup scheduler already started");
            return false;
        };

        let handle = tokio::spawn(run(
            self.tokens.clone(),
            trigger.arm(),
            self.shutdown.subscribe(),
            self.passes.clone(),
        ));
        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        tracing::info!("Token cleanup scheduler started");
        true
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Number of completed eviction passes, successful or not.
    pub fn subscribe_passes(&self) -> watch::Receiver<u64> {
        self.passes.subscribe()
    }

    /// Signal the loop to exit and wait for it. Safe to call more than once.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Token cleanup scheduler ended abnormally: {e}");
            }
            tracing::info!("Token cleanup scheduler stopped");
        }
    }
}

async fn run(
    tokens: TokenService,
    mut trigger: Trigger,
    mut shutdown: watch::Receiver<bool>,
    passes: Arc<watch::Sender<u64>>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            fired = trigger.next() => {
                if !fired {
                    break;
                }
            }
        }

        evict_once(&tokens).await;
        passes.send_modify(|n| *n += 1);
    }
}

/// One eviction pass. Failures are logged; the next tick still happens.
async fn evict_once(tokens: &TokenService) {
    match tokens.evict_idle().await {
        Ok(0) => tracing::debug!("Token cleanup: nothing to evict"),
        Ok(count) => tracing::info!(evicted = count, "Token cleanup: evicted idle sessions"),
        Err(e) => tracing::error!("Token cleanup failed: {e}"),
    }
}
