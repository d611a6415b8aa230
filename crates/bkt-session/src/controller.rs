//! Backtest session controller.
//!
//! ```text
//! Idle --start--> Starting --progress--> Running --complete--> Completed
//!                    |                      |
//!                    +--start failure / error event / stream loss--> Error
//! any --stop (with handle) / reset--> Idle
//! ```
//!
//! At most one event subscription is live at a time. Every teardown bumps a
//! generation counter and synchronously drops the old event stream, so a new
//! start request is never issued while the previous subscription is open,
//! and an event that was already in flight from the old stream is discarded
//! rather than applied to the new session.

use std::future::poll_fn;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use std::task::Poll;

use bkt_schemas::{BacktestSession, SessionConfig, SessionEvent, SessionStatus};
use futures_util::{Stream, StreamExt};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::transport::{EventStream, JobTransport, StreamError};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Slot holding the live event stream. Emptied by teardown.
type StreamSlot = Arc<StdMutex<Option<EventStream>>>;

struct Subscription {
    slot: StreamSlot,
    pump: JoinHandle<()>,
}

impl Subscription {
    /// Drop the stream now (closing the connection) and stop the pump.
    fn close(self) {
        drop(
            self.slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        self.pump.abort();
    }
}

struct Inner {
    session: BacktestSession,
    generation: u64,
    subscription: Option<Subscription>,
    snapshot_tx: watch::Sender<BacktestSession>,
    updates_tx: broadcast::Sender<BacktestSession>,
}

impl Inner {
    fn publish(&self) {
        self.snapshot_tx.send_replace(self.session.clone());
        // No subscribers is fine.
        let _ = self.updates_tx.send(self.session.clone());
    }

    fn set(&mut self, session: BacktestSession) {
        self.session = session;
        self.publish();
    }

    /// Invalidate whatever subscription is live. Returns the new generation.
    fn teardown(&mut self) -> u64 {
        self.generation += 1;
        if let Some(sub) = self.subscription.take() {
            debug!(generation = self.generation, "closing event subscription");
            sub.close();
        }
        self.generation
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.close();
        }
    }
}

/// Owns one backtest session and the subscription feeding it.
///
/// All mutations are serialized through one async mutex; event application
/// runs on a spawned pump task that only holds a weak reference, so dropping
/// the controller closes the subscription.
pub struct SessionController {
    transport: Arc<dyn JobTransport>,
    inner: Arc<Mutex<Inner>>,
    snapshot_rx: watch::Receiver<BacktestSession>,
    updates_tx: broadcast::Sender<BacktestSession>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn JobTransport>) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(BacktestSession::idle());
        let (updates_tx, _rx) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let inner = Inner {
            session: BacktestSession::idle(),
            generation: 0,
            subscription: None,
            snapshot_tx,
            updates_tx: updates_tx.clone(),
        };
        Self {
            transport,
            inner: Arc::new(Mutex::new(inner)),
            snapshot_rx,
            updates_tx,
        }
    }

    /// Latest published snapshot. Never blocks.
    pub fn snapshot(&self) -> BacktestSession {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver that always holds the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<BacktestSession> {
        self.snapshot_rx.clone()
    }

    /// Every published snapshot from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BacktestSession> {
        self.updates_tx.subscribe()
    }

    /// [`Self::subscribe`] as a stream. Snapshots missed by a slow reader are
    /// skipped.
    pub fn updates(&self) -> impl Stream<Item = BacktestSession> + Send + 'static {
        BroadcastStream::new(self.updates_tx.subscribe()).filter_map(|r| async move {
            match r {
                Ok(s) => Some(s),
                Err(e) => {
                    debug!(error = %e, "session update receiver lagged");
                    None
                }
            }
        })
    }

    /// Start a new backtest, replacing whatever session was there.
    ///
    /// The previous subscription is closed before anything else happens.
    /// Returns the snapshot after the start attempt.
    pub async fn start(&self, code: &str, config: &SessionConfig) -> BacktestSession {
        let mut inner = self.inner.lock().await;
        let generation = inner.teardown();

        if let Err(e) = config.validate() {
            warn!(error = %e, "backtest config rejected");
            inner.set(BacktestSession::failed(e.to_string()));
            return inner.session.clone();
        }

        inner.set(BacktestSession::starting());
        info!(
            transport = self.transport.name(),
            start = %config.start,
            end = %config.end,
            period = %config.period,
            exchanges = config.exchanges.len(),
            "starting backtest"
        );

        let task_id = match self.transport.start_job(code, config).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "backtest start failed");
                inner.set(BacktestSession::failed(e.to_string()));
                return inner.session.clone();
            }
        };

        info!(%task_id, "backtest started");
        inner.session.task_id = Some(task_id.clone());
        inner.publish();

        match self.transport.subscribe(&task_id).await {
            Ok(stream) => {
                let slot: StreamSlot = Arc::new(StdMutex::new(Some(stream)));
                let pump = tokio::spawn(pump_events(
                    Arc::downgrade(&self.inner),
                    generation,
                    Arc::clone(&slot),
                ));
                inner.subscription = Some(Subscription { slot, pump });
            }
            Err(e) => {
                warn!(%task_id, error = %e, "event subscription failed");
                // Handle is kept so `stop` can still cancel the remote job.
                inner.session.apply(SessionEvent::Error {
                    message: e.to_string(),
                });
                inner.publish();
            }
        }

        inner.session.clone()
    }

    /// Cancel the remote job and return to Idle. No-op without a task handle.
    ///
    /// A failed stop request is logged; local teardown happens regardless.
    pub async fn stop(&self) -> BacktestSession {
        let mut inner = self.inner.lock().await;
        let Some(task_id) = inner.session.task_id.clone() else {
            debug!("stop ignored: no active task");
            return inner.session.clone();
        };

        info!(%task_id, "stopping backtest");
        if let Err(e) = self.transport.stop_job(&task_id).await {
            warn!(%task_id, error = %e, "stop request failed");
        }
        inner.teardown();
        inner.set(BacktestSession::idle());
        inner.session.clone()
    }

    /// Drop the subscription and return to Idle without contacting the server.
    pub async fn reset(&self) -> BacktestSession {
        let mut inner = self.inner.lock().await;
        inner.teardown();
        inner.set(BacktestSession::idle());
        debug!("session reset");
        inner.session.clone()
    }
}

/// Poll the stream in `slot` without holding the lock across the await.
async fn next_event(slot: &StreamSlot) -> Option<Result<SessionEvent, StreamError>> {
    poll_fn(|cx| {
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(stream) => stream.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    })
    .await
}

async fn pump_events(inner: Weak<Mutex<Inner>>, generation: u64, slot: StreamSlot) {
    loop {
        let item = next_event(&slot).await;

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut inner = inner.lock().await;
        if inner.generation != generation {
            debug!(generation, current = inner.generation, "discarding event from stale subscription");
            return;
        }

        let event = match item {
            Some(Ok(event)) => event,
            Some(Err(e)) => SessionEvent::Error {
                message: e.to_string(),
            },
            None => SessionEvent::Error {
                message: StreamError::Closed.to_string(),
            },
        };
        let kind = event.kind();
        let terminal = inner.session.apply(event);
        inner.publish();

        match inner.session.status {
            SessionStatus::Completed => info!("backtest completed"),
            SessionStatus::Error => {
                warn!(error = ?inner.session.error, "backtest failed")
            }
            _ => debug!(
                kind,
                progress = inner.session.progress,
                stage = %inner.session.stage,
                "backtest event"
            ),
        }

        if terminal {
            // Drop our own handle without aborting; returning ends the task.
            if let Some(sub) = inner.subscription.take() {
                drop(sub.slot.lock().unwrap_or_else(PoisonError::into_inner).take());
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use bkt_schemas::TaskId;
    use futures_util::stream;

    use crate::transport::StartError;

    /// Transport whose event stream is a fixed list, optionally left open.
    struct ScriptedTransport {
        events: Vec<Result<SessionEvent, StreamError>>,
        hold_open: bool,
    }

    #[async_trait]
    impl JobTransport for ScriptedTransport {
        fn name(&self) -> &'static str {
            "scripted"
        }
        async fn start_job(&self, _: &str, _: &SessionConfig) -> Result<TaskId, StartError> {
            Ok(TaskId::new("t-1"))
        }
        async fn stop_job(&self, _: &TaskId) -> anyhow::Result<()> {
            Err(anyhow!("server unreachable"))
        }
        async fn subscribe(&self, _: &TaskId) -> Result<EventStream, StreamError> {
            let events = stream::iter(self.events.clone());
            if self.hold_open {
                Ok(events.chain(stream::pending()).boxed())
            } else {
                Ok(events.boxed())
            }
        }
    }

    async fn wait_for(c: &SessionController, pred: impl Fn(&BacktestSession) -> bool) -> BacktestSession {
        let mut rx = c.watch();
        let snapshot = tokio::time::timeout(std::time::Duration::from_secs(5), rx.wait_for(|s| pred(s)))
            .await
            .expect("timed out waiting for session")
            .expect("watch closed")
            .clone();
        snapshot
    }

    #[tokio::test]
    async fn stream_closing_early_is_an_error() {
        let c = SessionController::new(Arc::new(ScriptedTransport {
            events: vec![Ok(SessionEvent::Progress {
                percent: Some(5.0),
                stage: None,
            })],
            hold_open: false,
        }));
        c.start("code", &SessionConfig::default()).await;
        let s = wait_for(&c, |s| s.status.is_terminal()).await;
        assert_eq!(s.status, SessionStatus::Error);
        assert_eq!(s.error.as_deref(), Some("event stream closed before completion"));
    }

    #[tokio::test]
    async fn stream_transport_error_is_an_error() {
        let c = SessionController::new(Arc::new(ScriptedTransport {
            events: vec![Err(StreamError::Transport("reset".to_string()))],
            hold_open: true,
        }));
        c.start("code", &SessionConfig::default()).await;
        let s = wait_for(&c, |s| s.status.is_terminal()).await;
        assert_eq!(s.error.as_deref(), Some("WebSocket connection error: reset"));
    }

    #[tokio::test]
    async fn failed_stop_request_still_tears_down() {
        let c = SessionController::new(Arc::new(ScriptedTransport {
            events: vec![],
            hold_open: true,
        }));
        let s = c.start("code", &SessionConfig::default()).await;
        assert_eq!(s.status, SessionStatus::Starting);
        assert!(s.task_id.is_some());

        let s = c.stop().await;
        assert_eq!(s, BacktestSession::idle());
        assert_eq!(c.snapshot(), BacktestSession::idle());
    }

    #[tokio::test]
    async fn invalid_config_fails_before_any_request() {
        let c = SessionController::new(Arc::new(ScriptedTransport {
            events: vec![],
            hold_open: true,
        }));
        let cfg = SessionConfig {
            period: "hourly".to_string(),
            ..SessionConfig::default()
        };
        let s = c.start("code", &cfg).await;
        assert_eq!(s.status, SessionStatus::Error);
        assert_eq!(s.task_id, None);
    }

    #[tokio::test]
    async fn updates_stream_sees_each_published_snapshot() {
        let c = SessionController::new(Arc::new(ScriptedTransport {
            events: vec![Ok(SessionEvent::Error {
                message: "boom".to_string(),
            })],
            hold_open: true,
        }));
        let mut updates = Box::pin(c.updates());
        c.start("code", &SessionConfig::default()).await;

        let mut statuses = Vec::new();
        while let Some(s) = updates.next().await {
            statuses.push(s.status);
            if s.status.is_terminal() {
                break;
            }
        }
        assert_eq!(
            statuses,
            vec![
                SessionStatus::Starting,
                SessionStatus::Starting,
                SessionStatus::Error
            ]
        );
    }
}
