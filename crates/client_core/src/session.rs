use std::sync::Arc;

use futures::StreamExt;
use shared::{
    domain::{RequestId, RequestStatus},
    protocol::RequestRecord,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    commands::InFlightCommands,
    error::{SyncError, SyncResult},
    projector::{project, Board},
    reconcile::{MergeOutcome, RequestCollection},
    stream::{EventSource, EventSubscription},
    transport::RequestStore,
};

const SESSION_EVENT_BUFFER: usize = 1024;

/// Activation counter. Results carrying an older value are dropped.
pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Snapshot,
    Stream,
    Command,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Activated {
        generation: Generation,
    },
    SnapshotLoaded {
        generation: Generation,
        records: usize,
    },
    SnapshotFailed {
        generation: Generation,
        message: String,
    },
    BoardUpdated(Board),
    CommandFailed {
        id: RequestId,
        target: RequestStatus,
        message: String,
    },
    StreamClosed {
        generation: Generation,
    },
    Deactivated {
        generation: Generation,
    },
}

struct ActiveView {
    generation: Generation,
    stream_task: JoinHandle<()>,
    snapshot_task: JoinHandle<()>,
}

impl ActiveView {
    fn abort(self) {
        self.snapshot_task.abort();
        self.stream_task.abort();
    }
}

pub(crate) struct SessionState {
    last_generation: Generation,
    active: Option<ActiveView>,
    pub(crate) collection: RequestCollection,
}

impl SessionState {
    pub(crate) fn current_generation(&self) -> Option<Generation> {
        self.active.as_ref().map(|view| view.generation)
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.current_generation() == Some(generation)
    }
}

/// One waiter-side view over the request store.
///
/// Owns the reconciled collection while active. Activation subscribes to the
/// event channel first and then loads the snapshot concurrently; both feed
/// the same merge. Deactivation aborts the loader, drops the subscription and
/// forgets the collection.
pub struct ViewSession {
    pub(crate) store: Arc<dyn RequestStore>,
    source: Arc<dyn EventSource>,
    pub(crate) inner: Mutex<SessionState>,
    pub(crate) in_flight: InFlightCommands,
    pub(crate) events: broadcast::Sender<SessionEvent>,
}

impl ViewSession {
    pub fn new(store: Arc<dyn RequestStore>, source: Arc<dyn EventSource>) -> Arc<Self> {
        let (events, _) = broadcast::channel(SESSION_EVENT_BUFFER);
        Arc::new(Self {
            store,
            source,
            inner: Mutex::new(SessionState {
                last_generation: 0,
                active: None,
                collection: RequestCollection::new(),
            }),
            in_flight: InFlightCommands::new(),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn activate(self: &Arc<Self>) -> SyncResult<Generation> {
        let subscription = self
            .source
            .subscribe()
            .await
            .map_err(SyncError::Transport)?;

        let mut guard = self.inner.lock().await;
        if let Some(previous) = guard.active.take() {
            info!(generation = previous.generation, "session: replacing active view");
            previous.abort();
        }
        guard.last_generation += 1;
        let generation = guard.last_generation;
        guard.collection.clear();
        guard.active = Some(ActiveView {
            generation,
            stream_task: self.spawn_stream_pump(generation, subscription),
            snapshot_task: self.spawn_snapshot_load(generation),
        });
        let _ = self.events.send(SessionEvent::Activated { generation });
        info!(generation, "session: activated");
        Ok(generation)
    }

    /// Returns whether a view was active.
    pub async fn deactivate(&self) -> bool {
        let mut guard = self.inner.lock().await;
        let Some(view) = guard.active.take() else {
            return false;
        };
        let generation = view.generation;
        view.abort();
        guard.collection.clear();
        let _ = self.events.send(SessionEvent::Deactivated { generation });
        info!(generation, "session: deactivated");
        true
    }

    /// Runs the snapshot loader again for the current activation.
    pub async fn reload_snapshot(self: &Arc<Self>) -> SyncResult<()> {
        let mut guard = self.inner.lock().await;
        let generation = guard
            .current_generation()
            .ok_or(SyncError::SessionInactive)?;
        let task = self.spawn_snapshot_load(generation);
        if let Some(view) = guard.active.as_mut() {
            std::mem::replace(&mut view.snapshot_task, task).abort();
        }
        info!(generation, "session: reloading snapshot");
        Ok(())
    }

    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.active.is_some()
    }

    pub async fn generation(&self) -> Option<Generation> {
        self.inner.lock().await.current_generation()
    }

    pub async fn board(&self) -> Board {
        project(&self.inner.lock().await.collection)
    }

    pub async fn record(&self, id: RequestId) -> Option<RequestRecord> {
        self.inner.lock().await.collection.get(id).cloned()
    }

    /// Single entry point for mutating the collection.
    ///
    /// Returns `None` when `generation` is no longer the active one. Records
    /// failing validation are reported as discarded.
    pub(crate) async fn apply(
        &self,
        generation: Generation,
        origin: Origin,
        record: RequestRecord,
    ) -> Option<MergeOutcome> {
        let mut guard = self.inner.lock().await;
        if !guard.is_current(generation) {
            debug!(
                request_id = record.id.0,
                generation,
                ?origin,
                "session: discarding result of ended view"
            );
            return None;
        }

        let request_id = record.id.0;
        let status = record.status;
        if let Err(reason) = record.validate() {
            warn!(request_id, %status, ?origin, %reason, "session: dropping invalid record");
            return Some(MergeOutcome::Discarded);
        }
        let outcome = guard.collection.merge(record);
        match outcome {
            MergeOutcome::Discarded => debug!(
                request_id,
                %status,
                ?origin,
                "session: ignoring out-of-order observation"
            ),
            MergeOutcome::Unchanged => {}
            MergeOutcome::Inserted | MergeOutcome::Replaced => {
                debug!(request_id, %status, ?origin, ?outcome, "session: merged");
                let _ = self
                    .events
                    .send(SessionEvent::BoardUpdated(project(&guard.collection)));
            }
        }
        Some(outcome)
    }

    async fn apply_snapshot(&self, generation: Generation, records: Vec<RequestRecord>) {
        let mut guard = self.inner.lock().await;
        if !guard.is_current(generation) {
            debug!(generation, "session: discarding snapshot of ended view");
            return;
        }

        let total = records.len();
        let changed = guard.collection.merge_snapshot(records);

        let _ = self.events.send(SessionEvent::SnapshotLoaded {
            generation,
            records: total,
        });
        if changed > 0 {
            let _ = self
                .events
                .send(SessionEvent::BoardUpdated(project(&guard.collection)));
        }
        info!(generation, total, changed, "session: snapshot merged");
    }

    fn spawn_snapshot_load(self: &Arc<Self>, generation: Generation) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            match session.store.list_requests().await {
                Ok(records) => session.apply_snapshot(generation, records).await,
                Err(err) => {
                    let err = SyncError::Transport(err);
                    let guard = session.inner.lock().await;
                    if !guard.is_current(generation) {
                        return;
                    }
                    warn!(generation, error = %err, "session: snapshot load failed");
                    let _ = session.events.send(SessionEvent::SnapshotFailed {
                        generation,
                        message: err.to_string(),
                    });
                }
            }
        })
    }

    fn spawn_stream_pump(
        self: &Arc<Self>,
        generation: Generation,
        mut subscription: EventSubscription,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                if session
                    .apply(generation, Origin::Stream, event.into_record())
                    .await
                    .is_none()
                {
                    return;
                }
            }

            let guard = session.inner.lock().await;
            if guard.is_current(generation) {
                warn!(generation, "session: event stream ended");
                let _ = session
                    .events
                    .send(SessionEvent::StreamClosed { generation });
            }
        })
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
