use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use shared::{
    domain::{RequestId, RequestKind, RequestStatus, TableId, WaiterId},
    protocol::{CreateRequest, RequestRecord, StreamEvent, TransitionCommand},
};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, Notify};

use crate::{
    session::SessionEvent,
    stream::{EventSource, EventSubscription},
    transport::RequestStore,
};

pub(crate) type Reply<T> = oneshot::Receiver<std::result::Result<T, String>>;

pub(crate) fn record(id: i64, status: RequestStatus) -> RequestRecord {
    RequestRecord {
        id: RequestId(id),
        table_id: TableId(3),
        kind: RequestKind::Bill,
        status,
        notes: None,
        waiter_id: (status != RequestStatus::Pending).then_some(WaiterId(1)),
        created_at: Utc
            .with_ymd_and_hms(2024, 5, 1, 12, (id % 60) as u32, 0)
            .single()
            .expect("timestamp"),
    }
}

pub(crate) fn ready<T>(value: std::result::Result<T, String>) -> Reply<T> {
    let (tx, rx) = oneshot::channel();
    let _ = tx.send(value);
    rx
}

pub(crate) fn gated<T>() -> (oneshot::Sender<std::result::Result<T, String>>, Reply<T>) {
    oneshot::channel()
}

/// Request store double whose answers are queued by the test.
#[derive(Default)]
pub(crate) struct FakeStore {
    snapshots: Mutex<VecDeque<Reply<Vec<RequestRecord>>>>,
    patches: Mutex<VecDeque<Reply<RequestRecord>>>,
    pub(crate) patch_calls: Mutex<Vec<(RequestId, TransitionCommand)>>,
    pub(crate) patch_started: Notify,
    pub(crate) list_calls: AtomicUsize,
    pub(crate) created: Mutex<Vec<CreateRequest>>,
}

impl FakeStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) async fn push_snapshot(&self, reply: Reply<Vec<RequestRecord>>) {
        self.snapshots.lock().await.push_back(reply);
    }

    pub(crate) async fn push_patch(&self, reply: Reply<RequestRecord>) {
        self.patches.lock().await.push_back(reply);
    }

    pub(crate) async fn patch_count(&self) -> usize {
        self.patch_calls.lock().await.len()
    }
}

#[async_trait]
impl RequestStore for FakeStore {
    async fn list_requests(&self) -> Result<Vec<RequestRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.snapshots.lock().await.pop_front();
        match reply {
            None => Ok(Vec::new()),
            Some(reply) => reply
                .await
                .map_err(|_| anyhow!("snapshot reply dropped"))?
                .map_err(|err| anyhow!(err)),
        }
    }

    async fn patch_request(
        &self,
        id: RequestId,
        command: &TransitionCommand,
    ) -> Result<RequestRecord> {
        self.patch_calls.lock().await.push((id, command.clone()));
        self.patch_started.notify_one();
        let reply = self
            .patches
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| anyhow!("no patch reply queued"))?;
        reply
            .await
            .map_err(|_| anyhow!("patch reply dropped"))?
            .map_err(|err| anyhow!(err))
    }

    async fn create_request(&self, request: &CreateRequest) -> Result<RequestRecord> {
        let mut created = self.created.lock().await;
        created.push(request.clone());
        Ok(RequestRecord {
            id: RequestId(100 + created.len() as i64),
            table_id: request.table_id,
            kind: request.kind,
            status: RequestStatus::Pending,
            notes: request.notes.clone(),
            waiter_id: None,
            created_at: Utc::now(),
        })
    }
}

/// Event source handing out in-process channels.
#[derive(Default)]
pub(crate) struct FakeSource {
    senders: std::sync::Mutex<Vec<mpsc::Sender<StreamEvent>>>,
    pub(crate) fail: bool,
}

impl FakeSource {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub(crate) fn latest(&self) -> mpsc::Sender<StreamEvent> {
        self.senders
            .lock()
            .expect("senders")
            .last()
            .cloned()
            .expect("no subscription yet")
    }

    pub(crate) fn subscriptions(&self) -> usize {
        self.senders.lock().expect("senders").len()
    }

    /// Ends every subscription handed out so far.
    pub(crate) fn close_all(&self) {
        self.senders.lock().expect("senders").clear();
    }
}

#[async_trait]
impl EventSource for FakeSource {
    async fn subscribe(&self) -> Result<EventSubscription> {
        if self.fail {
            return Err(anyhow!("event channel unavailable"));
        }
        let (tx, rx) = mpsc::channel(16);
        self.senders.lock().expect("senders").push(tx);
        Ok(EventSubscription::from_receiver(rx))
    }
}

pub(crate) async fn wait_for<F>(
    rx: &mut broadcast::Receiver<SessionEvent>,
    mut matches: F,
) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("session events closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

/// Drains what is already queued without waiting.
pub(crate) fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
