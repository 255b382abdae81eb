use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::anyhow;
use shared::{
    domain::{RequestId, RequestKind, RequestStatus, TableId, WaiterId},
    protocol::{CreateRequest, RequestRecord, TransitionCommand},
};
use tracing::{info, warn};

use crate::{
    error::{SyncError, SyncResult},
    session::{Origin, SessionEvent, ViewSession},
    transport::RequestStore,
};

/// Ids with a transition command awaiting the store's answer.
#[derive(Debug, Clone, Default)]
pub struct InFlightCommands {
    ids: Arc<Mutex<HashSet<RequestId>>>,
}

impl InFlightCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` as busy, or returns `None` when a command is already out.
    pub fn try_begin(&self, id: RequestId) -> Option<InFlightGuard> {
        let inserted = self
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        inserted.then(|| InFlightGuard {
            ids: Arc::clone(&self.ids),
            id,
        })
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

}

/// Clears the in-flight marker when dropped, including on cancellation.
#[derive(Debug)]
pub struct InFlightGuard {
    ids: Arc<Mutex<HashSet<RequestId>>>,
    id: RequestId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

pub fn validate_transition(current: &RequestRecord, target: RequestStatus) -> SyncResult<()> {
    if current.status.successor() == Some(target) {
        Ok(())
    } else {
        Err(SyncError::InvalidTransition {
            id: current.id,
            from: current.status,
            to: target,
        })
    }
}

pub fn prepare_create_request(
    table_id: TableId,
    kind: RequestKind,
    notes: Option<String>,
) -> SyncResult<CreateRequest> {
    if table_id.0 <= 0 {
        return Err(SyncError::InvalidRequest(format!(
            "table id must be positive, got {table_id}"
        )));
    }
    let notes = notes
        .map(|notes| notes.trim().to_string())
        .filter(|notes| !notes.is_empty());
    if kind == RequestKind::Other && notes.is_none() {
        return Err(SyncError::InvalidRequest(
            "requests of type other need notes".into(),
        ));
    }
    Ok(CreateRequest {
        table_id,
        kind,
        notes,
    })
}

/// Table-side creation. The new record reaches waiter boards via the
/// `created` event, not through any session.
pub async fn create_request(
    store: &dyn RequestStore,
    table_id: TableId,
    kind: RequestKind,
    notes: Option<String>,
) -> SyncResult<RequestRecord> {
    let request = prepare_create_request(table_id, kind, notes)?;
    let record = store
        .create_request(&request)
        .await
        .map_err(SyncError::Transport)?;
    info!(
        request_id = record.id.0,
        table_id = table_id.0,
        kind = %kind,
        "commands: request created"
    );
    Ok(record)
}

impl ViewSession {
    /// Moves one request a single step forward through the store.
    ///
    /// The store's answer is folded through the same merge as stream events,
    /// so a concurrent `updated` event for the same change converges with it.
    /// On failure nothing changes locally.
    pub async fn transition(
        &self,
        id: RequestId,
        target: RequestStatus,
        waiter_id: WaiterId,
    ) -> SyncResult<RequestRecord> {
        let Some(_in_flight) = self.in_flight.try_begin(id) else {
            return Err(SyncError::CommandAlreadyInFlight(id));
        };

        let generation = {
            let guard = self.inner.lock().await;
            let generation = guard
                .current_generation()
                .ok_or(SyncError::SessionInactive)?;
            let current = guard
                .collection
                .get(id)
                .ok_or(SyncError::UnknownRequest(id))?;
            validate_transition(current, target)?;
            generation
        };

        let command = TransitionCommand::new(target, waiter_id);
        info!(
            request_id = id.0,
            target = %target,
            waiter_id = waiter_id.0,
            generation,
            "commands: sending transition"
        );

        let response = self
            .store
            .patch_request(id, &command)
            .await
            .and_then(|record| {
                record
                    .validate()
                    .map_err(|reason| anyhow!("store answered with an invalid record: {reason}"))?;
                Ok(record)
            });

        match response {
            Ok(record) => {
                self.apply(generation, Origin::Command, record.clone()).await;
                Ok(record)
            }
            Err(source) => {
                let err = SyncError::Command { id, target, source };
                warn!(request_id = id.0, target = %target, error = %err, "commands: transition failed");
                let _ = self.events.send(SessionEvent::CommandFailed {
                    id,
                    target,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    pub fn is_command_in_flight(&self, id: RequestId) -> bool {
        self.in_flight.contains(id)
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
