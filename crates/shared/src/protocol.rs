use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{status_rank, RequestId, RequestKind, RequestStatus, TableId, WaiterId};

/// One table service request as served by the request store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub id: RequestId,
    pub table_id: TableId,
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiter_id: Option<WaiterId>,
    pub created_at: DateTime<Utc>,
}

impl RequestRecord {
    pub fn rank(&self) -> u8 {
        status_rank(self.status)
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).max(Duration::zero())
    }

    /// Store-side records must reference a real table, and carry a waiter
    /// exactly when they have left `Pending`.
    pub fn validate(&self) -> Result<(), String> {
        if self.table_id.0 <= 0 {
            return Err(format!(
                "request {} has non-positive table id {}",
                self.id, self.table_id
            ));
        }
        match (self.status, self.waiter_id) {
            (RequestStatus::Pending, Some(waiter)) => Err(format!(
                "pending request {} already names waiter {waiter}",
                self.id
            )),
            (RequestStatus::InProgress | RequestStatus::Done, None) => Err(format!(
                "request {} is {} without a waiter",
                self.id, self.status
            )),
            _ => Ok(()),
        }
    }
}

/// Incremental change pushed by the store over the event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StreamEvent {
    #[serde(alias = "new_request")]
    Created(RequestRecord),
    #[serde(alias = "request_update")]
    Updated(RequestRecord),
}

impl StreamEvent {
    pub const CREATED: &'static str = "created";
    pub const UPDATED: &'static str = "updated";

    pub fn into_record(self) -> RequestRecord {
        match self {
            Self::Created(record) | Self::Updated(record) => record,
        }
    }
}

/// Body of the per-record partial update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionCommand {
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiter_id: Option<WaiterId>,
}

impl TransitionCommand {
    /// The waiter is only attached when a request gets picked up.
    pub fn new(status: RequestStatus, waiter_id: WaiterId) -> Self {
        Self {
            status,
            waiter_id: (status == RequestStatus::InProgress).then_some(waiter_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub table_id: TableId,
    #[serde(rename = "type")]
    pub kind: RequestKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_record() -> serde_json::Value {
        serde_json::json!({
            "id": 12,
            "tableId": 5,
            "type": "LIMPIAR_MESA",
            "status": "EN_CAMINO",
            "waiterId": 1,
            "createdAt": "2024-05-01T12:00:00.000Z"
        })
    }

    #[test]
    fn decodes_store_record() {
        let record: RequestRecord = serde_json::from_value(wire_record()).expect("record");
        assert_eq!(record.id, RequestId(12));
        assert_eq!(record.table_id, TableId(5));
        assert_eq!(record.kind, RequestKind::CleanTable);
        assert_eq!(record.status, RequestStatus::InProgress);
        assert_eq!(record.waiter_id, Some(WaiterId(1)));
        assert_eq!(record.notes, None);
    }

    #[test]
    fn unknown_type_falls_back_to_other() {
        let mut value = wire_record();
        value["type"] = "VINO".into();
        let record: RequestRecord = serde_json::from_value(value).expect("record");
        assert_eq!(record.kind, RequestKind::Other);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut value = wire_record();
        value["status"] = "ARCHIVADO".into();
        assert!(serde_json::from_value::<RequestRecord>(value).is_err());
    }

    #[test]
    fn english_status_aliases_are_accepted() {
        let mut value = wire_record();
        value["status"] = "DONE".into();
        let record: RequestRecord = serde_json::from_value(value).expect("record");
        assert_eq!(record.status, RequestStatus::Done);
    }

    #[test]
    fn stream_event_accepts_legacy_names() {
        let frame = serde_json::json!({ "type": "request_update", "payload": wire_record() });
        let event: StreamEvent = serde_json::from_value(frame).expect("event");
        assert!(matches!(event, StreamEvent::Updated(_)));

        let frame = serde_json::json!({ "type": "created", "payload": wire_record() });
        let event: StreamEvent = serde_json::from_value(frame).expect("event");
        assert!(matches!(event, StreamEvent::Created(_)));
    }

    #[test]
    fn transition_command_only_carries_waiter_when_picking_up() {
        let accept = TransitionCommand::new(RequestStatus::InProgress, WaiterId(4));
        assert_eq!(
            serde_json::to_value(&accept).expect("json"),
            serde_json::json!({ "status": "EN_CAMINO", "waiterId": 4 })
        );

        let finish = TransitionCommand::new(RequestStatus::Done, WaiterId(4));
        assert_eq!(
            serde_json::to_value(&finish).expect("json"),
            serde_json::json!({ "status": "COMPLETADO" })
        );
    }

    #[test]
    fn validate_checks_table_and_waiter_assignment() {
        let record: RequestRecord = serde_json::from_value(wire_record()).expect("record");
        assert_eq!(record.validate(), Ok(()));

        let mut no_table = record.clone();
        no_table.table_id = TableId(0);
        assert!(no_table.validate().is_err());

        let mut unassigned = record.clone();
        unassigned.waiter_id = None;
        assert!(unassigned.validate().is_err());
        unassigned.status = RequestStatus::Done;
        assert!(unassigned.validate().is_err());

        let mut pending_with_waiter = record.clone();
        pending_with_waiter.status = RequestStatus::Pending;
        assert!(pending_with_waiter.validate().is_err());
        pending_with_waiter.waiter_id = None;
        assert_eq!(pending_with_waiter.validate(), Ok(()));
    }

    #[test]
    fn status_rank_orders_lifecycle() {
        assert!(status_rank(RequestStatus::Pending) < status_rank(RequestStatus::InProgress));
        assert!(status_rank(RequestStatus::InProgress) < status_rank(RequestStatus::Done));
        assert_eq!(RequestStatus::Done.successor(), None);
    }

    #[test]
    fn request_kind_parses_cli_spellings() {
        assert_eq!("clear_plates".parse::<RequestKind>(), Ok(RequestKind::ClearPlates));
        assert_eq!("Menu".parse::<RequestKind>(), Ok(RequestKind::Menu));
        assert!("wine".parse::<RequestKind>().is_err());
    }
}
