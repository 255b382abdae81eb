use std::cmp::Reverse;

use shared::{domain::RequestStatus, protocol::RequestRecord};

use crate::reconcile::RequestCollection;

/// Read-only per-status view of a collection, newest first in every column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Board {
    pub pending: Vec<RequestRecord>,
    pub in_progress: Vec<RequestRecord>,
    pub done: Vec<RequestRecord>,
}

impl Board {
    pub fn column(&self, status: RequestStatus) -> &[RequestRecord] {
        match status {
            RequestStatus::Pending => &self.pending,
            RequestStatus::InProgress => &self.in_progress,
            RequestStatus::Done => &self.done,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len() + self.in_progress.len() + self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn project(collection: &RequestCollection) -> Board {
    let mut board = Board::default();
    for record in collection.records() {
        let column = match record.status {
            RequestStatus::Pending => &mut board.pending,
            RequestStatus::InProgress => &mut board.in_progress,
            RequestStatus::Done => &mut board.done,
        };
        column.push(record.clone());
    }
    for column in [&mut board.pending, &mut board.in_progress, &mut board.done] {
        column.sort_by_key(|record| Reverse((record.created_at, record.id)));
    }
    board
}
