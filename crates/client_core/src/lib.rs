//! Waiter-side synchronization core for table service requests.
//!
//! A [`ViewSession`] merges a one-shot snapshot from the [`RequestStore`]
//! with the `created`/`updated` events of an [`EventSource`] into a single
//! [`RequestCollection`], and issues single-flight status transitions whose
//! results go through the same merge.

pub mod commands;
pub mod error;
pub mod projector;
pub mod reconcile;
pub mod session;
pub mod stream;
pub mod transport;

pub use commands::{create_request, InFlightCommands, InFlightGuard};
pub use error::{SyncError, SyncResult};
pub use projector::{project, Board};
pub use reconcile::{reconcile, MergeOutcome, RequestCollection};
pub use session::{Generation, Origin, SessionEvent, ViewSession};
pub use stream::{normalize_frame, EventSource, EventSubscription, WebSocketEventSource};
pub use transport::{Endpoints, HttpRequestStore, RequestStore};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
