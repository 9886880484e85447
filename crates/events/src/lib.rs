//! `devisio-events`: the notification boundary.
//!
//! After each state transition the engine calls out with
//! `(document kind, document id, event kind)`; delivery confirmation is never
//! awaited. Email, calendar and other collaborators subscribe on the other
//! side of [`NotificationSink`].

pub mod event;
pub mod sink;

pub use event::{BillingEvent, BillingEventKind};
pub use sink::{InMemorySink, NotificationSink, SinkError, Subscription};
