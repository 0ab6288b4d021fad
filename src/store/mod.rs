//! Execution log and status store.
//!
//! Each run owns an append-only [`RunLog`] of events and a latest immutable
//! [`RunSnapshot`](crate::RunSnapshot). The [`Store`] keeps a bounded number
//! of these run records in memory.

mod log;
mod store;

use futures::stream::BoxStream;

use crate::events::Event;

pub use log::RunLog;
pub use store::{RunRecord, Store};

/// Ordered stream of a run's events, replayed from the first event and
/// ending after `RunEnded`.
pub type EventStream = BoxStream<'static, Event>;
