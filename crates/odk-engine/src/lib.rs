//! odk-engine
//!
//! The orchestration layer for order mutations. Every state change follows
//! the same discipline: load → authorize → lock → write → append audit row,
//! with the write and the append inside one transaction. A denied call
//! performs zero writes.
//!
//! The engine talks to the outside world through two injected boundaries:
//! [`ActorDirectory`] (who is this caller, which roles) and [`Notifier`]
//! (best-effort, fire-and-forget). Storage goes through odk-db; transition
//! legality is decided by odk-policy and never re-implemented here.

mod boundary;
mod error;
mod ops;

pub use boundary::{ActorDirectory, DbDirectory, LogNotifier, Notifier};
pub use error::EngineError;
pub use ops::{
    assign_developer, attach_file, create_order, get_order, list_orders_for, order_history,
    transition,
};
