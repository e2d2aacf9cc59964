//! The role → status → allowed-targets transition table.
//!
//! This is the single source of truth for lifecycle legality. It is pure
//! data; `lib.rs` owns the evaluation rules (role resolution order, the
//! manager no-op allowance, the NotAssigned guard).
//!
//! The shape is intentionally asymmetric: three independent approval loops
//! (manager gate, developer execution, client acceptance) that only
//! sometimes hand off to each other.

use odk_schemas::{OrderStatus, Role};

use OrderStatus::*;

const MANAGER_ROW: &[(OrderStatus, &[OrderStatus])] = &[
    (Submitted, &[Accepted, Rejected]),
    (ClientReview, &[AwaitingReview]),
    (ClientFix, &[ReworkRequested]),
    (AwaitingReview, &[InProgress]),
];

const PROGRAMMER_ROW: &[(OrderStatus, &[OrderStatus])] = &[
    (Accepted, &[InProgress]),
    (InProgress, &[ClientReview]),
    (ReworkRequested, &[InProgress]),
];

const CLIENT_ROW: &[(OrderStatus, &[OrderStatus])] = &[(AwaitingReview, &[Done, ClientFix])];

/// Targets the given role row permits from `current`. Empty when the row has
/// no entry for `current`. Admin resolves to the manager row.
pub fn allowed_targets(row: Role, current: OrderStatus) -> &'static [OrderStatus] {
    let table: &[(OrderStatus, &[OrderStatus])] = match row {
        Role::Manager | Role::Admin => MANAGER_ROW,
        Role::Programmer => PROGRAMMER_ROW,
        Role::Client => CLIENT_ROW,
    };
    table
        .iter()
        .find(|(from, _)| *from == current)
        .map(|(_, to)| *to)
        .unwrap_or(&[])
}
