//! odk-policy
//!
//! Transition authorization for the order lifecycle.
//!
//! Goals:
//! - Single source of truth for the role → status → allowed-targets table
//! - Role resolution order: manager/admin, then programmer, then owning client
//! - Structured denials carrying current and requested status
//!
//! Deterministic, pure logic. No IO, no time, no database.

mod table;

pub use table::allowed_targets;

use odk_schemas::{OrderStatus, Role};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Ownership and role facts about the caller, relative to one order.
/// Assembled by the engine from the Actor Directory and the order row.
#[derive(Debug, Clone, Default)]
pub struct ActorFacts {
    pub is_manager: bool,
    pub is_admin: bool,
    pub has_programmer_role: bool,
    /// Caller is the order's `client` (owner).
    pub is_owner_client: bool,
    /// Caller is the order's currently assigned `developer`.
    pub is_assigned_developer: bool,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Proof of a granted transition, carrying the role row that was evaluated.
/// The engine uses it to attribute the change in the audit description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    /// The row of the transition table that authorized the call
    /// (admin callers are granted via the manager row).
    pub role_row: Role,
}

/// Why a transition was refused. Side-effect free by construction; the
/// engine performs zero writes on any of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// Caller matches no role row for this order.
    Forbidden,
    /// Caller holds the programmer role but is not this order's developer.
    NotAssigned,
    /// The evaluated role row does not permit current → requested.
    IllegalTransition {
        role_row: Role,
        current: OrderStatus,
        requested: OrderStatus,
    },
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Denial::Forbidden => write!(f, "caller has no applicable role for this order"),
            Denial::NotAssigned => write!(f, "order is not assigned to this programmer"),
            Denial::IllegalTransition {
                role_row,
                current,
                requested,
            } => write!(
                f,
                "{}: cannot transition from '{}' to '{}'",
                role_row, current, requested
            ),
        }
    }
}

impl std::error::Error for Denial {}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Decide whether the caller may move the order from `current` to `requested`.
///
/// Resolution order is fixed: a manager (or admin) is always evaluated
/// against the manager row, a programmer only against the programmer row and
/// only when assigned, and the owning client against the client row. The
/// first matching row wins; a caller matching none is `Forbidden`.
///
/// Managers and admins may re-assert the current status (no-op) idempotently;
/// every other role is refused a no-op.
pub fn authorize(
    facts: &ActorFacts,
    current: OrderStatus,
    requested: OrderStatus,
) -> Result<Grant, Denial> {
    if facts.is_manager || facts.is_admin {
        let allowed = allowed_targets(Role::Manager, current);
        if allowed.contains(&requested) || requested == current {
            return Ok(Grant {
                role_row: Role::Manager,
            });
        }
        return Err(Denial::IllegalTransition {
            role_row: Role::Manager,
            current,
            requested,
        });
    }

    if facts.has_programmer_role {
        if !facts.is_assigned_developer {
            return Err(Denial::NotAssigned);
        }
        let allowed = allowed_targets(Role::Programmer, current);
        if allowed.contains(&requested) {
            return Ok(Grant {
                role_row: Role::Programmer,
            });
        }
        return Err(Denial::IllegalTransition {
            role_row: Role::Programmer,
            current,
            requested,
        });
    }

    if facts.is_owner_client {
        let allowed = allowed_targets(Role::Client, current);
        if allowed.contains(&requested) {
            return Ok(Grant {
                role_row: Role::Client,
            });
        }
        return Err(Denial::IllegalTransition {
            role_row: Role::Client,
            current,
            requested,
        });
    }

    Err(Denial::Forbidden)
}
