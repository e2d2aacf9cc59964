//! Error taxonomy for order mutations.
//!
//! Everything except `Transient` is deterministic: retrying with the same
//! input fails the same way until state or permissions change. `Transient`
//! covers storage/network failure inside the atomic unit and is safe to
//! retry because the unit either committed fully or not at all.

use odk_schemas::{FieldError, OrderStatus, Role};

#[derive(Debug)]
pub enum EngineError {
    /// Unknown order, or an order outside the caller's visibility.
    NotFound,
    /// Caller id does not resolve to any user.
    UnknownActor,
    /// Caller matches no role row for this order, or lacks the role the
    /// operation requires.
    Forbidden(String),
    /// Caller holds the programmer role but is not this order's developer.
    NotAssigned,
    /// Requested status value is outside the fixed enumeration.
    InvalidStatus(String),
    /// The evaluated role row does not permit current → requested, or a
    /// business rule blocks an otherwise table-legal pair.
    IllegalTransition {
        role_row: Role,
        current: OrderStatus,
        requested: OrderStatus,
        note: Option<&'static str>,
    },
    /// Assignment target missing or not a programmer.
    InvalidDeveloper(String),
    /// Order-creation field validation failed.
    InvalidField(FieldError),
    /// A concurrent update invalidated the authorized call between read and
    /// write (status moved, or the assignment the grant relied on changed).
    Conflict {
        authorized: OrderStatus,
        found: OrderStatus,
    },
    /// Storage failure inside the atomic unit; nothing was applied.
    Transient(anyhow::Error),
}

impl EngineError {
    /// Stable machine-readable kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound => "not_found",
            EngineError::UnknownActor => "unauthenticated",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::NotAssigned => "not_assigned",
            EngineError::InvalidStatus(_) => "invalid_status",
            EngineError::IllegalTransition { .. } => "illegal_transition",
            EngineError::InvalidDeveloper(_) => "invalid_developer",
            EngineError::InvalidField(_) => "invalid_field",
            EngineError::Conflict { .. } => "conflict",
            EngineError::Transient(_) => "transient",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound => write!(f, "order not found"),
            EngineError::UnknownActor => write!(f, "unknown caller"),
            EngineError::Forbidden(detail) => write!(f, "forbidden: {detail}"),
            EngineError::NotAssigned => {
                write!(f, "this order is not assigned to the calling programmer")
            }
            EngineError::IllegalTransition {
                role_row,
                current,
                requested,
                note,
            } => {
                write!(
                    f,
                    "{role_row}: cannot transition from '{current}' to '{requested}'"
                )?;
                if let Some(note) = note {
                    write!(f, " ({note})")?;
                }
                Ok(())
            }
            EngineError::InvalidStatus(raw) => write!(f, "invalid status value: '{raw}'"),
            EngineError::InvalidDeveloper(detail) => write!(f, "invalid developer: {detail}"),
            EngineError::InvalidField(err) => write!(f, "invalid field: {err}"),
            EngineError::Conflict { authorized, found } => write!(
                f,
                "concurrent update: the order changed between read and write \
                 (status '{authorized}' at authorization, '{found}' under lock)"
            ),
            EngineError::Transient(err) => write!(f, "transient storage failure: {err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Transient(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Infrastructure errors from odk-db are transient by definition: the
/// transaction boundary guarantees nothing partial was applied.
impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Transient(err)
    }
}

impl From<odk_policy::Denial> for EngineError {
    fn from(denial: odk_policy::Denial) -> Self {
        match denial {
            odk_policy::Denial::Forbidden => {
                EngineError::Forbidden("caller has no applicable role for this order".to_string())
            }
            odk_policy::Denial::NotAssigned => EngineError::NotAssigned,
            odk_policy::Denial::IllegalTransition {
                role_row,
                current,
                requested,
            } => EngineError::IllegalTransition {
                role_row,
                current,
                requested,
                note: None,
            },
        }
    }
}

impl From<FieldError> for EngineError {
    fn from(err: FieldError) -> Self {
        EngineError::InvalidField(err)
    }
}
