//! Shared domain vocabulary for the orderdesk workspace.
//!
//! Plain data types only: order statuses, roles, audit event types, file
//! references, and the field validation applied at order creation. No I/O,
//! no persistence — those live in odk-db and odk-engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of an order. Orders are always created as `Submitted`;
/// every other value is reached only through an authorized transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Submitted,
    Accepted,
    InProgress,
    AwaitingReview,
    ClientReview,
    ReworkRequested,
    ClientFix,
    Done,
    Rejected,
}

/// Every status, in declaration order. Used by the policy tests to enumerate
/// the full (role × status × requested) space.
pub const ALL_STATUSES: [OrderStatus; 9] = [
    OrderStatus::Submitted,
    OrderStatus::Accepted,
    OrderStatus::InProgress,
    OrderStatus::AwaitingReview,
    OrderStatus::ClientReview,
    OrderStatus::ReworkRequested,
    OrderStatus::ClientFix,
    OrderStatus::Done,
    OrderStatus::Rejected,
];

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Submitted => "submitted",
            OrderStatus::Accepted => "accepted",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::AwaitingReview => "awaiting_review",
            OrderStatus::ClientReview => "client_review",
            OrderStatus::ReworkRequested => "rework_requested",
            OrderStatus::ClientFix => "client_fix",
            OrderStatus::Done => "done",
            OrderStatus::Rejected => "rejected",
        }
    }

    /// Human-readable label used in audit descriptions and reports.
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Submitted => "Submitted",
            OrderStatus::Accepted => "Accepted",
            OrderStatus::InProgress => "In progress",
            OrderStatus::AwaitingReview => "Awaiting client review",
            OrderStatus::ClientReview => "Client review requested",
            OrderStatus::ReworkRequested => "Rework requested",
            OrderStatus::ClientFix => "Client fix requested",
            OrderStatus::Done => "Done",
            OrderStatus::Rejected => "Rejected",
        }
    }

    /// Parse the wire/database representation. Returns `None` for anything
    /// outside the fixed enumeration (the caller maps that to InvalidStatus).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(OrderStatus::Submitted),
            "accepted" => Some(OrderStatus::Accepted),
            "in_progress" => Some(OrderStatus::InProgress),
            "awaiting_review" => Some(OrderStatus::AwaitingReview),
            "client_review" => Some(OrderStatus::ClientReview),
            "rework_requested" => Some(OrderStatus::ReworkRequested),
            "client_fix" => Some(OrderStatus::ClientFix),
            "done" => Some(OrderStatus::Done),
            "rejected" => Some(OrderStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Caller role as resolved by the Actor Directory. A caller may hold several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Manager,
    Programmer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Manager => "manager",
            Role::Programmer => "programmer",
            Role::Admin => "admin",
        }
    }

    /// Only the canonical four names parse. Historical aliases ("developer")
    /// are deliberately rejected; role-name consistency is a hard contract.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "client" => Some(Role::Client),
            "manager" => Some(Role::Manager),
            "programmer" => Some(Role::Programmer),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Kind of audit entry. `StatusChange` and `Assignment` carry old/new values;
/// `FileAdded` carries a file reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StatusChange,
    Comment,
    FileAdded,
    Assignment,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::StatusChange => "status_change",
            EventType::Comment => "comment",
            EventType::FileAdded => "file_added",
            EventType::Assignment => "assignment",
            EventType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "status_change" => Some(EventType::StatusChange),
            "comment" => Some(EventType::Comment),
            "file_added" => Some(EventType::FileAdded),
            "assignment" => Some(EventType::Assignment),
            "other" => Some(EventType::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FileRef
// ---------------------------------------------------------------------------

/// Opaque reference to a file owned by the external file store. The core
/// only forwards the id and display name into audit entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_id: Uuid,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Order creation fields
// ---------------------------------------------------------------------------

/// Validated title + description for a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderFields {
    pub title: String,
    pub description: String,
}

/// Field-level rejection at order creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: &'static str,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl std::error::Error for FieldError {}

impl NewOrderFields {
    /// Trim and validate: title 3–100 chars, description at least 10 chars.
    pub fn validated(title: &str, description: &str) -> Result<Self, FieldError> {
        let title = title.trim();
        let description = description.trim();

        if title.chars().count() < 3 {
            return Err(FieldError {
                field: "title",
                reason: "title must be at least 3 characters",
            });
        }
        if title.chars().count() > 100 {
            return Err(FieldError {
                field: "title",
                reason: "title must not exceed 100 characters",
            });
        }
        if description.chars().count() < 10 {
            return Err(FieldError {
                field: "description",
                reason: "description must be at least 10 characters",
            });
        }

        Ok(Self {
            title: title.to_string(),
            description: description.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Audit entry view
// ---------------------------------------------------------------------------

/// One audit entry as surfaced to API consumers: actor resolved to a display
/// name ("System" when the entry was machine-generated).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntryView {
    pub id: Uuid,
    pub event_type: EventType,
    pub description: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub actor_name: String,
    pub timestamp: DateTime<Utc>,
    pub file: Option<FileRef>,
}
