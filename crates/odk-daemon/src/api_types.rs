//! Request and response types for all odk-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use chrono::{DateTime, Utc};
use odk_schemas::OrderStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Error body (all non-200 responses)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable reason; for transition denials it names the current
    /// and requested status.
    pub error: String,
    /// Stable machine-readable kind ("illegal_transition", "conflict", ...).
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeStatusRequest {
    /// Raw status value; parsed against the fixed enumeration at the
    /// boundary (400 on anything else).
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignDeveloperRequest {
    /// `null` clears the assignment.
    pub developer: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachFileRequest {
    /// Reference into the external file store.
    pub file_id: Uuid,
    pub name: String,
}

/// Acknowledgement body for endpoints that do not return an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Serialized order, user references resolved to display names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: OrderStatus,
    pub client: Uuid,
    pub manager: Option<Uuid>,
    pub developer: Option<Uuid>,
    pub client_name: Option<String>,
    pub manager_name: Option<String>,
    pub developer_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
}
