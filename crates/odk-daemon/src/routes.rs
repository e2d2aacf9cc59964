//! Axum router and all HTTP handlers for odk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.
//!
//! The caller is identified by the `x-actor-id` header (a user uuid; the
//! engine resolves it through the Actor Directory); real session handling
//! terminates in front of this daemon.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use odk_db::OrderRow;
use odk_engine::EngineError;
use odk_schemas::{AuditEntryView, FileRef, OrderStatus};
use uuid::Uuid;

use crate::{
    api_types::{
        AssignDeveloperRequest, AttachFileRequest, ChangeStatusRequest, CreateOrderRequest,
        ErrorResponse, HealthResponse, OkResponse, OrderListResponse, OrderResponse,
    },
    state::AppState,
};

pub const ACTOR_HEADER: &str = "x-actor-id";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/orders", get(list_orders))
        .route("/orders/create_order", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/change-status", post(change_status))
        .route("/orders/:id/assign-developer", post(assign_developer))
        .route("/orders/:id/attach-file", post(attach_file))
        .route("/orders/:id/history", get(history))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error plumbing
// ---------------------------------------------------------------------------

fn error_response(status: StatusCode, kind: &str, error: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error,
            kind: kind.to_string(),
        }),
    )
        .into_response()
}

fn engine_error(err: EngineError) -> Response {
    let status = match &err {
        EngineError::NotFound => StatusCode::NOT_FOUND,
        EngineError::UnknownActor => StatusCode::UNAUTHORIZED,
        EngineError::Forbidden(_)
        | EngineError::NotAssigned
        | EngineError::IllegalTransition { .. } => StatusCode::FORBIDDEN,
        EngineError::InvalidStatus(_)
        | EngineError::InvalidDeveloper(_)
        | EngineError::InvalidField(_) => StatusCode::BAD_REQUEST,
        EngineError::Conflict { .. } => StatusCode::CONFLICT,
        EngineError::Transient(inner) => {
            tracing::error!(error = %inner, "transient storage failure");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    error_response(status, err.kind(), err.to_string())
}

/// Extract the calling user id from the `x-actor-id` header. Whether the id
/// maps to a real user is the engine's concern: it resolves the caller once
/// per operation, and an unknown id surfaces as `UnknownActor` (also 401).
fn resolve_actor(headers: &HeaderMap) -> Result<Uuid, Response> {
    let raw = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            error_response(
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                format!("missing {ACTOR_HEADER} header"),
            )
        })?;

    raw.parse().map_err(|_| {
        error_response(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            format!("{ACTOR_HEADER} is not a valid uuid"),
        )
    })
}

// ---------------------------------------------------------------------------
// Order serialization
// ---------------------------------------------------------------------------

async fn resolve_name(
    st: &AppState,
    names: &mut BTreeMap<Uuid, Option<String>>,
    id: Option<Uuid>,
) -> Result<Option<String>, EngineError> {
    let Some(id) = id else {
        return Ok(None);
    };
    if let Some(cached) = names.get(&id) {
        return Ok(cached.clone());
    }
    let name = st.directory.display_name(id).await?;
    names.insert(id, name.clone());
    Ok(name)
}

async fn order_response(
    st: &AppState,
    row: OrderRow,
    names: &mut BTreeMap<Uuid, Option<String>>,
) -> Result<OrderResponse, EngineError> {
    let client_name = resolve_name(st, names, Some(row.client_id)).await?;
    let manager_name = resolve_name(st, names, row.manager_id).await?;
    let developer_name = resolve_name(st, names, row.developer_id).await?;

    Ok(OrderResponse {
        id: row.order_id,
        title: row.title,
        description: row.description,
        status: row.status,
        client: row.client_id,
        manager: row.manager_id,
        developer: row.developer_id,
        client_name,
        manager_name,
        developer_name,
        created_at: row.created_at_utc,
        updated_at: row.updated_at_utc,
    })
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /orders/create_order
// ---------------------------------------------------------------------------

pub(crate) async fn create_order(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Response {
    let actor = match resolve_actor(&headers) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    match odk_engine::create_order(
        &st.pool,
        st.directory.as_ref(),
        actor,
        &req.title,
        &req.description,
    )
    .await
    {
        Ok(row) => {
            let mut names = BTreeMap::new();
            match order_response(&st, row, &mut names).await {
                Ok(body) => (StatusCode::CREATED, Json(body)).into_response(),
                Err(err) => engine_error(err),
            }
        }
        Err(err) => engine_error(err),
    }
}

// ---------------------------------------------------------------------------
// GET /orders
// ---------------------------------------------------------------------------

pub(crate) async fn list_orders(State(st): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let actor = match resolve_actor(&headers) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    let rows = match odk_engine::list_orders_for(&st.pool, st.directory.as_ref(), actor).await {
        Ok(rows) => rows,
        Err(err) => return engine_error(err),
    };

    let mut names = BTreeMap::new();
    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        match order_response(&st, row, &mut names).await {
            Ok(body) => orders.push(body),
            Err(err) => return engine_error(err),
        }
    }

    (StatusCode::OK, Json(OrderListResponse { orders })).into_response()
}

// ---------------------------------------------------------------------------
// GET /orders/{id}
// ---------------------------------------------------------------------------

pub(crate) async fn get_order(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    headers: HeaderMap,
) -> Response {
    let actor = match resolve_actor(&headers) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    match odk_engine::get_order(&st.pool, st.directory.as_ref(), order_id, actor).await {
        Ok(row) => {
            let mut names = BTreeMap::new();
            match order_response(&st, row, &mut names).await {
                Ok(body) => (StatusCode::OK, Json(body)).into_response(),
                Err(err) => engine_error(err),
            }
        }
        Err(err) => engine_error(err),
    }
}

// ---------------------------------------------------------------------------
// POST /orders/{id}/change-status
// ---------------------------------------------------------------------------

pub(crate) async fn change_status(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<ChangeStatusRequest>,
) -> Response {
    let actor = match resolve_actor(&headers) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    // Rule 1: the raw value must parse into the fixed enumeration before
    // anything else happens.
    let Some(requested) = OrderStatus::parse(&req.status) else {
        return engine_error(EngineError::InvalidStatus(req.status));
    };

    match odk_engine::transition(
        &st.pool,
        st.directory.as_ref(),
        st.notifier.as_ref(),
        order_id,
        actor,
        requested,
    )
    .await
    {
        Ok(row) => {
            let mut names = BTreeMap::new();
            match order_response(&st, row, &mut names).await {
                Ok(body) => (StatusCode::OK, Json(body)).into_response(),
                Err(err) => engine_error(err),
            }
        }
        Err(err) => engine_error(err),
    }
}

// ---------------------------------------------------------------------------
// POST /orders/{id}/assign-developer
// ---------------------------------------------------------------------------

pub(crate) async fn assign_developer(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<AssignDeveloperRequest>,
) -> Response {
    let actor = match resolve_actor(&headers) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    match odk_engine::assign_developer(
        &st.pool,
        st.directory.as_ref(),
        order_id,
        actor,
        req.developer,
    )
    .await
    {
        Ok(row) => {
            let mut names = BTreeMap::new();
            match order_response(&st, row, &mut names).await {
                Ok(body) => (StatusCode::OK, Json(body)).into_response(),
                Err(err) => engine_error(err),
            }
        }
        Err(err) => engine_error(err),
    }
}

// ---------------------------------------------------------------------------
// POST /orders/{id}/attach-file
// ---------------------------------------------------------------------------

pub(crate) async fn attach_file(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<AttachFileRequest>,
) -> Response {
    let actor = match resolve_actor(&headers) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    let file = FileRef {
        file_id: req.file_id,
        name: req.name,
    };

    match odk_engine::attach_file(&st.pool, st.directory.as_ref(), order_id, actor, file).await {
        Ok(()) => (StatusCode::OK, Json(OkResponse { ok: true })).into_response(),
        Err(err) => engine_error(err),
    }
}

// ---------------------------------------------------------------------------
// GET /orders/{id}/history
// ---------------------------------------------------------------------------

pub(crate) async fn history(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    headers: HeaderMap,
) -> Response {
    let actor = match resolve_actor(&headers) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    match odk_engine::order_history(&st.pool, st.directory.as_ref(), order_id, actor).await {
        Ok(entries) => (StatusCode::OK, Json::<Vec<AuditEntryView>>(entries)).into_response(),
        Err(err) => engine_error(err),
    }
}
