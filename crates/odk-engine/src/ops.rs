//! Order mutation operations.
//!
//! Each operation is one short unit of work: resolve the caller, check
//! authority, then apply the write and its audit append inside a single
//! transaction holding a row lock on the order. Concurrent transitions on
//! the same order serialize on that lock; a raced precondition surfaces as
//! `Conflict` and nothing is applied.

use anyhow::Context;
use odk_db::{LogRow, NewLogEntry, NewOrder, OrderRow, OrderScope};
use odk_policy::{authorize, ActorFacts};
use odk_schemas::{
    AuditEntryView, EventType, FileRef, NewOrderFields, OrderStatus, Role,
};
use sqlx::PgPool;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::boundary::{ActorDirectory, Notifier};
use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Caller resolution
// ---------------------------------------------------------------------------

struct Caller {
    user_id: Uuid,
    roles: Vec<Role>,
}

impl Caller {
    fn has(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    fn is_manager_or_admin(&self) -> bool {
        self.has(Role::Manager) || self.has(Role::Admin)
    }

    fn facts_for(&self, order: &OrderRow) -> ActorFacts {
        ActorFacts {
            is_manager: self.has(Role::Manager),
            is_admin: self.has(Role::Admin),
            has_programmer_role: self.has(Role::Programmer),
            is_owner_client: order.client_id == self.user_id,
            is_assigned_developer: order.developer_id == Some(self.user_id),
        }
    }

    /// Visibility mirrors the listing scope: managers/admins see everything,
    /// programmers their assignments, clients their own orders. Invisible
    /// orders read as absent, not as forbidden.
    fn can_see(&self, order: &OrderRow) -> bool {
        self.is_manager_or_admin()
            || order.developer_id == Some(self.user_id)
            || order.client_id == self.user_id
    }
}

async fn resolve_caller(
    directory: &dyn ActorDirectory,
    user_id: Uuid,
) -> Result<Caller, EngineError> {
    let roles = directory
        .roles(user_id)
        .await?
        .ok_or(EngineError::UnknownActor)?;
    Ok(Caller { user_id, roles })
}

// ---------------------------------------------------------------------------
// create_order
// ---------------------------------------------------------------------------

/// Create an order for the calling client. The server forces ownership:
/// `client` is always the caller, status always starts at `submitted`.
/// Creation and its audit entry commit together.
pub async fn create_order(
    pool: &PgPool,
    directory: &dyn ActorDirectory,
    actor_id: Uuid,
    title: &str,
    description: &str,
) -> Result<OrderRow, EngineError> {
    let caller = resolve_caller(directory, actor_id).await?;
    if !caller.has(Role::Client) {
        return Err(EngineError::Forbidden(
            "only clients may create orders".to_string(),
        ));
    }

    let fields = NewOrderFields::validated(title, description)?;
    let order_id = Uuid::new_v4();

    let mut tx = pool.begin().await.context("begin create_order tx")?;

    odk_db::insert_order(
        &mut tx,
        &NewOrder {
            order_id,
            title: fields.title,
            description: fields.description,
            client_id: actor_id,
        },
    )
    .await?;

    odk_db::append_log_entry(
        &mut tx,
        &NewLogEntry {
            log_id: Uuid::new_v4(),
            order_id,
            actor_id: Some(actor_id),
            event_type: EventType::Other,
            description: "Order created.".to_string(),
            old_value: None,
            new_value: None,
            file: None,
        },
    )
    .await?;

    tx.commit().await.context("commit create_order tx")?;

    tracing::info!(%order_id, client = %actor_id, "order created");

    odk_db::fetch_order(pool, order_id)
        .await?
        .ok_or(EngineError::NotFound)
}

// ---------------------------------------------------------------------------
// transition
// ---------------------------------------------------------------------------

/// Apply an authorized status transition and log it.
///
/// The authorization runs against an optimistic snapshot; the transaction
/// re-reads the row under `FOR UPDATE` and refuses with `Conflict` if the
/// status moved in between, or if a concurrent assignment change invalidated
/// the grant or the done rule. On success exactly one `status_change` audit
/// entry exists for the write, and the client (plus assigned developer) is
/// notified best-effort after commit.
pub async fn transition(
    pool: &PgPool,
    directory: &dyn ActorDirectory,
    notifier: &dyn Notifier,
    order_id: Uuid,
    actor_id: Uuid,
    requested: OrderStatus,
) -> Result<OrderRow, EngineError> {
    let order = odk_db::fetch_order(pool, order_id)
        .await?
        .ok_or(EngineError::NotFound)?;
    let caller = resolve_caller(directory, actor_id).await?;

    let grant = authorize(&caller.facts_for(&order), order.status, requested)?;

    // Business rule, deliberately outside the transition table: an order may
    // not reach `done` without an assigned developer.
    if requested == OrderStatus::Done && order.developer_id.is_none() {
        return Err(EngineError::IllegalTransition {
            role_row: grant.role_row,
            current: order.status,
            requested,
            note: Some("an order can only be done with an assigned developer"),
        });
    }

    let authorized_status = order.status;

    let mut tx = pool.begin().await.context("begin transition tx")?;

    let locked = odk_db::fetch_order_locked(&mut tx, order_id)
        .await?
        .ok_or(EngineError::NotFound)?;

    if locked.status != authorized_status {
        // Raced with another transition; the authorization no longer holds.
        return Err(EngineError::Conflict {
            authorized: authorized_status,
            found: locked.status,
        });
    }

    // Status equality alone does not prove the grant still holds: a
    // concurrent assignment leaves status untouched but can strip the
    // caller's assigned-developer fact or the developer the done rule
    // requires. Re-evaluate both against the locked row.
    if requested == OrderStatus::Done && locked.developer_id.is_none() {
        return Err(EngineError::Conflict {
            authorized: authorized_status,
            found: locked.status,
        });
    }
    if authorize(&caller.facts_for(&locked), locked.status, requested).is_err() {
        return Err(EngineError::Conflict {
            authorized: authorized_status,
            found: locked.status,
        });
    }

    odk_db::update_order_status(&mut tx, order_id, requested).await?;

    let description = format!(
        "Status changed from \"{}\" to \"{}\"",
        authorized_status.label(),
        requested.label()
    );

    odk_db::append_log_entry(
        &mut tx,
        &NewLogEntry {
            log_id: Uuid::new_v4(),
            order_id,
            actor_id: Some(actor_id),
            event_type: EventType::StatusChange,
            description: description.clone(),
            old_value: Some(authorized_status.as_str().to_string()),
            new_value: Some(requested.as_str().to_string()),
            file: None,
        },
    )
    .await?;

    tx.commit().await.context("commit transition tx")?;

    tracing::info!(
        %order_id,
        actor = %actor_id,
        role = %grant.role_row,
        from = %authorized_status,
        to = %requested,
        "status transition applied"
    );

    let updated = odk_db::fetch_order(pool, order_id)
        .await?
        .ok_or(EngineError::NotFound)?;

    // Fire-and-forget; delivery failure never rolls back the transition.
    let mut recipients = vec![updated.client_id];
    if let Some(dev) = updated.developer_id {
        if dev != updated.client_id {
            recipients.push(dev);
        }
    }
    notifier.notify(
        &recipients,
        &format!("Order \"{}\" is now {}", updated.title, requested.label()),
        &description,
    );

    Ok(updated)
}

// ---------------------------------------------------------------------------
// assign_developer
// ---------------------------------------------------------------------------

/// Bind or clear the developer on an order. Manager/admin only; the acting
/// manager becomes the manager of record. Does not touch status, but uses
/// the same lock + write + log discipline as a transition.
pub async fn assign_developer(
    pool: &PgPool,
    directory: &dyn ActorDirectory,
    order_id: Uuid,
    actor_id: Uuid,
    developer_id: Option<Uuid>,
) -> Result<OrderRow, EngineError> {
    let caller = resolve_caller(directory, actor_id).await?;
    if !caller.is_manager_or_admin() {
        return Err(EngineError::Forbidden(
            "only managers may assign developers".to_string(),
        ));
    }

    let order = odk_db::fetch_order(pool, order_id)
        .await?
        .ok_or(EngineError::NotFound)?;

    let new_name = match developer_id {
        Some(dev) => {
            let roles = directory.roles(dev).await?.ok_or_else(|| {
                EngineError::InvalidDeveloper("no user with the given id".to_string())
            })?;
            if !roles.contains(&Role::Programmer) {
                return Err(EngineError::InvalidDeveloper(
                    "user does not hold the programmer role".to_string(),
                ));
            }
            directory
                .display_name(dev)
                .await?
                .unwrap_or_else(|| dev.to_string())
        }
        None => "none".to_string(),
    };

    // Directory lookups stay outside the lock window. The old name comes
    // from the snapshot; the re-check under the lock guarantees the snapshot
    // is still what the audit entry will describe.
    let old_name = match order.developer_id {
        Some(prev) => directory
            .display_name(prev)
            .await?
            .unwrap_or_else(|| prev.to_string()),
        None => "none".to_string(),
    };

    let mut tx = pool.begin().await.context("begin assignment tx")?;

    let locked = odk_db::fetch_order_locked(&mut tx, order_id)
        .await?
        .ok_or(EngineError::NotFound)?;

    if locked.developer_id != order.developer_id {
        // Raced with another assignment; the old value no longer matches.
        return Err(EngineError::Conflict {
            authorized: order.status,
            found: locked.status,
        });
    }

    odk_db::update_order_assignment(&mut tx, order_id, actor_id, developer_id).await?;

    odk_db::append_log_entry(
        &mut tx,
        &NewLogEntry {
            log_id: Uuid::new_v4(),
            order_id,
            actor_id: Some(actor_id),
            event_type: EventType::Assignment,
            description: format!("Developer changed from {old_name} to {new_name}"),
            old_value: Some(old_name),
            new_value: Some(new_name),
            file: None,
        },
    )
    .await?;

    tx.commit().await.context("commit assignment tx")?;

    tracing::info!(%order_id, manager = %actor_id, developer = ?developer_id, "developer assignment");

    odk_db::fetch_order(pool, order_id)
        .await?
        .ok_or(EngineError::NotFound)
}

// ---------------------------------------------------------------------------
// attach_file
// ---------------------------------------------------------------------------

/// Record that an externally-stored file was attached to an order. The file
/// body lives in the file store; the core only keeps the opaque reference in
/// the audit trail.
pub async fn attach_file(
    pool: &PgPool,
    directory: &dyn ActorDirectory,
    order_id: Uuid,
    actor_id: Uuid,
    file: FileRef,
) -> Result<(), EngineError> {
    let order = odk_db::fetch_order(pool, order_id)
        .await?
        .ok_or(EngineError::NotFound)?;
    let caller = resolve_caller(directory, actor_id).await?;

    let permitted = caller.is_manager_or_admin()
        || order.client_id == actor_id
        || order.developer_id == Some(actor_id);
    if !permitted {
        return Err(EngineError::Forbidden(
            "caller may not attach files to this order".to_string(),
        ));
    }

    let mut conn = pool.acquire().await.context("acquire connection")?;
    odk_db::append_log_entry(
        &mut conn,
        &NewLogEntry {
            log_id: Uuid::new_v4(),
            order_id,
            actor_id: Some(actor_id),
            event_type: EventType::FileAdded,
            description: format!("File attached: {}", file.name),
            old_value: None,
            new_value: None,
            file: Some(file),
        },
    )
    .await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetch one order, subject to the caller's visibility. An order outside the
/// caller's scope reads as absent.
pub async fn get_order(
    pool: &PgPool,
    directory: &dyn ActorDirectory,
    order_id: Uuid,
    actor_id: Uuid,
) -> Result<OrderRow, EngineError> {
    let caller = resolve_caller(directory, actor_id).await?;
    let order = odk_db::fetch_order(pool, order_id)
        .await?
        .ok_or(EngineError::NotFound)?;
    if !caller.can_see(&order) {
        return Err(EngineError::NotFound);
    }
    Ok(order)
}

/// Orders visible to the caller, newest first.
pub async fn list_orders_for(
    pool: &PgPool,
    directory: &dyn ActorDirectory,
    actor_id: Uuid,
) -> Result<Vec<OrderRow>, EngineError> {
    let caller = resolve_caller(directory, actor_id).await?;
    let scope = if caller.is_manager_or_admin() {
        OrderScope::All
    } else if caller.has(Role::Programmer) {
        OrderScope::AssignedTo(actor_id)
    } else {
        OrderScope::OwnedBy(actor_id)
    };
    Ok(odk_db::list_orders(pool, scope).await?)
}

/// Full audit history of an order, oldest first, actors resolved to display
/// names ("System" for machine-generated entries).
pub async fn order_history(
    pool: &PgPool,
    directory: &dyn ActorDirectory,
    order_id: Uuid,
    actor_id: Uuid,
) -> Result<Vec<AuditEntryView>, EngineError> {
    let caller = resolve_caller(directory, actor_id).await?;
    let order = odk_db::fetch_order(pool, order_id)
        .await?
        .ok_or(EngineError::NotFound)?;
    if !caller.can_see(&order) {
        return Err(EngineError::NotFound);
    }

    let rows = odk_db::list_log_for_order(pool, order_id).await?;

    let mut names: BTreeMap<Uuid, String> = BTreeMap::new();
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let actor_name = match row.actor_id {
            Some(id) => match names.get(&id) {
                Some(name) => name.clone(),
                None => {
                    let name = directory
                        .display_name(id)
                        .await?
                        .unwrap_or_else(|| "System".to_string());
                    names.insert(id, name.clone());
                    name
                }
            },
            None => "System".to_string(),
        };
        out.push(view_from_row(row, actor_name));
    }
    Ok(out)
}

fn view_from_row(row: LogRow, actor_name: String) -> AuditEntryView {
    AuditEntryView {
        id: row.log_id,
        event_type: row.event_type,
        description: row.description,
        old_value: row.old_value,
        new_value: row.new_value,
        actor_name,
        timestamp: row.ts_utc,
        file: row.file,
    }
}
