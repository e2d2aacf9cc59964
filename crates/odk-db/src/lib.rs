//! Postgres persistence for orderdesk: users (the thin table behind the
//! Actor Directory boundary), orders, and the append-only order_log.
//!
//! All mutation of `orders.status` / assignment fields goes through
//! odk-engine, which calls the `*_locked` functions here inside one
//! transaction so a status write and its audit append commit together.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use odk_schemas::{EventType, FileRef, OrderStatus};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

pub const ENV_DB_URL: &str = "ODK_DATABASE_URL";

/// Connect to Postgres using ODK_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='orders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_orders_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}

// ---------------------------------------------------------------------------
// Users (Actor Directory boundary table)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UserRow {
    pub user_id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub created_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

pub async fn insert_user(pool: &PgPool, user: &NewUser) -> Result<()> {
    sqlx::query(
        r#"
        insert into users (user_id, username, email, roles)
        values ($1, $2, $3, $4)
        "#,
    )
    .bind(user.user_id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.roles)
    .execute(pool)
    .await
    .context("insert_user failed")?;
    Ok(())
}

pub async fn fetch_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRow>> {
    let row = sqlx::query(
        r#"
        select user_id, username, email, roles, created_at_utc
        from users
        where user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("fetch_user failed")?;

    row.map(|r| {
        Ok(UserRow {
            user_id: r.try_get("user_id")?,
            username: r.try_get("username")?,
            email: r.try_get("email")?,
            roles: r.try_get("roles")?,
            created_at_utc: r.try_get("created_at_utc")?,
        })
    })
    .transpose()
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrderRow {
    pub order_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: OrderStatus,
    pub client_id: Uuid,
    pub manager_id: Option<Uuid>,
    pub developer_id: Option<Uuid>,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: Uuid,
    pub title: String,
    pub description: String,
    pub client_id: Uuid,
}

fn order_from_row(row: &PgRow) -> Result<OrderRow> {
    let status_str: String = row.try_get("status")?;
    let status = OrderStatus::parse(&status_str)
        .ok_or_else(|| anyhow!("invalid status in orders row: {status_str}"))?;

    Ok(OrderRow {
        order_id: row.try_get("order_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status,
        client_id: row.try_get("client_id")?,
        manager_id: row.try_get("manager_id")?,
        developer_id: row.try_get("developer_id")?,
        created_at_utc: row.try_get("created_at_utc")?,
        updated_at_utc: row.try_get("updated_at_utc")?,
    })
}

const ORDER_COLUMNS: &str = r#"
    order_id, title, description, status,
    client_id, manager_id, developer_id,
    created_at_utc, updated_at_utc
"#;

/// Insert a new order. Status defaults to 'submitted' in the schema; the
/// engine never creates an order in any other state. Transaction-scoped so
/// creation and its audit entry commit together.
pub async fn insert_order(conn: &mut PgConnection, order: &NewOrder) -> Result<()> {
    sqlx::query(
        r#"
        insert into orders (order_id, title, description, client_id)
        values ($1, $2, $3, $4)
        "#,
    )
    .bind(order.order_id)
    .bind(&order.title)
    .bind(&order.description)
    .bind(order.client_id)
    .execute(&mut *conn)
    .await
    .context("insert_order failed")?;
    Ok(())
}

pub async fn fetch_order(pool: &PgPool, order_id: Uuid) -> Result<Option<OrderRow>> {
    let row = sqlx::query(&format!(
        "select {ORDER_COLUMNS} from orders where order_id = $1"
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await
    .context("fetch_order failed")?;

    row.as_ref().map(order_from_row).transpose()
}

/// Fetch an order with a row-level exclusive lock. Must run inside a
/// transaction; the lock holds until commit/rollback, serializing
/// transitions on the same order.
pub async fn fetch_order_locked(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> Result<Option<OrderRow>> {
    let row = sqlx::query(&format!(
        "select {ORDER_COLUMNS} from orders where order_id = $1 for update"
    ))
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await
    .context("fetch_order_locked failed")?;

    row.as_ref().map(order_from_row).transpose()
}

/// Write a new status and bump updated_at. Transaction-scoped; the caller
/// pairs this with an `append_log_entry` before committing.
pub async fn update_order_status(
    conn: &mut PgConnection,
    order_id: Uuid,
    status: OrderStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        update orders
        set status = $2,
            updated_at_utc = now()
        where order_id = $1
        "#,
    )
    .bind(order_id)
    .bind(status.as_str())
    .execute(&mut *conn)
    .await
    .context("update_order_status failed")?;
    Ok(())
}

/// Rebind manager/developer. Transaction-scoped, same discipline as status.
pub async fn update_order_assignment(
    conn: &mut PgConnection,
    order_id: Uuid,
    manager_id: Uuid,
    developer_id: Option<Uuid>,
) -> Result<()> {
    sqlx::query(
        r#"
        update orders
        set manager_id = $2,
            developer_id = $3,
            updated_at_utc = now()
        where order_id = $1
        "#,
    )
    .bind(order_id)
    .bind(manager_id)
    .bind(developer_id)
    .execute(&mut *conn)
    .await
    .context("update_order_assignment failed")?;
    Ok(())
}

/// Which orders a caller may list. Managers and admins see everything,
/// programmers their assignments, clients their own orders.
#[derive(Debug, Clone, Copy)]
pub enum OrderScope {
    All,
    AssignedTo(Uuid),
    OwnedBy(Uuid),
}

/// List orders for a scope, newest first.
pub async fn list_orders(pool: &PgPool, scope: OrderScope) -> Result<Vec<OrderRow>> {
    let rows = match scope {
        OrderScope::All => {
            sqlx::query(&format!(
                "select {ORDER_COLUMNS} from orders order by created_at_utc desc"
            ))
            .fetch_all(pool)
            .await
        }
        OrderScope::AssignedTo(dev) => {
            sqlx::query(&format!(
                "select {ORDER_COLUMNS} from orders where developer_id = $1 order by created_at_utc desc"
            ))
            .bind(dev)
            .fetch_all(pool)
            .await
        }
        OrderScope::OwnedBy(client) => {
            sqlx::query(&format!(
                "select {ORDER_COLUMNS} from orders where client_id = $1 order by created_at_utc desc"
            ))
            .bind(client)
            .fetch_all(pool)
            .await
        }
    }
    .context("list_orders failed")?;

    rows.iter().map(order_from_row).collect()
}

// ---------------------------------------------------------------------------
// Order log (append-only)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LogRow {
    pub log_id: Uuid,
    pub seq: i64,
    pub order_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub event_type: EventType,
    pub description: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub file: Option<FileRef>,
    pub ts_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub log_id: Uuid,
    pub order_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub event_type: EventType,
    pub description: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub file: Option<FileRef>,
}

fn log_from_row(row: &PgRow) -> Result<LogRow> {
    let event_str: String = row.try_get("event_type")?;
    let event_type = EventType::parse(&event_str)
        .ok_or_else(|| anyhow!("invalid event_type in order_log row: {event_str}"))?;

    let file_id: Option<Uuid> = row.try_get("file_id")?;
    let file_name: Option<String> = row.try_get("file_name")?;
    let file = match (file_id, file_name) {
        (Some(file_id), Some(name)) => Some(FileRef { file_id, name }),
        _ => None,
    };

    Ok(LogRow {
        log_id: row.try_get("log_id")?,
        seq: row.try_get("seq")?,
        order_id: row.try_get("order_id")?,
        actor_id: row.try_get("actor_id")?,
        event_type,
        description: row.try_get("description")?,
        old_value: row.try_get("old_value")?,
        new_value: row.try_get("new_value")?,
        file,
        ts_utc: row.try_get("ts_utc")?,
    })
}

/// Append one audit entry (append-only semantics enforced at app layer:
/// there is no update or delete function for order_log).
pub async fn append_log_entry(conn: &mut PgConnection, entry: &NewLogEntry) -> Result<()> {
    let (file_id, file_name) = match &entry.file {
        Some(f) => (Some(f.file_id), Some(f.name.clone())),
        None => (None, None),
    };

    sqlx::query(
        r#"
        insert into order_log (
          log_id, order_id, actor_id, event_type, description,
          old_value, new_value, file_id, file_name
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9
        )
        "#,
    )
    .bind(entry.log_id)
    .bind(entry.order_id)
    .bind(entry.actor_id)
    .bind(entry.event_type.as_str())
    .bind(&entry.description)
    .bind(&entry.old_value)
    .bind(&entry.new_value)
    .bind(file_id)
    .bind(file_name)
    .execute(&mut *conn)
    .await
    .context("append_log_entry failed")?;
    Ok(())
}

/// Full history for one order, oldest first. The (ts_utc, seq) key makes
/// repeated reads stable even when entries share a timestamp.
pub async fn list_log_for_order(pool: &PgPool, order_id: Uuid) -> Result<Vec<LogRow>> {
    let rows = sqlx::query(
        r#"
        select log_id, seq, order_id, actor_id, event_type, description,
               old_value, new_value, file_id, file_name, ts_utc
        from order_log
        where order_id = $1
        order by ts_utc asc, seq asc
        "#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await
    .context("list_log_for_order failed")?;

    rows.iter().map(log_from_row).collect()
}

/// Administrative order removal (outside the lifecycle core). The order_log
/// rows cascade with the order.
pub async fn delete_order(pool: &PgPool, order_id: Uuid) -> Result<u64> {
    let res = sqlx::query("delete from orders where order_id = $1")
        .bind(order_id)
        .execute(pool)
        .await
        .context("delete_order failed")?;
    Ok(res.rows_affected())
}
