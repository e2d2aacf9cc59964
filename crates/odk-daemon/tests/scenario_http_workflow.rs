//! End-to-end workflow over the HTTP surface with production wiring
//! (DB directory, log-only notifier). Covers creation, acceptance,
//! assignment, execution, visibility, attachments, and the history read.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use odk_daemon::routes::{build_router, ACTOR_HEADER};
use odk_daemon::state::AppState;
use odk_engine::{DbDirectory, LogNotifier};
use odk_schemas::Role;
use odk_testkit::seed_user;
use tower::ServiceExt;
use uuid::Uuid;

async fn body_json(resp: Response) -> anyhow::Result<serde_json::Value> {
    let bytes = resp.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    actor: Uuid,
    body: Option<serde_json::Value>,
) -> anyhow::Result<Response> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(ACTOR_HEADER, actor.to_string());
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    Ok(router.clone().oneshot(builder.body(body)?).await?)
}

/// DB-backed test. Skips if ODK_DATABASE_URL is not set.
#[tokio::test]
async fn orders_flow_end_to_end_over_http() -> anyhow::Result<()> {
    let url = match std::env::var(odk_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: ODK_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    odk_db::migrate(&pool).await?;

    let client = seed_user(&pool, "client", &[Role::Client]).await?;
    let stranger = seed_user(&pool, "client2", &[Role::Client]).await?;
    let manager = seed_user(&pool, "manager", &[Role::Manager]).await?;
    let dev = seed_user(&pool, "dev", &[Role::Programmer]).await?;

    let state = AppState::with_boundaries(
        pool.clone(),
        Arc::new(DbDirectory::new(pool.clone())),
        Arc::new(LogNotifier),
    );
    let router = build_router(Arc::new(state));

    // Create.
    let resp = send(
        &router,
        "POST",
        "/orders/create_order",
        client,
        Some(serde_json::json!({
            "title": "Inventory sync",
            "description": "Nightly sync of warehouse stock into the shop."
        })),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let order = body_json(resp).await?;
    assert_eq!(order["status"], serde_json::json!("submitted"));
    assert!(order["client_name"].is_string());
    let order_id: Uuid = order["id"].as_str().unwrap().parse()?;

    // Another client cannot even see it.
    let resp = send(&router, "GET", &format!("/orders/{order_id}"), stranger, None).await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // The owning client may not accept their own order.
    let resp = send(
        &router,
        "POST",
        &format!("/orders/{order_id}/change-status"),
        client,
        Some(serde_json::json!({ "status": "accepted" })),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = body_json(resp).await?;
    assert_eq!(body["kind"], serde_json::json!("illegal_transition"));

    // Manager accepts.
    let resp = send(
        &router,
        "POST",
        &format!("/orders/{order_id}/change-status"),
        manager,
        Some(serde_json::json!({ "status": "accepted" })),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["status"], serde_json::json!("accepted"));

    // Assigning a non-programmer is a 400.
    let resp = send(
        &router,
        "POST",
        &format!("/orders/{order_id}/assign-developer"),
        manager,
        Some(serde_json::json!({ "developer": stranger })),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await?;
    assert_eq!(body["kind"], serde_json::json!("invalid_developer"));

    // Real assignment.
    let resp = send(
        &router,
        "POST",
        &format!("/orders/{order_id}/assign-developer"),
        manager,
        Some(serde_json::json!({ "developer": dev })),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["developer"], serde_json::json!(dev.to_string()));
    assert_eq!(body["manager"], serde_json::json!(manager.to_string()));
    assert!(body["developer_name"].is_string());

    // The assigned developer starts the work and sees it in their listing.
    let resp = send(
        &router,
        "POST",
        &format!("/orders/{order_id}/change-status"),
        dev,
        Some(serde_json::json!({ "status": "in_progress" })),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&router, "GET", "/orders", dev, None).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    let listed = body["orders"]
        .as_array()
        .unwrap()
        .iter()
        .any(|o| o["id"] == serde_json::json!(order_id.to_string()));
    assert!(listed, "assigned order must appear in the developer listing");

    // Client attaches a requirements document.
    let file_id = Uuid::new_v4();
    let resp = send(
        &router,
        "POST",
        &format!("/orders/{order_id}/attach-file"),
        client,
        Some(serde_json::json!({ "file_id": file_id, "name": "stock-mapping.xlsx" })),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["ok"], serde_json::json!(true));

    // History: creation, accept, assignment, in_progress, file. Oldest first.
    let resp = send(&router, "GET", &format!("/orders/{order_id}/history"), manager, None).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let history = body_json(resp).await?;
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[0]["description"], serde_json::json!("Order created."));
    let last = entries.last().unwrap();
    assert_eq!(last["event_type"], serde_json::json!("file_added"));
    assert_eq!(last["file"]["name"], serde_json::json!("stock-mapping.xlsx"));
    for w in entries.windows(2) {
        let a: chrono::DateTime<chrono::Utc> = w[0]["timestamp"].as_str().unwrap().parse()?;
        let b: chrono::DateTime<chrono::Utc> = w[1]["timestamp"].as_str().unwrap().parse()?;
        assert!(a <= b, "history must be oldest first");
    }

    // Unknown order id.
    let resp = send(&router, "GET", &format!("/orders/{}", Uuid::new_v4()), manager, None).await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await?;
    assert_eq!(body["kind"], serde_json::json!("not_found"));

    Ok(())
}
