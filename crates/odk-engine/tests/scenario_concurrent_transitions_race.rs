use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use odk_engine::{ActorDirectory, DbDirectory};
use odk_schemas::{EventType, OrderStatus, Role};
use odk_testkit::{seed_user, RecordingNotifier};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Two concurrent transitions with the same precondition (accepted ->
/// in_progress by the assigned programmer) must produce exactly one success
/// and exactly one audit entry — never two, never zero. The loser sees
/// `Conflict` (raced inside the lock window) or `IllegalTransition` (read
/// the post-write status).
///
/// DB-backed test. Skips if ODK_DATABASE_URL is not set.
#[tokio::test]
async fn concurrent_same_precondition_single_winner() -> Result<()> {
    let url = match std::env::var(odk_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: ODK_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await?;
    odk_db::migrate(&pool).await?;

    let directory = DbDirectory::new(pool.clone());
    let notifier = Arc::new(RecordingNotifier::new());

    let client = seed_user(&pool, "client", &[Role::Client]).await?;
    let manager = seed_user(&pool, "manager", &[Role::Manager]).await?;
    let dev = seed_user(&pool, "dev", &[Role::Programmer]).await?;

    let order = odk_engine::create_order(
        &pool,
        &directory,
        client,
        "Race test order",
        "Order used to race two identical transitions.",
    )
    .await?;
    let order_id = order.order_id;

    odk_engine::transition(
        &pool,
        &directory,
        &*notifier,
        order_id,
        manager,
        OrderStatus::Accepted,
    )
    .await?;
    odk_engine::assign_developer(&pool, &directory, order_id, manager, Some(dev)).await?;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let pool = pool.clone();
        let directory = directory.clone();
        let notifier = Arc::clone(&notifier);
        handles.push(tokio::spawn(async move {
            odk_engine::transition(
                &pool,
                &directory,
                &*notifier,
                order_id,
                dev,
                OrderStatus::InProgress,
            )
            .await
        }));
    }

    let mut oks = 0;
    let mut losses = Vec::new();
    for handle in handles {
        match handle.await? {
            Ok(row) => {
                oks += 1;
                assert_eq!(row.status, OrderStatus::InProgress);
            }
            Err(err) => losses.push(err),
        }
    }

    assert_eq!(oks, 1, "exactly one of the racers may win");
    assert_eq!(losses.len(), 1);
    let kind = losses[0].kind();
    assert!(
        kind == "conflict" || kind == "illegal_transition",
        "loser must fail deterministically, got {kind}: {}",
        losses[0]
    );

    let final_order = odk_db::fetch_order(&pool, order_id).await?.unwrap();
    assert_eq!(final_order.status, OrderStatus::InProgress);

    let log = odk_db::list_log_for_order(&pool, order_id).await?;
    let raced: Vec<_> = log
        .iter()
        .filter(|e| {
            e.event_type == EventType::StatusChange
                && e.old_value.as_deref() == Some("accepted")
                && e.new_value.as_deref() == Some("in_progress")
        })
        .collect();
    assert_eq!(raced.len(), 1, "exactly one audit entry for the raced write");

    Ok(())
}

/// Directory wrapper that pauses the first lookup for one chosen user until
/// released. This opens a deterministic window between an operation's
/// optimistic snapshot and its row lock, so a test can commit a competing
/// write inside it.
struct GateDirectory {
    inner: DbDirectory,
    gate_user: Uuid,
    reached: Mutex<Option<oneshot::Sender<()>>>,
    release: Mutex<Option<oneshot::Receiver<()>>>,
}

impl GateDirectory {
    fn new(
        inner: DbDirectory,
        gate_user: Uuid,
    ) -> (Self, oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let gate = Self {
            inner,
            gate_user,
            reached: Mutex::new(Some(reached_tx)),
            release: Mutex::new(Some(release_rx)),
        };
        (gate, reached_rx, release_tx)
    }

    async fn pause_if_gated(&self, user_id: Uuid) {
        if user_id != self.gate_user {
            return;
        }
        let reached = self.reached.lock().unwrap().take();
        let release = self.release.lock().unwrap().take();
        if let (Some(reached), Some(release)) = (reached, release) {
            let _ = reached.send(());
            let _ = release.await;
        }
    }
}

#[async_trait]
impl ActorDirectory for GateDirectory {
    async fn roles(&self, user_id: Uuid) -> Result<Option<Vec<Role>>> {
        self.pause_if_gated(user_id).await;
        self.inner.roles(user_id).await
    }

    async fn display_name(&self, user_id: Uuid) -> Result<Option<String>> {
        self.pause_if_gated(user_id).await;
        self.inner.display_name(user_id).await
    }
}

/// A transition must not commit on the strength of a stale assignment.
/// Here the developer is unbound after the client's `done` request was
/// authorized but before its row lock; status never moves, so only the
/// lock-window re-check can catch it. The transition must fail with
/// `Conflict` and write nothing.
///
/// DB-backed test. Skips if ODK_DATABASE_URL is not set.
#[tokio::test]
async fn unassignment_inside_the_lock_window_blocks_done() -> Result<()> {
    let url = match std::env::var(odk_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: ODK_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await?;
    odk_db::migrate(&pool).await?;

    let plain = DbDirectory::new(pool.clone());
    let notifier = Arc::new(RecordingNotifier::new());

    let client = seed_user(&pool, "client", &[Role::Client]).await?;
    let manager = seed_user(&pool, "manager", &[Role::Manager]).await?;
    let dev = seed_user(&pool, "dev", &[Role::Programmer]).await?;

    let order = odk_engine::create_order(
        &pool,
        &plain,
        client,
        "Stale assignment",
        "Order for the done-rule race regression.",
    )
    .await?;
    let order_id = order.order_id;

    use OrderStatus::*;
    odk_engine::transition(&pool, &plain, &*notifier, order_id, manager, Accepted).await?;
    odk_engine::assign_developer(&pool, &plain, order_id, manager, Some(dev)).await?;
    odk_engine::transition(&pool, &plain, &*notifier, order_id, dev, InProgress).await?;
    odk_engine::transition(&pool, &plain, &*notifier, order_id, dev, ClientReview).await?;
    odk_engine::transition(&pool, &plain, &*notifier, order_id, manager, AwaitingReview).await?;

    // The gated directory stalls the client's role lookup, which sits after
    // the transition's snapshot read and before its transaction.
    let (gate, reached, release) = GateDirectory::new(plain.clone(), client);
    let gate = Arc::new(gate);

    let racer = {
        let pool = pool.clone();
        let gate = Arc::clone(&gate);
        let notifier = Arc::clone(&notifier);
        tokio::spawn(async move {
            odk_engine::transition(&pool, &*gate, &*notifier, order_id, client, Done).await
        })
    };

    reached.await?;
    odk_engine::assign_developer(&pool, &plain, order_id, manager, None).await?;
    let _ = release.send(());

    let err = racer.await?.unwrap_err();
    assert_eq!(err.kind(), "conflict", "got: {err}");

    let after = odk_db::fetch_order(&pool, order_id).await?.unwrap();
    assert_eq!(after.status, AwaitingReview);
    assert!(after.developer_id.is_none());

    let log = odk_db::list_log_for_order(&pool, order_id).await?;
    assert!(
        log.iter().all(|e| e.new_value.as_deref() != Some("done")),
        "the refused transition must not leave an audit entry"
    );

    Ok(())
}

/// Two assignments racing on the same order: the loser's audit entry would
/// describe a developer binding that no longer exists, so the lock-window
/// re-check refuses it with `Conflict`.
///
/// DB-backed test. Skips if ODK_DATABASE_URL is not set.
#[tokio::test]
async fn raced_assignment_is_refused() -> Result<()> {
    let url = match std::env::var(odk_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: ODK_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await?;
    odk_db::migrate(&pool).await?;

    let plain = DbDirectory::new(pool.clone());

    let client = seed_user(&pool, "client", &[Role::Client]).await?;
    let manager = seed_user(&pool, "manager", &[Role::Manager]).await?;
    let dev1 = seed_user(&pool, "dev1", &[Role::Programmer]).await?;
    let dev2 = seed_user(&pool, "dev2", &[Role::Programmer]).await?;

    let order = odk_engine::create_order(
        &pool,
        &plain,
        client,
        "Raced assignment",
        "Order for the assignment race regression.",
    )
    .await?;
    let order_id = order.order_id;

    odk_engine::assign_developer(&pool, &plain, order_id, manager, Some(dev1)).await?;

    // Stall the racer at the target-validation lookup: its snapshot already
    // reads dev1 while the competing unassignment commits.
    let (gate, reached, release) = GateDirectory::new(plain.clone(), dev2);
    let gate = Arc::new(gate);

    let racer = {
        let pool = pool.clone();
        let gate = Arc::clone(&gate);
        tokio::spawn(async move {
            odk_engine::assign_developer(&pool, &*gate, order_id, manager, Some(dev2)).await
        })
    };

    reached.await?;
    odk_engine::assign_developer(&pool, &plain, order_id, manager, None).await?;
    let _ = release.send(());

    let err = racer.await?.unwrap_err();
    assert_eq!(err.kind(), "conflict", "got: {err}");

    let after = odk_db::fetch_order(&pool, order_id).await?.unwrap();
    assert!(after.developer_id.is_none(), "the loser must not rebind");

    let log = odk_db::list_log_for_order(&pool, order_id).await?;
    let assignments: Vec<_> = log
        .iter()
        .filter(|e| e.event_type == EventType::Assignment)
        .collect();
    assert_eq!(assignments.len(), 2, "bind + unbind, nothing from the loser");
    assert_eq!(
        assignments.last().unwrap().new_value.as_deref(),
        Some("none")
    );

    Ok(())
}
