//! Shared test helpers: in-memory boundary doubles and DB seeding.
//!
//! Consumed only as a dev-dependency by the engine and daemon scenario
//! tests. Usernames are suffixed with a uuid so tests never collide with
//! leftover rows in a developer database.

use anyhow::Result;
use async_trait::async_trait;
use odk_engine::{ActorDirectory, Notifier};
use odk_schemas::Role;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// MemDirectory
// ---------------------------------------------------------------------------

/// In-memory Actor Directory for tests that do not want the users table.
#[derive(Debug, Default)]
pub struct MemDirectory {
    users: HashMap<Uuid, (String, Vec<Role>)>,
}

impl MemDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, name: &str, roles: &[Role]) -> Uuid {
        let id = Uuid::new_v4();
        self.users.insert(id, (name.to_string(), roles.to_vec()));
        id
    }
}

#[async_trait]
impl ActorDirectory for MemDirectory {
    async fn roles(&self, user_id: Uuid) -> Result<Option<Vec<Role>>> {
        Ok(self.users.get(&user_id).map(|(_, roles)| roles.clone()))
    }

    async fn display_name(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(self.users.get(&user_id).map(|(name, _)| name.clone()))
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub recipients: Vec<Uuid>,
    pub subject: String,
    pub body: String,
}

/// Notifier double that records every notification for assertion.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, recipients: &[Uuid], subject: &str, body: &str) {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(SentNotification {
                recipients: recipients.to_vec(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
    }
}

// ---------------------------------------------------------------------------
// DB seeding
// ---------------------------------------------------------------------------

/// Insert a user with a collision-proof username and the given roles.
pub async fn seed_user(pool: &PgPool, name: &str, roles: &[Role]) -> Result<Uuid> {
    let user_id = Uuid::new_v4();
    odk_db::insert_user(
        pool,
        &odk_db::NewUser {
            user_id,
            username: format!("{name}_{}", user_id.simple()),
            email: Some(format!("{name}@example.test")),
            roles: roles.iter().map(|r| r.as_str().to_string()).collect(),
        },
    )
    .await?;
    Ok(user_id)
}

/// Insert a submitted order owned by `client_id`, bypassing the engine.
/// Useful for store-level tests; engine tests should prefer
/// `odk_engine::create_order`.
pub async fn seed_order(pool: &PgPool, client_id: Uuid) -> Result<Uuid> {
    let order_id = Uuid::new_v4();
    let mut conn = pool.acquire().await?;
    odk_db::insert_order(
        &mut conn,
        &odk_db::NewOrder {
            order_id,
            title: format!("Test order {}", order_id.simple()),
            description: "Seeded order for scenario tests.".to_string(),
            client_id,
        },
    )
    .await?;
    Ok(order_id)
}
