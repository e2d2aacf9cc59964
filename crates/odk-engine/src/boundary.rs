//! External collaborator boundaries.
//!
//! The engine never reads group tables or sends mail itself. It sees the
//! caller through [`ActorDirectory`] and emits notifications through
//! [`Notifier`]. Production wires the DB-backed directory and a webhook
//! notifier; tests wire in-memory doubles.

use anyhow::Result;
use async_trait::async_trait;
use odk_schemas::Role;
use sqlx::PgPool;
use uuid::Uuid;

/// Resolves a caller to a role set and a display name.
///
/// `None` means the user does not exist; errors are infrastructure failures.
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    async fn roles(&self, user_id: Uuid) -> Result<Option<Vec<Role>>>;
    async fn display_name(&self, user_id: Uuid) -> Result<Option<String>>;
}

/// Best-effort outbound notification. Failure must never affect the calling
/// mutation, so the contract is fire-and-forget: implementations log or
/// spawn, they do not return errors.
pub trait Notifier: Send + Sync {
    fn notify(&self, recipients: &[Uuid], subject: &str, body: &str);
}

// ---------------------------------------------------------------------------
// DbDirectory
// ---------------------------------------------------------------------------

/// Actor Directory backed by the users table in odk-db.
#[derive(Clone)]
pub struct DbDirectory {
    pool: PgPool,
}

impl DbDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActorDirectory for DbDirectory {
    async fn roles(&self, user_id: Uuid) -> Result<Option<Vec<Role>>> {
        let Some(user) = odk_db::fetch_user(&self.pool, user_id).await? else {
            return Ok(None);
        };
        // Unknown role strings are skipped, not fatal: the table may carry
        // roles this core does not evaluate.
        let roles = user
            .roles
            .iter()
            .filter_map(|r| Role::parse(r))
            .collect::<Vec<_>>();
        Ok(Some(roles))
    }

    async fn display_name(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(odk_db::fetch_user(&self.pool, user_id)
            .await?
            .map(|u| u.username))
    }
}

// ---------------------------------------------------------------------------
// LogNotifier
// ---------------------------------------------------------------------------

/// Default notifier: records the notification in the service log and drops
/// it. Deployments that want delivery swap in the daemon's webhook notifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, recipients: &[Uuid], subject: &str, body: &str) {
        tracing::info!(?recipients, subject, body, "notification (log-only)");
    }
}
