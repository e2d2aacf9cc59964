//! Shared runtime state for odk-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The directory and
//! notifier are trait objects so tests can substitute in-memory doubles.

use std::sync::Arc;

use odk_engine::{ActorDirectory, DbDirectory, LogNotifier, Notifier};
use serde::Serialize;
use sqlx::PgPool;

use crate::notify::WebhookNotifier;

pub const ENV_NOTIFY_WEBHOOK: &str = "ODK_NOTIFY_WEBHOOK";

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
pub struct AppState {
    pub pool: PgPool,
    pub directory: Arc<dyn ActorDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub build: BuildInfo,
}

impl AppState {
    /// Production wiring: DB-backed directory; webhook notifier when
    /// ODK_NOTIFY_WEBHOOK is set, log-only notifier otherwise.
    pub fn from_env(pool: PgPool) -> Self {
        let notifier: Arc<dyn Notifier> = match std::env::var(ENV_NOTIFY_WEBHOOK) {
            Ok(url) if !url.is_empty() => Arc::new(WebhookNotifier::new(url)),
            _ => Arc::new(LogNotifier),
        };
        Self::with_boundaries(pool.clone(), Arc::new(DbDirectory::new(pool)), notifier)
    }

    /// Explicit wiring, used by tests to inject doubles.
    pub fn with_boundaries(
        pool: PgPool,
        directory: Arc<dyn ActorDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            pool,
            directory,
            notifier,
            build: BuildInfo {
                service: "odk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}
