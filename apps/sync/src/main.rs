//! Vizgate permission sync runtime.
//!
//! Applies migrations, rebuilds the built-in roles and backfills missing
//! data grants. Pass `migrate` to stop after migrations.

#![forbid(unsafe_code)]

mod sync_config;

use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vizgate_application::{PermissionRegistry, PermissionSyncService, RoleSyncService};
use vizgate_core::{AppError, AppResult};
use vizgate_domain::BuiltinRole;
use vizgate_infrastructure::{
    JwtGuestTokenCodec, PostgresSecurityRepository, TracingGrantEventSink,
};

use crate::sync_config::SyncConfig;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = SyncConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;
    info!("database migrations applied");

    if config.migrate_only {
        return Ok(());
    }

    // Fail before touching roles when the signing settings are unusable.
    JwtGuestTokenCodec::new(&config.security.guest_token)?;

    let repository = Arc::new(PostgresSecurityRepository::new(pool));
    let permission_sync = PermissionSyncService::new(
        repository.clone(),
        repository.clone(),
        Arc::new(TracingGrantEventSink),
    );
    let role_sync = RoleSyncService::new(
        repository.clone(),
        repository.clone(),
        permission_sync,
        config.security.clone(),
    );

    role_sync.sync_role_definitions().await?;

    let grants = repository.list_grants().await?;
    info!(
        grants = grants.len(),
        roles = BuiltinRole::synced().len(),
        public_role_like = config.security.public_role_like.as_deref().unwrap_or("-"),
        "vizgate-sync finished"
    );

    Ok(())
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
