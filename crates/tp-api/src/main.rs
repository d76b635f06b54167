//! Taskpay API server binary.

use anyhow::Context;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tp_api::{server, AppState};
use tp_core::store::UserStore;
use tp_core::{hash_password, Role, User};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let state = AppState::in_memory();
    seed_admin(&state).await?;

    let addr: SocketAddr = std::env::var("TASKPAY_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8000".to_string())
        .parse()
        .context("invalid TASKPAY_ADDR")?;

    server::serve(addr, state).await?;
    Ok(())
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tp_core=info,tp_api=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Ensures an admin account exists so the back office is reachable on a
/// fresh store.
async fn seed_admin(state: &AppState) -> anyhow::Result<()> {
    let username =
        std::env::var("TASKPAY_ADMIN_USER").unwrap_or_else(|_| "admin".to_string());
    if state.users.get_by_username(&username).await?.is_some() {
        return Ok(());
    }

    let password =
        std::env::var("TASKPAY_ADMIN_PASSWORD").unwrap_or_else(|_| "change-me-now".to_string());
    let admin = User::new(
        format!("{username}@taskpay.local"),
        &username,
        hash_password(&password)?,
        Role::Admin,
    );
    state.users.insert(&admin).await?;
    info!(username = %username, "seeded admin account");
    Ok(())
}
