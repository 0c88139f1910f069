use std::path::Path;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stagedoor::{
    api,
    audit::AuditLog,
    auth,
    backup::BackupService,
    config::Config,
    delivery::StreamDelivery,
    lifecycle::TrackLifecycle,
    media::MediaStore,
    store::{self, models::UserAccount, MetaStore, UserStore},
    AppState,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "stagedoor starting");

    // Load configuration
    let config = Config::load()?;
    info!("Loaded configuration, data dir: {}", config.data_dir);

    // Initialize stores
    let meta = MetaStore::open(Path::new(&config.data_dir).join("meta")).await?;
    info!("Metadata store opened at: {}/meta", config.data_dir);

    let users = UserStore::open(&config.users_dir).await?;
    info!("User store opened at: {}", config.users_dir);

    let media = MediaStore::open(&config.data_dir).await?;
    info!("Media areas ready under: {}", config.data_dir);

    let lifecycle = TrackLifecycle::new(meta.clone(), media.clone(), users.clone());
    let delivery = StreamDelivery::new(meta.clone());
    let audit = AuditLog::new(Path::new(&config.data_dir).join("activity.log"));
    let backup = BackupService::new(&config.data_dir, &config.users_dir);

    // Seed the admin account on first boot
    if let Some(password) = &config.bootstrap_admin_password {
        match users.get("admin").await {
            Ok(_) => {}
            Err(store::StoreError::NotFound(_)) => {
                let hash = auth::hash_password(password)
                    .map_err(|e| anyhow::anyhow!("Failed to hash bootstrap password: {e}"))?;
                users
                    .put(&UserAccount {
                        username: "admin".to_string(),
                        password_hash: hash,
                        role: store::models::ROLE_ADMIN.to_string(),
                        display_name: "Administrator".to_string(),
                        avatar: None,
                        badges: Vec::new(),
                        verified: true,
                        quota: Default::default(),
                    })
                    .await?;
                info!("Bootstrapped admin account");
            }
            Err(e) => return Err(e.into()),
        }
    }

    // Repair any moderation moves interrupted by a crash
    let report = lifecycle.reconcile().await?;
    info!(
        checked = report.checked,
        repaired = report.repaired,
        missing = report.missing,
        "Startup reconciliation complete"
    );

    // Create shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        users,
        meta,
        media,
        lifecycle,
        delivery,
        audit,
        backup,
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Listening on: {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
