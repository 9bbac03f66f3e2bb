//! # Passkey Provisioning Server
//!
//! Entry point. Registers passkeys, provisions the matching Keycloak account
//! and logs users in with their passkeys.

use passkey_provisioning::app::build_router;
use passkey_provisioning::config::Config;
use passkey_provisioning::state::AppState;
use time::Duration;
use tokio_util::sync::CancellationToken;
use tower_sessions_sqlx_store::SqliteStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main application entry point
///
/// This function:
/// 1. Sets up logging for debugging and monitoring
/// 2. Loads configuration from environment variables
/// 3. Initializes database, WebAuthn and identity provider components
/// 4. Configures HTTP sessions for keeping users logged in
/// 5. Serves until ctrl-c or SIGTERM, then cancels pending retry waits
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: info level for most crates, debug level for our app
    // Can be overridden with RUST_LOG environment variable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,passkey_provisioning=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    let shutdown = CancellationToken::new();
    let app_state = AppState::new(&config, shutdown.clone()).await?;
    tracing::info!("Application state initialized");

    // Session data (user_id) is stored server-side in the same SQLite database
    let session_store = SqliteStore::new(app_state.db.clone());
    session_store.migrate().await?;

    let app = build_router(
        app_state,
        session_store,
        Duration::hours(config.session_inactivity_hours),
    );

    let bind_addr = config.bind_address();
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel `shutdown`
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
    shutdown.cancel();
}
