//! Attendance Server - ADMS push endpoint with attendance tracking.

use std::sync::Arc;

use axum::Router;
use color_eyre::eyre::WrapErr as _;
use tower_http::trace::TraceLayer;

use adms_notify::{LogNotifier, MultiNotifier, WebhookNotifier};
use attendance_server::config::ServerConfig;

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("attendance-server starting");

    let config = ServerConfig::load().wrap_err("failed to load config")?;
    let settings = config.settings().wrap_err("invalid config")?;

    // Initialize storage
    let storage = adms_storage::SqliteStorage::new(&config.database_url)
        .wrap_err("failed to initialize storage")?;

    storage
        .run_migrations()
        .wrap_err("failed to run migrations")?;

    // Logging always runs; the webhook is best effort
    let mut notifier = MultiNotifier::new(LogNotifier, Vec::<WebhookNotifier>::new());
    if let Some(url) = &config.webhook_url {
        tracing::info!(url = %url, "webhook notifications enabled");
        notifier = notifier.with_secondary(WebhookNotifier::new(url.clone(), config.webhook_timeout())?);
    }

    let service = Arc::new(adms_service::Adms::new(storage, notifier, settings));

    tokio::spawn(adms_service::run_sweeper(
        service.clone(),
        config.sweep_interval(),
    ));

    // Build router
    let app = Router::new()
        .merge(adms_http::device_router(service.clone()))
        .merge(adms_http::api_router(service))
        .layer(TraceLayer::new_for_http());

    // Start server
    tracing::info!(addr = %config.listen, "listening");

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .wrap_err("failed to bind")?;

    axum::serve(listener, app).await.wrap_err("server error")?;

    Ok(())
}
