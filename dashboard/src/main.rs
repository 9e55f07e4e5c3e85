use clap::Parser;
use dashboard::app::build_router;
use dashboard::config::{Cli, Settings};
use dashboard::directory::{Directory, DirectoryClient};
use dashboard::metrics;
use dashboard::notify::{self, run_notifications};
use dashboard::pending::{run_pending, PendingQueue};
use dashboard::query::Projection;
use dashboard::reconciler::Reconciler;
use dashboard::registration::register;
use dashboard::registry::Registry;
use dashboard::sync::DeviceSync;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = match Settings::load(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load {}: {}", cli.config.display(), e);
            std::process::exit(1);
        }
    };

    info!("Starting oneM2M dashboard");
    info!("CSE: {} ({}, {})", settings.cse_url, settings.cse_id, settings.cse_name);
    info!("HTTP server: {}", settings.bind_addr);
    info!("Point of access: {}", settings.point_of_access());

    metrics::init_metrics();

    let offset = match settings.display_offset() {
        Ok(offset) => offset,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let client = match DirectoryClient::from_settings(&settings) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build broker client: {}", e);
            std::process::exit(1);
        }
    };

    let client = Arc::new(client);
    let directory: Arc<dyn Directory> = client.clone();
    let registry = Registry::shared(settings.history_capacity);
    let sync = DeviceSync::new(
        registry.clone(),
        directory.clone(),
        settings.cse_name.as_str(),
        settings.subscription_name(),
    );

    let (queue, pending_rx) = PendingQueue::channel();
    let reconciler = Arc::new(Reconciler::new(
        registry.clone(),
        directory.clone(),
        queue.clone(),
        settings.cse_name.as_str(),
    ));
    let (notifications, notification_rx) = notify::channel();

    let app = build_router(
        notifications,
        Projection::new(registry),
        directory,
        &settings.cse_name,
    );

    // The broker verifies the point of access while the AE is created
    let listener = match tokio::net::TcpListener::bind(&settings.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", settings.bind_addr, e);
            std::process::exit(1);
        }
    };

    info!("HTTP server listening on {}", settings.bind_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });
    let notify_handle = tokio::spawn(run_notifications(notification_rx, reconciler, offset));
    let pending_handle = tokio::spawn(run_pending(pending_rx, settings.grace(), sync.clone()));

    if let Err(e) = register(&client, &settings).await {
        error!("Cannot register with CSE at {}: {}", settings.cse_url, e);
        std::process::exit(1);
    }

    // Registry is rebuilt from the broker on every start
    let report = sync.sweep().await;
    for (url, kind) in report.unsubscribed {
        queue.enqueue(url, kind);
    }

    tokio::select! {
        _ = notify_handle => {
            error!("Notification consumer terminated");
        }
        _ = pending_handle => {
            error!("Pending subscription loop terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
}
