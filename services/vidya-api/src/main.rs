//! Vidya API server binary

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::connect_info::IntoMakeServiceWithConnectInfo;
use axum::Router;
use chrono::Utc;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use vidya_api::{build_router, AppState, Config};
use vidya_auth_core::TokenValidator;
use vidya_billing_core::BillingService;
use vidya_db::Repositories;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("vidya_api=debug".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Vidya API");

    let config = Config::from_env()?;
    tracing::info!(http_port = config.http_port, "Configuration loaded");

    let metrics_handle = if config.metrics_enabled {
        Some(setup_metrics()?)
    } else {
        None
    };

    let pool = vidya_db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    if config.run_migrations {
        vidya_db::run_migrations(&pool).await?;
        tracing::info!("Migrations applied");
    }

    let repos = Repositories::postgres(pool.clone());
    let billing = BillingService::new(repos, config.billing.clone());
    let auth = TokenValidator::new(config.auth.clone())?;

    let state = AppState::new(billing, auth, pool, config.clone());

    let outbox_task = config
        .outbox_poll
        .map(|every| spawn_outbox_processor(state.clone(), every));

    let app = build_router(state, metrics_handle);
    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));

    if let Err(e) = run_http_server(app, http_addr).await {
        tracing::error!(error = ?e, "HTTP server error");
    }

    if let Some(task) = outbox_task {
        task.abort();
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run_http_server(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let service: IntoMakeServiceWithConnectInfo<Router, SocketAddr> =
        app.into_make_service_with_connect_info();

    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Drain the outbox on a fixed interval
fn spawn_outbox_processor(state: AppState, every: Duration) -> JoinHandle<()> {
    tracing::info!(interval_secs = every.as_secs(), "Outbox processor started");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match state.billing.run_outbox(Utc::now()).await {
                Ok(stats) if stats.claimed > 0 => {
                    tracing::info!(
                        claimed = stats.claimed,
                        done = stats.done,
                        retried = stats.retried,
                        failed = stats.failed,
                        "Outbox batch processed"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Outbox run failed"),
            }
        }
    })
}

fn setup_metrics() -> anyhow::Result<PrometheusHandle> {
    // Most ops should complete in <100ms; webhooks and exports run longer
    let billing_latency_buckets = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.2, 0.5, 1.0, 2.5];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("billing_operation_duration_seconds".to_string()),
            billing_latency_buckets,
        )?
        .install_recorder()?;

    metrics::describe_counter!(
        "billing_webhooks_processed_total",
        "Total webhooks processed by status"
    );
    metrics::describe_counter!(
        "billing_entitlement_checks_total",
        "Entitlement checks by outcome"
    );
    metrics::describe_counter!(
        "billing_outbox_processed_total",
        "Outbox items processed by result"
    );
    metrics::describe_histogram!(
        "billing_operation_duration_seconds",
        "Billing operation latency in seconds by operation type"
    );

    Ok(handle)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
