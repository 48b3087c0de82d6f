use actix_cors::Cors;
use actix_web::{middleware, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use risk_control::{
    activity::{ActivityMetrics, InMemoryActivityMetrics, PgActivityMetrics},
    app::{self, AppServices, RouteGuards},
    config::{Config, StoreBackend},
    database, metrics,
    store::{InMemoryRiskControlStore, PgRiskControlStore, RiskControlStore},
    StubPaymentProcessor,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("Starting Risk Control service...");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    metrics::register_metrics(prometheus::default_registry())
        .context("Failed to register metrics")?;

    let (store, activity) = build_stores(&config).await?;
    let services = AppServices::new(
        store,
        activity,
        Arc::new(StubPaymentProcessor),
        config.policy.clone(),
    );
    let guards = RouteGuards::new(
        &config.scheduler.header,
        &config.scheduler.secret,
        &config.admin.jwt_secret,
        config.rate_limit.payment_requests_per_minute,
    );

    if config.scheduler.interval_secs > 0 {
        app::spawn_periodic_sweeps(
            services.clone(),
            Duration::from_secs(config.scheduler.interval_secs),
        );
    }

    let server_config = config.server.clone();
    info!(
        "Starting HTTP server on {}:{}",
        server_config.host, server_config.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
            .configure(|cfg| app::configure(cfg, &services, &guards))
    })
    .workers(server_config.workers)
    .bind((server_config.host, server_config.port))?
    .run()
    .await?;

    Ok(())
}

async fn build_stores(
    config: &Config,
) -> anyhow::Result<(Arc<dyn RiskControlStore>, Arc<dyn ActivityMetrics>)> {
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory store; risk state is lost on restart");
            Ok((
                Arc::new(InMemoryRiskControlStore::new()),
                Arc::new(InMemoryActivityMetrics::new()),
            ))
        }
        StoreBackend::Postgres => {
            info!("Connecting to database");
            let pool = database::create_pool(&config.database)
                .await
                .context("Database connection failed")?;
            database::health_check(&pool)
                .await
                .context("Database not accessible")?;
            info!("Database health check passed");

            if config.database.run_migrations {
                database::run_migrations(&pool)
                    .await
                    .context("Failed to run migrations")?;
                info!("Migrations applied");
            }

            let timeout = Duration::from_millis(config.database.statement_timeout_ms);
            Ok((
                Arc::new(PgRiskControlStore::new(pool.clone(), timeout)),
                Arc::new(PgActivityMetrics::new(pool, timeout)),
            ))
        }
    }
}
