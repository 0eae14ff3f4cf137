use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notify_dispatch::config::Config;
use notify_dispatch::db::init::init_db;
use notify_dispatch::ingest::spawn_event_consumer;
use notify_dispatch::{build_adapters, build_app, worker_config_from};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notify_dispatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("starting notification dispatcher");

    let pool = init_db(&config).await?;

    let redis_client = redis::Client::open(config.redis.url.clone())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;

    let built = build_app(pool, redis_conn, &config);
    let adapters = build_adapters(&config)?;
    let shutdown = built.shutdown.clone();

    let mut worker_handles = notify_dispatch::worker::spawn_channel_workers(
        built.worker_queues,
        adapters,
        built.worker_notifications,
        built.worker_device_tokens,
        built.resolver,
        built.state.metrics.clone(),
        worker_config_from(&config),
        built.shutdown.clone(),
    );

    worker_handles.push(
        built
            .state
            .metrics_collector
            .clone()
            .start(built.shutdown.subscribe()),
    );
    worker_handles.push(spawn_event_consumer(
        built.event_transport,
        built.ingestor,
        built.shutdown.subscribe(),
    ));

    let app = notify_dispatch::surface::router()
        .with_state(built.state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        }
    }

    for handle in worker_handles {
        handle.abort();
    }

    Ok(())
}
