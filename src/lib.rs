pub mod adapters;
pub mod cache;
pub mod channel;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod queue;
pub mod surface;
pub mod worker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use reqwest::Client;
use tokio::sync::{broadcast, mpsc};

use crate::adapters::{ChannelAdapter, HttpPushAdapter, HttpSmsAdapter, SmtpEmailAdapter};
use crate::cache::TemplateCache;
use crate::channel::ChannelResolver;
use crate::config::Config;
use crate::db::models::notification::Channel;
use crate::db::repository::{DeviceTokenRepository, NotificationRepository, PreferenceRepository, TemplateRepository};
use crate::dispatcher::Dispatcher;
use crate::ingest::{ChannelEventTransport, InboundEvent, Ingestor};
use crate::metrics::{Metrics, MetricsCollector};
use crate::queue::ChannelQueue;
use crate::worker::WorkerConfig;

/// Shared application state handed to every axum handler, mirroring the
/// teacher's `Arc<AppState>` pattern.
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub notifications: NotificationRepository,
    pub preferences: PreferenceRepository,
    pub device_tokens: DeviceTokenRepository,
    pub metrics: Arc<Metrics>,
    pub metrics_collector: Arc<MetricsCollector>,
    pub queues: HashMap<Channel, ChannelQueue>,
    pub event_tx: mpsc::Sender<InboundEvent>,
}

/// Everything `main` needs to finish wiring the process: the shared state
/// for the request surface, per-channel queue handles and collaborators the
/// worker pool needs its own copy of (workers live outside the axum state),
/// the Ingestor plus the transport it drains, and the shutdown broadcast
/// sender.
pub struct BuiltApp {
    pub state: Arc<AppState>,
    pub worker_queues: HashMap<Channel, ChannelQueue>,
    pub worker_notifications: NotificationRepository,
    pub worker_device_tokens: DeviceTokenRepository,
    pub resolver: ChannelResolver,
    pub ingestor: Ingestor,
    pub event_transport: ChannelEventTransport,
    pub shutdown: broadcast::Sender<()>,
}

/// Assembles every channel queue handle for a Redis connection manager.
pub fn build_queues(conn: ConnectionManager) -> HashMap<Channel, ChannelQueue> {
    Channel::ALL
        .iter()
        .map(|c| (*c, ChannelQueue::new(conn.clone())))
        .collect()
}

/// Assembles a real adapter per channel from configuration. Fallible only
/// for the SMTP transport, which validates its relay host up front.
pub fn build_adapters(config: &Config) -> anyhow::Result<HashMap<Channel, Arc<dyn ChannelAdapter>>> {
    let http_client = Client::new();

    let mut adapters: HashMap<Channel, Arc<dyn ChannelAdapter>> = HashMap::new();
    adapters.insert(
        Channel::Email,
        Arc::new(SmtpEmailAdapter::new(
            &config.smtp.relay_host,
            &config.smtp.username,
            &config.smtp.password,
            config.smtp.from_address.clone(),
        )?),
    );
    adapters.insert(
        Channel::Push,
        Arc::new(HttpPushAdapter::new(
            http_client.clone(),
            config.push.url.clone(),
            config.push.api_key.clone(),
        )),
    );
    adapters.insert(
        Channel::Sms,
        Arc::new(HttpSmsAdapter::new(
            http_client,
            config.sms.url.clone(),
            config.sms.api_key.clone(),
            config.sms.from_number.clone(),
        )),
    );

    Ok(adapters)
}

pub fn worker_config_from(config: &Config) -> WorkerConfig {
    WorkerConfig {
        workers_per_channel: config.worker.workers_per_channel,
        poll_interval: Duration::from_millis(config.worker.poll_interval_ms),
        reclaim_interval: Duration::from_secs(config.worker.reclaim_interval_secs),
        initial_backoff: Duration::from_secs(config.worker.initial_backoff_secs),
        max_backoff: Duration::from_secs(config.worker.max_backoff_secs),
        stalled_interval: Duration::from_secs(config.worker.stalled_interval_secs),
        max_stalled_count: config.worker.max_stalled_count,
    }
}

/// Capacity of the in-process event channel standing in for the real
/// broker connection (§1, §6) — the HTTP ingress handler and any local
/// test producer both feed through this.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Builds the application state and the worker-pool collaborators together,
/// since the dispatcher and the worker pool both need their own handle onto
/// the same per-channel queues, device-token repository, and resolver.
pub fn build_app(pool: sqlx::SqlitePool, redis_conn: ConnectionManager, config: &Config) -> BuiltApp {
    let notifications = NotificationRepository::new(pool.clone());
    let templates = TemplateRepository::new(pool.clone());
    let device_tokens = DeviceTokenRepository::new(pool.clone());
    let preferences = PreferenceRepository::new(pool.clone());
    let metrics = Arc::new(Metrics::new());
    let cache = Arc::new(TemplateCache::new(
        config.cache.template_capacity,
        Duration::from_secs(config.cache.template_ttl_secs),
    ));
    let resolver = ChannelResolver::new(preferences.clone(), templates, cache);

    let dispatcher_queues = build_queues(redis_conn.clone());
    let worker_queues = build_queues(redis_conn.clone());
    let metrics_queues = build_queues(redis_conn);

    let dispatcher = Dispatcher::new(
        notifications.clone(),
        device_tokens.clone(),
        resolver.clone(),
        dispatcher_queues.clone(),
        metrics.clone(),
    );

    let metrics_collector = MetricsCollector::new(metrics.clone(), metrics_queues);

    let ingestor = Ingestor::new(dispatcher.clone(), metrics.clone());
    let (event_tx, event_transport) = ChannelEventTransport::new(EVENT_CHANNEL_CAPACITY);

    let state = Arc::new(AppState {
        dispatcher,
        notifications: notifications.clone(),
        preferences,
        device_tokens: device_tokens.clone(),
        metrics,
        metrics_collector,
        queues: dispatcher_queues,
        event_tx,
    });

    let (shutdown_tx, _rx) = broadcast::channel(1);

    BuiltApp {
        state,
        worker_queues,
        worker_notifications: notifications,
        worker_device_tokens: device_tokens,
        resolver,
        ingestor,
        event_transport,
        shutdown: shutdown_tx,
    }
}
