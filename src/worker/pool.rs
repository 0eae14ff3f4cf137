use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::adapters::{ChannelAdapter, OutboundMessage};
use crate::channel::ChannelResolver;
use crate::db::models::notification::{Channel, Notification, NotificationStatus};
use crate::db::repository::{DeviceTokenRepository, NotificationRepository};
use crate::error::AppError;
use crate::metrics::Metrics;
use crate::queue::ChannelQueue;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub workers_per_channel: usize,
    pub poll_interval: Duration,
    pub reclaim_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// How long a popped job may go unreported before the stalled-job
    /// sweep reassigns it (§4.4).
    pub stalled_interval: Duration,
    /// How many times a job may be reassigned by the stalled sweep before
    /// it is declared dead (§4.4).
    pub max_stalled_count: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers_per_channel: 2,
            poll_interval: Duration::from_millis(500),
            reclaim_interval: Duration::from_secs(5),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            stalled_interval: Duration::from_secs(5),
            max_stalled_count: 1,
        }
    }
}

/// Spawns the worker pool, the delayed-job reclaim loop, and the stalled-job
/// reclaim loop for every channel that has a queue and an adapter configured
/// (C5). Mirrors the teacher's `spawn_background_workers`: one
/// `tokio::spawn` per loop, coordinated shutdown via a shared
/// `broadcast::Sender<()>`.
#[allow(clippy::too_many_arguments)]
pub fn spawn_channel_workers(
    queues: HashMap<Channel, ChannelQueue>,
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    notifications: NotificationRepository,
    device_tokens: DeviceTokenRepository,
    resolver: ChannelResolver,
    metrics: Arc<Metrics>,
    config: WorkerConfig,
    shutdown: broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    let notifications = Arc::new(notifications);
    let device_tokens = Arc::new(device_tokens);
    let mut handles = Vec::new();

    for (channel, queue) in queues {
        let queue = Arc::new(queue);
        let Some(adapter) = adapters.get(&channel).cloned() else {
            tracing::warn!(?channel, "no adapter configured; skipping worker spawn");
            continue;
        };

        for worker_id in 0..config.workers_per_channel {
            handles.push(spawn_worker_loop(
                channel,
                worker_id,
                queue.clone(),
                adapter.clone(),
                notifications.clone(),
                device_tokens.clone(),
                resolver.clone(),
                metrics.clone(),
                config.clone(),
                shutdown.subscribe(),
            ));
        }

        handles.push(spawn_reclaim_loop(channel, queue.clone(), config.clone(), shutdown.subscribe()));
        handles.push(spawn_stalled_reclaim_loop(
            channel,
            queue.clone(),
            notifications.clone(),
            config.clone(),
            shutdown.subscribe(),
        ));
    }

    handles
}

#[allow(clippy::too_many_arguments)]
fn spawn_worker_loop(
    channel: Channel,
    worker_id: usize,
    queue: Arc<ChannelQueue>,
    adapter: Arc<dyn ChannelAdapter>,
    notifications: Arc<NotificationRepository>,
    device_tokens: Arc<DeviceTokenRepository>,
    resolver: ChannelResolver,
    metrics: Arc<Metrics>,
    config: WorkerConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(?channel, worker_id, "channel worker started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(?channel, worker_id, "channel worker shutting down");
                    break;
                }
                result = queue.pop(channel, config.stalled_interval.as_millis() as i64) => {
                    match result {
                        Ok(Some(job)) => {
                            if let Err(e) = process_job(
                                channel,
                                &job.notification_id,
                                &queue,
                                &adapter,
                                &notifications,
                                &device_tokens,
                                &resolver,
                                &metrics,
                                &config,
                            )
                            .await
                            {
                                tracing::error!(?channel, notification_id = %job.notification_id, error = %e, "failed to process job");
                            }
                        }
                        Ok(None) => {
                            tokio::time::sleep(config.poll_interval).await;
                        }
                        Err(e) => {
                            tracing::error!(?channel, error = %e, "queue pop failed");
                            tokio::time::sleep(config.poll_interval).await;
                        }
                    }
                }
            }
        }
    })
}

#[allow(clippy::too_many_arguments)]
async fn process_job(
    channel: Channel,
    notification_id: &str,
    queue: &ChannelQueue,
    adapter: &Arc<dyn ChannelAdapter>,
    notifications: &NotificationRepository,
    device_tokens: &DeviceTokenRepository,
    resolver: &ChannelResolver,
    metrics: &Metrics,
    config: &WorkerConfig,
) -> Result<(), AppError> {
    let notification = match notifications.claim_for_processing(notification_id).await {
        Ok(n) => n,
        Err(AppError::NotFound(_)) => {
            // Already claimed by another worker or already terminal; drop the job payload.
            queue.complete(channel, notification_id).await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    match deliver(channel, &notification, adapter, device_tokens, resolver).await {
        Ok(()) => {
            notifications.mark_sent(&notification.id).await?;
            queue.complete(channel, &notification.id).await?;
            queue.record_completed(channel, &notification.id).await?;
            metrics.record_sent(channel);
        }
        Err(e @ AppError::AdapterPermanent(_)) => {
            // §7: mark FAILED without retry, regardless of retry_count.
            notifications.mark_failed_terminal(&notification.id, &e.to_string()).await?;
            metrics.record_failed(channel);
            queue.complete(channel, &notification.id).await?;
            queue.record_failed(channel, &notification.id, &e.to_string()).await?;
        }
        Err(e) => {
            let status = notifications
                .register_attempt_failure(&notification.id, &e.to_string())
                .await?;

            if status == NotificationStatus::Queued {
                metrics.record_retried(channel);
                let backoff = backoff_for_attempt(notification.retry_count, config);
                let job = crate::queue::QueueJob::new(notification.id.clone(), channel, notification.priority);
                queue.requeue_with_backoff(job, backoff.as_millis() as i64).await?;
            } else {
                metrics.record_failed(channel);
                queue.complete(channel, &notification.id).await?;
                queue.record_failed(channel, &notification.id, &e.to_string()).await?;
            }
        }
    }

    Ok(())
}

/// Per-job delivery procedure (§4.5 steps 2-4): resolve the active template
/// as a delivery-time override, falling back to the notification's own
/// literal title/message when there is none (or a read failure); for push,
/// fan out to every active device token in parallel and require all to
/// succeed.
async fn deliver(
    channel: Channel,
    notification: &Notification,
    adapter: &Arc<dyn ChannelAdapter>,
    device_tokens: &DeviceTokenRepository,
    resolver: &ChannelResolver,
) -> Result<(), AppError> {
    let rendered = resolver
        .get_template(notification.notification_type, channel)
        .await
        .map(|template| template.render(&notification.metadata));

    let (title, body, html_body) = match rendered {
        Some(r) => (r.title, r.message, r.html_content),
        None => (notification.title.clone(), notification.message.clone(), None),
    };
    let body = if channel == Channel::Email {
        html_body.clone().unwrap_or(body)
    } else {
        body
    };

    let recipient_field = notification.metadata.get("__recipient").cloned().unwrap_or_default();

    if channel != Channel::Push {
        let message = OutboundMessage {
            recipient: recipient_field,
            subject: Some(title),
            body,
            html_body,
        };
        return adapter.send(&message).await;
    }

    let tokens: Vec<&str> = recipient_field.split(',').filter(|t| !t.is_empty()).collect();
    if tokens.is_empty() {
        return Err(AppError::RecipientMissing("no active device token".to_string()));
    }

    let sends = tokens.iter().map(|token| {
        let message = OutboundMessage {
            recipient: token.to_string(),
            subject: Some(title.clone()),
            body: body.clone(),
            html_body: html_body.clone(),
        };
        let token = token.to_string();
        async move { (token, adapter.send(&message).await) }
    });

    let mut worst: Option<AppError> = None;
    for (token, result) in join_all(sends).await {
        if let Err(e) = result {
            if matches!(e, AppError::AdapterPermanent(_)) {
                let _ = device_tokens.deactivate(&token).await;
            }
            let replace = worst.is_none() || (matches!(e, AppError::AdapterPermanent(_)) && !matches!(worst, Some(AppError::AdapterPermanent(_))));
            if replace {
                worst = Some(e);
            }
        }
    }

    match worst {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn backoff_for_attempt(attempt: i32, config: &WorkerConfig) -> Duration {
    let scaled = config.initial_backoff.as_millis() as u64 * 2u64.saturating_pow(attempt.max(0) as u32);
    Duration::from_millis(scaled).min(config.max_backoff)
}

fn spawn_reclaim_loop(
    channel: Channel,
    queue: Arc<ChannelQueue>,
    config: WorkerConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.reclaim_interval);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = queue.reclaim_due(channel).await {
                        tracing::error!(?channel, error = %e, "failed to reclaim delayed jobs");
                    }
                }
            }
        }
    })
}

/// Periodically reassigns jobs a worker popped but never reported back on,
/// and finalizes any job that has already been reassigned once before
/// (`max_stalled_count`) to terminal `FAILED` (§4.4).
fn spawn_stalled_reclaim_loop(
    channel: Channel,
    queue: Arc<ChannelQueue>,
    notifications: Arc<NotificationRepository>,
    config: WorkerConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.stalled_interval);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    match queue.reclaim_stalled(channel, config.max_stalled_count).await {
                        Ok(dead) => {
                            for notification_id in dead {
                                tracing::warn!(?channel, notification_id, "job stalled past max reassignment count; declaring dead");
                                if let Err(e) = notifications
                                    .mark_failed_terminal(&notification_id, "stalled past max reassignment count")
                                    .await
                                {
                                    tracing::error!(?channel, notification_id, error = %e, "failed to finalize stalled job");
                                    continue;
                                }
                                if let Err(e) = queue.record_failed(channel, &notification_id, "stalled past max reassignment count").await {
                                    tracing::error!(?channel, notification_id, error = %e, "failed to record dead-letter entry");
                                }
                            }
                        }
                        Err(e) => tracing::error!(?channel, error = %e, "failed to reclaim stalled jobs"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_one_second_until_the_cap() {
        let config = WorkerConfig::default();
        assert_eq!(backoff_for_attempt(0, &config), Duration::from_secs(1));
        assert_eq!(backoff_for_attempt(1, &config), Duration::from_secs(2));
        assert_eq!(backoff_for_attempt(2, &config), Duration::from_secs(4));
        assert_eq!(backoff_for_attempt(20, &config), config.max_backoff);
    }
}
