use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use futures::stream;
use serde::{Deserialize, Serialize};

use crate::db::models::device_token::RegisterDeviceToken;
use crate::db::models::notification::{Channel, NotificationType, Priority};
use crate::db::models::preference::SetUserPreference;
use crate::dispatcher::DispatchRequest;
use crate::error::{AppError, AppResult};
use crate::ingest::InboundEvent;
use crate::AppState;

/// Admin ingress guard on the bulk endpoint (§4.8): an empty batch is
/// pointless and a huge one risks starving the channel queues for every
/// other caller.
const MAX_BULK_ITEMS: usize = 10_000;

#[derive(Debug, Clone, Deserialize)]
pub struct SendNotificationBody {
    pub user_id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub priority: Priority,
    pub scheduled_at: Option<chrono::NaiveDateTime>,
    #[serde(default)]
    pub recipients: HashMap<Channel, String>,
    /// Pins the target channel, bypassing the default-channels/preference
    /// intersection entirely (§4.6 step 3).
    #[serde(default)]
    pub channel: Option<Channel>,
}

#[derive(Debug, Serialize)]
pub struct SendNotificationResponse {
    pub notifications: Vec<NotificationSummary>,
}

#[derive(Debug, Serialize)]
pub struct NotificationSummary {
    pub id: String,
    pub channel: Channel,
    pub status: String,
}

impl From<SendNotificationBody> for DispatchRequest {
    fn from(body: SendNotificationBody) -> Self {
        DispatchRequest {
            user_id: body.user_id,
            notification_type: body.notification_type,
            title: body.title,
            message: body.message,
            variables: body.variables,
            priority: body.priority,
            scheduled_at: body.scheduled_at,
            recipients: body.recipients,
            channel: body.channel,
        }
    }
}

pub async fn send_notification(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SendNotificationBody>,
) -> AppResult<Json<SendNotificationResponse>> {
    let notifications = state.dispatcher.dispatch(body.into()).await?;
    Ok(Json(SendNotificationResponse {
        notifications: notifications
            .into_iter()
            .map(|n| NotificationSummary {
                id: n.id,
                channel: n.channel,
                status: n.status.as_str().to_string(),
            })
            .collect(),
    }))
}

pub async fn send_bulk(
    State(state): State<Arc<AppState>>,
    Json(bodies): Json<Vec<SendNotificationBody>>,
) -> AppResult<Json<Vec<serde_json::Value>>> {
    if bodies.is_empty() {
        return Err(AppError::InvalidArgument("bulk batch must not be empty".to_string()));
    }
    if bodies.len() > MAX_BULK_ITEMS {
        return Err(AppError::InvalidArgument(format!(
            "bulk batch must not exceed {MAX_BULK_ITEMS} items"
        )));
    }

    let sends = bodies.into_iter().map(|body| {
        let state = state.clone();
        async move { bulk_item_to_json(state.dispatcher.dispatch(body.into()).await) }
    });
    Ok(Json(futures::future::join_all(sends).await))
}

fn bulk_item_to_json(result: AppResult<Vec<crate::db::models::notification::Notification>>) -> serde_json::Value {
    match result {
        Ok(notifications) => serde_json::json!({
            "ok": true,
            "notifications": notifications.into_iter().map(|n| serde_json::json!({
                "id": n.id,
                "channel": n.channel,
                "status": n.status.as_str(),
            })).collect::<Vec<_>>(),
        }),
        Err(e) => serde_json::json!({ "ok": false, "error": e.to_string() }),
    }
}

/// NDJSON-over-chunked-body variant of bulk dispatch: each line is emitted
/// as soon as its dispatch completes, instead of buffering the whole batch.
pub async fn send_stream(
    State(state): State<Arc<AppState>>,
    Json(bodies): Json<Vec<SendNotificationBody>>,
) -> Response {
    let stream = stream::unfold((0usize, bodies, state), |(idx, bodies, state)| async move {
        if idx >= bodies.len() {
            return None;
        }
        let body = bodies[idx].clone();
        let result = state.dispatcher.dispatch(body.into()).await;
        let mut line = serde_json::to_vec(&bulk_item_to_json(result)).unwrap_or_default();
        line.push(b'\n');
        Some((Ok::<_, std::convert::Infallible>(line), (idx + 1, bodies, state)))
    });

    Response::builder()
        .header("content-type", "application/x-ndjson")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| AppError::Internal(anyhow::anyhow!("failed to build stream response")).into_response())
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<NotificationSummary>> {
    let notification = state.notifications.find_by_id(&id).await?;
    Ok(Json(NotificationSummary {
        id: notification.id,
        channel: notification.channel,
        status: notification.status.as_str().to_string(),
    }))
}

pub async fn retry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<NotificationSummary>> {
    let notification = state.dispatcher.retry_failed(&id).await?;
    Ok(Json(NotificationSummary {
        id: notification.id,
        channel: notification.channel,
        status: notification.status.as_str().to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePreferenceBody {
    pub channel: Channel,
    pub is_enabled: bool,
}

pub async fn update_preference(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<UpdatePreferenceBody>,
) -> AppResult<Json<serde_json::Value>> {
    let preference = state
        .preferences
        .set(
            &user_id,
            SetUserPreference {
                channel: body.channel,
                is_enabled: body.is_enabled,
            },
        )
        .await?;
    Ok(Json(serde_json::json!({
        "user_id": preference.user_id,
        "channel": preference.channel,
        "is_enabled": preference.is_enabled,
    })))
}

pub async fn register_device_token(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<RegisterDeviceToken>,
) -> AppResult<Json<serde_json::Value>> {
    let token = state.device_tokens.register(&user_id, body).await?;
    Ok(Json(serde_json::json!({
        "id": token.id,
        "platform": token.platform,
        "is_active": token.is_active,
    })))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub queue_depth: u64,
    pub active_workers: u64,
    pub throughput_per_second: f64,
}

/// Reads live figures from the channel queues (C4) and the metrics sampler
/// (C9), per §4.8.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mut queue_depth = 0u64;
    for (channel, queue) in &state.queues {
        queue_depth += queue.depth(*channel).await.unwrap_or(0);
    }

    let sample = state.metrics_collector.current().await;
    let (active_workers, throughput_per_second) = sample
        .map(|s| (s.total_active_workers, s.throughput_per_second))
        .unwrap_or((0, 0.0));
    let status = if state.metrics_collector.healthy().await {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        timestamp: chrono::Utc::now().to_rfc3339(),
        queue_depth,
        active_workers,
        throughput_per_second,
    })
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<crate::metrics::MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

#[derive(Debug, Deserialize)]
pub struct IngestEventBody {
    pub topic: String,
    pub event_type: String,
    pub user_id: String,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub recipients: HashMap<Channel, String>,
}

/// HTTP ingress standing in for the real event-stream subscription (§1,
/// §4.7): hands the event to the same `mpsc` channel the Ingestor's
/// consumer loop drains, so this path and a real broker client exercise
/// identical demultiplex/dispatch logic.
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IngestEventBody>,
) -> AppResult<Json<serde_json::Value>> {
    state
        .event_tx
        .send(InboundEvent {
            topic: body.topic,
            event_type: body.event_type,
            user_id: body.user_id,
            variables: body.variables,
            recipients: body.recipients,
        })
        .await
        .map_err(|_| AppError::QueueUnavailable("event ingest channel closed".to_string()))?;

    Ok(Json(serde_json::json!({ "accepted": true })))
}
