use std::collections::HashMap;

use notify_dispatch::db::models::notification::{Channel, CreateNotification, NotificationStatus, NotificationType, Priority};
use notify_dispatch::db::repository::NotificationRepository;
use sqlx::sqlite::SqlitePoolOptions;

async fn in_memory_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new()
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    pool
}

fn sample_notification() -> CreateNotification {
    CreateNotification {
        user_id: "user-1".to_string(),
        notification_type: NotificationType::Welcome,
        channel: Channel::Email,
        title: "Welcome".to_string(),
        message: "Hi there".to_string(),
        metadata: HashMap::new(),
        priority: Priority::Normal,
        scheduled_at: None,
    }
}

#[tokio::test]
async fn create_then_claim_then_mark_sent() {
    let pool = in_memory_pool().await;
    let repo = NotificationRepository::new(pool);

    let created = repo.create(sample_notification()).await.unwrap();
    assert_eq!(created.status, NotificationStatus::Queued);

    let claimed = repo.claim_for_processing(&created.id).await.unwrap();
    assert_eq!(claimed.status, NotificationStatus::Processing);

    // A second claim on an already-processing row must fail: this is the
    // invariant that keeps two workers from delivering the same notification.
    assert!(repo.claim_for_processing(&created.id).await.is_err());

    repo.mark_sent(&created.id).await.unwrap();
    let found = repo.find_by_id(&created.id).await.unwrap();
    assert_eq!(found.status, NotificationStatus::Sent);
    assert!(found.sent_at.is_some());
}

#[tokio::test]
async fn repeated_failures_exhaust_retries_and_go_terminal() {
    let pool = in_memory_pool().await;
    let repo = NotificationRepository::new(pool);

    let created = repo.create(sample_notification()).await.unwrap();

    let mut last_status = NotificationStatus::Queued;
    for _ in 0..5 {
        last_status = repo.register_attempt_failure(&created.id, "adapter timed out").await.unwrap();
        if last_status == NotificationStatus::Failed {
            break;
        }
    }

    assert_eq!(last_status, NotificationStatus::Failed);
    let found = repo.find_by_id(&created.id).await.unwrap();
    assert!(found.failed_at.is_some());
    assert_eq!(found.error_message.as_deref(), Some("adapter timed out"));
}

#[tokio::test]
async fn find_failed_for_retry_only_returns_rows_under_the_retry_budget() {
    let pool = in_memory_pool().await;
    let repo = NotificationRepository::new(pool);

    let created = repo.create(sample_notification()).await.unwrap();
    repo.register_attempt_failure(&created.id, "transient").await.unwrap();

    let retryable = repo.find_failed_for_retry(10).await.unwrap();
    assert!(retryable.is_empty(), "one failed attempt should still be QUEUED, not FAILED");
}

#[tokio::test]
async fn list_by_user_returns_every_row_for_that_user() {
    let pool = in_memory_pool().await;
    let repo = NotificationRepository::new(pool);

    let first = repo.create(sample_notification()).await.unwrap();
    let second = repo.create(sample_notification()).await.unwrap();

    let listed = repo.list_by_user("user-1", 10).await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(listed.len(), 2);
    assert!(ids.contains(&first.id.as_str()));
    assert!(ids.contains(&second.id.as_str()));
}
