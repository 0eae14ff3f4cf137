use notify_dispatch::db::models::device_token::{Platform, RegisterDeviceToken};
use notify_dispatch::db::models::notification::Channel;
use notify_dispatch::db::models::preference::SetUserPreference;
use notify_dispatch::db::repository::{DeviceTokenRepository, PreferenceRepository};
use sqlx::sqlite::SqlitePoolOptions;

async fn in_memory_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new()
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite pool");
    sqlx::migrate!("./migrations").run(&pool).await.expect("run migrations");
    pool
}

#[tokio::test]
async fn a_channel_with_no_preference_row_is_enabled_by_default() {
    let pool = in_memory_pool().await;
    let repo = PreferenceRepository::new(pool);

    assert!(repo.is_enabled("user-1", Channel::Sms).await.unwrap());
}

#[tokio::test]
async fn opting_out_of_a_channel_is_respected() {
    let pool = in_memory_pool().await;
    let repo = PreferenceRepository::new(pool);

    repo.set(
        "user-1",
        SetUserPreference {
            channel: Channel::Sms,
            is_enabled: false,
        },
    )
    .await
    .unwrap();

    assert!(!repo.is_enabled("user-1", Channel::Sms).await.unwrap());
    assert!(repo.is_enabled("user-1", Channel::Email).await.unwrap());
}

#[tokio::test]
async fn setting_a_preference_twice_updates_in_place_rather_than_duplicating() {
    let pool = in_memory_pool().await;
    let repo = PreferenceRepository::new(pool);

    repo.set(
        "user-1",
        SetUserPreference {
            channel: Channel::Push,
            is_enabled: false,
        },
    )
    .await
    .unwrap();
    repo.set(
        "user-1",
        SetUserPreference {
            channel: Channel::Push,
            is_enabled: true,
        },
    )
    .await
    .unwrap();

    let preferences = repo.list_for_user("user-1").await.unwrap();
    assert_eq!(preferences.len(), 1);
    assert!(preferences[0].is_enabled);
}

#[tokio::test]
async fn only_active_device_tokens_are_returned() {
    let pool = in_memory_pool().await;
    let repo = DeviceTokenRepository::new(pool);

    repo.register(
        "user-1",
        RegisterDeviceToken {
            token: "token-a".to_string(),
            platform: Platform::Ios,
        },
    )
    .await
    .unwrap();
    repo.register(
        "user-1",
        RegisterDeviceToken {
            token: "token-b".to_string(),
            platform: Platform::Android,
        },
    )
    .await
    .unwrap();

    repo.deactivate("token-a").await.unwrap();

    let active = repo.active_for_user("user-1").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].token, "token-b");
}
