use std::time::Duration;

use notify_dispatch::cache::TemplateCache;
use notify_dispatch::channel::ChannelResolver;
use notify_dispatch::db::models::notification::{Channel, NotificationType};
use notify_dispatch::db::models::preference::SetUserPreference;
use notify_dispatch::db::repository::{PreferenceRepository, TemplateRepository};
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
async fn seeded_template_renders_with_supplied_variables() {
    let pool = in_memory_pool().await;
    let repo = TemplateRepository::new(pool);

    let template = repo
        .find_active(NotificationType::Welcome, Channel::Email)
        .await
        .unwrap();

    let mut vars = std::collections::HashMap::new();
    vars.insert("name".to_string(), "Grace".to_string());
    let rendered = template.render(&vars);

    assert_eq!(rendered.message, "Hi Grace, welcome aboard.");
}

#[tokio::test]
async fn missing_template_reports_template_render_error() {
    let pool = in_memory_pool().await;
    let repo = TemplateRepository::new(pool);

    let result = repo.find_active(NotificationType::Welcome, Channel::Sms).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn cache_hit_rate_improves_after_first_lookup() {
    let pool = in_memory_pool().await;
    let repo = TemplateRepository::new(pool);
    let cache = TemplateCache::new(8, Duration::from_secs(60));

    cache.get_or_load(&repo, NotificationType::Welcome, Channel::Email).await.unwrap();
    cache.get_or_load(&repo, NotificationType::Welcome, Channel::Email).await.unwrap();

    let (hits, misses) = cache.stats();
    assert_eq!(hits, 1);
    assert_eq!(misses, 1);
}

#[tokio::test]
async fn resolver_drops_channels_the_user_opted_out_of() {
    let pool = in_memory_pool().await;
    let preferences = PreferenceRepository::new(pool);
    preferences
        .set(
            "user-1",
            SetUserPreference {
                channel: Channel::Push,
                is_enabled: false,
            },
        )
        .await
        .unwrap();

    let templates = TemplateRepository::new(in_memory_pool().await);
    let cache = std::sync::Arc::new(TemplateCache::new(8, Duration::from_secs(60)));
    let resolver = ChannelResolver::new(preferences, templates, cache);
    let resolved = resolver
        .resolve("user-1", NotificationType::OrderConfirmation, None)
        .await
        .unwrap();

    assert_eq!(resolved, vec![Channel::Email]);
}
