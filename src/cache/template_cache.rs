use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::db::models::notification::{Channel, NotificationType};
use crate::db::models::template::NotificationTemplate;
use crate::db::repository::TemplateRepository;
use crate::error::AppResult;

type CacheKey = (NotificationType, Channel);

struct Entry {
    template: NotificationTemplate,
    inserted_at: Instant,
}

/// LRU+TTL cache fronting the template store (C1). Entries older than `ttl`
/// are treated as misses and refetched, without being evicted early —
/// capacity pressure is handled by the LRU discipline alone.
pub struct TemplateCache {
    inner: Mutex<LruCache<CacheKey, Entry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TemplateCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fetch a template, consulting the cache first and falling back to
    /// `repo` on miss or expiry.
    pub async fn get_or_load(
        &self,
        repo: &TemplateRepository,
        notification_type: NotificationType,
        channel: Channel,
    ) -> AppResult<NotificationTemplate> {
        let key = (notification_type, channel);

        if let Some(template) = self.peek_fresh(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(template);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let template = repo.find_active(notification_type, channel).await?;
        self.insert(key, template.clone());
        Ok(template)
    }

    fn peek_fresh(&self, key: &CacheKey) -> Option<NotificationTemplate> {
        let mut guard = self.inner.lock().unwrap();
        match guard.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.template.clone()),
            Some(_) => {
                guard.pop(key);
                None
            }
            None => None,
        }
    }

    fn insert(&self, key: CacheKey, template: NotificationTemplate) {
        let mut guard = self.inner.lock().unwrap();
        guard.put(
            key,
            Entry {
                template,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, notification_type: NotificationType, channel: Channel) {
        self.inner.lock().unwrap().pop(&(notification_type, channel));
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }

    pub fn stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_is_zero_with_no_traffic() {
        let cache = TemplateCache::new(8, Duration::from_secs(60));
        assert_eq!(cache.hit_rate(), 0.0);
    }

    #[test]
    fn expired_entries_are_treated_as_misses() {
        let cache = TemplateCache::new(8, Duration::from_millis(0));
        let template = NotificationTemplate {
            id: "t1".to_string(),
            notification_type: NotificationType::Welcome,
            channel: Channel::Email,
            is_active: true,
            title: None,
            message: "hi".to_string(),
            html_content: None,
            created_at: chrono::Utc::now().naive_utc(),
            updated_at: chrono::Utc::now().naive_utc(),
        };
        cache.insert((NotificationType::Welcome, Channel::Email), template);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.peek_fresh(&(NotificationType::Welcome, Channel::Email)).is_none());
    }
}
