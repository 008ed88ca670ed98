//! Anything that displays the appointment list while it is mounted.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{AppointmentCache, RefreshResult};
use crate::error::RefreshError;
use crate::models::appointment::AppointmentSnapshot;
use crate::subscription::SubscriptionHandle;

pub struct MountedConsumer {
    name: String,
    cache: AppointmentCache,
    handle: Option<SubscriptionHandle>,
    initial: Arc<AppointmentSnapshot>,
    loading: Option<JoinHandle<RefreshResult>>,
}

impl MountedConsumer {
    pub fn mount<F>(cache: &AppointmentCache, name: impl Into<String>, on_update: F) -> Self
    where
        F: Fn(Arc<AppointmentSnapshot>) + Send + Sync + 'static,
    {
        let name = name.into();

        // Subscribe before reading so no snapshot applied in between is lost.
        let handle = cache.subscribe(on_update);
        let initial = cache.read();
        let loading = tokio::spawn({
            let cache = cache.clone();
            async move { cache.refresh().await }
        });
        debug!(
            consumer = %name,
            cached = initial.len(),
            subscribers = cache.subscriber_count(),
            "consumer mounted"
        );

        Self {
            name,
            cache: cache.clone(),
            handle: Some(handle),
            initial,
            loading: Some(loading),
        }
    }

    pub fn initial(&self) -> Arc<AppointmentSnapshot> {
        Arc::clone(&self.initial)
    }

    /// Result of the refresh started at mount, then the current snapshot.
    pub async fn loaded(&mut self) -> RefreshResult {
        let Some(loading) = self.loading.take() else {
            return Ok(self.cache.read());
        };

        let result = loading
            .await
            .unwrap_or_else(|e| Err(RefreshError::Aborted(e.to_string())));
        if let Err(e) = &result {
            warn!(consumer = %self.name, error = %e, "appointments fetch warning, showing cached data");
        }
        result
    }
}

impl Drop for MountedConsumer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cache.unsubscribe(handle);
        }
        if let Some(loading) = self.loading.take() {
            loading.abort();
        }
        debug!(consumer = %self.name, "consumer unmounted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RetryPolicy;
    use crate::error::FetchError;
    use crate::source::scripted::{ScriptedSource, snapshot};
    use std::sync::Mutex;

    type Seen = Arc<Mutex<Vec<Arc<AppointmentSnapshot>>>>;

    fn mount_recording(cache: &AppointmentCache, name: &str) -> (MountedConsumer, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let consumer = MountedConsumer::mount(cache, name, move |snapshot| {
            seen_clone.lock().unwrap().push(snapshot);
        });
        (consumer, seen)
    }

    #[tokio::test]
    async fn test_two_screens_share_one_fetch() {
        let source = ScriptedSource::new();
        source.push_ok(snapshot(&["a1"]));
        let cache = AppointmentCache::with_retry(source.clone(), RetryPolicy::none());

        let (mut home, home_seen) = mount_recording(&cache, "home");
        let (mut appointments, appointments_seen) = mount_recording(&cache, "appointments");
        assert!(home.initial().is_empty());
        assert!(appointments.initial().is_empty());

        let a = home.loaded().await.unwrap();
        let b = appointments.loaded().await.unwrap();

        assert_eq!(source.calls(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(home_seen.lock().unwrap().len(), 1);
        assert_eq!(appointments_seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mount_renders_cached_snapshot_first() {
        let source = ScriptedSource::new();
        source.push_ok(snapshot(&["a1"]));
        source.push_ok(snapshot(&["a1", "a2"]));
        let cache = AppointmentCache::with_retry(source.clone(), RetryPolicy::none());
        cache.refresh().await.unwrap();

        let (mut consumer, seen) = mount_recording(&cache, "home");
        assert_eq!(consumer.initial().len(), 1);

        let fresh = consumer.loaded().await.unwrap();
        assert_eq!(fresh.len(), 2);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_cached_data() {
        let source = ScriptedSource::new();
        source.push_ok(snapshot(&["a1"]));
        source.push_err(FetchError::Status(500));
        let cache = AppointmentCache::with_retry(source.clone(), RetryPolicy::none());
        cache.refresh().await.unwrap();

        let (mut consumer, seen) = mount_recording(&cache, "home");
        assert!(consumer.loaded().await.is_err());
        assert_eq!(consumer.initial().len(), 1);
        assert_eq!(cache.read().len(), 1);
        assert!(seen.lock().unwrap().is_empty());

        // Already awaited: falls back to the cache.
        assert_eq!(consumer.loaded().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unmount_stops_notifications() {
        let source = ScriptedSource::new();
        let release = source.push_gated(Ok(snapshot(&["a1"])));
        let cache = AppointmentCache::with_retry(source.clone(), RetryPolicy::none());

        let (consumer, seen) = mount_recording(&cache, "home");
        source.wait_for_calls(1).await;
        assert_eq!(cache.subscriber_count(), 1);

        drop(consumer);
        assert_eq!(cache.subscriber_count(), 0);

        release.send(()).unwrap();
        cache.refresh().await.unwrap();
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(cache.read().len(), 1);
        assert_eq!(source.calls(), 1);
    }
}
