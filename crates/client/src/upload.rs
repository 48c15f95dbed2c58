//! Resource upload cache
//!
//! Deduplicates outbound resources by content digest and coalesces
//! resources discovered in quick succession into one existence check:
//! - a digest is uploaded at most once per process
//! - concurrent requesters of the same digest share one outcome
//! - batches flush after a quiet period (debounce, reset on every arrival)
//! - uploads are bounded by a process-wide limit, independent of batches

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use rendergrid_common::{CacheEntry, Error, GridConfig, Resource, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::services::ResourceStore;

type UploadFuture = Shared<BoxFuture<'static, Result<()>>>;

/// A resource waiting for the next flush
struct Pending {
    resource: Resource,
    tx: oneshot::Sender<Result<()>>,
}

#[derive(Default)]
struct UploadState {
    /// Digests known to exist remotely
    uploaded: HashSet<String>,
    /// Digests with an outstanding check or upload
    requested: HashMap<String, UploadFuture>,
    /// Batch collected since the last flush
    pending: Vec<Pending>,
    /// Debounce timer, replaced on every arrival
    timer: Option<JoinHandle<()>>,
    timer_generation: u64,
}

struct Inner {
    store: Arc<dyn ResourceStore>,
    debounce: Duration,
    upload_permits: Semaphore,
    state: Mutex<UploadState>,
    entries: DashMap<String, CacheEntry>,
}

/// Process-wide upload cache shared by every test of a run
#[derive(Clone)]
pub struct ResourceUploadCache {
    inner: Arc<Inner>,
}

impl ResourceUploadCache {
    /// Create a cache using the configured debounce window and upload limit
    pub fn new(store: Arc<dyn ResourceStore>, config: &GridConfig) -> Self {
        Self::with_limits(store, config.upload_debounce(), config.upload_concurrency)
    }

    pub fn with_limits(
        store: Arc<dyn ResourceStore>,
        debounce: Duration,
        upload_concurrency: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                debounce,
                upload_permits: Semaphore::new(upload_concurrency.max(1)),
                state: Mutex::new(UploadState::default()),
                entries: DashMap::new(),
            }),
        }
    }

    /// Ensure every resource exists remotely
    ///
    /// Resolves once each resource's bytes are known to be stored. The URL
    /// metadata cache is updated before any network result is known. The
    /// first failed resource's error is returned; other resources are not
    /// affected by it.
    pub async fn put_resources(&self, resources: &[Resource]) -> Result<()> {
        let waiters = self.enqueue(resources);

        for resource in resources {
            trace!("Caching metadata for {}", resource.url());
            self.inner
                .entries
                .insert(resource.url().to_string(), CacheEntry::from_resource(resource));
        }

        futures::future::try_join_all(waiters).await?;
        Ok(())
    }

    /// Metadata for a URL seen by `put_resources`
    pub fn cache_entry(&self, url: &str) -> Option<CacheEntry> {
        self.inner.entries.get(url).map(|e| e.value().clone())
    }

    pub fn is_uploaded(&self, hash: &str) -> bool {
        self.inner.state.lock().uploaded.contains(hash)
    }

    /// Number of distinct digests known to exist remotely
    pub fn uploaded_count(&self) -> usize {
        self.inner.state.lock().uploaded.len()
    }

    /// Number of resources waiting for the next flush
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    fn enqueue(&self, resources: &[Resource]) -> Vec<UploadFuture> {
        let mut state = self.inner.state.lock();
        let mut waiters = Vec::new();
        let mut added = 0usize;

        for resource in resources {
            let Some(hash) = resource.hash() else {
                continue;
            };
            if state.uploaded.contains(hash) {
                continue;
            }
            if let Some(outstanding) = state.requested.get(hash) {
                waiters.push(outstanding.clone());
                continue;
            }

            let (tx, rx) = oneshot::channel();
            let waiter = rx
                .map(|outcome| {
                    outcome.unwrap_or_else(|_| {
                        Err(Error::Internal("upload batch dropped".to_string()))
                    })
                })
                .boxed()
                .shared();
            state.requested.insert(hash.to_string(), waiter.clone());
            state.pending.push(Pending {
                resource: resource.clone(),
                tx,
            });
            waiters.push(waiter);
            added += 1;
        }

        if added > 0 {
            debug!(
                "Queued {} resource(s) for upload ({} pending)",
                added,
                state.pending.len()
            );
            self.restart_timer(&mut state);
        }

        waiters
    }

    fn restart_timer(&self, state: &mut UploadState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.timer_generation += 1;
        let generation = state.timer_generation;
        let inner = Arc::clone(&self.inner);

        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;

            let batch = {
                let mut state = inner.state.lock();
                if state.timer_generation != generation {
                    return;
                }
                state.timer = None;
                std::mem::take(&mut state.pending)
            };

            // The flush outlives the timer so a later arrival cannot abort it
            tokio::spawn(Inner::flush(inner, batch));
        }));
    }
}

impl Inner {
    async fn flush(self: Arc<Self>, batch: Vec<Pending>) {
        if batch.is_empty() {
            return;
        }

        let resources: Vec<Resource> = batch.iter().map(|p| p.resource.clone()).collect();
        debug!("Checking {} resource(s) against the store", resources.len());

        let present = match self.store.check_resources(&resources).await {
            Ok(present) if present.len() == batch.len() => present,
            Ok(present) => {
                let err = Error::Internal(format!(
                    "resource check returned {} answers for {} resources",
                    present.len(),
                    batch.len()
                ));
                for pending in batch {
                    self.settle(pending, Err(err.clone()));
                }
                return;
            }
            Err(e) => {
                warn!("Resource check failed: {}", e);
                for pending in batch {
                    self.settle(pending, Err(e.clone()));
                }
                return;
            }
        };

        let jobs = batch.into_iter().zip(present).map(|(pending, present)| {
            let inner = Arc::clone(&self);
            async move {
                let result = if present {
                    trace!("{} already stored", pending.resource.url());
                    Ok(())
                } else {
                    inner.upload(&pending.resource).await
                };
                inner.settle(pending, result);
            }
        });
        futures::future::join_all(jobs).await;
    }

    async fn upload(&self, resource: &Resource) -> Result<()> {
        let _permit = self
            .upload_permits
            .acquire()
            .await
            .map_err(|_| Error::Internal("upload limiter closed".to_string()))?;

        debug!("Uploading {}", resource.url());
        self.store
            .put_resource(resource)
            .await
            .map_err(|e| match e {
                Error::Upload { .. } => e,
                other => Error::Upload {
                    url: resource.url().to_string(),
                    hash: resource.hash().unwrap_or_default().to_string(),
                    reason: other.to_string(),
                },
            })
    }

    fn settle(&self, pending: Pending, result: Result<()>) {
        if let Some(hash) = pending.resource.hash() {
            let mut state = self.state.lock();
            state.requested.remove(hash);
            if result.is_ok() {
                state.uploaded.insert(hash.to_string());
            }
        }
        if let Err(e) = &result {
            warn!("Upload of {} failed: {}", pending.resource.url(), e);
        }
        // Nobody waiting is fine: the digest is recorded either way
        let _ = pending.tx.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingStore {
        checks: AtomicUsize,
        puts: Mutex<Vec<String>>,
        present: HashSet<String>,
        failing: HashSet<String>,
        put_delay: Option<Duration>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl ResourceStore for CountingStore {
        async fn check_resources(&self, resources: &[Resource]) -> Result<Vec<bool>> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(resources
                .iter()
                .map(|r| self.present.contains(r.url()))
                .collect())
        }

        async fn put_resource(&self, resource: &Resource) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.put_delay.unwrap_or(Duration::from_millis(5))).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.puts.lock().push(resource.url().to_string());
            if self.failing.contains(resource.url()) {
                return Err(Error::Internal("503 from store".to_string()));
            }
            Ok(())
        }
    }

    fn res(name: &str) -> Resource {
        Resource::new(
            format!("https://site.test/{}", name),
            "image/png",
            format!("bytes of {}", name).into_bytes(),
        )
    }

    fn cache(store: Arc<CountingStore>) -> ResourceUploadCache {
        ResourceUploadCache::with_limits(store, Duration::from_millis(100), 4)
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_batches_upload_each_digest_once() {
        let store = Arc::new(CountingStore::default());
        let cache = cache(store.clone());
        let (a, b, c) = (res("a"), res("b"), res("c"));

        let first = [a.clone(), b.clone()];
        let second = [b.clone(), c.clone()];
        let (r1, r2) = tokio::join!(cache.put_resources(&first), cache.put_resources(&second));
        r1.unwrap();
        r2.unwrap();

        assert_eq!(store.puts.lock().len(), 3);
        assert_eq!(store.checks.load(Ordering::SeqCst), 1);
        assert_eq!(cache.uploaded_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubmitting_uploaded_digest_is_free() {
        let store = Arc::new(CountingStore::default());
        let cache = cache(store.clone());
        let a = res("a");

        cache.put_resources(&[a.clone()]).await.unwrap();
        cache.put_resources(&[a.clone()]).await.unwrap();
        cache.put_resources(&[a.clone()]).await.unwrap();

        assert_eq!(store.checks.load(Ordering::SeqCst), 1);
        assert_eq!(store.puts.lock().len(), 1);
        assert!(cache.is_uploaded(a.hash().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_bytes_different_urls_share_upload() {
        let store = Arc::new(CountingStore::default());
        let cache = cache(store.clone());
        let a = Resource::new("https://one.test/x.png", "image/png", &b"pixels"[..]);
        let b = Resource::new("https://two.test/y.png", "image/png", &b"pixels"[..]);

        cache.put_resources(&[a, b]).await.unwrap();
        assert_eq!(store.puts.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_present_resources_are_not_uploaded() {
        let store = Arc::new(CountingStore {
            present: ["https://site.test/a".to_string()].into_iter().collect(),
            ..Default::default()
        });
        let cache = cache(store.clone());

        cache.put_resources(&[res("a"), res("b")]).await.unwrap();
        assert_eq!(*store.puts.lock(), vec!["https://site.test/b".to_string()]);
        assert_eq!(cache.uploaded_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_scoped_to_its_digest() {
        let store = Arc::new(CountingStore {
            failing: ["https://site.test/bad".to_string()].into_iter().collect(),
            ..Default::default()
        });
        let cache = cache(store.clone());
        let good = res("good");
        let bad = res("bad");

        let err = cache
            .put_resources(&[good.clone(), bad.clone()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upload { ref url, .. } if url == "https://site.test/bad"));

        // Give the sibling upload time to settle
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.is_uploaded(good.hash().unwrap()));
        assert!(!cache.is_uploaded(bad.hash().unwrap()));

        // A failed digest may be retried
        assert!(cache.put_resources(&[bad]).await.is_err());
        assert_eq!(store.puts.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_resets_on_arrival() {
        let store = Arc::new(CountingStore::default());
        let cache = cache(store.clone());

        let c1 = cache.clone();
        let first = tokio::spawn(async move { c1.put_resources(&[res("a")]).await });
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.checks.load(Ordering::SeqCst), 0);

        let c2 = cache.clone();
        let second = tokio::spawn(async move { c2.put_resources(&[res("b")]).await });
        tokio::time::sleep(Duration::from_millis(60)).await;
        // 120ms after the first arrival but only 60ms after the second
        assert_eq!(store.checks.load(Ordering::SeqCst), 0);
        assert_eq!(cache.pending_count(), 2);

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(store.checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_cached_before_network() {
        let store = Arc::new(CountingStore::default());
        let cache = cache(store.clone());
        let css = Resource::new("https://site.test/app.css", "text/css", &b"h1{}"[..]);
        let remote = Resource::remote("https://cdn.test/font.woff");

        let c = cache.clone();
        let resources = vec![css.clone(), remote.clone()];
        let handle = tokio::spawn(async move { c.put_resources(&resources).await });
        tokio::task::yield_now().await;

        let entry = cache.cache_entry(css.url()).unwrap();
        assert!(entry.requires_processing);
        assert_eq!(store.checks.load(Ordering::SeqCst), 0);
        assert_eq!(cache.cache_entry(remote.url()).unwrap().hash, None);

        handle.await.unwrap().unwrap();
        assert_eq!(store.puts.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_limit_spans_batches() {
        let store = Arc::new(CountingStore {
            put_delay: Some(Duration::from_millis(500)),
            ..Default::default()
        });
        let cache = cache(store.clone());

        let c1 = cache.clone();
        let first: Vec<Resource> = (0..6).map(|i| res(&format!("a{}", i))).collect();
        let first = tokio::spawn(async move { c1.put_resources(&first).await });

        // The first batch is still uploading when the second one flushes
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.in_flight.load(Ordering::SeqCst), 4);
        let c2 = cache.clone();
        let second: Vec<Resource> = (0..6).map(|i| res(&format!("b{}", i))).collect();
        let second = tokio::spawn(async move { c2.put_resources(&second).await });

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(store.checks.load(Ordering::SeqCst), 2);
        assert_eq!(store.puts.lock().len(), 12);
        assert_eq!(store.peak_in_flight.load(Ordering::SeqCst), 4);
    }
}
