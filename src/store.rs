use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::watch;

use crate::{DatasetSource, Error};

/// Observable snapshot of one dataset kind.
///
/// `canonical` is the last successfully fetched dataset, `working` the
/// locally editable copy. The two never share structure: `working` is always
/// produced by cloning, so editors can never alias into `canonical`.
/// `error` is non-empty exactly when the most recent load failed, in which
/// case both datasets are absent.
#[derive(Clone, Debug)]
pub struct StoreState<T> {
    pub canonical: Option<T>,
    pub working: Option<T>,
    pub error: String,
}

impl<T> Default for StoreState<T> {
    fn default() -> Self {
        Self {
            canonical: None,
            working: None,
            error: String::new(),
        }
    }
}

/// Versioned cache for one dataset kind.
///
/// Created once at startup and shared by reference; all mutations go through
/// a `watch` channel so subscribers are notified synchronously within the
/// mutating call.
pub struct DataStore<T> {
    name: &'static str,
    source: Arc<dyn DatasetSource<T>>,
    state: watch::Sender<StoreState<T>>,
    seq: AtomicU64,
    timeout: Duration,
}

impl<T> DataStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, source: Arc<dyn DatasetSource<T>>, timeout: Duration) -> Self {
        let (state, _) = watch::channel(StoreState::default());
        Self {
            name,
            source,
            state,
            seq: AtomicU64::new(0),
            timeout,
        }
    }

    /// Fetches the dataset for `version` and replaces the store contents
    /// wholesale. No-op for an empty version.
    ///
    /// Loads for different versions may be in flight concurrently; each call
    /// is stamped with a sequence number and a resolution is discarded when a
    /// newer load has been issued since, so the settled state always reflects
    /// the most recently issued call.
    pub async fn load(&self, version: &str) {
        if version.is_empty() {
            return;
        }
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        // Drop the previous version's data up front so consumers never see
        // stale entries while the fetch is outstanding.
        self.state.send_modify(|s| {
            s.error.clear();
            s.canonical = None;
            s.working = None;
        });
        debug!("{}: loading version `{}`", self.name, version);
        let result = match tokio::time::timeout(self.timeout, self.source.fetch(version)).await {
            Ok(r) => r,
            Err(_) => Err(Error::Timeout),
        };
        let mut pending = Some(result);
        // The stamp is re-checked inside the same critical section as the
        // write, so a newer load cannot stamp, clear, and commit between
        // this check and this commit.
        let committed = self.state.send_if_modified(|s| {
            if self.seq.load(Ordering::SeqCst) != seq {
                return false;
            }
            match pending.take() {
                Some(Ok(data)) => {
                    s.working = Some(data.clone());
                    s.canonical = Some(data);
                    s.error.clear();
                }
                Some(Err(e)) => {
                    warn!("{}: failed to load version `{}`: {}", self.name, version, e);
                    s.canonical = None;
                    s.working = None;
                    s.error = e.to_string();
                }
                None => return false,
            }
            true
        });
        if committed {
            debug!("{}: version `{}` settled", self.name, version);
        } else {
            debug!(
                "{}: discarding superseded load of version `{}`",
                self.name, version
            );
        }
    }

    /// Overwrites the working copy, e.g. when an editor commits a bulk
    /// replacement. The canonical copy is untouched.
    pub fn replace(&self, new_working: T) {
        self.state.send_modify(|s| s.working = Some(new_working));
    }

    /// Discards local edits: working becomes a fresh clone of canonical.
    /// No-op while canonical is absent.
    pub fn reset(&self) {
        self.state.send_modify(|s| {
            if let Some(canonical) = &s.canonical {
                s.working = Some(canonical.clone());
            }
        });
    }

    pub fn canonical(&self) -> Option<T> {
        self.state.borrow().canonical.clone()
    }

    pub fn working(&self) -> Option<T> {
        self.state.borrow().working.clone()
    }

    pub fn error(&self) -> String {
        self.state.borrow().error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreState<T>> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use async_trait::async_trait;
    use indexmap::IndexMap;
    use reqwest::StatusCode;

    use super::*;

    type Dataset = IndexMap<String, String>;

    /// Fetcher returning `{ "version": <v> }` per version, with optional
    /// per-version delays and failures.
    #[derive(Default)]
    struct FakeSource {
        delay_ms: HashMap<String, u64>,
        fail: HashSet<String>,
    }

    #[async_trait]
    impl DatasetSource<Dataset> for FakeSource {
        async fn fetch(&self, version: &str) -> Result<Dataset, Error> {
            if let Some(ms) = self.delay_ms.get(version) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            if self.fail.contains(version) {
                return Err(Error::HttpError(
                    format!("http://test/api/{}/ships.json", version),
                    StatusCode::NOT_FOUND,
                    format!("no such version: {}", version),
                ));
            }
            let mut data = Dataset::new();
            data.insert("version".to_string(), version.to_string());
            Ok(data)
        }
    }

    fn store(source: FakeSource) -> DataStore<Dataset> {
        DataStore::new("test", Arc::new(source), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn load_success() {
        crate::tests::init_logger();
        let store = store(FakeSource::default());
        let mut rx = store.subscribe();
        store.load("v1").await;
        assert_eq!(store.canonical(), store.working());
        assert_eq!(store.working().unwrap()["version"], "v1");
        assert_eq!(store.error(), "");
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn load_failure_leaves_store_empty() {
        let mut source = FakeSource::default();
        source.fail.insert("bad".to_string());
        let store = store(source);
        store.load("bad").await;
        assert!(store.canonical().is_none());
        assert!(store.working().is_none());
        assert!(store.error().contains("no such version: bad"));

        // A later successful load clears the error.
        store.load("v2").await;
        assert_eq!(store.error(), "");
        assert_eq!(store.working().unwrap()["version"], "v2");
    }

    #[tokio::test]
    async fn empty_version_is_noop() {
        let store = store(FakeSource::default());
        store.load("v1").await;
        store.load("").await;
        assert_eq!(store.working().unwrap()["version"], "v1");
    }

    #[tokio::test]
    async fn replace_and_reset() {
        let store = store(FakeSource::default());
        store.load("v1").await;

        let mut edited = store.working().unwrap();
        edited.insert("extra".to_string(), "edited".to_string());
        store.replace(edited.clone());
        assert_eq!(store.working().unwrap(), edited);
        // Canonical is untouched by the replacement.
        assert!(!store.canonical().unwrap().contains_key("extra"));

        store.reset();
        assert_eq!(store.working(), store.canonical());
        assert!(!store.working().unwrap().contains_key("extra"));
    }

    #[tokio::test]
    async fn reset_without_canonical_is_noop() {
        let store = store(FakeSource::default());
        let mut edited = Dataset::new();
        edited.insert("k".to_string(), "v".to_string());
        store.replace(edited.clone());
        store.reset();
        assert_eq!(store.working().unwrap(), edited);
    }

    #[tokio::test]
    async fn last_issued_load_wins() {
        let mut source = FakeSource::default();
        source.delay_ms.insert("slow".to_string(), 80);
        source.delay_ms.insert("fast".to_string(), 10);
        let store = store(source);
        // `slow` is issued first but resolves after `fast`; its resolution
        // must be discarded.
        tokio::join!(store.load("slow"), store.load("fast"));
        assert_eq!(store.working().unwrap()["version"], "fast");
        assert_eq!(store.canonical().unwrap()["version"], "fast");
        assert_eq!(store.error(), "");
    }

    #[tokio::test]
    async fn load_clears_state_while_fetch_outstanding() {
        let mut source = FakeSource::default();
        source.delay_ms.insert("v2".to_string(), 100);
        let store = Arc::new(store(source));
        store.load("v1").await;
        assert!(store.working().is_some());

        let mut rx = store.subscribe();
        let pending = tokio::spawn({
            let store = store.clone();
            async move { store.load("v2").await }
        });
        // First notification is the clear issued before the fetch; no stale
        // v1 data may be visible while v2 is outstanding.
        rx.changed().await.unwrap();
        {
            let state = rx.borrow();
            assert!(state.canonical.is_none());
            assert!(state.working.is_none());
            assert_eq!(state.error, "");
        }
        pending.await.unwrap();
        assert_eq!(store.working().unwrap()["version"], "v2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_loads_settle_on_last_issued() {
        let mut source = FakeSource::default();
        source.delay_ms.insert("slow".to_string(), 100);
        let store = Arc::new(store(source));
        let first = tokio::spawn({
            let store = store.clone();
            async move { store.load("slow").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = tokio::spawn({
            let store = store.clone();
            async move { store.load("fast").await }
        });
        let _ = tokio::join!(first, second);
        assert_eq!(store.working().unwrap()["version"], "fast");
        assert_eq!(store.canonical().unwrap()["version"], "fast");
        assert_eq!(store.error(), "");
    }

    #[tokio::test]
    async fn slow_fetch_times_out() {
        let mut source = FakeSource::default();
        source.delay_ms.insert("v1".to_string(), 200);
        let store = DataStore::new("test", Arc::new(source), Duration::from_millis(10));
        store.load("v1").await;
        assert!(store.working().is_none());
        assert_eq!(store.error(), Error::Timeout.to_string());
    }
}
