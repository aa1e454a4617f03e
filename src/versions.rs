use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::{watch, Mutex};

use crate::{Error, VersionSource};

/// Observable registry snapshot. `versions` is most-recent-first; `selected`
/// optionally pins the effective latest version to an older snapshot.
#[derive(Clone, Debug, Default)]
pub struct RegistryState {
    pub versions: Vec<String>,
    pub selected: String,
    pub error: String,
}

/// Process-wide registry of available dataset versions.
///
/// The version list is fetched once and immutable thereafter; only the
/// selection may change.
pub struct VersionRegistry {
    source: Arc<dyn VersionSource>,
    state: watch::Sender<RegistryState>,
    load_gate: Mutex<()>,
    timeout: Duration,
}

impl VersionRegistry {
    pub fn new(source: Arc<dyn VersionSource>, timeout: Duration) -> Self {
        let (state, _) = watch::channel(RegistryState::default());
        Self {
            source,
            state,
            load_gate: Mutex::new(()),
            timeout,
        }
    }

    /// Fetches the version list if not already populated.
    ///
    /// Concurrent callers are serialized on a gate: only the first issues a
    /// fetch, the rest wait for it to settle and then observe the populated
    /// list. After a failed load the list stays empty and the next call
    /// retries.
    pub async fn load(&self) {
        if !self.state.borrow().versions.is_empty() {
            return;
        }
        let _gate = self.load_gate.lock().await;
        if !self.state.borrow().versions.is_empty() {
            // Another caller finished the fetch while we waited.
            return;
        }
        debug!("Fetching version list");
        let result = match tokio::time::timeout(self.timeout, self.source.fetch_versions()).await {
            Ok(r) => r,
            Err(_) => Err(Error::Timeout),
        };
        match result {
            Ok(mut versions) => {
                // Fetch order is oldest-first; flip it so the most recent
                // version comes first.
                versions.reverse();
                debug!("Version list loaded: {:?}", versions);
                self.state.send_modify(|s| {
                    s.versions = versions;
                    s.error.clear();
                });
            }
            Err(e) => {
                warn!("Failed to fetch version list: {}", e);
                self.state.send_modify(|s| s.error = e.to_string());
            }
        }
    }

    /// The effective latest version: the external selection when set,
    /// otherwise the first stored version, otherwise the empty sentinel.
    pub fn latest(&self) -> String {
        let state = self.state.borrow();
        if !state.selected.is_empty() {
            return state.selected.clone();
        }
        state.versions.first().cloned().unwrap_or_default()
    }

    /// Pins the effective latest version, e.g. when the user browses an
    /// older snapshot.
    pub fn select(&self, version: &str) {
        self.state
            .send_modify(|s| s.selected = version.to_string());
    }

    pub fn clear_selection(&self) {
        self.state.send_modify(|s| s.selected.clear());
    }

    pub fn versions(&self) -> Vec<String> {
        self.state.borrow().versions.clone()
    }

    pub fn error(&self) -> String {
        self.state.borrow().error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RegistryState> {
        self.state.subscribe()
    }
}
