use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, trace, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::Error;

/// Request posted to the search worker. `components` is the full dataset
/// serialized to JSON; only values cross the thread boundary.
#[derive(Clone, Debug)]
pub struct SearchRequest {
    pub id: u64,
    pub components: String,
    pub query: String,
}

/// Worker reply. An empty `status` means success; otherwise `status` carries
/// the failure message and `matches` is empty.
#[derive(Clone, Debug)]
pub struct SearchResponse {
    pub id: u64,
    pub status: String,
    pub matches: IndexMap<String, Value>,
}

/// Front end of the search protocol, living on the interactive side.
///
/// Substring-scanning a large serialized dataset is inherently blocking, so
/// the scan runs on a dedicated worker thread and the coordinator exchanges
/// request/response values with it over channels. Requests are tagged with
/// increasing ids; responses land in a single latest-response slot, so a
/// caller can tell its own result from a stale one (late arrival of a
/// superseded query, discarded) or a newer one (this query was superseded).
pub struct SearchCoordinator {
    tx: mpsc::UnboundedSender<SearchRequest>,
    resp_rx: watch::Receiver<Option<SearchResponse>>,
    next_id: AtomicU64,
    timeout: Duration,
    _worker: thread::JoinHandle<()>,
}

impl SearchCoordinator {
    /// Starts the worker thread. It exits when the coordinator is dropped
    /// and its request channel closes.
    pub fn spawn(timeout: Duration) -> Result<Self, Error> {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (resp_tx, resp_rx) = watch::channel(None);
        let worker = thread::Builder::new()
            .name("search-worker".to_string())
            .spawn(move || run_worker(req_rx, resp_tx))?;
        Ok(Self {
            tx: req_tx,
            resp_rx,
            next_id: AtomicU64::new(0),
            timeout,
            _worker: worker,
        })
    }

    /// Serializes `dataset` and runs one full-text query over it, returning
    /// the matching entries in their original order.
    pub async fn search<T>(&self, dataset: &T, query: &str) -> Result<IndexMap<String, Value>, Error>
    where
        T: Serialize,
    {
        self.search_raw(serde_json::to_string(dataset)?, query).await
    }

    /// Like [`search`](Self::search), but over an already serialized dataset.
    pub async fn search_raw(
        &self,
        components: String,
        query: &str,
    ) -> Result<IndexMap<String, Value>, Error> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut rx = self.resp_rx.clone();
        // Mark whatever sits in the slot as seen before posting, so only
        // responses produced from here on can wake this caller.
        rx.borrow_and_update();
        self.tx
            .send(SearchRequest {
                id,
                components,
                query: query.to_string(),
            })
            .map_err(|_| Error::SearchWorkerGone)?;
        let recv = tokio::time::timeout(self.timeout, async {
            loop {
                rx.changed().await.map_err(|_| Error::SearchWorkerGone)?;
                let resp = match rx.borrow_and_update().clone() {
                    Some(resp) => resp,
                    None => continue,
                };
                if resp.id == id {
                    return Ok(resp);
                }
                if resp.id > id {
                    // The worker skipped this query for a newer one.
                    return Err(Error::SearchSuperseded);
                }
                // Late response of a query this one superseded.
                trace!("Discarding stale search response {}", resp.id);
            }
        })
        .await;
        let resp = match recv {
            Ok(r) => r?,
            Err(_) => return Err(Error::Timeout),
        };
        if resp.status.is_empty() {
            Ok(resp.matches)
        } else {
            Err(Error::SearchFailed(resp.status))
        }
    }
}

fn run_worker(
    mut requests: mpsc::UnboundedReceiver<SearchRequest>,
    responses: watch::Sender<Option<SearchResponse>>,
) {
    debug!("Search worker started");
    while let Some(req) = requests.blocking_recv() {
        let req = newest_request(req, &mut requests);
        trace!("Search request {}: query `{}`", req.id, req.query);
        let resp = match scan(&req.components, &req.query) {
            Ok(matches) => SearchResponse {
                id: req.id,
                status: String::new(),
                matches,
            },
            Err(e) => {
                warn!("Search request {} failed: {}", req.id, e);
                SearchResponse {
                    id: req.id,
                    status: e.to_string(),
                    matches: IndexMap::new(),
                }
            }
        };
        if responses.send(Some(resp)).is_err() {
            break;
        }
    }
    debug!("Search worker exiting");
}

/// Drains the queued backlog and keeps only the newest request. A newer
/// query supersedes the older ones, which are never scanned.
fn newest_request(
    first: SearchRequest,
    requests: &mut mpsc::UnboundedReceiver<SearchRequest>,
) -> SearchRequest {
    let mut req = first;
    while let Ok(newer) = requests.try_recv() {
        trace!("Skipping superseded search request {}", req.id);
        req = newer;
    }
    req
}

/// Keeps the entries whose key, or whose value's JSON serialization,
/// contains `query` as a case-sensitive substring. The empty query matches
/// every entry. Original insertion order is preserved.
fn scan(components: &str, query: &str) -> Result<IndexMap<String, Value>, Error> {
    let parsed: IndexMap<String, Value> = serde_json::from_str(components)?;
    let mut matches = IndexMap::new();
    for (key, value) in parsed {
        if key.contains(query) || serde_json::to_string(&value)?.contains(query) {
            matches.insert(key, value);
        }
    }
    Ok(matches)
}
