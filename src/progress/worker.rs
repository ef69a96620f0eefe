//! Coverage worker — recomputation off the interactive thread
//!
//! Trees can hold tens of thousands of resources, so aggregation runs on a
//! dedicated thread that shares no memory with the session. The worker is
//! seeded once with the immutable parts of the project (tree, external
//! index, policy); each request then carries only the mutable inputs
//! (manual index, resolved set) plus the resource id that triggered it.
//!
//! Requests carry a monotonically increasing sequence number. The owner
//! applies only the result with the highest issued sequence; a result for
//! a superseded request is discarded silently — last writer wins by
//! request recency, not arrival order. The worker itself coalesces queued
//! requests for the same reason: there is no point computing a summary
//! nobody will apply.

use std::collections::HashSet;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::model::index::AttributionIndex;
use crate::model::resources::{ResourceTree, ROOT_PATH};
use crate::model::AttributionId;
use crate::policy::TreePolicy;
use crate::progress::{compute, compute_full_parallel, CoverageCache, CoverageInputs, ProgressSummary};

// ─── Protocol ──────────────────────────────────────────────────────

/// Immutable snapshot the worker is seeded with, once per project load.
#[derive(Debug, Clone)]
pub struct CoverageSeed {
    pub tree: ResourceTree,
    pub external: AttributionIndex,
    pub policy: TreePolicy,
}

/// One recomputation request. `changed_paths` is the minimal set of paths
/// the session knows to have changed; the worker extends it with whatever
/// it detects by diffing the mutable inputs against the previous request.
#[derive(Debug, Clone)]
pub struct CoverageRequest {
    pub seq: u64,
    /// The resource whose mutation triggered this request; results are
    /// correlated back to it.
    pub resource_id: String,
    pub manual: AttributionIndex,
    pub resolved: HashSet<AttributionId>,
    pub changed_paths: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CoverageResult {
    pub seq: u64,
    pub resource_id: String,
    pub summary: ProgressSummary,
}

enum WorkerMessage {
    Recompute(Box<CoverageRequest>),
    Shutdown,
}

// ─── Owner handle ──────────────────────────────────────────────────

/// Session-side handle. All communication is message passing; dropping
/// the handle shuts the thread down.
#[derive(Debug)]
pub struct CoverageWorker {
    tx: Sender<WorkerMessage>,
    rx: Receiver<CoverageResult>,
    next_seq: u64,
    applied_seq: u64,
    handle: Option<JoinHandle<()>>,
}

impl CoverageWorker {
    pub fn spawn(seed: CoverageSeed) -> Self {
        let (tx, request_rx) = channel::<WorkerMessage>();
        let (result_tx, rx) = channel::<CoverageResult>();
        let handle = std::thread::Builder::new()
            .name("merkja-coverage".into())
            .spawn(move || worker_loop(seed, request_rx, result_tx))
            .expect("failed to spawn coverage worker thread");
        tracing::info!("Coverage worker spawned");
        Self {
            tx,
            rx,
            next_seq: 1,
            applied_seq: 0,
            handle: Some(handle),
        }
    }

    /// Queue a recomputation. Returns the sequence number assigned to it.
    pub fn request(
        &mut self,
        resource_id: impl Into<String>,
        manual: AttributionIndex,
        resolved: HashSet<AttributionId>,
        changed_paths: Vec<String>,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let request = CoverageRequest {
            seq,
            resource_id: resource_id.into(),
            manual,
            resolved,
            changed_paths,
        };
        // A closed channel means the worker died; the next poll simply
        // yields nothing, which the session treats as "no fresh summary".
        if self.tx.send(WorkerMessage::Recompute(Box::new(request))).is_err() {
            tracing::warn!(seq, "coverage worker unavailable, request dropped");
        }
        seq
    }

    /// Drain available results and return the freshest unapplied one, if
    /// any. Superseded results are discarded silently.
    pub fn poll(&mut self) -> Option<CoverageResult> {
        let drained: Vec<CoverageResult> = self.rx.try_iter().collect();
        let latest = latest_result(drained, self.applied_seq)?;
        self.applied_seq = latest.seq;
        Some(latest)
    }

    /// Block until a result at least as fresh as `seq` arrives, or the
    /// timeout elapses. Used right after load to surface the initial
    /// full-tree summary.
    pub fn wait_for(&mut self, seq: u64, timeout: Duration) -> Option<CoverageResult> {
        let deadline = Instant::now() + timeout;
        let mut best: Option<CoverageResult> = None;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(result) => {
                    let fresher = best.as_ref().map_or(true, |b| result.seq > b.seq);
                    if result.seq > self.applied_seq && fresher {
                        best = Some(result);
                    } else {
                        tracing::debug!(seq = result.seq, "stale coverage result discarded");
                    }
                    if best.as_ref().is_some_and(|b| b.seq >= seq) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        if let Some(ref result) = best {
            self.applied_seq = result.seq;
        }
        best
    }

    pub fn last_issued_seq(&self) -> u64 {
        self.next_seq - 1
    }
}

impl Drop for CoverageWorker {
    fn drop(&mut self) {
        let _ = self.tx.send(WorkerMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Pick the freshest result strictly newer than `applied_seq`, regardless
/// of arrival order. Everything else is superseded.
fn latest_result(
    drained: impl IntoIterator<Item = CoverageResult>,
    applied_seq: u64,
) -> Option<CoverageResult> {
    let mut latest: Option<CoverageResult> = None;
    for result in drained {
        if result.seq <= applied_seq {
            tracing::debug!(seq = result.seq, "stale coverage result discarded");
            continue;
        }
        match latest {
            Some(ref best) if best.seq >= result.seq => {
                tracing::debug!(seq = result.seq, "stale coverage result discarded");
            }
            _ => latest = Some(result),
        }
    }
    latest
}

// ─── Worker thread ─────────────────────────────────────────────────

fn worker_loop(
    seed: CoverageSeed,
    requests: Receiver<WorkerMessage>,
    results: Sender<CoverageResult>,
) {
    let mut cache = CoverageCache::new();
    let mut last_manual = AttributionIndex::new();
    let mut last_resolved: HashSet<AttributionId> = HashSet::new();
    let mut seeded = false;

    while let Ok(message) = requests.recv() {
        // Coalesce: only the newest queued request can ever be applied.
        let mut current = match message {
            WorkerMessage::Recompute(request) => request,
            WorkerMessage::Shutdown => return,
        };
        loop {
            match requests.try_recv() {
                Ok(WorkerMessage::Recompute(next)) => {
                    tracing::debug!(seq = current.seq, "coalesced superseded request");
                    current = next;
                }
                Ok(WorkerMessage::Shutdown) => return,
                Err(_) => break,
            }
        }
        let request = current;

        let inputs = CoverageInputs {
            tree: &seed.tree,
            manual: &request.manual,
            external: &seed.external,
            resolved: &request.resolved,
            policy: &seed.policy,
        };

        let summary = if !seeded {
            let (summary, full_cache) = compute_full_parallel(&inputs);
            cache = full_cache;
            seeded = true;
            summary
        } else {
            for path in dirty_paths(&seed, &request, &last_manual, &last_resolved) {
                cache.invalidate_chain(&path);
            }
            compute(&inputs, ROOT_PATH, &mut cache).unwrap_or_default()
        };

        last_manual = request.manual;
        last_resolved = request.resolved;

        let delivered = results.send(CoverageResult {
            seq: request.seq,
            resource_id: request.resource_id,
            summary,
        });
        if delivered.is_err() {
            return; // owner is gone
        }
    }
}

/// Everything that could have changed since the previous request: the
/// paths the session flagged, paths whose manual links differ, and paths
/// referencing external ids whose resolved flag flipped.
fn dirty_paths(
    seed: &CoverageSeed,
    request: &CoverageRequest,
    last_manual: &AttributionIndex,
    last_resolved: &HashSet<AttributionId>,
) -> Vec<String> {
    let mut dirty: HashSet<String> = request.changed_paths.iter().cloned().collect();
    dirty.insert(request.resource_id.clone());
    dirty.extend(last_manual.diff_paths(&request.manual));
    for id in last_resolved.symmetric_difference(&request.resolved) {
        if let Some(paths) = seed.external.resources_for(id) {
            dirty.extend(paths.iter().cloned());
        }
    }
    dirty.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::resources::ResourceInput;

    fn id(s: &str) -> AttributionId {
        AttributionId::new(s)
    }

    fn seed_from(json: &str) -> CoverageSeed {
        let input: ResourceInput = serde_json::from_str(json).unwrap();
        CoverageSeed {
            tree: ResourceTree::from_input(&input, &Default::default()),
            external: AttributionIndex::new(),
            policy: TreePolicy::default(),
        }
    }

    fn result(seq: u64, manual: usize) -> CoverageResult {
        CoverageResult {
            seq,
            resource_id: "/".into(),
            summary: ProgressSummary {
                total_count: 1,
                manual_count: manual,
                ..Default::default()
            },
        }
    }

    #[test]
    fn latest_result_wins_by_recency_not_arrival_order() {
        // R2's result arrives first, R1's late — R2 must still win.
        let applied = latest_result(vec![result(2, 1), result(1, 0)], 0).unwrap();
        assert_eq!(applied.seq, 2);
        assert_eq!(applied.summary.manual_count, 1);

        // A late result older than the applied one is discarded outright.
        assert!(latest_result(vec![result(1, 0)], 2).is_none());
    }

    #[test]
    fn worker_computes_full_summary_on_first_request() {
        let mut worker = CoverageWorker::spawn(seed_from(r#"{"a.rs": 1, "b": {"c.rs": 1}}"#));
        let seq = worker.request("/", AttributionIndex::new(), HashSet::new(), vec![]);
        let result = worker.wait_for(seq, Duration::from_secs(5)).unwrap();
        assert_eq!(result.summary.total_count, 2);
        assert_eq!(result.summary.unassigned_count, 2);
        assert_eq!(result.resource_id, "/");
    }

    #[test]
    fn newer_request_supersedes_older_one() {
        let mut worker = CoverageWorker::spawn(seed_from(r#"{"a.rs": 1, "b.rs": 1}"#));

        let mut manual = AttributionIndex::new();
        worker.request("/a.rs", manual.clone(), HashSet::new(), vec!["/a.rs".into()]);
        manual.link("/a.rs", id("m1"));
        let seq2 = worker.request("/a.rs", manual, HashSet::new(), vec!["/a.rs".into()]);

        let applied = worker.wait_for(seq2, Duration::from_secs(5)).unwrap();
        assert_eq!(applied.seq, seq2);
        assert_eq!(applied.summary.manual_count, 1);
        // Nothing fresher left over.
        assert!(worker.poll().is_none());
    }

    #[test]
    fn incremental_recompute_reflects_resolved_toggle() {
        let mut seed = seed_from(r#"{"a.rs": 1, "b.rs": 1}"#);
        seed.external.link("/a.rs", id("e1"));
        let mut worker = CoverageWorker::spawn(seed);

        let seq = worker.request("/", AttributionIndex::new(), HashSet::new(), vec![]);
        let first = worker.wait_for(seq, Duration::from_secs(5)).unwrap();
        assert_eq!(first.summary.external_only_unresolved_count, 1);

        let resolved: HashSet<AttributionId> = [id("e1")].into();
        let seq = worker.request("/a.rs", AttributionIndex::new(), resolved, vec![]);
        let second = worker.wait_for(seq, Duration::from_secs(5)).unwrap();
        assert_eq!(second.summary.external_only_unresolved_count, 0);
        assert_eq!(second.summary.unassigned_count, 2);
    }
}
