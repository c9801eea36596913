//! Thread-safe collection of checksum scan results with progress tracking.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{timeout, Instant};

use crate::client::ClientError;
use crate::output::{human_bytes, OutputSink};

/// Terminal outcome of one replica's checksum scan.
pub type ReplicaResult = Result<u64, ClientError>;
/// replica uuid → scan outcome, ordered so report lines and mismatch
/// counting are deterministic.
pub type ReplicaResultMap = BTreeMap<String, ReplicaResult>;
/// tablet id → per-replica outcomes.
pub type TabletResultMap = HashMap<String, ReplicaResultMap>;

/// Collector for the checksum phase. Shared by every scan worker; the single
/// waiter inside `wait_for` is the only progress printer.
pub struct ChecksumReporter {
    expected_count: usize,
    /// Countdown of results still outstanding; `watch` so the waiter wakes
    /// the moment it reaches zero.
    remaining: watch::Sender<usize>,
    rows_summed: AtomicI64,
    disk_bytes_summed: AtomicI64,
    checksums: Mutex<TabletResultMap>,
}

impl ChecksumReporter {
    pub fn new(expected_count: usize) -> Self {
        let (remaining, _) = watch::channel(expected_count);
        Self {
            expected_count,
            remaining,
            rows_summed: AtomicI64::new(0),
            disk_bytes_summed: AtomicI64::new(0),
            checksums: Mutex::new(HashMap::new()),
        }
    }

    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    pub fn report_progress(&self, delta_rows: i64, delta_bytes: i64) {
        self.rows_summed.fetch_add(delta_rows, Ordering::Relaxed);
        self.disk_bytes_summed.fetch_add(delta_bytes, Ordering::Relaxed);
    }

    /// Records the terminal result for one (tablet, replica) pair. Each pair
    /// reports exactly once; a second report means the scheduler dispatched
    /// the same work item twice and is a bug.
    pub fn report_result(&self, tablet_id: &str, replica_uuid: &str, result: ReplicaResult) {
        {
            let mut checksums = self.checksums.lock().unwrap();
            let replicas = checksums.entry(tablet_id.to_string()).or_default();
            let previous = replicas.insert(replica_uuid.to_string(), result);
            assert!(
                previous.is_none(),
                "duplicate checksum result for tablet {} replica {}",
                tablet_id,
                replica_uuid
            );
        }
        self.remaining.send_modify(|r| *r = r.saturating_sub(1));
    }

    /// Count of replicas that have not reported yet.
    pub fn remaining(&self) -> usize {
        *self.remaining.borrow()
    }

    pub fn all_reported(&self) -> bool {
        self.remaining() == 0
    }

    /// Blocks until every expected replica has reported or `deadline_in`
    /// elapses, whichever comes first, printing a progress line at least
    /// every `progress_interval`. Returns false iff the deadline expired
    /// with results still outstanding.
    pub async fn wait_for(
        &self,
        deadline_in: Duration,
        progress_interval: Duration,
        output: &OutputSink,
    ) -> bool {
        let start = Instant::now();
        let deadline = start + deadline_in;
        let mut remaining_rx = self.remaining.subscribe();
        loop {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let window = (deadline - now).min(progress_interval);
            let done = timeout(window, remaining_rx.wait_for(|r| *r == 0))
                .await
                .is_ok();
            let status = if done { "finished in" } else { "running for" };
            output.info(&format!(
                "Checksum {} {}s: {}/{} replicas remaining ({} from disk, {} rows summed)",
                status,
                start.elapsed().as_secs(),
                self.remaining(),
                self.expected_count,
                human_bytes(self.disk_bytes_summed.load(Ordering::Relaxed)),
                self.rows_summed.load(Ordering::Relaxed)
            ));
            if done {
                return true;
            }
        }
    }

    /// Snapshot of results reported so far.
    pub fn checksums(&self) -> TabletResultMap {
        self.checksums.lock().unwrap().clone()
    }
}
