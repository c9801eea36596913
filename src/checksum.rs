//! Fleet-wide checksum scans: work construction, per-server scheduling, and
//! result classification.
//!
//! Scheduling is two-level: work items are grouped into one queue per tablet
//! server, and each server gets at most `scan_concurrency` worker tasks
//! draining its queue, so the per-server in-flight cap is structural. A
//! single reporter aggregates results and progress across the whole fleet
//! under one global deadline.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::check::CheckError;
use crate::client::ScanProgress;
use crate::cluster::Cluster;
use crate::filter::matches_any_pattern;
use crate::output::OutputSink;
use crate::reporter::ChecksumReporter;

/// Tuning for the checksum phase.
#[derive(Debug, Clone)]
pub struct ChecksumOptions {
    /// Wall-clock budget for the whole phase.
    pub timeout: Duration,
    /// Max concurrent scans per tablet server.
    pub scan_concurrency: usize,
    /// Scan at a repeatable-read snapshot timestamp.
    pub use_snapshot: bool,
    /// `CURRENT_TIMESTAMP` resolves at runtime to the current timestamp of
    /// the first healthy server in the work set.
    pub snapshot_timestamp: u64,
    /// Max wait between progress lines while blocked on results.
    pub progress_interval: Duration,
}

impl ChecksumOptions {
    /// Sentinel: resolve the snapshot timestamp at runtime.
    pub const CURRENT_TIMESTAMP: u64 = 0;
}

impl Default for ChecksumOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            scan_concurrency: 4,
            use_snapshot: true,
            snapshot_timestamp: Self::CURRENT_TIMESTAMP,
            progress_interval: Duration::from_secs(5),
        }
    }
}

/// One unit of scan work: a replica of `tablet_id` hosted on the server that
/// owns the queue this job sits in.
struct ScanJob {
    tablet_id: String,
    schema: Bytes,
}

/// Runs checksum scans over every replica selected by the filters and
/// classifies the outcome: `TimedOut` before `Corruption` (mismatches)
/// before `Aborted` (per-replica scan errors) before success.
pub async fn checksum_data(
    cluster: &Cluster,
    options: &ChecksumOptions,
    table_filters: &[String],
    tablet_id_filters: &[String],
    output: &OutputSink,
) -> Result<(), CheckError> {
    let mut options = options.clone();

    // Work construction: per-server queues, exactly sized.
    let mut queues: BTreeMap<String, VecDeque<ScanJob>> = BTreeMap::new();
    let mut num_tablet_replicas = 0usize;
    for table in &cluster.tables {
        if !matches_any_pattern(table_filters, &table.name) {
            continue;
        }
        for tablet in &table.tablets {
            if !matches_any_pattern(tablet_id_filters, &tablet.id) {
                continue;
            }
            for replica in &tablet.replicas {
                assert!(
                    cluster.tablet_servers.contains_key(&replica.ts_uuid),
                    "replica of tablet {} references unknown tablet server {}",
                    tablet.id,
                    replica.ts_uuid
                );
                queues
                    .entry(replica.ts_uuid.clone())
                    .or_default()
                    .push_back(ScanJob {
                        tablet_id: tablet.id.clone(),
                        schema: table.schema.clone(),
                    });
                num_tablet_replicas += 1;
            }
        }
    }

    if num_tablet_replicas == 0 {
        let mut msg = "No tablet replicas found.".to_string();
        if !table_filters.is_empty() || !tablet_id_filters.is_empty() {
            msg.push_str(" Filter:");
            if !table_filters.is_empty() {
                msg.push_str(&format!(" table_filters={}", table_filters.join(",")));
            }
            if !tablet_id_filters.is_empty() {
                msg.push_str(&format!(
                    " tablet_id_filters={}",
                    tablet_id_filters.join(",")
                ));
            }
        }
        return Err(CheckError::NotFound(msg));
    }

    // Resolve the snapshot timestamp once, up front, from the first healthy
    // server in queue-map order.
    if options.use_snapshot && options.snapshot_timestamp == ChecksumOptions::CURRENT_TIMESTAMP {
        options.snapshot_timestamp = queues
            .keys()
            .map(|uuid| &cluster.tablet_servers[uuid])
            .find(|ts| ts.is_healthy())
            .map(|ts| ts.current_timestamp())
            .ok_or_else(|| {
                CheckError::ServiceUnavailable(
                    "no tablet servers were available to fetch the current timestamp".to_string(),
                )
            })?;
        output.info(&format!(
            "Using snapshot timestamp: {}",
            options.snapshot_timestamp
        ));
    }

    let reporter = Arc::new(ChecksumReporter::new(num_tablet_replicas));

    // Single aggregator for progress deltas from every in-flight scan.
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ScanProgress>();
    {
        let reporter = Arc::clone(&reporter);
        tokio::spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                reporter.report_progress(progress.delta_rows, progress.delta_bytes);
            }
        });
    }

    // Two-level scheduler: per server, up to `scan_concurrency` workers loop
    // over that server's queue until it drains. A zero cap starts no workers;
    // the queue never drains and the phase times out at the deadline.
    for (uuid, queue) in queues {
        let ts = &cluster.tablet_servers[&uuid];
        let workers = options.scan_concurrency.min(queue.len());
        let queue = Arc::new(Mutex::new(queue));
        for _ in 0..workers {
            let client = Arc::clone(ts.client());
            let queue = Arc::clone(&queue);
            let reporter = Arc::clone(&reporter);
            let progress_tx = progress_tx.clone();
            let options = options.clone();
            tokio::spawn(async move {
                loop {
                    let job = queue.lock().expect("scan queue lock poisoned").pop_front();
                    let Some(job) = job else { break };
                    debug!(ts = %client.uuid(), tablet = %job.tablet_id, "starting checksum scan");
                    let result = client
                        .checksum_scan(&job.tablet_id, job.schema, &options, progress_tx.clone())
                        .await;
                    reporter.report_result(&job.tablet_id, client.uuid(), result);
                }
            });
        }
    }
    drop(progress_tx);

    let timed_out = !reporter
        .wait_for(options.timeout, options.progress_interval, output)
        .await;
    let checksums = reporter.checksums();

    // Walk tables in source order, printing the result block for every
    // tablet that has any results. The first successful replica's checksum
    // is the reference for mismatch detection.
    let mut num_errors = 0usize;
    let mut num_mismatches = 0usize;
    let mut num_results = 0usize;
    for table in &cluster.tables {
        let mut printed_table_name = false;
        for tablet in &table.tablets {
            let Some(replica_results) = checksums.get(&tablet.id) else {
                continue;
            };
            if !printed_table_name {
                printed_table_name = true;
                output.out_line("-----------------------");
                output.out_line(&table.name);
                output.out_line("-----------------------");
            }
            let mut first_checksum: Option<u64> = None;
            for (replica_uuid, result) in replica_results {
                let ts = &cluster.tablet_servers[replica_uuid];
                let status_str = match result {
                    Ok(checksum) => format!("Checksum: {}", checksum),
                    Err(e) => format!("Error: {}", e),
                };
                output.out_line(&format!(
                    "T {} P {} ({}): {}",
                    tablet.id,
                    ts.uuid(),
                    ts.address(),
                    status_str
                ));
                match result {
                    Err(_) => num_errors += 1,
                    Ok(checksum) => match first_checksum {
                        None => first_checksum = Some(*checksum),
                        Some(first) if *checksum != first => {
                            num_mismatches += 1;
                            output.error(&format!(
                                ">> Mismatch found in table {} tablet {}",
                                table.name, tablet.id
                            ));
                        }
                        Some(_) => {}
                    },
                }
                num_results += 1;
            }
        }
        if printed_table_name {
            output.out_line("");
        }
    }

    if num_results != num_tablet_replicas {
        assert!(
            timed_out,
            "only got {} out of {} replica results",
            num_results, num_tablet_replicas
        );
        return Err(CheckError::TimedOut(format!(
            "checksum scan did not complete within {}s: received results for {} out of {} expected replicas",
            options.timeout.as_secs(),
            num_results,
            num_tablet_replicas
        )));
    }
    if num_mismatches != 0 {
        return Err(CheckError::Corruption(format!(
            "{} checksum mismatches were detected",
            num_mismatches
        )));
    }
    if num_errors != 0 {
        return Err(CheckError::Aborted(format!(
            "{} errors were detected",
            num_errors
        )));
    }

    Ok(())
}
