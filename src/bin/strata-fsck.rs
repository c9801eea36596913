//! Cluster consistency checker for Strata tablet storage clusters.
//!
//! Runs the metadata health check against a live cluster and, with
//! `--checksum-scan`, a fleet-wide data consistency check. Exits zero only
//! when every phase passes.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use strata_fsck::check::{CheckError, ClusterCheck};
use strata_fsck::checksum::ChecksumOptions;
use strata_fsck::grpc::RemoteMasterClient;
use strata_fsck::output::OutputSink;
use strata_fsck::settings::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "strata-fsck")]
#[command(about = "Consistency checker for Strata tablet storage clusters")]
#[command(version)]
struct Args {
    /// Master address (e.g. http://localhost:7150)
    #[arg(long, short = 'm', default_value = "http://localhost:7150")]
    master_address: String,

    /// Only check tables whose name matches one of these globs (repeatable)
    #[arg(long = "tables")]
    tables: Vec<String>,

    /// Only check tablets whose id matches one of these globs (repeatable)
    #[arg(long = "tablets")]
    tablets: Vec<String>,

    /// Also run checksum scans over every selected replica
    #[arg(long)]
    checksum_scan: bool,

    /// Maximum total seconds to wait for checksum scans to complete
    #[arg(long)]
    checksum_timeout_sec: Option<u64>,

    /// Number of concurrent checksum scans to execute per tablet server
    #[arg(long)]
    checksum_scan_concurrency: Option<usize>,

    /// Whether the checksum scanner should use a snapshot scan
    #[arg(long)]
    checksum_snapshot: Option<bool>,

    /// Timestamp to use for snapshot checksum scans; 0 uses the current
    /// timestamp of a tablet server involved in the scan
    #[arg(long)]
    checksum_snapshot_timestamp: Option<u64>,

    /// Number of tablet servers to fetch replica info from in parallel
    #[arg(long)]
    fetch_replica_info_concurrency: Option<usize>,

    /// Skip warning about tablets whose replica count differs from the
    /// table's configured replication factor
    #[arg(long)]
    no_check_replica_count: bool,

    /// Path to a TOML config file with defaults for these knobs
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    strata_fsck::trace::init();
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = AppConfig::load(args.config.as_deref())?;

    let checksum_options = ChecksumOptions {
        timeout: Duration::from_secs(
            args.checksum_timeout_sec.unwrap_or(config.checksum_timeout_sec),
        ),
        scan_concurrency: args
            .checksum_scan_concurrency
            .unwrap_or(config.checksum_scan_concurrency),
        use_snapshot: args.checksum_snapshot.unwrap_or(config.checksum_snapshot),
        snapshot_timestamp: args
            .checksum_snapshot_timestamp
            .unwrap_or(config.checksum_snapshot_timestamp),
        ..ChecksumOptions::default()
    };

    let output = OutputSink::stdio();
    let master = Arc::new(RemoteMasterClient::new(&args.master_address));
    let mut check = ClusterCheck::new(master, output.clone());
    check.set_table_filters(args.tables);
    check.set_tablet_id_filters(args.tablets);
    check.set_check_replica_count(!args.no_check_replica_count);
    check.set_fetch_replica_info_concurrency(
        args.fetch_replica_info_concurrency
            .unwrap_or(config.fetch_replica_info_concurrency),
    );

    let mut all_ok = true;

    // Without the master there is nothing else to check.
    if let Err(e) = check.check_master_running().await {
        output.error(&format!("Master connectivity check: {}", e));
        return Ok(ExitCode::FAILURE);
    }
    if let Err(e) = check.fetch_table_and_tablet_info().await {
        output.error(&format!("Fetching table and tablet info: {}", e));
        return Ok(ExitCode::FAILURE);
    }

    // Unreachable tablet servers are non-fatal here: the verifier reports
    // their replicas, and the exit code aggregates across phases.
    if let Err(e) = check.fetch_info_from_tablet_servers().await {
        report_phase_error(&output, "Fetching info from tablet servers", &e);
        all_ok = false;
    }

    if let Err(e) = check.check_tables_consistency() {
        report_phase_error(&output, "Table metadata check", &e);
        all_ok = false;
    }

    if args.checksum_scan {
        if let Err(e) = check.checksum_data(&checksum_options).await {
            report_phase_error(&output, "Checksum scan", &e);
            all_ok = false;
        }
    }

    if all_ok {
        output.info("OK");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn report_phase_error(output: &OutputSink, phase: &str, e: &CheckError) {
    output.error(&format!("{}: {}", phase, e));
}
