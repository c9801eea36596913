//! Top-level check driver: runs the phases in order and owns the terminal
//! error taxonomy.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::checksum::{self, ChecksumOptions};
use crate::client::{ClientError, MasterClient};
use crate::cluster::Cluster;
use crate::fetch;
use crate::output::OutputSink;
use crate::verify;

/// Terminal classification of a check phase.
#[derive(Debug, Error)]
pub enum CheckError {
    /// No tablet servers in the directory, or no replicas match the filters.
    #[error("not found: {0}")]
    NotFound(String),

    /// One or more tablet servers were unreachable during fetch. The cluster
    /// keeps the partial state.
    #[error("network error: {0}")]
    Network(String),

    /// No healthy tablet server to resolve the snapshot timestamp from.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Metadata unhealthy, or checksum mismatches detected.
    #[error("corruption: {0}")]
    Corruption(String),

    /// The checksum deadline passed with results still outstanding.
    #[error("timed out: {0}")]
    TimedOut(String),

    /// Every scan returned, but at least one failed.
    #[error("aborted: {0}")]
    Aborted(String),

    /// Master RPC failure (connectivity or listing).
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Driver for one checker run against one cluster. Phases are separate
/// methods so the binary can report each outcome as it goes; they must run
/// in declaration order.
pub struct ClusterCheck {
    master: Arc<dyn MasterClient>,
    cluster: Option<Cluster>,
    table_filters: Vec<String>,
    tablet_id_filters: Vec<String>,
    check_replica_count: bool,
    fetch_replica_info_concurrency: usize,
    output: OutputSink,
}

impl ClusterCheck {
    pub fn new(master: Arc<dyn MasterClient>, output: OutputSink) -> Self {
        Self {
            master,
            cluster: None,
            table_filters: Vec::new(),
            tablet_id_filters: Vec::new(),
            check_replica_count: true,
            fetch_replica_info_concurrency: 20,
            output,
        }
    }

    /// Glob patterns selecting tables by name; empty selects everything.
    pub fn set_table_filters(&mut self, filters: Vec<String>) {
        self.table_filters = filters;
    }

    /// Glob patterns selecting tablets by id; empty selects everything.
    pub fn set_tablet_id_filters(&mut self, filters: Vec<String>) {
        self.tablet_id_filters = filters;
    }

    pub fn set_check_replica_count(&mut self, check: bool) {
        self.check_replica_count = check;
    }

    pub fn set_fetch_replica_info_concurrency(&mut self, concurrency: usize) {
        self.fetch_replica_info_concurrency = concurrency;
    }

    /// Is the master reachable at all?
    pub async fn check_master_running(&self) -> Result<(), CheckError> {
        debug!("connecting to the master");
        self.master.connect().await?;
        self.output.info("Connected to the master");
        Ok(())
    }

    /// Serialized metadata download from the master.
    pub async fn fetch_table_and_tablet_info(&mut self) -> Result<(), CheckError> {
        self.cluster = Some(fetch::fetch_table_and_tablet_info(self.master.as_ref()).await?);
        Ok(())
    }

    /// Bounded fan-out to the fleet. A `NetworkError` here still leaves a
    /// usable partial snapshot behind; later phases report the gaps.
    pub async fn fetch_info_from_tablet_servers(&mut self) -> Result<(), CheckError> {
        let concurrency = self.fetch_replica_info_concurrency;
        let cluster = self
            .cluster
            .as_mut()
            .expect("fetch_table_and_tablet_info did not run");
        fetch::fetch_info_from_tablet_servers(cluster, concurrency, &self.output).await
    }

    /// Metadata verification over the frozen snapshot.
    pub fn check_tables_consistency(&self) -> Result<(), CheckError> {
        verify::check_tables_consistency(
            self.cluster(),
            &self.table_filters,
            &self.tablet_id_filters,
            self.check_replica_count,
            &self.output,
        )
    }

    /// Fleet-wide checksum scans over the frozen snapshot.
    pub async fn checksum_data(&self, options: &ChecksumOptions) -> Result<(), CheckError> {
        checksum::checksum_data(
            self.cluster(),
            options,
            &self.table_filters,
            &self.tablet_id_filters,
            &self.output,
        )
        .await
    }

    /// The fetched snapshot. Panics if the fetch phases did not run.
    pub fn cluster(&self) -> &Cluster {
        self.cluster
            .as_ref()
            .expect("fetch_table_and_tablet_info did not run")
    }

    fn cluster_mut(&mut self) -> &mut Cluster {
        self.cluster
            .as_mut()
            .expect("fetch_table_and_tablet_info did not run")
    }
}
