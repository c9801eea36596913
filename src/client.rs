//! Client seams for the master and tablet-server RPC surfaces.
//!
//! The checker core only ever talks to these traits; `grpc` provides the
//! production implementations and the test suite provides scripted mocks.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::checksum::ChecksumOptions;
use crate::cluster::{Tablet, TsInfo};

/// Error types for master and tablet-server RPC operations.
#[derive(Debug, Error, Clone)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("malformed response: {0}")]
    Protocol(String),

    #[error("scan failed: {0}")]
    Scan(String),
}

impl From<tonic::transport::Error> for ClientError {
    fn from(e: tonic::transport::Error) -> Self {
        ClientError::Connection(e.to_string())
    }
}

impl From<tonic::Status> for ClientError {
    fn from(e: tonic::Status) -> Self {
        ClientError::Rpc(e.to_string())
    }
}

/// Listing of one table as the master reports it (placement comes separately
/// from `list_tablets`).
#[derive(Debug, Clone)]
pub struct TableListing {
    pub name: String,
    pub schema: Bytes,
    pub num_replicas: u32,
}

/// Interim progress of one checksum scan: deltas since the previous event.
#[derive(Debug, Clone, Copy)]
pub struct ScanProgress {
    pub delta_rows: i64,
    pub delta_bytes: i64,
}

/// The master's metadata surface.
#[async_trait]
pub trait MasterClient: Send + Sync {
    /// Establish (or verify) connectivity to the master.
    async fn connect(&self) -> Result<(), ClientError>;

    async fn list_tables(&self) -> Result<Vec<TableListing>, ClientError>;

    /// One live client handle per tablet server in the directory.
    async fn list_tablet_servers(&self) -> Result<Vec<Arc<dyn TabletServerClient>>, ClientError>;

    async fn list_tablets(&self, table_name: &str) -> Result<Vec<Tablet>, ClientError>;
}

/// One tablet server's surface: identity, state fetch, and checksum scans.
#[async_trait]
pub trait TabletServerClient: Send + Sync {
    /// Permanent uuid of this server.
    fn uuid(&self) -> &str;

    /// Address the server serves from.
    fn address(&self) -> &str;

    /// Fetch the server's full per-tablet report map and current timestamp.
    async fn fetch_info(&self) -> Result<TsInfo, ClientError>;

    /// Run one checksum scan over the replica of `tablet_id` hosted here.
    /// Progress deltas are emitted on `progress` while the scan runs; the
    /// returned value is the final checksum. The scan observes
    /// `options.use_snapshot` / `options.snapshot_timestamp`.
    async fn checksum_scan(
        &self,
        tablet_id: &str,
        schema: Bytes,
        options: &ChecksumOptions,
        progress: mpsc::UnboundedSender<ScanProgress>,
    ) -> Result<u64, ClientError>;
}
