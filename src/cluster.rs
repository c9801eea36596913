//! In-memory model of the cluster under check.
//!
//! Built once by `fetch` and frozen before verification or checksum scans
//! run: tables own their tablets, tablets own their replica placements, and
//! the tablet-server directory pairs each server's live client handle with
//! whatever state was fetched from it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::client::TabletServerClient;

/// Consensus role of a replica, as reported by the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaRole {
    Leader,
    Follower,
    /// Non-voting participant (or any role the master reports that is
    /// neither leader nor follower).
    Learner,
}

impl ReplicaRole {
    pub fn is_leader(self) -> bool {
        self == ReplicaRole::Leader
    }

    pub fn is_follower(self) -> bool {
        self == ReplicaRole::Follower
    }
}

/// One copy of a tablet, placed on the tablet server with uuid `ts_uuid`.
#[derive(Debug, Clone)]
pub struct Replica {
    pub ts_uuid: String,
    pub role: ReplicaRole,
}

#[derive(Debug, Clone)]
pub struct Tablet {
    pub id: String,
    pub replicas: Vec<Replica>,
}

#[derive(Clone)]
pub struct Table {
    pub name: String,
    /// Opaque schema blob, forwarded verbatim when starting a scan.
    pub schema: Bytes,
    /// Desired replication factor.
    pub num_replicas: u32,
    pub tablets: Vec<Tablet>,
}

/// Local state of a tablet replica as reported by its hosting server. Only
/// `Running` counts as healthy serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabletState {
    Unknown,
    Bootstrapping,
    Running,
    Stopped,
    Failed,
    Tombstoned,
}

impl fmt::Display for TabletState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TabletState::Unknown => "UNKNOWN",
            TabletState::Bootstrapping => "BOOTSTRAPPING",
            TabletState::Running => "RUNNING",
            TabletState::Stopped => "STOPPED",
            TabletState::Failed => "FAILED",
            TabletState::Tombstoned => "TOMBSTONED",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a replica's on-disk data, independent of its serving state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabletDataState {
    Unknown,
    Ready,
    Copying,
    Deleted,
}

impl fmt::Display for TabletDataState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TabletDataState::Unknown => "UNKNOWN",
            TabletDataState::Ready => "READY",
            TabletDataState::Copying => "COPYING",
            TabletDataState::Deleted => "DELETED",
        };
        f.write_str(name)
    }
}

/// One entry of a fetched server's per-tablet report map.
#[derive(Debug, Clone)]
pub struct TabletReport {
    pub state: TabletState,
    pub last_status: String,
    pub data_state: TabletDataState,
}

/// Everything a tablet server reports about itself in one fetch.
#[derive(Debug, Clone, Default)]
pub struct TsInfo {
    pub tablets: HashMap<String, TabletReport>,
    /// The server's current hybrid timestamp, usable for snapshot scans.
    pub current_timestamp: u64,
}

/// Fetch lifecycle of a directory entry.
#[derive(Debug, Clone)]
pub enum FetchState {
    Unfetched,
    Fetched(TsInfo),
    Unreachable,
}

/// Directory entry for one tablet server: the live client handle plus the
/// state fetched from it. The fetched state is recorded exactly once.
pub struct TabletServer {
    client: Arc<dyn TabletServerClient>,
    fetch: FetchState,
}

impl TabletServer {
    pub fn new(client: Arc<dyn TabletServerClient>) -> Self {
        Self {
            client,
            fetch: FetchState::Unfetched,
        }
    }

    pub fn uuid(&self) -> &str {
        self.client.uuid()
    }

    pub fn address(&self) -> &str {
        self.client.address()
    }

    pub fn client(&self) -> &Arc<dyn TabletServerClient> {
        &self.client
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.fetch, FetchState::Fetched(_))
    }

    pub fn record_fetch(&mut self, info: TsInfo) {
        assert!(
            matches!(self.fetch, FetchState::Unfetched),
            "tablet server {} fetched twice",
            self.uuid()
        );
        self.fetch = FetchState::Fetched(info);
    }

    pub fn record_unreachable(&mut self) {
        assert!(
            matches!(self.fetch, FetchState::Unfetched),
            "tablet server {} fetched twice",
            self.uuid()
        );
        self.fetch = FetchState::Unreachable;
    }

    fn info(&self) -> &TsInfo {
        match &self.fetch {
            FetchState::Fetched(info) => info,
            _ => panic!("tablet server {} was not fetched", self.uuid()),
        }
    }

    /// Local state of `tablet_id` on this server. Only valid once the server
    /// has been fetched; tablet ids the server never reported map to
    /// `Unknown`.
    pub fn replica_state(&self, tablet_id: &str) -> TabletState {
        self.info()
            .tablets
            .get(tablet_id)
            .map(|report| report.state)
            .unwrap_or(TabletState::Unknown)
    }

    /// Full report for `tablet_id`, if the server reported one.
    pub fn tablet_report(&self, tablet_id: &str) -> Option<&TabletReport> {
        self.info().tablets.get(tablet_id)
    }

    /// The server's current timestamp from its fetch. Only valid once fetched.
    pub fn current_timestamp(&self) -> u64 {
        self.info().current_timestamp
    }
}

impl fmt::Display for TabletServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.uuid(), self.address())
    }
}

/// Frozen view of the cluster: what the master knows, plus what every
/// reachable tablet server reported. The directory is keyed by uuid in an
/// ordered map so every traversal is deterministic.
pub struct Cluster {
    pub tables: Vec<Table>,
    pub tablet_servers: BTreeMap<String, TabletServer>,
}
