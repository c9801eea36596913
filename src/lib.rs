//! Consistency checker for Strata tablet storage clusters.
//!
//! A Strata cluster is a master plus a fleet of tablet servers hosting
//! replicated tablets. This crate checks two things about a running cluster:
//! that every tablet satisfies its replication contract (metadata health),
//! and that all replicas of a tablet hold identical data, as witnessed by
//! checksum scans (data consistency). See `check::ClusterCheck` for the
//! phase-by-phase driver the `strata-fsck` binary runs.

pub mod check;
pub mod checksum;
pub mod client;
pub mod cluster;
pub mod fetch;
pub mod filter;
pub mod grpc;
pub mod output;
pub mod reporter;
pub mod settings;
pub mod trace;
pub mod verify;

pub mod pb {
    tonic::include_proto!("strata.v1");
}

pub use strata_fsck_macros::test;
