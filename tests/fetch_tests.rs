//! Fleet-fetch behavior: fail-fast on the master, partial-state tolerance on
//! the fleet.


use strata_fsck::check::{CheckError, ClusterCheck};
use strata_fsck::cluster::TabletState;
use strata_fsck::output::OutputSink;

use test_helpers::{leader, tablet, text, MockMaster, MockTabletServer};

#[strata_fsck::test]
async fn unreachable_master_fails_fast() {
    let master = MockMaster::new().unreachable().build();
    let (output, _out, _err) = OutputSink::capture();
    let mut check = ClusterCheck::new(master, output);

    let connect_err = check.check_master_running().await.unwrap_err();
    assert!(matches!(connect_err, CheckError::Client(_)));

    let fetch_err = check.fetch_table_and_tablet_info().await.unwrap_err();
    assert!(matches!(fetch_err, CheckError::Client(_)));
}

#[strata_fsck::test]
async fn empty_tablet_server_directory_is_not_found() {
    let master = MockMaster::new()
        .table("t1", 1, vec![tablet("abc", vec![leader("u1")])])
        .build();
    let (output, _out, _err) = OutputSink::capture();
    let mut check = ClusterCheck::new(master, output);

    let result = check.fetch_table_and_tablet_info().await.unwrap_err();
    match result {
        CheckError::NotFound(msg) => assert!(msg.contains("no tablet servers"), "{}", msg),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[strata_fsck::test]
async fn full_fleet_fetch_reports_success() {
    let u1 = MockTabletServer::builder("u1")
        .tablet("abc", TabletState::Running)
        .build();
    let u2 = MockTabletServer::builder("u2")
        .tablet("abc", TabletState::Running)
        .build();
    let master = MockMaster::new()
        .table("t1", 2, vec![tablet("abc", vec![leader("u1"), test_helpers::follower("u2")])])
        .server(&u1)
        .server(&u2)
        .build();

    let (output, _out, err) = OutputSink::capture();
    let mut check = ClusterCheck::new(master, output);
    check.fetch_table_and_tablet_info().await.expect("metadata");
    check
        .fetch_info_from_tablet_servers()
        .await
        .expect("everything reachable");

    assert!(text(&err).contains("INFO: Fetched info from all 2 tablet servers"));
    let cluster = check.cluster();
    assert!(cluster.tablet_servers["u1"].is_healthy());
    assert!(cluster.tablet_servers["u2"].is_healthy());
}

#[strata_fsck::test]
async fn partial_fetch_keeps_partial_state() {
    let u1 = MockTabletServer::builder("u1")
        .tablet("abc", TabletState::Running)
        .build();
    let u2 = MockTabletServer::builder("u2").unreachable().build();
    let master = MockMaster::new()
        .table("t1", 2, vec![tablet("abc", vec![leader("u1"), test_helpers::follower("u2")])])
        .server(&u1)
        .server(&u2)
        .build();

    let (output, _out, err) = OutputSink::capture();
    let mut check = ClusterCheck::new(master, output);
    check.fetch_table_and_tablet_info().await.expect("metadata");
    let result = check.fetch_info_from_tablet_servers().await.unwrap_err();
    assert!(matches!(result, CheckError::Network(_)));

    // The reachable server's state is still in the snapshot.
    let cluster = check.cluster();
    assert!(cluster.tablet_servers["u1"].is_healthy());
    assert!(!cluster.tablet_servers["u2"].is_healthy());
    assert_eq!(
        cluster.tablet_servers["u1"].replica_state("abc"),
        TabletState::Running
    );

    let err_text = text(&err);
    assert!(err_text.contains("WARNING: Unable to connect to tablet server u2"));
    assert!(err_text.contains("1 weren't reachable"));
}

#[strata_fsck::test]
async fn fetch_respects_tiny_concurrency() {
    // With a pool width of 1 the fan-out still probes every server.
    let u1 = MockTabletServer::builder("u1").build();
    let u2 = MockTabletServer::builder("u2").build();
    let u3 = MockTabletServer::builder("u3").build();
    let master = MockMaster::new()
        .table("t1", 3, Vec::new())
        .server(&u1)
        .server(&u2)
        .server(&u3)
        .build();

    let (output, _out, err) = OutputSink::capture();
    let mut check = ClusterCheck::new(master, output);
    check.set_fetch_replica_info_concurrency(1);
    check.fetch_table_and_tablet_info().await.expect("metadata");
    check
        .fetch_info_from_tablet_servers()
        .await
        .expect("all reachable");
    assert!(text(&err).contains("Fetched info from all 3 tablet servers"));
}
