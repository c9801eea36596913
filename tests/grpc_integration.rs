//! End-to-end checks through the gRPC clients against in-process mock
//! services on loopback listeners.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::transport::Server;
use tonic::{Request, Response, Status};

use strata_fsck::check::{CheckError, ClusterCheck};
use strata_fsck::checksum::ChecksumOptions;
use strata_fsck::grpc::RemoteMasterClient;
use strata_fsck::output::OutputSink;
use strata_fsck::pb;

/// Tablet server service hosting a fixed set of tablets, each with a fixed
/// checksum answer.
struct TestTabletServer {
    tablets: Vec<(String, u64)>,
    timestamp: u64,
}

#[tonic::async_trait]
impl pb::tablet_server_server::TabletServer for TestTabletServer {
    async fn get_tablet_info(
        &self,
        _request: Request<pb::GetTabletInfoRequest>,
    ) -> Result<Response<pb::GetTabletInfoResponse>, Status> {
        let tablets = self
            .tablets
            .iter()
            .map(|(id, _)| pb::TabletStatus {
                tablet_id: id.clone(),
                state: pb::TabletState::Running as i32,
                last_status: String::new(),
                data_state: pb::TabletDataState::Ready as i32,
            })
            .collect();
        Ok(Response::new(pb::GetTabletInfoResponse {
            tablets,
            current_timestamp: self.timestamp,
        }))
    }

    type ChecksumScanStream = ReceiverStream<Result<pb::ChecksumScanEvent, Status>>;

    async fn checksum_scan(
        &self,
        request: Request<pb::ChecksumScanRequest>,
    ) -> Result<Response<Self::ChecksumScanStream>, Status> {
        let request = request.into_inner();
        let checksum = self
            .tablets
            .iter()
            .find(|(id, _)| *id == request.tablet_id)
            .map(|(_, checksum)| *checksum)
            .ok_or_else(|| Status::not_found("no such tablet"))?;

        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let progress = pb::ChecksumScanEvent {
                event: Some(pb::checksum_scan_event::Event::Progress(
                    pb::checksum_scan_event::Progress {
                        rows_summed: 10,
                        disk_bytes_summed: 1024,
                    },
                )),
            };
            let done = pb::ChecksumScanEvent {
                event: Some(pb::checksum_scan_event::Event::Done(
                    pb::checksum_scan_event::Done { checksum },
                )),
            };
            let _ = tx.send(Ok(progress)).await;
            let _ = tx.send(Ok(done)).await;
        });
        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

struct TestMaster {
    tables: Vec<pb::TableEntry>,
    tablets: HashMap<String, Vec<pb::TabletEntry>>,
    tablet_servers: Vec<pb::TabletServerEntry>,
}

#[tonic::async_trait]
impl pb::master_server::Master for TestMaster {
    async fn ping(
        &self,
        _request: Request<pb::PingRequest>,
    ) -> Result<Response<pb::PingResponse>, Status> {
        Ok(Response::new(pb::PingResponse {}))
    }

    async fn list_tables(
        &self,
        _request: Request<pb::ListTablesRequest>,
    ) -> Result<Response<pb::ListTablesResponse>, Status> {
        Ok(Response::new(pb::ListTablesResponse {
            tables: self.tables.clone(),
        }))
    }

    async fn list_tablet_servers(
        &self,
        _request: Request<pb::ListTabletServersRequest>,
    ) -> Result<Response<pb::ListTabletServersResponse>, Status> {
        Ok(Response::new(pb::ListTabletServersResponse {
            tablet_servers: self.tablet_servers.clone(),
        }))
    }

    async fn list_tablets(
        &self,
        request: Request<pb::ListTabletsRequest>,
    ) -> Result<Response<pb::ListTabletsResponse>, Status> {
        let table_name = request.into_inner().table_name;
        let tablets = self
            .tablets
            .get(&table_name)
            .cloned()
            .ok_or_else(|| Status::not_found("no such table"))?;
        Ok(Response::new(pb::ListTabletsResponse { tablets }))
    }
}

async fn serve_tablet_server(tablets: Vec<(&str, u64)>, timestamp: u64) -> SocketAddr {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind loopback listener");
    let addr = listener.local_addr().expect("local addr");
    let service = pb::tablet_server_server::TabletServerServer::new(TestTabletServer {
        tablets: tablets
            .into_iter()
            .map(|(id, checksum)| (id.to_string(), checksum))
            .collect(),
        timestamp,
    });
    tokio::spawn(async move {
        let _ = Server::builder()
            .add_service(service)
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await;
    });
    addr
}

async fn serve_master(master: TestMaster) -> SocketAddr {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind loopback listener");
    let addr = listener.local_addr().expect("local addr");
    let service = pb::master_server::MasterServer::new(master);
    tokio::spawn(async move {
        let _ = Server::builder()
            .add_service(service)
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await;
    });
    addr
}

fn replica(ts_uuid: &str, role: pb::ReplicaRole) -> pb::ReplicaEntry {
    pb::ReplicaEntry {
        ts_uuid: ts_uuid.to_string(),
        role: role as i32,
    }
}

fn text(buf: &Arc<std::sync::Mutex<Vec<u8>>>) -> String {
    String::from_utf8(buf.lock().unwrap().clone()).expect("sink output was not utf-8")
}

/// One table, one tablet, three replicas, with the given per-server checksum
/// answers. Returns the driver plus the captured sinks.
async fn three_replica_cluster(
    checksums: [u64; 3],
) -> (
    ClusterCheck,
    Arc<std::sync::Mutex<Vec<u8>>>,
    Arc<std::sync::Mutex<Vec<u8>>>,
) {
    let ts1 = serve_tablet_server(vec![("abc", checksums[0])], 5000).await;
    let ts2 = serve_tablet_server(vec![("abc", checksums[1])], 6000).await;
    let ts3 = serve_tablet_server(vec![("abc", checksums[2])], 7000).await;

    let master_addr = serve_master(TestMaster {
        tables: vec![pb::TableEntry {
            name: "t1".to_string(),
            schema: b"test-schema".to_vec(),
            num_replicas: 3,
        }],
        tablets: HashMap::from([(
            "t1".to_string(),
            vec![pb::TabletEntry {
                id: "abc".to_string(),
                replicas: vec![
                    replica("u1", pb::ReplicaRole::Leader),
                    replica("u2", pb::ReplicaRole::Follower),
                    replica("u3", pb::ReplicaRole::Follower),
                ],
            }],
        )]),
        tablet_servers: vec![
            pb::TabletServerEntry {
                uuid: "u1".to_string(),
                address: ts1.to_string(),
            },
            pb::TabletServerEntry {
                uuid: "u2".to_string(),
                address: ts2.to_string(),
            },
            pb::TabletServerEntry {
                uuid: "u3".to_string(),
                address: ts3.to_string(),
            },
        ],
    })
    .await;

    let master = Arc::new(RemoteMasterClient::new(&format!("http://{}", master_addr)));
    let (output, out, err) = OutputSink::capture();
    (ClusterCheck::new(master, output), out, err)
}

#[strata_fsck::test]
async fn clean_cluster_end_to_end() {
    let (mut check, out, err) = three_replica_cluster([42, 42, 42]).await;

    check.check_master_running().await.expect("master reachable");
    check
        .fetch_table_and_tablet_info()
        .await
        .expect("metadata fetch");
    check
        .fetch_info_from_tablet_servers()
        .await
        .expect("fleet reachable");
    check.check_tables_consistency().expect("metadata healthy");

    let options = ChecksumOptions {
        timeout: Duration::from_secs(30),
        ..ChecksumOptions::default()
    };
    check.checksum_data(&options).await.expect("checksums agree");

    assert_eq!(text(&out).matches("Checksum: 42").count(), 3);
    let err_text = text(&err);
    assert!(err_text.contains("INFO: Connected to the master"));
    assert!(err_text.contains("INFO: Fetched info from all 3 tablet servers"));
    // u1 leads the uuid-ordered directory, so its timestamp is chosen.
    assert!(err_text.contains("INFO: Using snapshot timestamp: 5000"));
}

#[strata_fsck::test]
async fn mismatch_end_to_end() {
    let (mut check, _out, err) = three_replica_cluster([100, 100, 101]).await;

    check
        .fetch_table_and_tablet_info()
        .await
        .expect("metadata fetch");
    check
        .fetch_info_from_tablet_servers()
        .await
        .expect("fleet reachable");

    let options = ChecksumOptions {
        timeout: Duration::from_secs(30),
        use_snapshot: false,
        ..ChecksumOptions::default()
    };
    let result = check.checksum_data(&options).await.unwrap_err();
    assert!(matches!(result, CheckError::Corruption(_)), "{:?}", result);
    assert!(text(&err).contains("ERROR: >> Mismatch found in table t1 tablet abc"));
}

#[strata_fsck::test]
async fn unreachable_fleet_member_end_to_end() {
    let ts1 = serve_tablet_server(vec![("abc", 1)], 5000).await;
    // u2's address points at a port nothing listens on.
    let dead = {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("bind throwaway listener");
        listener.local_addr().expect("local addr")
    };

    let master_addr = serve_master(TestMaster {
        tables: vec![pb::TableEntry {
            name: "t1".to_string(),
            schema: b"test-schema".to_vec(),
            num_replicas: 2,
        }],
        tablets: HashMap::from([(
            "t1".to_string(),
            vec![pb::TabletEntry {
                id: "abc".to_string(),
                replicas: vec![
                    replica("u1", pb::ReplicaRole::Leader),
                    replica("u2", pb::ReplicaRole::Follower),
                ],
            }],
        )]),
        tablet_servers: vec![
            pb::TabletServerEntry {
                uuid: "u1".to_string(),
                address: ts1.to_string(),
            },
            pb::TabletServerEntry {
                uuid: "u2".to_string(),
                address: dead.to_string(),
            },
        ],
    })
    .await;

    let master = Arc::new(RemoteMasterClient::new(&format!("http://{}", master_addr)));
    let (output, _out, err) = OutputSink::capture();
    let mut check = ClusterCheck::new(master, output);

    check
        .fetch_table_and_tablet_info()
        .await
        .expect("metadata fetch");
    let result = check.fetch_info_from_tablet_servers().await.unwrap_err();
    assert!(matches!(result, CheckError::Network(_)), "{:?}", result);

    // The verifier still reads the partial snapshot.
    let verify_err = check.check_tables_consistency().unwrap_err();
    assert!(matches!(verify_err, CheckError::Corruption(_)));
    assert!(text(&err).contains("but TS is unavailable"));
}
