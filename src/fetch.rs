//! Fleet fetch: populate the cluster model from the master and the fleet.
//!
//! The master calls are serialized; only the per-server probe fans out, with
//! a semaphore bounding how many servers are hit at once.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tracing::debug;

use crate::check::CheckError;
use crate::client::MasterClient;
use crate::cluster::{Cluster, Table, TabletServer};
use crate::output::OutputSink;

/// Serialized metadata download: table list, server directory, and each
/// table's tablet list with replica placement. Fails fast if the master is
/// unreachable or the directory is empty.
pub async fn fetch_table_and_tablet_info(master: &dyn MasterClient) -> Result<Cluster, CheckError> {
    master.connect().await?;

    let listings = master.list_tables().await?;
    let server_clients = master.list_tablet_servers().await?;

    let mut tablet_servers = BTreeMap::new();
    for client in server_clients {
        let uuid = client.uuid().to_string();
        tablet_servers.insert(uuid, TabletServer::new(client));
    }
    if tablet_servers.is_empty() {
        return Err(CheckError::NotFound("no tablet servers found".to_string()));
    }

    let mut tables = Vec::with_capacity(listings.len());
    for listing in listings {
        debug!(table = %listing.name, "retrieving tablet list");
        let tablets = master.list_tablets(&listing.name).await?;
        tables.push(Table {
            name: listing.name,
            schema: listing.schema,
            num_replicas: listing.num_replicas,
            tablets,
        });
    }

    Ok(Cluster {
        tables,
        tablet_servers,
    })
}

/// Parallel fan-out probing every tablet server, at most `concurrency` at a
/// time. Unreachable servers are recorded as such and reported; the caller
/// receives `NetworkError` while the cluster keeps the partial state, which
/// the verifier knows how to read.
pub async fn fetch_info_from_tablet_servers(
    cluster: &mut Cluster,
    concurrency: usize,
    output: &OutputSink,
) -> Result<(), CheckError> {
    let servers_count = cluster.tablet_servers.len();
    debug!(servers = servers_count, "fetching info from all tablet servers");

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let (tx, mut rx) = mpsc::unbounded_channel();
    for (uuid, ts) in &cluster.tablet_servers {
        let client = Arc::clone(ts.client());
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();
        let uuid = uuid.clone();
        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            debug!(ts = %uuid, "connecting to tablet server");
            let result = client.fetch_info().await;
            let _ = tx.send((uuid, result));
        });
    }
    drop(tx);

    let mut bad_servers = 0usize;
    while let Some((uuid, result)) = rx.recv().await {
        let ts = cluster
            .tablet_servers
            .get_mut(&uuid)
            .expect("fetch result for a server missing from the directory");
        match result {
            Ok(info) => {
                debug!(ts = %uuid, tablets = info.tablets.len(), "connected to tablet server");
                ts.record_fetch(info);
            }
            Err(e) => {
                output.warn(&format!("Unable to connect to tablet server {}: {}", ts, e));
                ts.record_unreachable();
                bad_servers += 1;
            }
        }
    }

    if bad_servers == 0 {
        output.info(&format!(
            "Fetched info from all {} tablet servers",
            servers_count
        ));
        Ok(())
    } else {
        output.warn(&format!(
            "Fetched info from {} tablet servers, {} weren't reachable",
            servers_count - bad_servers,
            bad_servers
        ));
        Err(CheckError::Network(format!(
            "{} of {} tablet servers were unreachable",
            bad_servers, servers_count
        )))
    }
}
