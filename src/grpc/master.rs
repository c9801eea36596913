use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use super::{ensure_http_scheme, RemoteTabletServerClient};
use crate::client::{ClientError, MasterClient, TableListing, TabletServerClient};
use crate::cluster::{Replica, ReplicaRole, Tablet};
use crate::pb;
use crate::pb::master_client::MasterClient as MasterRpc;

/// Master client over gRPC. Connects lazily on first use and caches the
/// channel for the rest of the run.
pub struct RemoteMasterClient {
    address: String,
    client: Mutex<Option<MasterRpc<Channel>>>,
}

impl RemoteMasterClient {
    pub fn new(address: &str) -> Self {
        Self {
            address: ensure_http_scheme(address),
            client: Mutex::new(None),
        }
    }

    async fn client(&self) -> Result<MasterRpc<Channel>, ClientError> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        debug!(addr = %self.address, "connecting to master");
        let channel = Endpoint::new(self.address.clone())?.connect().await?;
        let client = MasterRpc::new(channel);
        *guard = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl MasterClient for RemoteMasterClient {
    async fn connect(&self) -> Result<(), ClientError> {
        let mut client = self.client().await?;
        client.ping(pb::PingRequest {}).await?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableListing>, ClientError> {
        let mut client = self.client().await?;
        let resp = client.list_tables(pb::ListTablesRequest {}).await?.into_inner();
        Ok(resp
            .tables
            .into_iter()
            .map(|t| TableListing {
                name: t.name,
                schema: Bytes::from(t.schema),
                num_replicas: t.num_replicas,
            })
            .collect())
    }

    async fn list_tablet_servers(&self) -> Result<Vec<Arc<dyn TabletServerClient>>, ClientError> {
        let mut client = self.client().await?;
        let resp = client
            .list_tablet_servers(pb::ListTabletServersRequest {})
            .await?
            .into_inner();
        Ok(resp
            .tablet_servers
            .into_iter()
            .map(|entry| {
                Arc::new(RemoteTabletServerClient::new(entry.uuid, entry.address))
                    as Arc<dyn TabletServerClient>
            })
            .collect())
    }

    async fn list_tablets(&self, table_name: &str) -> Result<Vec<Tablet>, ClientError> {
        let mut client = self.client().await?;
        let resp = client
            .list_tablets(pb::ListTabletsRequest {
                table_name: table_name.to_string(),
            })
            .await?
            .into_inner();
        Ok(resp
            .tablets
            .into_iter()
            .map(|t| Tablet {
                id: t.id,
                replicas: t
                    .replicas
                    .into_iter()
                    .map(|r| Replica {
                        ts_uuid: r.ts_uuid,
                        role: replica_role(r.role),
                    })
                    .collect(),
            })
            .collect())
    }
}

fn replica_role(role: i32) -> ReplicaRole {
    match pb::ReplicaRole::try_from(role) {
        Ok(pb::ReplicaRole::Leader) => ReplicaRole::Leader,
        Ok(pb::ReplicaRole::Follower) => ReplicaRole::Follower,
        // Learners and anything the master reports that we don't model count
        // as non-voting.
        _ => ReplicaRole::Learner,
    }
}
