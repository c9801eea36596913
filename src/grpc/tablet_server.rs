use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use super::ensure_http_scheme;
use crate::checksum::ChecksumOptions;
use crate::client::{ClientError, ScanProgress, TabletServerClient};
use crate::cluster::{TabletDataState, TabletReport, TabletState, TsInfo};
use crate::pb;
use crate::pb::tablet_server_client::TabletServerClient as TabletServerRpc;

/// Tablet-server client over gRPC. One per directory entry; connects lazily.
pub struct RemoteTabletServerClient {
    uuid: String,
    address: String,
    endpoint: String,
    client: Mutex<Option<TabletServerRpc<Channel>>>,
}

impl RemoteTabletServerClient {
    pub fn new(uuid: String, address: String) -> Self {
        let endpoint = ensure_http_scheme(&address);
        Self {
            uuid,
            address,
            endpoint,
            client: Mutex::new(None),
        }
    }

    async fn client(&self) -> Result<TabletServerRpc<Channel>, ClientError> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        debug!(ts = %self.uuid, addr = %self.endpoint, "connecting to tablet server");
        let channel = Endpoint::new(self.endpoint.clone())?.connect().await?;
        let client = TabletServerRpc::new(channel);
        *guard = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl TabletServerClient for RemoteTabletServerClient {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn fetch_info(&self) -> Result<TsInfo, ClientError> {
        let mut client = self.client().await?;
        let resp = client
            .get_tablet_info(pb::GetTabletInfoRequest {})
            .await?
            .into_inner();
        let mut tablets = HashMap::with_capacity(resp.tablets.len());
        for status in resp.tablets {
            tablets.insert(
                status.tablet_id,
                TabletReport {
                    state: tablet_state(status.state),
                    last_status: status.last_status,
                    data_state: tablet_data_state(status.data_state),
                },
            );
        }
        Ok(TsInfo {
            tablets,
            current_timestamp: resp.current_timestamp,
        })
    }

    async fn checksum_scan(
        &self,
        tablet_id: &str,
        schema: Bytes,
        options: &ChecksumOptions,
        progress: mpsc::UnboundedSender<ScanProgress>,
    ) -> Result<u64, ClientError> {
        let mut client = self.client().await?;
        let request = pb::ChecksumScanRequest {
            tablet_id: tablet_id.to_string(),
            schema: schema.to_vec(),
            use_snapshot: options.use_snapshot,
            snapshot_timestamp: options.snapshot_timestamp,
        };
        let mut stream = client.checksum_scan(request).await?.into_inner();
        while let Some(event) = stream.message().await? {
            match event.event {
                Some(pb::checksum_scan_event::Event::Progress(p)) => {
                    let _ = progress.send(ScanProgress {
                        delta_rows: p.rows_summed,
                        delta_bytes: p.disk_bytes_summed,
                    });
                }
                Some(pb::checksum_scan_event::Event::Done(done)) => {
                    return Ok(done.checksum);
                }
                None => {}
            }
        }
        Err(ClientError::Protocol(format!(
            "checksum scan stream for tablet {} ended without a result",
            tablet_id
        )))
    }
}

fn tablet_state(state: i32) -> TabletState {
    match pb::TabletState::try_from(state) {
        Ok(pb::TabletState::Bootstrapping) => TabletState::Bootstrapping,
        Ok(pb::TabletState::Running) => TabletState::Running,
        Ok(pb::TabletState::Stopped) => TabletState::Stopped,
        Ok(pb::TabletState::Failed) => TabletState::Failed,
        Ok(pb::TabletState::Tombstoned) => TabletState::Tombstoned,
        _ => TabletState::Unknown,
    }
}

fn tablet_data_state(state: i32) -> TabletDataState {
    match pb::TabletDataState::try_from(state) {
        Ok(pb::TabletDataState::Ready) => TabletDataState::Ready,
        Ok(pb::TabletDataState::Copying) => TabletDataState::Copying,
        Ok(pb::TabletDataState::Deleted) => TabletDataState::Deleted,
        _ => TabletDataState::Unknown,
    }
}
