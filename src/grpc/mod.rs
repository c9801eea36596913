//! gRPC implementations of the client traits, over the cluster's public
//! `strata.v1` surface.

mod master;
mod tablet_server;

pub use master::RemoteMasterClient;
pub use tablet_server::RemoteTabletServerClient;

/// Ensure an address has the http:// scheme prefix tonic endpoints need.
pub(crate) fn ensure_http_scheme(addr: &str) -> String {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    }
}
