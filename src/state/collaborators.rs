//! Interfaces of the components the Configurator drives: the process manager that owns the NGINX files,
//! the template renderer and the metrics label sinks. All calls are synchronous from the store's point of view.

use std::fmt::Display;

use super::metric_labels::LabelSets;
use crate::{
    nginx::{IngressNginxConfig, TlsPassthroughHostsConfig, TransportServerConfig, VirtualServerConfig},
    Result,
};

pub const TLS_SECRET_FILE_MODE: u32 = 0o600;
pub const JWK_SECRET_FILE_MODE: u32 = 0o644;
pub const HTPASSWD_SECRET_FILE_MODE: u32 = 0o644;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReloadReason {
    EndpointsUpdate,
    OtherUpdate,
}

impl Display for ReloadReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReloadReason::EndpointsUpdate => write!(f, "endpoints update"),
            ReloadReason::OtherUpdate => write!(f, "configuration update"),
        }
    }
}

/// Per server parameters sent along with the addresses of an upstream pushed through the Plus API.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerOptions {
    pub max_fails: i32,
    pub max_conns: i32,
    pub fail_timeout: String,
    pub slow_start: String,
}

/// Owns the NGINX configuration and secret files and the running NGINX process.
pub trait ConfigSink: Send {
    /// Writes an http configuration file and reports whether its content changed.
    fn write_config(&mut self, name: &str, content: &[u8]) -> bool;
    fn delete_config(&mut self, name: &str);
    fn write_stream_config(&mut self, name: &str, content: &[u8]) -> bool;
    fn delete_stream_config(&mut self, name: &str);
    fn write_tls_passthrough_hosts_config(&mut self, content: &[u8]) -> bool;
    fn delete_key_val_state_files(&mut self, virtual_server: &str);
    /// Writes a secret file and returns its path.
    fn create_secret_file(&mut self, name: &str, content: &[u8], mode: u32) -> String;
    fn delete_secret_file(&mut self, name: &str);
    /// Path a secret with the given file name is written to.
    fn secret_file_name(&self, name: &str) -> String;
    fn reload(&mut self, reason: ReloadReason) -> Result<()>;
    fn upsert_key_value(&mut self, zone: &str, key: &str, value: &str);
    fn push_dynamic_upstream(&mut self, upstream: &str, servers: &[String], options: &ServerOptions) -> Result<()>;
    fn push_dynamic_stream_upstream(&mut self, upstream: &str, servers: &[String]) -> Result<()>;
}

/// Turns compiled configuration into NGINX configuration text.
pub trait TemplateRenderer: Send {
    fn render_ingress(&self, config: &IngressNginxConfig) -> Result<Vec<u8>>;
    fn render_virtual_server(&self, config: &VirtualServerConfig) -> Result<Vec<u8>>;
    fn render_transport_server(&self, config: &TransportServerConfig) -> Result<Vec<u8>>;
    fn render_tls_passthrough_hosts(&self, config: &TlsPassthroughHostsConfig) -> Result<Vec<u8>>;
}

/// Receives the variable labels of upstream, peer and server zone metrics.
/// HTTP and stream metrics are reported through separate instances.
pub trait LabelUpdater: Send {
    fn update_upstream_labels(&mut self, labels: &LabelSets);
    fn delete_upstream_labels(&mut self, keys: &[String]);
    fn update_peer_labels(&mut self, labels: &LabelSets);
    fn delete_peer_labels(&mut self, keys: &[String]);
    fn update_zone_labels(&mut self, labels: &LabelSets);
    fn delete_zone_labels(&mut self, keys: &[String]);
}

/// Label sink for setups without metrics.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLabelUpdater;

impl LabelUpdater for NoopLabelUpdater {
    fn update_upstream_labels(&mut self, _: &LabelSets) {}
    fn delete_upstream_labels(&mut self, _: &[String]) {}
    fn update_peer_labels(&mut self, _: &LabelSets) {}
    fn delete_peer_labels(&mut self, _: &[String]) {}
    fn update_zone_labels(&mut self, _: &LabelSets) {}
    fn delete_zone_labels(&mut self, _: &[String]) {}
}
