//! Compiled stream (layer 4) configuration of a TransportServer.

use std::collections::BTreeMap;

use serde::Serialize;

use super::version2::UpstreamLabels;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TransportServerConfig {
    pub server: StreamServer,
    pub upstreams: Vec<StreamUpstream>,
    pub stream_snippets: Vec<String>,
    pub match_: Option<Match>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StreamUpstream {
    pub name: String,
    pub servers: Vec<StreamUpstreamServer>,
    pub backup_servers: Vec<StreamUpstreamBackupServer>,
    pub upstream_labels: UpstreamLabels,
    pub load_balancing_method: String,
    pub resolve: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamUpstreamServer {
    pub address: String,
    pub max_fails: i32,
    pub fail_timeout: String,
    pub max_connections: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamUpstreamBackupServer {
    pub address: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StreamServer {
    pub tls_passthrough: bool,
    pub unix_socket: String,
    pub port: i32,
    pub udp: bool,
    pub status_zone: String,
    pub proxy_requests: Option<i32>,
    pub proxy_responses: Option<i32>,
    pub proxy_pass: String,
    pub name: String,
    pub namespace: String,
    pub proxy_timeout: String,
    pub proxy_connect_timeout: String,
    pub proxy_next_upstream: bool,
    pub proxy_next_upstream_timeout: String,
    pub proxy_next_upstream_tries: i32,
    pub health_check: Option<StreamHealthCheck>,
    pub server_snippets: Vec<String>,
    pub ssl: Option<StreamSsl>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamSsl {
    pub enabled: bool,
    pub certificate: String,
    pub certificate_key: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamHealthCheck {
    pub enabled: bool,
    pub interval: String,
    pub port: i32,
    pub passes: i32,
    pub jitter: String,
    pub fails: i32,
    pub timeout: String,
    pub match_: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Match {
    pub name: String,
    pub send: String,
    pub expect_regex_modifier: String,
    pub expect: String,
}

/// SNI host to unix socket of every TLS passthrough TransportServer.
pub type TlsPassthroughHostsConfig = BTreeMap<String, String>;
