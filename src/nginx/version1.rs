//! Compiled configuration of a regular or mergeable Ingress.

use std::collections::BTreeMap;

use serde::Serialize;

use super::version2::UpstreamLabels;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct IngressNginxConfig {
    pub upstreams: Vec<Upstream>,
    pub servers: Vec<Server>,
    pub keepalive: String,
    pub ingress: Ingress,
    pub limit_req_zones: Vec<LimitReqZone>,
}

/// Identity of the Ingress a configuration was generated for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Ingress {
    pub name: String,
    pub namespace: String,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Upstream {
    pub name: String,
    pub upstream_servers: Vec<UpstreamServer>,
    pub sticky_cookie: String,
    pub lb_method: String,
    pub queue: i64,
    pub queue_timeout: i64,
    pub upstream_zone_size: String,
    pub upstream_labels: UpstreamLabels,
}

/// Address OSS upstreams fall back to until endpoints are known.
pub const DEFAULT_UPSTREAM_SERVER: &str = "127.0.0.1:8181";

impl Upstream {
    pub fn with_default_server(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            upstream_zone_size: "256k".to_owned(),
            upstream_servers: vec![UpstreamServer {
                address: DEFAULT_UPSTREAM_SERVER.to_owned(),
                max_fails: 1,
                fail_timeout: "10s".to_owned(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UpstreamServer {
    pub address: String,
    pub max_fails: i32,
    pub max_conns: i32,
    pub fail_timeout: String,
    pub slow_start: String,
    pub resolve: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HealthCheck {
    pub upstream_name: String,
    pub fails: i32,
    pub interval: i32,
    pub passes: i32,
    pub uri: String,
    pub scheme: String,
    pub mandatory: bool,
    pub headers: BTreeMap<String, String>,
    pub time_out_seconds: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Server {
    pub name: String,
    pub server_tokens: String,
    pub locations: Vec<Location>,
    pub ssl: bool,
    pub ssl_certificate: String,
    pub ssl_certificate_key: String,
    pub ssl_reject_handshake: bool,
    pub tls_passthrough: bool,
    pub grpc_only: bool,
    pub status_zone: String,
    pub http2: bool,
    pub redirect_to_https: bool,
    pub ssl_redirect: bool,
    pub proxy_protocol: bool,
    pub hsts: bool,
    pub hsts_max_age: i64,
    pub hsts_include_subdomains: bool,
    pub hsts_behind_proxy: bool,
    pub proxy_hide_headers: Vec<String>,
    pub proxy_pass_headers: Vec<String>,
    pub health_checks: BTreeMap<String, HealthCheck>,
    pub real_ip_header: String,
    pub set_real_ip_from: Vec<String>,
    pub real_ip_recursive: bool,
    pub jwt_auth: Option<JwtAuth>,
    pub jwt_redirect_locations: Vec<JwtRedirectLocation>,
    pub basic_auth: Option<BasicAuth>,
    pub server_snippets: Vec<String>,
    pub ports: Vec<i32>,
    pub ssl_ports: Vec<i32>,
    pub app_protect_enable: String,
    pub app_protect_policy: String,
    pub app_protect_log_conf: Vec<String>,
    pub app_protect_log_enable: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct JwtAuth {
    pub key: String,
    pub realm: String,
    pub token: String,
    pub redirect_location_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct JwtRedirectLocation {
    pub name: String,
    pub login_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BasicAuth {
    pub secret: String,
    pub realm: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LimitReq {
    pub zone: String,
    pub burst: i32,
    pub delay: i32,
    pub no_delay: bool,
    pub reject_code: i32,
    pub dry_run: bool,
    pub log_level: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LimitReqZone {
    pub name: String,
    pub key: String,
    pub size: String,
    pub rate: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Location {
    pub path: String,
    pub upstream: Upstream,
    pub proxy_connect_timeout: String,
    pub proxy_read_timeout: String,
    pub proxy_send_timeout: String,
    pub client_max_body_size: String,
    pub websocket: bool,
    pub rewrite: String,
    pub ssl: bool,
    pub grpc: bool,
    pub proxy_buffering: bool,
    pub proxy_buffers: String,
    pub proxy_buffer_size: String,
    pub proxy_max_temp_file_size: String,
    pub proxy_ssl_name: String,
    pub jwt_auth: Option<JwtAuth>,
    pub basic_auth: Option<BasicAuth>,
    pub service_name: String,
    pub location_snippets: Vec<String>,
    pub minion_ingress: Option<Ingress>,
    pub limit_req: Option<LimitReq>,
}
