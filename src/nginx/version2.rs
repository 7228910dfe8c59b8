//! Compiled configuration of a VirtualServer and its VirtualServerRoutes.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VirtualServerConfig {
    pub upstreams: Vec<Upstream>,
    pub split_clients: Vec<SplitClient>,
    pub maps: Vec<Map>,
    pub status_matches: Vec<StatusMatch>,
    pub limit_req_zones: Vec<LimitReqZone>,
    pub http_snippets: Vec<String>,
    pub server: Server,
    pub key_val_zones: Vec<KeyValZone>,
    pub key_vals: Vec<KeyVal>,
    pub two_way_split_clients: Vec<TwoWaySplitClients>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UpstreamLabels {
    pub service: String,
    pub resource_type: String,
    pub resource_name: String,
    pub resource_namespace: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Upstream {
    pub name: String,
    pub servers: Vec<UpstreamServer>,
    pub backup_servers: Vec<UpstreamServer>,
    pub lb_method: String,
    pub resolve: bool,
    pub keepalive: i32,
    pub max_fails: i32,
    pub max_conns: i32,
    pub fail_timeout: String,
    pub upstream_zone_size: String,
    pub upstream_labels: UpstreamLabels,
    pub slow_start: String,
    pub queue: Option<Queue>,
    pub session_cookie: Option<SessionCookie>,
    pub ntlm: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UpstreamServer {
    pub address: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Queue {
    pub size: i32,
    pub timeout: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionCookie {
    pub enable: bool,
    pub name: String,
    pub path: String,
    pub expires: String,
    pub domain: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Server {
    pub server_name: String,
    pub status_zone: String,
    pub gunzip: bool,
    pub http_port: i32,
    pub https_port: i32,
    pub custom_listeners: bool,
    pub proxy_protocol: bool,
    pub ssl: Option<Ssl>,
    pub server_tokens: String,
    pub real_ip_header: String,
    pub set_real_ip_from: Vec<String>,
    pub real_ip_recursive: bool,
    pub snippets: Vec<String>,
    pub internal_redirect_locations: Vec<InternalRedirectLocation>,
    pub locations: Vec<Location>,
    pub return_locations: Vec<ReturnLocation>,
    pub health_checks: Vec<HealthCheck>,
    pub tls_redirect: Option<TlsRedirect>,
    pub error_page_locations: Vec<ErrorPageLocation>,
    pub tls_passthrough: bool,
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub limit_req_options: LimitReqOptions,
    pub limit_reqs: Vec<LimitReq>,
    pub jwt_auth: Option<JwtAuth>,
    pub jwt_auth_list: BTreeMap<String, JwtAuth>,
    pub jwks_auth_enabled: bool,
    pub basic_auth: Option<BasicAuth>,
    pub ingress_mtls: Option<IngressMtls>,
    pub egress_mtls: Option<EgressMtls>,
    pub oidc: Option<Oidc>,
    pub waf: Option<Waf>,
    pub policies_error_return: Option<Return>,
    pub vs_namespace: String,
    pub vs_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Ssl {
    pub http2: bool,
    pub certificate: String,
    pub certificate_key: String,
    pub reject_handshake: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TlsRedirect {
    pub code: i32,
    pub based_on: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Location {
    pub path: String,
    pub internal: bool,
    pub snippets: Vec<String>,
    pub proxy_connect_timeout: String,
    pub proxy_read_timeout: String,
    pub proxy_send_timeout: String,
    pub client_max_body_size: String,
    pub proxy_max_temp_file_size: String,
    pub proxy_buffering: bool,
    pub proxy_buffers: String,
    pub proxy_buffer_size: String,
    pub proxy_pass: String,
    pub proxy_next_upstream: String,
    pub proxy_next_upstream_timeout: String,
    pub proxy_next_upstream_tries: i32,
    pub proxy_intercept_errors: bool,
    pub proxy_pass_request_headers: bool,
    pub proxy_set_headers: Vec<Header>,
    pub proxy_hide_headers: Vec<String>,
    pub proxy_pass_headers: Vec<String>,
    pub proxy_ignore_headers: String,
    pub proxy_pass_rewrite: String,
    pub add_headers: Vec<AddHeader>,
    pub rewrites: Vec<String>,
    pub has_keepalive: bool,
    pub error_pages: Vec<ErrorPage>,
    pub proxy_ssl_name: String,
    pub service_name: String,
    pub is_vsr: bool,
    pub vsr_name: String,
    pub vsr_namespace: String,
    pub grpc_pass: String,
    pub internal_proxy_pass: String,
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub limit_req_options: LimitReqOptions,
    pub limit_reqs: Vec<LimitReq>,
    pub jwt_auth: Option<JwtAuth>,
    pub basic_auth: Option<BasicAuth>,
    pub egress_mtls: Option<EgressMtls>,
    pub oidc: bool,
    pub waf: Option<Waf>,
    pub policies_error_return: Option<Return>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AddHeader {
    pub name: String,
    pub value: String,
    pub always: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ErrorPage {
    pub name: String,
    pub codes: String,
    pub response_code: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ErrorPageLocation {
    pub name: String,
    pub default_type: String,
    pub return_: Option<Return>,
    pub headers: Vec<Header>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReturnLocation {
    pub name: String,
    pub default_type: String,
    pub return_: Return,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Return {
    pub code: i32,
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InternalRedirectLocation {
    pub path: String,
    pub destination: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SplitClient {
    pub source: String,
    pub variable: String,
    pub distributions: Vec<Distribution>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Distribution {
    pub weight: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Map {
    pub source: String,
    pub variable: String,
    pub parameters: Vec<Parameter>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub value: String,
    pub result: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct KeyValZone {
    pub name: String,
    pub size: String,
    pub state: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct KeyVal {
    pub key: String,
    pub variable: String,
    pub zone_name: String,
}

/// A two-way split whose active weights live in a key-value zone and can be changed without a reload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TwoWaySplitClients {
    pub key: String,
    pub variable: String,
    pub zone_name: String,
    pub weights: Vec<i32>,
    pub split_client_index: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub uri: String,
    pub interval: String,
    pub jitter: String,
    pub keepalive_time: String,
    pub fails: i32,
    pub passes: i32,
    pub port: i32,
    pub proxy_pass: String,
    pub proxy_connect_timeout: String,
    pub proxy_read_timeout: String,
    pub proxy_send_timeout: String,
    pub headers: BTreeMap<String, String>,
    pub match_: String,
    pub grpc_pass: String,
    pub grpc_status: Option<i32>,
    pub grpc_service: String,
    pub mandatory: bool,
    pub persistent: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusMatch {
    pub name: String,
    pub code: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LimitReqZone {
    pub zone_name: String,
    pub key: String,
    pub zone_size: String,
    pub rate: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LimitReq {
    pub zone: String,
    pub burst: i32,
    pub no_delay: bool,
    pub delay: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LimitReqOptions {
    pub dry_run: bool,
    pub log_level: String,
    pub reject_code: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct JwtAuth {
    pub key: String,
    pub secret: String,
    pub realm: String,
    pub token: String,
    pub key_cache: String,
    pub jwks_uri: JwksUri,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct JwksUri {
    pub jwks_scheme: String,
    pub jwks_host: String,
    pub jwks_port: String,
    pub jwks_path: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BasicAuth {
    pub secret: String,
    pub realm: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngressMtls {
    pub client_cert: String,
    pub client_crl: String,
    pub verify_client: String,
    pub verify_depth: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EgressMtls {
    pub certificate: String,
    pub certificate_key: String,
    pub verify_server: bool,
    pub verify_depth: i32,
    pub protocols: String,
    pub ciphers: String,
    pub session_reuse: bool,
    pub server_name: bool,
    pub trusted_cert: String,
    pub ssl_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Oidc {
    pub auth_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub redirect_uri: String,
    pub zone_sync_leeway: i32,
    pub auth_extra_args: String,
    pub access_token_enable: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Waf {
    pub enable: String,
    pub ap_policy: String,
    pub ap_bundle: String,
    pub ap_security_log_enable: bool,
    pub ap_log_conf: Vec<String>,
}
