use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const GRPC_UPSTREAM_TYPE: &str = "grpc";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "k8s.nginx.org", version = "v1", kind = "VirtualServer", plural = "virtualservers", shortname = "vs", namespaced, derive = "Default")]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualServerSpec {
    pub ingress_class_name: String,
    pub host: String,
    pub listener: Option<VirtualServerListener>,
    pub tls: Option<Tls>,
    pub gunzip: bool,
    pub policies: Vec<PolicyReference>,
    pub upstreams: Vec<Upstream>,
    pub routes: Vec<Route>,
    #[serde(rename = "http-snippets")]
    pub http_snippets: String,
    #[serde(rename = "server-snippets")]
    pub server_snippets: String,
    pub internal_route: bool,
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "k8s.nginx.org", version = "v1", kind = "VirtualServerRoute", plural = "virtualserverroutes", shortname = "vsr", namespaced, derive = "Default")]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualServerRouteSpec {
    pub ingress_class_name: String,
    pub host: String,
    pub upstreams: Vec<Upstream>,
    pub subroutes: Vec<Route>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct VirtualServerListener {
    pub http: String,
    pub https: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(default)]
pub struct PolicyReference {
    pub name: String,
    pub namespace: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct Upstream {
    pub name: String,
    pub service: String,
    pub subselector: BTreeMap<String, String>,
    pub port: u16,
    #[serde(rename = "lb-method")]
    pub lb_method: String,
    #[serde(rename = "fail-timeout")]
    pub fail_timeout: String,
    #[serde(rename = "max-fails")]
    pub max_fails: Option<i32>,
    #[serde(rename = "max-conns")]
    pub max_conns: Option<i32>,
    pub keepalive: Option<i32>,
    #[serde(rename = "connect-timeout")]
    pub proxy_connect_timeout: String,
    #[serde(rename = "read-timeout")]
    pub proxy_read_timeout: String,
    #[serde(rename = "send-timeout")]
    pub proxy_send_timeout: String,
    #[serde(rename = "next-upstream")]
    pub proxy_next_upstream: String,
    #[serde(rename = "next-upstream-timeout")]
    pub proxy_next_upstream_timeout: String,
    #[serde(rename = "next-upstream-tries")]
    pub proxy_next_upstream_tries: i32,
    #[serde(rename = "buffering")]
    pub proxy_buffering: Option<bool>,
    #[serde(rename = "buffers")]
    pub proxy_buffers: Option<UpstreamBuffers>,
    #[serde(rename = "buffer-size")]
    pub proxy_buffer_size: String,
    #[serde(rename = "client-max-body-size")]
    pub client_max_body_size: String,
    pub tls: UpstreamTls,
    #[serde(rename = "healthCheck")]
    pub health_check: Option<HealthCheck>,
    #[serde(rename = "slow-start")]
    pub slow_start: String,
    pub queue: Option<UpstreamQueue>,
    #[serde(rename = "sessionCookie")]
    pub session_cookie: Option<SessionCookie>,
    #[serde(rename = "use-cluster-ip")]
    pub use_cluster_ip: bool,
    pub ntlm: bool,
    #[serde(rename = "type")]
    pub upstream_type: String,
    pub backup: String,
    #[serde(rename = "backupPort")]
    pub backup_port: Option<u16>,
}

impl Upstream {
    pub fn is_grpc(&self) -> bool {
        self.upstream_type == GRPC_UPSTREAM_TYPE
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct UpstreamBuffers {
    pub number: i32,
    pub size: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct UpstreamTls {
    pub enable: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct UpstreamQueue {
    pub size: i32,
    pub timeout: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthCheck {
    pub enable: bool,
    pub path: String,
    pub interval: String,
    pub jitter: String,
    pub fails: i32,
    pub passes: i32,
    pub port: i32,
    pub tls: Option<UpstreamTls>,
    #[serde(rename = "connect-timeout")]
    pub connect_timeout: String,
    #[serde(rename = "read-timeout")]
    pub read_timeout: String,
    #[serde(rename = "send-timeout")]
    pub send_timeout: String,
    pub headers: Vec<Header>,
    pub status_match: String,
    pub grpc_status: Option<i32>,
    pub grpc_service: String,
    pub mandatory: bool,
    pub persistent: bool,
    #[serde(rename = "keepalive-time")]
    pub keepalive_time: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionCookie {
    pub enable: bool,
    pub name: String,
    pub path: String,
    pub expires: String,
    pub domain: String,
    pub http_only: bool,
    pub secure: bool,
    #[serde(rename = "samesite")]
    pub same_site: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Route {
    pub path: String,
    pub policies: Vec<PolicyReference>,
    pub route: String,
    pub action: Option<Action>,
    pub splits: Vec<Split>,
    pub matches: Vec<Match>,
    /// `None` and an empty list differ: only `None` lets a VirtualServerRoute inherit the pages of its VirtualServer route.
    pub error_pages: Option<Vec<ErrorPage>>,
    #[serde(rename = "location-snippets")]
    pub location_snippets: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct Action {
    pub pass: String,
    pub redirect: Option<ActionRedirect>,
    #[serde(rename = "return")]
    pub return_: Option<ActionReturn>,
    pub proxy: Option<ActionProxy>,
}

impl Action {
    /// The logical upstream an action sends traffic to.
    pub fn upstream(&self) -> &str {
        match &self.proxy {
            Some(proxy) if !proxy.upstream.is_empty() => &proxy.upstream,
            _ => &self.pass,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ActionRedirect {
    pub url: String,
    pub code: i32,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ActionReturn {
    pub code: i32,
    #[serde(rename = "type")]
    pub return_type: String,
    pub body: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionProxy {
    pub upstream: String,
    pub rewrite_path: String,
    pub request_headers: Option<ProxyRequestHeaders>,
    pub response_headers: Option<ProxyResponseHeaders>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ProxyRequestHeaders {
    pub pass: Option<bool>,
    pub set: Vec<Header>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ProxyResponseHeaders {
    pub hide: Vec<String>,
    pub pass: Vec<String>,
    pub ignore: Vec<String>,
    pub add: Vec<AddHeader>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct AddHeader {
    pub name: String,
    pub value: String,
    pub always: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct Split {
    pub weight: i32,
    pub action: Option<Action>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct Condition {
    pub header: String,
    pub cookie: String,
    pub argument: String,
    pub variable: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct Match {
    pub conditions: Vec<Condition>,
    pub action: Option<Action>,
    pub splits: Vec<Split>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ErrorPage {
    pub codes: Vec<i32>,
    #[serde(rename = "return")]
    pub return_: Option<ErrorPageReturn>,
    pub redirect: Option<ActionRedirect>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ErrorPageReturn {
    pub code: i32,
    #[serde(rename = "type")]
    pub return_type: String,
    pub body: String,
    pub headers: Vec<Header>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct Tls {
    pub secret: String,
    pub redirect: Option<TlsRedirect>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TlsRedirect {
    pub enable: bool,
    pub code: Option<i32>,
    pub based_on: String,
}
