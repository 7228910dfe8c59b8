use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const TLS_PASSTHROUGH_LISTENER_NAME: &str = "tls-passthrough";
pub const TLS_PASSTHROUGH_LISTENER_PROTOCOL: &str = "TLS_PASSTHROUGH";
pub const UDP_PROTOCOL: &str = "UDP";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "k8s.nginx.org", version = "v1", kind = "TransportServer", plural = "transportservers", shortname = "ts", namespaced, derive = "Default")]
#[serde(rename_all = "camelCase", default)]
pub struct TransportServerSpec {
    pub ingress_class_name: String,
    pub tls: Option<TransportServerTls>,
    pub listener: TransportServerListener,
    pub server_snippets: String,
    pub stream_snippets: String,
    pub host: String,
    pub upstreams: Vec<TransportServerUpstream>,
    pub upstream_parameters: Option<UpstreamParameters>,
    pub session_parameters: Option<SessionParameters>,
    pub action: Option<TransportServerAction>,
}

impl TransportServerSpec {
    pub fn is_tls_passthrough(&self) -> bool {
        self.listener.name == TLS_PASSTHROUGH_LISTENER_NAME && self.listener.protocol == TLS_PASSTHROUGH_LISTENER_PROTOCOL
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct TransportServerTls {
    pub secret: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct TransportServerListener {
    pub name: String,
    pub protocol: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportServerUpstream {
    pub name: String,
    pub service: String,
    pub port: u16,
    pub fail_timeout: String,
    pub max_fails: Option<i32>,
    pub max_conns: Option<i32>,
    pub health_check: Option<TransportServerHealthCheck>,
    pub load_balancing_method: String,
    pub backup: String,
    pub backup_port: Option<u16>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct TransportServerHealthCheck {
    #[serde(rename = "enable")]
    pub enabled: bool,
    pub timeout: String,
    pub jitter: String,
    pub port: i32,
    pub interval: String,
    pub passes: i32,
    pub fails: i32,
    #[serde(rename = "match")]
    pub match_: Option<TransportServerMatch>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct TransportServerMatch {
    pub send: String,
    pub expect: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamParameters {
    pub udp_requests: Option<i32>,
    pub udp_responses: Option<i32>,
    pub connect_timeout: String,
    pub next_upstream: bool,
    pub next_upstream_timeout: String,
    pub next_upstream_tries: i32,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct SessionParameters {
    pub timeout: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct TransportServerAction {
    pub pass: String,
}
