use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A reusable policy attached to VirtualServers and their routes. Exactly one of the policy kinds is expected to be set.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "k8s.nginx.org", version = "v1", kind = "Policy", plural = "policies", shortname = "pol", namespaced, derive = "Default")]
#[serde(rename_all = "camelCase", default)]
pub struct PolicySpec {
    pub ingress_class_name: String,
    pub access_control: Option<AccessControl>,
    pub rate_limit: Option<RateLimit>,
    #[serde(rename = "jwt")]
    pub jwt_auth: Option<JwtAuth>,
    pub basic_auth: Option<BasicAuth>,
    #[serde(rename = "ingressMTLS")]
    pub ingress_mtls: Option<IngressMtls>,
    #[serde(rename = "egressMTLS")]
    pub egress_mtls: Option<EgressMtls>,
    pub oidc: Option<Oidc>,
    pub waf: Option<Waf>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct AccessControl {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimit {
    pub rate: String,
    pub key: String,
    pub delay: Option<i32>,
    pub no_delay: Option<bool>,
    pub burst: Option<i32>,
    pub zone_size: String,
    pub dry_run: Option<bool>,
    pub log_level: String,
    pub reject_code: Option<i32>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct JwtAuth {
    pub realm: String,
    pub secret: String,
    pub token: String,
    #[serde(rename = "jwksURI")]
    pub jwks_uri: String,
    pub key_cache: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct BasicAuth {
    pub realm: String,
    pub secret: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressMtls {
    pub client_cert_secret: String,
    pub crl_file_name: String,
    pub verify_client: String,
    pub verify_depth: Option<i32>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EgressMtls {
    pub tls_secret: String,
    pub verify_server: bool,
    pub verify_depth: Option<i32>,
    pub protocols: String,
    pub session_reuse: Option<bool>,
    pub ciphers: String,
    pub trusted_cert_secret: String,
    pub server_name: bool,
    pub ssl_name: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Oidc {
    pub auth_endpoint: String,
    pub token_endpoint: String,
    #[serde(rename = "jwksURI")]
    pub jwks_uri: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    #[serde(rename = "redirectURI")]
    pub redirect_uri: String,
    pub zone_sync_leeway: Option<i32>,
    pub auth_extra_args: Vec<String>,
    pub access_token_enable: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Waf {
    pub enable: bool,
    pub ap_policy: String,
    pub ap_bundle: String,
    pub security_log: Option<SecurityLog>,
    pub security_logs: Option<Vec<SecurityLog>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityLog {
    pub enable: bool,
    pub ap_log_conf: String,
    pub ap_log_bundle: String,
    pub log_dest: String,
}
