//! Merges the policies referenced from one scope of a VirtualServer into a single validated configuration.

use std::{collections::BTreeMap, fmt::Display};

use thiserror::Error;
use url::Url;

use super::{CompileContext, OidcSlot};
use crate::{
    common::{
        generate_bool, generate_string,
        secrets::{check_secret, SecretCheck, CLIENT_SECRET_KEY, CRL_KEY, DEFAULT_SECRET_PATH, SECRET_TYPE_CA, SECRET_TYPE_HTPASSWD, SECRET_TYPE_JWK, SECRET_TYPE_OIDC, SECRET_TYPE_TLS},
        ResourceKey, SecretReference,
    },
    nginx::version2::{BasicAuth, EgressMtls, IngressMtls, JwksUri, JwtAuth, LimitReq, LimitReqOptions, LimitReqZone, Location, Oidc, Return, Waf},
    resources::{self, AppProtectResources, Policy, PolicyReference},
};

pub const APP_PROTECT_BUNDLE_FOLDER: &str = "/etc/nginx/waf/bundles/";
const DEFAULT_LOG_OUTPUT: &str = "syslog:server=localhost:514";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Only one oidc policy is allowed in a VirtualServer and its VirtualServerRoutes. Can't use {rejected}. Use {used}")]
    ConflictingOidc { used: String, rejected: String },
    #[error("Policy {0} is missing or invalid")]
    Missing(String),
}

/// Where a list of policy references is attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyContext {
    Spec,
    Route,
    Subroute,
}

impl Display for PolicyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let context = match self {
            PolicyContext::Spec => "spec",
            PolicyContext::Route => "route",
            PolicyContext::Subroute => "subroute",
        };
        write!(f, "{context}")
    }
}

/// The resource that declares the references. Warnings are attributed to it and unqualified references resolve in its namespace.
pub struct PolicyOwner<'a> {
    pub key: &'a ResourceKey,
    pub namespace: &'a str,
    pub vs_namespace: &'a str,
    pub vs_name: &'a str,
}

pub struct PolicyOptions<'a> {
    pub tls: bool,
    pub secret_refs: &'a BTreeMap<String, SecretReference>,
    pub ap_resources: &'a AppProtectResources,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoliciesConfig {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub limit_req_options: LimitReqOptions,
    pub limit_req_zones: Vec<LimitReqZone>,
    pub limit_reqs: Vec<LimitReq>,
    pub jwt_auth: Option<JwtAuth>,
    pub jwt_auth_list: BTreeMap<String, JwtAuth>,
    pub jwks_auth_enabled: bool,
    pub basic_auth: Option<BasicAuth>,
    pub ingress_mtls: Option<IngressMtls>,
    pub egress_mtls: Option<EgressMtls>,
    pub oidc: bool,
    pub waf: Option<Waf>,
    pub error_return: Option<Return>,
}

#[derive(Default)]
struct ValidationResults {
    is_error: bool,
    warnings: Vec<String>,
}

impl ValidationResults {
    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn error(&mut self, message: impl Into<String>) {
        self.is_error = true;
        self.warnings.push(message.into());
    }
}

/// Path of a secret, or the warning explaining why the policy cannot use it.
fn policy_secret(options: &PolicyOptions, kind: &str, pol_key: &str, secret_key: &str, expected: &str, res: &mut ValidationResults) -> Option<SecretReference> {
    match check_secret(options.secret_refs, secret_key, expected) {
        SecretCheck::Valid(reference) => Some(reference.clone()),
        SecretCheck::WrongType(actual) => {
            res.error(format!("{kind} policy {pol_key} references a secret {secret_key} of a wrong type '{actual}', must be '{expected}'"));
            None
        },
        SecretCheck::Invalid(error) => {
            res.error(format!("{kind} policy {pol_key} references an invalid secret {secret_key}: {error}"));
            None
        },
    }
}

impl PoliciesConfig {
    /// Configuration of a scope whose policies failed validation: every request gets a 500.
    pub fn error() -> Self {
        Self { error_return: Some(Return { code: 500, text: String::new() }), ..Default::default() }
    }

    fn add_access_control(&mut self, access_control: &resources::AccessControl) -> ValidationResults {
        let mut res = ValidationResults::default();
        self.allow.extend(access_control.allow.iter().cloned());
        self.deny.extend(access_control.deny.iter().cloned());
        if !self.allow.is_empty() && !self.deny.is_empty() {
            res.warn("AccessControl policy (or policies) with deny rules is overridden by policy (or policies) with allow rules");
        }
        res
    }

    fn add_rate_limit(&mut self, rate_limit: &resources::RateLimit, pol_key: &str, pol_namespace: &str, pol_name: &str, owner: &PolicyOwner) -> ValidationResults {
        let mut res = ValidationResults::default();
        let zone_name = format!("pol_rl_{pol_namespace}_{pol_name}_{}_{}", owner.vs_namespace, owner.vs_name);
        self.limit_reqs.push(generate_limit_req(&zone_name, rate_limit));
        self.limit_req_zones.push(generate_limit_req_zone(&zone_name, rate_limit));

        let options = generate_limit_req_options(rate_limit);
        if self.limit_reqs.len() == 1 {
            self.limit_req_options = options;
            return res;
        }
        let first = &self.limit_req_options;
        if options.dry_run != first.dry_run {
            res.warn(format!(
                "RateLimit policy {pol_key} with limit request option dryRun='{}' is overridden to dryRun='{}' by the first policy reference in this context",
                options.dry_run, first.dry_run
            ));
        }
        if options.log_level != first.log_level {
            res.warn(format!(
                "RateLimit policy {pol_key} with limit request option logLevel='{}' is overridden to logLevel='{}' by the first policy reference in this context",
                options.log_level, first.log_level
            ));
        }
        if options.reject_code != first.reject_code {
            res.warn(format!(
                "RateLimit policy {pol_key} with limit request option rejectCode='{}' is overridden to rejectCode='{}' by the first policy reference in this context",
                options.reject_code, first.reject_code
            ));
        }
        res
    }

    fn add_basic_auth(&mut self, basic_auth: &resources::BasicAuth, pol_key: &str, pol_namespace: &str, options: &PolicyOptions) -> ValidationResults {
        let mut res = ValidationResults::default();
        if self.basic_auth.is_some() {
            res.warn(format!("Multiple basic auth policies in the same context is not valid. Basic auth policy {pol_key} will be ignored"));
            return res;
        }
        let secret_key = format!("{pol_namespace}/{}", basic_auth.secret);
        if let Some(secret) = policy_secret(options, "Basic Auth", pol_key, &secret_key, SECRET_TYPE_HTPASSWD, &mut res) {
            self.basic_auth = Some(BasicAuth { secret: secret.path, realm: basic_auth.realm.clone() });
        }
        res
    }

    fn add_jwt_auth(&mut self, jwt_auth: &resources::JwtAuth, pol_key: &str, pol_namespace: &str, options: &PolicyOptions) -> ValidationResults {
        let mut res = ValidationResults::default();
        if self.jwt_auth.is_some() {
            res.warn(format!("Multiple jwt policies in the same context is not valid. JWT policy {pol_key} will be ignored"));
            return res;
        }
        if !jwt_auth.secret.is_empty() {
            let secret_key = format!("{pol_namespace}/{}", jwt_auth.secret);
            if let Some(secret) = policy_secret(options, "JWT", pol_key, &secret_key, SECRET_TYPE_JWK, &mut res) {
                self.jwt_auth = Some(JwtAuth {
                    secret: secret.path,
                    realm: jwt_auth.realm.clone(),
                    token: jwt_auth.token.clone(),
                    ..Default::default()
                });
            }
        } else if !jwt_auth.jwks_uri.is_empty() {
            let jwks_uri = match Url::parse(&jwt_auth.jwks_uri) {
                Ok(uri) => JwksUri {
                    jwks_scheme: uri.scheme().to_owned(),
                    jwks_host: uri.host_str().unwrap_or_default().to_owned(),
                    jwks_port: uri.port().map(|p| p.to_string()).unwrap_or_default(),
                    jwks_path: uri.path().to_owned(),
                },
                Err(_) => JwksUri::default(),
            };
            self.jwt_auth = Some(JwtAuth {
                key: pol_key.to_owned(),
                jwks_uri,
                realm: jwt_auth.realm.clone(),
                token: jwt_auth.token.clone(),
                key_cache: jwt_auth.key_cache.clone(),
                ..Default::default()
            });
            self.jwks_auth_enabled = true;
        }
        res
    }

    fn add_ingress_mtls(
        &mut self,
        ingress_mtls: &resources::IngressMtls,
        pol_key: &str,
        pol_namespace: &str,
        context: PolicyContext,
        options: &PolicyOptions,
    ) -> ValidationResults {
        let mut res = ValidationResults::default();
        if !options.tls {
            res.error(format!("TLS must be enabled in VirtualServer for IngressMTLS policy {pol_key}"));
            return res;
        }
        if context != PolicyContext::Spec {
            res.error(format!("IngressMTLS policy {pol_key} is not allowed in the {context} context"));
            return res;
        }
        if self.ingress_mtls.is_some() {
            res.warn(format!("Multiple ingressMTLS policies are not allowed. IngressMTLS policy {pol_key} will be ignored"));
            return res;
        }
        let secret_key = format!("{pol_namespace}/{}", ingress_mtls.client_cert_secret);
        let Some(secret) = policy_secret(options, "IngressMTLS", pol_key, &secret_key, SECRET_TYPE_CA, &mut res) else {
            return res;
        };

        let has_crl = secret.has_data(CRL_KEY);
        if has_crl && !ingress_mtls.crl_file_name.is_empty() {
            res.warn(format!(
                "Both ca.crl in the Secret and ingressMTLS.crlFileName fields cannot be used. ca.crl in {secret_key} will be ignored and {pol_key} will be applied"
            ));
        }

        let mut ca_fields = secret.path.split_whitespace();
        let client_cert = ca_fields.next().unwrap_or_default().to_owned();
        let client_crl = if !ingress_mtls.crl_file_name.is_empty() {
            format!("{DEFAULT_SECRET_PATH}/{}", ingress_mtls.crl_file_name)
        } else if has_crl {
            ca_fields.next().unwrap_or_default().to_owned()
        } else {
            String::new()
        };

        self.ingress_mtls = Some(IngressMtls {
            client_cert,
            client_crl,
            verify_client: generate_string(&ingress_mtls.verify_client, "on"),
            verify_depth: ingress_mtls.verify_depth.unwrap_or(1),
        });
        res
    }

    fn add_egress_mtls(&mut self, egress_mtls: &resources::EgressMtls, pol_key: &str, pol_namespace: &str, options: &PolicyOptions) -> ValidationResults {
        let mut res = ValidationResults::default();
        if self.egress_mtls.is_some() {
            res.warn(format!("Multiple egressMTLS policies in the same context is not valid. EgressMTLS policy {pol_key} will be ignored"));
            return res;
        }

        let mut tls_secret_path = String::new();
        if !egress_mtls.tls_secret.is_empty() {
            let secret_key = format!("{pol_namespace}/{}", egress_mtls.tls_secret);
            match policy_secret(options, "EgressMTLS", pol_key, &secret_key, SECRET_TYPE_TLS, &mut res) {
                Some(secret) => tls_secret_path = secret.path,
                None => return res,
            }
        }

        let mut trusted_cert = String::new();
        if !egress_mtls.trusted_cert_secret.is_empty() {
            let secret_key = format!("{pol_namespace}/{}", egress_mtls.trusted_cert_secret);
            match policy_secret(options, "EgressMTLS", pol_key, &secret_key, SECRET_TYPE_CA, &mut res) {
                Some(secret) => trusted_cert = secret.path.split_whitespace().next().unwrap_or_default().to_owned(),
                None => return res,
            }
        }

        self.egress_mtls = Some(EgressMtls {
            certificate: tls_secret_path.clone(),
            certificate_key: tls_secret_path,
            ciphers: generate_string(&egress_mtls.ciphers, "DEFAULT"),
            protocols: generate_string(&egress_mtls.protocols, "TLSv1 TLSv1.1 TLSv1.2"),
            verify_server: egress_mtls.verify_server,
            verify_depth: egress_mtls.verify_depth.unwrap_or(1),
            session_reuse: generate_bool(egress_mtls.session_reuse, true),
            server_name: egress_mtls.server_name,
            trusted_cert,
            ssl_name: generate_string(&egress_mtls.ssl_name, "$proxy_host"),
        });
        res
    }

    /// The first OIDC policy of a VirtualServer family claims the slot. Referencing the same policy again is fine,
    /// any other OIDC policy fails validation.
    fn add_oidc(&mut self, oidc: &resources::Oidc, pol_key: &str, pol_namespace: &str, options: &PolicyOptions, ctx: &mut CompileContext) -> ValidationResults {
        let mut res = ValidationResults::default();
        if self.oidc {
            res.warn(format!("Multiple oidc policies in the same context is not valid. OIDC policy {pol_key} will be ignored"));
            return res;
        }

        match &ctx.oidc {
            Some(slot) if slot.key != pol_key => {
                res.error(PolicyError::ConflictingOidc { used: slot.key.clone(), rejected: pol_key.to_owned() }.to_string());
                return res;
            },
            Some(_) => {},
            None => {
                let secret_key = format!("{pol_namespace}/{}", oidc.client_secret);
                let Some(secret) = policy_secret(options, "OIDC", pol_key, &secret_key, SECRET_TYPE_OIDC, &mut res) else {
                    return res;
                };
                let client_secret = secret.data(CLIENT_SECRET_KEY).map(|d| String::from_utf8_lossy(d).into_owned()).unwrap_or_default();
                ctx.oidc = Some(OidcSlot {
                    key: pol_key.to_owned(),
                    config: Oidc {
                        auth_endpoint: oidc.auth_endpoint.clone(),
                        token_endpoint: oidc.token_endpoint.clone(),
                        jwks_uri: oidc.jwks_uri.clone(),
                        client_id: oidc.client_id.clone(),
                        client_secret,
                        scope: generate_string(&oidc.scope, "openid"),
                        redirect_uri: generate_string(&oidc.redirect_uri, "/_codexch"),
                        zone_sync_leeway: oidc.zone_sync_leeway.unwrap_or(200),
                        auth_extra_args: oidc.auth_extra_args.join("&"),
                        access_token_enable: oidc.access_token_enable,
                    },
                });
            },
        }

        self.oidc = true;
        res
    }

    fn add_waf(&mut self, waf: &resources::Waf, pol_key: &str, pol_namespace: &str, options: &PolicyOptions) -> ValidationResults {
        let mut res = ValidationResults::default();
        if self.waf.is_some() {
            res.warn(format!("Multiple WAF policies in the same context is not valid. WAF policy {pol_key} will be ignored"));
            return res;
        }

        let mut config = Waf { enable: if waf.enable { "on" } else { "off" }.to_owned(), ..Default::default() };
        let ap_resources = options.ap_resources;

        if !waf.ap_policy.is_empty() {
            let ap_pol_key = qualify(&waf.ap_policy, pol_namespace);
            let Some(path) = ap_resources.policies.get(&ap_pol_key) else {
                res.error(format!("WAF policy {pol_key} references an invalid or non-existing App Protect policy {ap_pol_key}"));
                self.waf = Some(config);
                return res;
            };
            config.ap_policy.clone_from(path);
        }

        if !waf.ap_bundle.is_empty() {
            config.ap_bundle = format!("{APP_PROTECT_BUNDLE_FOLDER}{}", waf.ap_bundle);
            if !ap_resources.bundles.contains(&waf.ap_bundle) {
                res.error(format!("WAF policy {pol_key} references an invalid or non-existing App Protect bundle {}", config.ap_bundle));
            }
        }

        let security_logs = match (&waf.security_logs, &waf.security_log) {
            (Some(logs), _) => logs.clone(),
            (None, Some(log)) => vec![log.clone()],
            (None, None) => vec![],
        };
        if waf.security_logs.is_some() || waf.security_log.is_some() {
            config.ap_security_log_enable = true;
        }
        for log in &security_logs {
            let log_dest = generate_string(&log.log_dest, DEFAULT_LOG_OUTPUT);
            if !log.ap_log_conf.is_empty() {
                let log_conf_key = qualify(&log.ap_log_conf, pol_namespace);
                match ap_resources.log_confs.get(&log_conf_key) {
                    Some(path) => config.ap_log_conf.push(format!("{path} {log_dest}")),
                    None => res.error(format!("WAF policy {pol_key} references an invalid or non-existing log config {log_conf_key}")),
                }
            }
            if !log.ap_log_bundle.is_empty() {
                let bundle = format!("{APP_PROTECT_BUNDLE_FOLDER}{}", log.ap_log_bundle);
                if ap_resources.bundles.contains(&log.ap_log_bundle) {
                    config.ap_log_conf.push(format!("{bundle} {log_dest}"));
                } else {
                    res.error(format!("WAF policy {pol_key} references an invalid or non-existing log config bundle {bundle}"));
                }
            }
        }

        self.waf = Some(config);
        res
    }

    /// Copies the per-location part of the policies onto a location.
    pub fn apply_to_location(&self, location: &mut Location) {
        location.allow.clone_from(&self.allow);
        location.deny.clone_from(&self.deny);
        location.limit_req_options = self.limit_req_options.clone();
        location.limit_reqs.clone_from(&self.limit_reqs);
        location.jwt_auth.clone_from(&self.jwt_auth);
        location.basic_auth.clone_from(&self.basic_auth);
        location.egress_mtls.clone_from(&self.egress_mtls);
        location.oidc = self.oidc;
        location.waf.clone_from(&self.waf);
        location.policies_error_return.clone_from(&self.error_return);
    }

    pub fn apply_to_locations(&self, locations: &mut [Location]) {
        for location in locations {
            self.apply_to_location(location);
        }
    }
}

fn qualify(name: &str, namespace: &str) -> String {
    if name.contains('/') {
        name.to_owned()
    } else {
        format!("{namespace}/{name}")
    }
}

/// Composes the referenced policies. Once any reference fails validation the remaining ones are still checked
/// so every warning is reported, but the scope is compiled into a plain 500.
pub fn generate_policies(
    owner: &PolicyOwner,
    references: &[PolicyReference],
    policies: &BTreeMap<String, Policy>,
    context: PolicyContext,
    options: &PolicyOptions,
    ctx: &mut CompileContext,
) -> PoliciesConfig {
    let mut config = PoliciesConfig::default();
    let mut failed = false;

    for reference in references {
        let pol_namespace = if reference.namespace.is_empty() { owner.namespace } else { reference.namespace.as_str() };
        let key = format!("{pol_namespace}/{}", reference.name);

        let Some(policy) = policies.get(&key) else {
            ctx.warnings.add(owner.key, PolicyError::Missing(key).to_string());
            failed = true;
            continue;
        };

        let spec = &policy.spec;
        let res = if let Some(access_control) = &spec.access_control {
            config.add_access_control(access_control)
        } else if let Some(rate_limit) = &spec.rate_limit {
            config.add_rate_limit(rate_limit, &key, pol_namespace, &reference.name, owner)
        } else if let Some(jwt_auth) = &spec.jwt_auth {
            config.add_jwt_auth(jwt_auth, &key, pol_namespace, options)
        } else if let Some(basic_auth) = &spec.basic_auth {
            config.add_basic_auth(basic_auth, &key, pol_namespace, options)
        } else if let Some(ingress_mtls) = &spec.ingress_mtls {
            config.add_ingress_mtls(ingress_mtls, &key, pol_namespace, context, options)
        } else if let Some(egress_mtls) = &spec.egress_mtls {
            config.add_egress_mtls(egress_mtls, &key, pol_namespace, options)
        } else if let Some(oidc) = &spec.oidc {
            config.add_oidc(oidc, &key, pol_namespace, options, ctx)
        } else if let Some(waf) = &spec.waf {
            config.add_waf(waf, &key, pol_namespace, options)
        } else {
            ValidationResults::default()
        };

        ctx.warnings.add_all(owner.key, res.warnings);
        failed |= res.is_error;
    }

    if failed {
        return PoliciesConfig::error();
    }
    config
}

pub fn generate_limit_req(zone_name: &str, rate_limit: &resources::RateLimit) -> LimitReq {
    let no_delay = generate_bool(rate_limit.no_delay, false);
    LimitReq {
        zone: zone_name.to_owned(),
        burst: rate_limit.burst.unwrap_or_default(),
        delay: if no_delay { 0 } else { rate_limit.delay.unwrap_or_default() },
        no_delay,
    }
}

pub fn generate_limit_req_zone(zone_name: &str, rate_limit: &resources::RateLimit) -> LimitReqZone {
    LimitReqZone {
        zone_name: zone_name.to_owned(),
        key: rate_limit.key.clone(),
        zone_size: rate_limit.zone_size.clone(),
        rate: rate_limit.rate.clone(),
    }
}

pub fn generate_limit_req_options(rate_limit: &resources::RateLimit) -> LimitReqOptions {
    LimitReqOptions {
        dry_run: generate_bool(rate_limit.dry_run, false),
        log_level: generate_string(&rate_limit.log_level, "error"),
        reject_code: rate_limit.reject_code.unwrap_or(503),
    }
}

/// Keeps the first zone of every name, preserving order.
pub fn remove_duplicate_limit_req_zones(zones: Vec<LimitReqZone>) -> Vec<LimitReqZone> {
    let mut seen = std::collections::BTreeSet::new();
    zones.into_iter().filter(|zone| seen.insert(zone.zone_name.clone())).collect()
}

#[cfg(test)]
mod tests {
    use k8s_openapi::{api::core::v1::Secret, ByteString};
    use kube::api::ObjectMeta;

    use super::*;
    use crate::resources::PolicySpec;

    fn policy(name: &str, spec: PolicySpec) -> (String, Policy) {
        let policy = Policy { metadata: ObjectMeta { name: Some(name.to_owned()), namespace: Some("default".to_owned()), ..Default::default() }, spec };
        (format!("default/{name}"), policy)
    }

    fn reference(name: &str) -> PolicyReference {
        PolicyReference { name: name.to_owned(), namespace: String::new() }
    }

    fn secret(secret_type: &str, data: &[(&str, &str)]) -> Secret {
        Secret {
            type_: Some(secret_type.to_owned()),
            data: Some(data.iter().map(|(k, v)| ((*k).to_owned(), ByteString(v.as_bytes().to_vec()))).collect()),
            ..Default::default()
        }
    }

    struct Fixture {
        key: ResourceKey,
        secret_refs: BTreeMap<String, SecretReference>,
        ap_resources: AppProtectResources,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                key: ResourceKey::with_kind("cafe", "default", "VirtualServer"),
                secret_refs: BTreeMap::new(),
                ap_resources: AppProtectResources::default(),
            }
        }

        fn owner(&self) -> PolicyOwner<'_> {
            PolicyOwner { key: &self.key, namespace: "default", vs_namespace: "default", vs_name: "cafe" }
        }

        fn options(&self, tls: bool) -> PolicyOptions<'_> {
            PolicyOptions { tls, secret_refs: &self.secret_refs, ap_resources: &self.ap_resources }
        }

        fn generate(&self, refs: &[PolicyReference], policies: &BTreeMap<String, Policy>, context: PolicyContext, ctx: &mut CompileContext) -> PoliciesConfig {
            generate_policies(&self.owner(), refs, policies, context, &self.options(true), ctx)
        }
    }

    fn rate_limit(dry_run: Option<bool>, reject_code: Option<i32>) -> PolicySpec {
        PolicySpec {
            rate_limit: Some(resources::RateLimit {
                rate: "10r/s".to_owned(),
                key: "$binary_remote_addr".to_owned(),
                zone_size: "10M".to_owned(),
                burst: Some(5),
                delay: Some(3),
                dry_run,
                reject_code,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    pub fn test_policy_context_display() {
        assert_eq!("spec", PolicyContext::Spec.to_string());
        assert_eq!("route", PolicyContext::Route.to_string());
        assert_eq!("subroute", PolicyContext::Subroute.to_string());
    }

    #[test]
    pub fn test_rate_limits_are_additive_with_first_options() {
        let fixture = Fixture::new();
        let policies = BTreeMap::from([policy("rl-one", rate_limit(None, None)), policy("rl-two", rate_limit(Some(true), Some(429)))]);
        let mut ctx = CompileContext::new();

        let config = fixture.generate(&[reference("rl-one"), reference("rl-two")], &policies, PolicyContext::Spec, &mut ctx);

        assert_eq!(
            vec!["pol_rl_default_rl-one_default_cafe", "pol_rl_default_rl-two_default_cafe"],
            config.limit_req_zones.iter().map(|z| z.zone_name.as_str()).collect::<Vec<_>>()
        );
        assert_eq!(LimitReqOptions { dry_run: false, log_level: "error".to_owned(), reject_code: 503 }, config.limit_req_options);
        assert_eq!(LimitReq { zone: "pol_rl_default_rl-one_default_cafe".to_owned(), burst: 5, no_delay: false, delay: 3 }, config.limit_reqs[0]);
        assert!(ctx.warnings.contains(
            &fixture.key,
            "RateLimit policy default/rl-two with limit request option dryRun='true' is overridden to dryRun='false' by the first policy reference in this context"
        ));
        assert!(ctx.warnings.contains(
            &fixture.key,
            "RateLimit policy default/rl-two with limit request option rejectCode='429' is overridden to rejectCode='503' by the first policy reference in this context"
        ));
    }

    #[test]
    pub fn test_access_control_allow_wins() {
        let fixture = Fixture::new();
        let allow = PolicySpec { access_control: Some(resources::AccessControl { allow: vec!["10.0.0.0/8".to_owned()], deny: vec![] }), ..Default::default() };
        let deny = PolicySpec { access_control: Some(resources::AccessControl { allow: vec![], deny: vec!["127.0.0.1".to_owned()] }), ..Default::default() };
        let policies = BTreeMap::from([policy("allow", allow), policy("deny", deny)]);
        let mut ctx = CompileContext::new();

        let config = fixture.generate(&[reference("allow"), reference("deny")], &policies, PolicyContext::Route, &mut ctx);

        assert_eq!(vec!["10.0.0.0/8".to_owned()], config.allow);
        assert!(config.error_return.is_none());
        assert!(ctx.warnings.contains(&fixture.key, "AccessControl policy (or policies) with deny rules is overridden by policy (or policies) with allow rules"));
    }

    #[test]
    pub fn test_missing_policy_returns_500_but_keeps_collecting() {
        let fixture = Fixture::new();
        let jwt = PolicySpec { jwt_auth: Some(resources::JwtAuth { secret: "jwk".to_owned(), ..Default::default() }), ..Default::default() };
        let policies = BTreeMap::from([policy("jwt", jwt)]);
        let mut ctx = CompileContext::new();

        let config = fixture.generate(&[reference("absent"), reference("jwt")], &policies, PolicyContext::Spec, &mut ctx);

        assert_eq!(PoliciesConfig::error(), config);
        assert!(ctx.warnings.contains(&fixture.key, "Policy default/absent is missing or invalid"));
        assert!(ctx.warnings.contains(
            &fixture.key,
            "JWT policy default/jwt references an invalid secret default/jwk: secret doesn't exist or of an unsupported type"
        ));
    }

    #[test]
    pub fn test_basic_auth_wrong_secret_type() {
        let mut fixture = Fixture::new();
        fixture.secret_refs.insert("default/htpasswd".to_owned(), SecretReference::new(secret(SECRET_TYPE_TLS, &[]), "/etc/nginx/secrets/default-htpasswd"));
        let basic = PolicySpec { basic_auth: Some(resources::BasicAuth { secret: "htpasswd".to_owned(), realm: "cafe".to_owned() }), ..Default::default() };
        let policies = BTreeMap::from([policy("basic", basic)]);
        let mut ctx = CompileContext::new();

        let config = fixture.generate(&[reference("basic")], &policies, PolicyContext::Spec, &mut ctx);

        assert_eq!(Some(Return { code: 500, text: String::new() }), config.error_return);
        assert!(ctx.warnings.contains(
            &fixture.key,
            "Basic Auth policy default/basic references a secret default/htpasswd of a wrong type 'kubernetes.io/tls', must be 'nginx.org/htpasswd'"
        ));
    }

    #[test]
    pub fn test_jwt_with_jwks_uri() {
        let fixture = Fixture::new();
        let jwt = PolicySpec {
            jwt_auth: Some(resources::JwtAuth {
                realm: "cafe".to_owned(),
                jwks_uri: "https://idp.example.com:8443/keys".to_owned(),
                key_cache: "1h".to_owned(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let policies = BTreeMap::from([policy("jwt", jwt)]);
        let mut ctx = CompileContext::new();

        let config = fixture.generate(&[reference("jwt")], &policies, PolicyContext::Spec, &mut ctx);

        let jwt_auth = config.jwt_auth.unwrap();
        assert!(config.jwks_auth_enabled);
        assert_eq!("default/jwt", jwt_auth.key);
        assert_eq!(
            JwksUri {
                jwks_scheme: "https".to_owned(),
                jwks_host: "idp.example.com".to_owned(),
                jwks_port: "8443".to_owned(),
                jwks_path: "/keys".to_owned()
            },
            jwt_auth.jwks_uri
        );
    }

    #[test]
    pub fn test_ingress_mtls_rules() {
        let mut fixture = Fixture::new();
        fixture.secret_refs.insert(
            "default/ca".to_owned(),
            SecretReference::new(secret(SECRET_TYPE_CA, &[("ca.crt", "x"), ("ca.crl", "y")]), "/etc/nginx/secrets/default-ca.crt /etc/nginx/secrets/default-ca.crl"),
        );
        let mtls = PolicySpec {
            ingress_mtls: Some(resources::IngressMtls { client_cert_secret: "ca".to_owned(), ..Default::default() }),
            ..Default::default()
        };
        let policies = BTreeMap::from([policy("mtls", mtls)]);

        let mut ctx = CompileContext::new();
        let config = fixture.generate(&[reference("mtls")], &policies, PolicyContext::Spec, &mut ctx);
        assert_eq!(
            Some(IngressMtls {
                client_cert: "/etc/nginx/secrets/default-ca.crt".to_owned(),
                client_crl: "/etc/nginx/secrets/default-ca.crl".to_owned(),
                verify_client: "on".to_owned(),
                verify_depth: 1,
            }),
            config.ingress_mtls
        );

        let mut ctx = CompileContext::new();
        let config = fixture.generate(&[reference("mtls")], &policies, PolicyContext::Route, &mut ctx);
        assert!(config.error_return.is_some());
        assert!(ctx.warnings.contains(&fixture.key, "IngressMTLS policy default/mtls is not allowed in the route context"));

        let mut ctx = CompileContext::new();
        let config = generate_policies(&fixture.owner(), &[reference("mtls")], &policies, PolicyContext::Spec, &fixture.options(false), &mut ctx);
        assert!(config.error_return.is_some());
        assert!(ctx.warnings.contains(&fixture.key, "TLS must be enabled in VirtualServer for IngressMTLS policy default/mtls"));
    }

    #[test]
    pub fn test_egress_mtls_defaults() {
        let mut fixture = Fixture::new();
        fixture.secret_refs.insert("default/client".to_owned(), SecretReference::new(secret(SECRET_TYPE_TLS, &[]), "/etc/nginx/secrets/default-client"));
        let egress = PolicySpec {
            egress_mtls: Some(resources::EgressMtls { tls_secret: "client".to_owned(), verify_server: true, ..Default::default() }),
            ..Default::default()
        };
        let policies = BTreeMap::from([policy("egress", egress)]);
        let mut ctx = CompileContext::new();

        let config = fixture.generate(&[reference("egress")], &policies, PolicyContext::Route, &mut ctx);

        let egress = config.egress_mtls.unwrap();
        assert_eq!("/etc/nginx/secrets/default-client", egress.certificate);
        assert_eq!("DEFAULT", egress.ciphers);
        assert_eq!("TLSv1 TLSv1.1 TLSv1.2", egress.protocols);
        assert_eq!("$proxy_host", egress.ssl_name);
        assert!(egress.session_reuse);
        assert!(ctx.warnings.is_empty());
    }

    #[test]
    pub fn test_waf_references() {
        let mut fixture = Fixture::new();
        fixture.ap_resources.policies.insert("default/dataguard".to_owned(), "/etc/nginx/waf/nac-policies/default_dataguard".to_owned());
        fixture.ap_resources.log_confs.insert("default/logconf".to_owned(), "/etc/nginx/waf/nac-logconfs/default_logconf".to_owned());
        let waf = PolicySpec {
            waf: Some(resources::Waf {
                enable: true,
                ap_policy: "dataguard".to_owned(),
                security_log: Some(resources::SecurityLog { enable: true, ap_log_conf: "logconf".to_owned(), ..Default::default() }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let bundle = PolicySpec { waf: Some(resources::Waf { enable: true, ap_bundle: "missing.tgz".to_owned(), ..Default::default() }), ..Default::default() };
        let policies = BTreeMap::from([policy("waf", waf), policy("bundle", bundle)]);

        let mut ctx = CompileContext::new();
        let config = fixture.generate(&[reference("waf")], &policies, PolicyContext::Spec, &mut ctx);
        assert_eq!(
            Some(Waf {
                enable: "on".to_owned(),
                ap_policy: "/etc/nginx/waf/nac-policies/default_dataguard".to_owned(),
                ap_bundle: String::new(),
                ap_security_log_enable: true,
                ap_log_conf: vec!["/etc/nginx/waf/nac-logconfs/default_logconf syslog:server=localhost:514".to_owned()],
            }),
            config.waf
        );

        let mut ctx = CompileContext::new();
        let config = fixture.generate(&[reference("bundle")], &policies, PolicyContext::Spec, &mut ctx);
        assert!(config.error_return.is_some());
        assert!(ctx.warnings.contains(
            &fixture.key,
            "WAF policy default/bundle references an invalid or non-existing App Protect bundle /etc/nginx/waf/bundles/missing.tgz"
        ));
    }

    #[test]
    pub fn test_apply_to_locations() {
        let config = PoliciesConfig { allow: vec!["10.0.0.1".to_owned()], oidc: true, ..Default::default() };
        let mut locations = vec![Location::default(), Location::default()];
        config.apply_to_locations(&mut locations);
        assert!(locations.iter().all(|l| l.oidc && l.allow == vec!["10.0.0.1".to_owned()]));
    }

    #[test]
    pub fn test_remove_duplicate_limit_req_zones() {
        let zone = |name: &str, rate: &str| LimitReqZone { zone_name: name.to_owned(), rate: rate.to_owned(), ..Default::default() };
        let zones = vec![zone("a", "1r/s"), zone("b", "1r/s"), zone("a", "5r/s")];
        assert_eq!(vec![zone("a", "1r/s"), zone("b", "1r/s")], remove_duplicate_limit_req_zones(zones));
    }
}
