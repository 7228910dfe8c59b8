//! `nginx.org/*` and `nginx.com/*` Ingress annotations. They override a copy of the ConfigMap parameters per Ingress.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::error;

use crate::{
    common::ResourceKey,
    config::{is_size, ConfigParams},
    resources::IngressEx,
};

pub const PROXY_CONNECT_TIMEOUT: &str = "nginx.org/proxy-connect-timeout";
pub const PROXY_READ_TIMEOUT: &str = "nginx.org/proxy-read-timeout";
pub const PROXY_SEND_TIMEOUT: &str = "nginx.org/proxy-send-timeout";
pub const PROXY_HIDE_HEADERS: &str = "nginx.org/proxy-hide-headers";
pub const PROXY_PASS_HEADERS: &str = "nginx.org/proxy-pass-headers";
pub const CLIENT_MAX_BODY_SIZE: &str = "nginx.org/client-max-body-size";
pub const REDIRECT_TO_HTTPS: &str = "nginx.org/redirect-to-https";
pub const SSL_REDIRECT: &str = "ingress.kubernetes.io/ssl-redirect";
pub const HTTP2: &str = "nginx.org/http2";
pub const HSTS: &str = "nginx.org/hsts";
pub const HSTS_MAX_AGE: &str = "nginx.org/hsts-max-age";
pub const HSTS_INCLUDE_SUBDOMAINS: &str = "nginx.org/hsts-include-subdomains";
pub const HSTS_BEHIND_PROXY: &str = "nginx.org/hsts-behind-proxy";
pub const PROXY_BUFFERING: &str = "nginx.org/proxy-buffering";
pub const PROXY_BUFFERS: &str = "nginx.org/proxy-buffers";
pub const PROXY_BUFFER_SIZE: &str = "nginx.org/proxy-buffer-size";
pub const PROXY_MAX_TEMP_FILE_SIZE: &str = "nginx.org/proxy-max-temp-file-size";
pub const SERVER_TOKENS: &str = "nginx.org/server-tokens";
pub const SERVER_SNIPPETS: &str = "nginx.org/server-snippets";
pub const LOCATION_SNIPPETS: &str = "nginx.org/location-snippets";
pub const LB_METHOD: &str = "nginx.org/lb-method";
pub const UPSTREAM_ZONE_SIZE: &str = "nginx.org/upstream-zone-size";
pub const KEEPALIVE: &str = "nginx.org/keepalive";
pub const MAX_FAILS: &str = "nginx.org/max-fails";
pub const MAX_CONNS: &str = "nginx.org/max-conns";
pub const FAIL_TIMEOUT: &str = "nginx.org/fail-timeout";
pub const LISTEN_PORTS: &str = "nginx.org/listen-ports";
pub const LISTEN_PORTS_SSL: &str = "nginx.org/listen-ports-ssl";
pub const USE_CLUSTER_IP: &str = "nginx.org/use-cluster-ip";
pub const REWRITES: &str = "nginx.org/rewrites";
pub const SSL_SERVICES: &str = "nginx.org/ssl-services";
pub const GRPC_SERVICES: &str = "nginx.org/grpc-services";
pub const WEBSOCKET_SERVICES: &str = "nginx.org/websocket-services";
pub const BASIC_AUTH_SECRET: &str = "nginx.org/basic-auth-secret";
pub const BASIC_AUTH_REALM: &str = "nginx.org/basic-auth-realm";

pub const STICKY_COOKIE_SERVICES: &str = "nginx.com/sticky-cookie-services";
pub const HEALTH_CHECKS: &str = "nginx.com/health-checks";
pub const HEALTH_CHECKS_MANDATORY: &str = "nginx.com/health-checks-mandatory";
pub const HEALTH_CHECKS_MANDATORY_QUEUE: &str = "nginx.com/health-checks-mandatory-queue";
pub const SLOW_START: &str = "nginx.com/slow-start";
pub const JWT_KEY: &str = "nginx.com/jwt-key";
pub const JWT_REALM: &str = "nginx.com/jwt-realm";
pub const JWT_TOKEN: &str = "nginx.com/jwt-token";
pub const JWT_LOGIN_URL: &str = "nginx.com/jwt-login-url";

pub const LIMIT_REQ_RATE: &str = "nginx.org/limit-req-rate";
pub const LIMIT_REQ_KEY: &str = "nginx.org/limit-req-key";
pub const LIMIT_REQ_ZONE_SIZE: &str = "nginx.org/limit-req-zone-size";
pub const LIMIT_REQ_DELAY: &str = "nginx.org/limit-req-delay";
pub const LIMIT_REQ_NO_DELAY: &str = "nginx.org/limit-req-no-delay";
pub const LIMIT_REQ_BURST: &str = "nginx.org/limit-req-burst";
pub const LIMIT_REQ_DRY_RUN: &str = "nginx.org/limit-req-dry-run";
pub const LIMIT_REQ_LOG_LEVEL: &str = "nginx.org/limit-req-log-level";
pub const LIMIT_REQ_REJECT_CODE: &str = "nginx.org/limit-req-reject-code";

pub const APP_PROTECT_ENABLE: &str = "appprotect.f5.com/app_protect_enable";
pub const APP_PROTECT_POLICY: &str = "appprotect.f5.com/app_protect_policy";
pub const APP_PROTECT_SECURITY_LOG_ENABLE: &str = "appprotect.f5.com/app_protect_security_log_enable";
pub const APP_PROTECT_SECURITY_LOG: &str = "appprotect.f5.com/app_protect_security_log";

/// Annotations a master may not carry: they describe services, which only minions own.
const MASTER_DENYLIST: [&str; 9] = [
    REWRITES,
    SSL_SERVICES,
    GRPC_SERVICES,
    WEBSOCKET_SERVICES,
    STICKY_COOKIE_SERVICES,
    HEALTH_CHECKS,
    HEALTH_CHECKS_MANDATORY,
    HEALTH_CHECKS_MANDATORY_QUEUE,
    USE_CLUSTER_IP,
];

/// Annotations a minion may not carry: they configure the server block, which belongs to the master.
const MINION_DENYLIST: [&str; 15] = [
    PROXY_HIDE_HEADERS,
    PROXY_PASS_HEADERS,
    REDIRECT_TO_HTTPS,
    SSL_REDIRECT,
    HSTS,
    HSTS_MAX_AGE,
    HSTS_INCLUDE_SUBDOMAINS,
    SERVER_TOKENS,
    LISTEN_PORTS,
    LISTEN_PORTS_SSL,
    SERVER_SNIPPETS,
    APP_PROTECT_ENABLE,
    APP_PROTECT_POLICY,
    APP_PROTECT_SECURITY_LOG_ENABLE,
    APP_PROTECT_SECURITY_LOG,
];

/// Master annotations a minion inherits unless it sets them itself.
const MINION_INHERITANCE_LIST: [&str; 24] = [
    PROXY_CONNECT_TIMEOUT,
    PROXY_READ_TIMEOUT,
    PROXY_SEND_TIMEOUT,
    CLIENT_MAX_BODY_SIZE,
    PROXY_BUFFERING,
    PROXY_BUFFERS,
    PROXY_BUFFER_SIZE,
    PROXY_MAX_TEMP_FILE_SIZE,
    UPSTREAM_ZONE_SIZE,
    LOCATION_SNIPPETS,
    LB_METHOD,
    KEEPALIVE,
    MAX_FAILS,
    MAX_CONNS,
    FAIL_TIMEOUT,
    LIMIT_REQ_RATE,
    LIMIT_REQ_KEY,
    LIMIT_REQ_ZONE_SIZE,
    LIMIT_REQ_DELAY,
    LIMIT_REQ_NO_DELAY,
    LIMIT_REQ_BURST,
    LIMIT_REQ_DRY_RUN,
    LIMIT_REQ_LOG_LEVEL,
    LIMIT_REQ_REJECT_CODE,
];

const LIMIT_REQ_LOG_LEVELS: [&str; 4] = ["info", "notice", "warn", "error"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("invalid value '{value}' for annotation {annotation}: {reason}")]
    InvalidValue { annotation: &'static str, value: String, reason: &'static str },
    #[error("invalid service format: {0}")]
    InvalidServiceFormat(String),
}

fn invalid(annotation: &'static str, value: &str, reason: &'static str) -> AnnotationError {
    AnnotationError::InvalidValue { annotation, value: value.to_owned(), reason }
}

/// Typed access to the annotations of one Ingress.
struct Annotations<'a> {
    values: &'a BTreeMap<String, String>,
    errors: Vec<AnnotationError>,
}

impl<'a> Annotations<'a> {
    fn new(values: &'a BTreeMap<String, String>) -> Self {
        Self { values, errors: vec![] }
    }

    fn string(&self, annotation: &'static str) -> Option<&'a str> {
        self.values.get(annotation).map(String::as_str)
    }

    fn set_string(&self, annotation: &'static str, target: &mut String) {
        if let Some(value) = self.string(annotation) {
            value.clone_into(target);
        }
    }

    fn bool(&mut self, annotation: &'static str) -> Option<bool> {
        let value = self.string(annotation)?;
        let parsed = parse_bool(value);
        if parsed.is_none() {
            self.errors.push(invalid(annotation, value, "must be a boolean"));
        }
        parsed
    }

    fn set_bool(&mut self, annotation: &'static str, target: &mut bool) {
        if let Some(value) = self.bool(annotation) {
            *target = value;
        }
    }

    fn number<T: std::str::FromStr>(&mut self, annotation: &'static str) -> Option<T> {
        let value = self.string(annotation)?;
        let parsed = value.trim().parse().ok();
        if parsed.is_none() {
            self.errors.push(invalid(annotation, value, "must be a number"));
        }
        parsed
    }

    fn set_number<T: std::str::FromStr>(&mut self, annotation: &'static str, target: &mut T) {
        if let Some(value) = self.number(annotation) {
            *target = value;
        }
    }

    fn list(&self, annotation: &'static str) -> Option<Vec<String>> {
        self.string(annotation).map(|value| value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(ToOwned::to_owned).collect())
    }

    fn ports(&mut self, annotation: &'static str) -> Option<Vec<i32>> {
        let value = self.string(annotation)?;
        let ports: Option<Vec<i32>> = value.split(',').map(|port| port.trim().parse().ok().filter(|p| (1..=65535).contains(p))).collect();
        if ports.is_none() {
            self.errors.push(invalid(annotation, value, "must be a comma separated list of ports"));
        }
        ports
    }
}

/// Mirrors the boolean spellings Kubernetes users are used to: `1`, `t`, `true`, `True`, `TRUE` and their negations.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "True" | "TRUE" => Some(true),
        "0" | "f" | "F" | "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

/// Applies the annotations of an Ingress to a copy of the ConfigMap parameters. Invalid values are logged and skipped.
pub fn parse_annotations(ing_ex: &IngressEx, base: &ConfigParams, is_plus: bool) -> ConfigParams {
    let key = ing_ex.key();
    let mut params = base.clone();
    let mut annotations = Annotations::new(ing_ex.annotations());

    if let Some(tokens) = annotations.string(SERVER_TOKENS) {
        match parse_bool(tokens) {
            Some(true) => "on".clone_into(&mut params.server_tokens),
            Some(false) => "off".clone_into(&mut params.server_tokens),
            None if is_plus => tokens.clone_into(&mut params.server_tokens),
            None => annotations.errors.push(invalid(SERVER_TOKENS, tokens, "must be a boolean")),
        }
    }
    annotations.set_string(LB_METHOD, &mut params.lb_method);
    annotations.set_string(PROXY_CONNECT_TIMEOUT, &mut params.proxy_connect_timeout);
    annotations.set_string(PROXY_READ_TIMEOUT, &mut params.proxy_read_timeout);
    annotations.set_string(PROXY_SEND_TIMEOUT, &mut params.proxy_send_timeout);
    annotations.set_string(CLIENT_MAX_BODY_SIZE, &mut params.client_max_body_size);
    annotations.set_string(PROXY_BUFFERS, &mut params.proxy_buffers);
    annotations.set_string(PROXY_BUFFER_SIZE, &mut params.proxy_buffer_size);
    annotations.set_string(PROXY_MAX_TEMP_FILE_SIZE, &mut params.proxy_max_temp_file_size);
    annotations.set_string(FAIL_TIMEOUT, &mut params.fail_timeout);
    annotations.set_bool(PROXY_BUFFERING, &mut params.proxy_buffering);
    annotations.set_bool(HTTP2, &mut params.http2);
    annotations.set_bool(REDIRECT_TO_HTTPS, &mut params.redirect_to_https);
    annotations.set_bool(SSL_REDIRECT, &mut params.ssl_redirect);
    annotations.set_bool(USE_CLUSTER_IP, &mut params.use_cluster_ip);
    annotations.set_number(MAX_FAILS, &mut params.max_fails);
    annotations.set_number(MAX_CONNS, &mut params.max_conns);
    annotations.set_number(KEEPALIVE, &mut params.keepalive);

    if let Some(headers) = annotations.list(PROXY_HIDE_HEADERS) {
        params.proxy_hide_headers = headers;
    }
    if let Some(headers) = annotations.list(PROXY_PASS_HEADERS) {
        params.proxy_pass_headers = headers;
    }
    if let Some(snippets) = annotations.string(SERVER_SNIPPETS) {
        params.server_snippets = snippets.lines().map(ToOwned::to_owned).collect();
    }
    if let Some(snippets) = annotations.string(LOCATION_SNIPPETS) {
        params.location_snippets = snippets.lines().map(ToOwned::to_owned).collect();
    }
    if let Some(size) = annotations.string(UPSTREAM_ZONE_SIZE) {
        if is_size(size) {
            size.clone_into(&mut params.upstream_zone_size);
        } else {
            annotations.errors.push(invalid(UPSTREAM_ZONE_SIZE, size, "must be a valid size"));
        }
    }
    if let Some(ports) = annotations.ports(LISTEN_PORTS) {
        params.ports = ports;
    }
    if let Some(ports) = annotations.ports(LISTEN_PORTS_SSL) {
        params.ssl_ports = ports;
    }

    parse_hsts(&mut annotations, &mut params);

    if is_plus {
        annotations.set_bool(HEALTH_CHECKS, &mut params.health_check_enabled);
        if params.health_check_enabled {
            annotations.set_bool(HEALTH_CHECKS_MANDATORY, &mut params.health_check_mandatory);
            if params.health_check_mandatory {
                annotations.set_number(HEALTH_CHECKS_MANDATORY_QUEUE, &mut params.health_check_mandatory_queue);
            }
        }
        annotations.set_string(SLOW_START, &mut params.slow_start);
        annotations.set_string(JWT_KEY, &mut params.jwt_key);
        annotations.set_string(JWT_REALM, &mut params.jwt_realm);
        annotations.set_string(JWT_TOKEN, &mut params.jwt_token);
        annotations.set_string(JWT_LOGIN_URL, &mut params.jwt_login_url);
    }
    annotations.set_string(BASIC_AUTH_SECRET, &mut params.basic_auth_secret);
    annotations.set_string(BASIC_AUTH_REALM, &mut params.basic_auth_realm);

    if let Some(enable) = annotations.bool(APP_PROTECT_ENABLE) {
        (if enable { "on" } else { "off" }).clone_into(&mut params.app_protect_enable);
    }
    if let Some(enable) = annotations.bool(APP_PROTECT_SECURITY_LOG_ENABLE) {
        (if enable { "on" } else { "off" }).clone_into(&mut params.app_protect_log_enable);
    }

    let mut errors = annotations.errors;
    errors.extend(parse_rate_limit_annotations(ing_ex.annotations(), &mut params));
    for e in errors {
        error!("{key} {e}, ignoring");
    }
    params
}

fn parse_hsts(annotations: &mut Annotations, params: &mut ConfigParams) {
    let Some(hsts) = annotations.bool(HSTS) else {
        return;
    };
    let errors_before = annotations.errors.len();
    let max_age = annotations.number(HSTS_MAX_AGE);
    let include_subdomains = annotations.bool(HSTS_INCLUDE_SUBDOMAINS);
    let behind_proxy = annotations.bool(HSTS_BEHIND_PROXY);
    if annotations.errors.len() > errors_before {
        return;
    }
    params.hsts = hsts;
    if let Some(max_age) = max_age {
        params.hsts_max_age = max_age;
    }
    if let Some(include_subdomains) = include_subdomains {
        params.hsts_include_subdomains = include_subdomains;
    }
    if let Some(behind_proxy) = behind_proxy {
        params.hsts_behind_proxy = behind_proxy;
    }
}

/// Applies the `limit-req` annotations. Every invalid value is returned and leaves its parameter untouched.
pub fn parse_rate_limit_annotations(values: &BTreeMap<String, String>, params: &mut ConfigParams) -> Vec<AnnotationError> {
    let mut annotations = Annotations::new(values);
    if let Some(rate) = annotations.string(LIMIT_REQ_RATE) {
        if is_rate(rate) {
            rate.clone_into(&mut params.limit_req_rate);
        } else {
            annotations.errors.push(invalid(LIMIT_REQ_RATE, rate, "must be a positive rate in r/s or r/m"));
        }
    }
    annotations.set_string(LIMIT_REQ_KEY, &mut params.limit_req_key);
    if let Some(size) = annotations.string(LIMIT_REQ_ZONE_SIZE) {
        if is_size(size) {
            size.clone_into(&mut params.limit_req_zone_size);
        } else {
            annotations.errors.push(invalid(LIMIT_REQ_ZONE_SIZE, size, "must be a valid size"));
        }
    }
    annotations.set_number(LIMIT_REQ_DELAY, &mut params.limit_req_delay);
    annotations.set_bool(LIMIT_REQ_NO_DELAY, &mut params.limit_req_no_delay);
    annotations.set_number(LIMIT_REQ_BURST, &mut params.limit_req_burst);
    annotations.set_bool(LIMIT_REQ_DRY_RUN, &mut params.limit_req_dry_run);
    if let Some(level) = annotations.string(LIMIT_REQ_LOG_LEVEL) {
        if LIMIT_REQ_LOG_LEVELS.contains(&level) {
            level.clone_into(&mut params.limit_req_log_level);
        } else {
            annotations.errors.push(invalid(LIMIT_REQ_LOG_LEVEL, level, "must be one of info, notice, warn or error"));
        }
    }
    if let Some(code) = annotations.number::<i32>(LIMIT_REQ_REJECT_CODE) {
        if (400..=599).contains(&code) {
            params.limit_req_reject_code = code;
        } else {
            annotations.errors.push(invalid(LIMIT_REQ_REJECT_CODE, &code.to_string(), "must be between 400 and 599"));
        }
    }
    annotations.errors
}

/// `10r/s` or `10r/m` with a non-zero count.
fn is_rate(rate: &str) -> bool {
    let Some(count) = rate.strip_suffix("r/s").or_else(|| rate.strip_suffix("r/m")) else {
        return false;
    };
    !count.is_empty() && count.chars().all(|c| c.is_ascii_digit()) && !count.trim_start_matches('0').is_empty()
}

/// Removes the annotations a master may not carry and returns their names.
pub fn filter_master_annotations(annotations: &mut BTreeMap<String, String>) -> Vec<String> {
    remove_listed(annotations, &MASTER_DENYLIST)
}

/// Removes the annotations a minion may not carry and returns their names.
pub fn filter_minion_annotations(annotations: &mut BTreeMap<String, String>) -> Vec<String> {
    remove_listed(annotations, &MINION_DENYLIST)
}

fn remove_listed(annotations: &mut BTreeMap<String, String>, list: &[&str]) -> Vec<String> {
    let removed: Vec<String> = annotations.keys().filter(|key| list.contains(&key.as_str())).cloned().collect();
    for key in &removed {
        annotations.remove(key);
    }
    removed
}

pub fn merge_master_annotations_into_minion(minion: &mut BTreeMap<String, String>, master: &BTreeMap<String, String>) {
    for (key, value) in master {
        if MINION_INHERITANCE_LIST.contains(&key.as_str()) {
            minion.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

/// Services named by a comma separated annotation such as `nginx.org/ssl-services`.
pub fn service_set(annotations: &BTreeMap<String, String>, annotation: &str) -> BTreeSet<String> {
    annotations
        .get(annotation)
        .map(|value| value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(ToOwned::to_owned).collect())
        .unwrap_or_default()
}

/// Per service rewrites, from `serviceName=svc rewrite=/path;...`.
pub fn get_rewrites(owner: &ResourceKey, annotations: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    parse_service_list(owner, annotations, REWRITES, parse_rewrites)
}

/// Per service sticky cookie parameters, from `serviceName=svc srv_id expires=1h;...`.
pub fn get_session_persistence_services(owner: &ResourceKey, annotations: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    parse_service_list(owner, annotations, STICKY_COOKIE_SERVICES, parse_sticky_service)
}

fn parse_service_list(
    owner: &ResourceKey,
    annotations: &BTreeMap<String, String>,
    annotation: &str,
    parse: fn(&str) -> Result<(String, String), AnnotationError>,
) -> BTreeMap<String, String> {
    let Some(value) = annotations.get(annotation) else {
        return BTreeMap::new();
    };
    value
        .split(';')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|service| match parse(service) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                error!("{owner} in {annotation}: {e}");
                None
            },
        })
        .collect()
}

fn service_name(part: &str, service: &str) -> Result<String, AnnotationError> {
    match part.split_once('=') {
        Some(("serviceName", name)) if !name.is_empty() => Ok(name.to_owned()),
        _ => Err(AnnotationError::InvalidServiceFormat(service.to_owned())),
    }
}

pub fn parse_rewrites(service: &str) -> Result<(String, String), AnnotationError> {
    let trimmed = service.trim();
    let Some((name_part, rewrite_part)) = trimmed.split_once(' ') else {
        return Err(AnnotationError::InvalidServiceFormat(service.to_owned()));
    };
    let name = service_name(name_part, service)?;
    match rewrite_part.trim().split_once('=') {
        Some(("rewrite", path)) => Ok((name, path.to_owned())),
        _ => Err(AnnotationError::InvalidServiceFormat(service.to_owned())),
    }
}

pub fn parse_sticky_service(service: &str) -> Result<(String, String), AnnotationError> {
    let trimmed = service.trim();
    let Some((name_part, cookie)) = trimmed.split_once(' ') else {
        return Err(AnnotationError::InvalidServiceFormat(service.to_owned()));
    };
    Ok((service_name(name_part, service)?, cookie.trim().to_owned()))
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::networking::v1::Ingress;
    use kube::api::ObjectMeta;

    use super::*;

    fn annotations(values: &[(&str, &str)]) -> BTreeMap<String, String> {
        values.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    pub fn test_parse_rewrites() {
        assert_eq!(Ok(("coffee-svc".to_owned(), "/beans/".to_owned())), parse_rewrites("serviceName=coffee-svc rewrite=/beans/"));
        assert_eq!(Ok(("coffee-svc".to_owned(), "/beans/".to_owned())), parse_rewrites("\t\n serviceName=coffee-svc rewrite=/beans/ \t\n"));
        assert!(parse_rewrites("serviceNamecoffee-svc rewrite=/").is_err());
    }

    #[test]
    pub fn test_parse_sticky_service() {
        assert_eq!(
            Ok(("coffee-svc".to_owned(), "srv_id expires=1h domain=.example.com path=/".to_owned())),
            parse_sticky_service("serviceName=coffee-svc srv_id expires=1h domain=.example.com path=/")
        );
        assert!(parse_sticky_service("serviceNamecoffee-svc srv_id expires=1h domain=.example.com path=/").is_err());
    }

    #[test]
    pub fn test_filter_master_annotations() {
        let mut master = annotations(&[
            (REWRITES, "serviceName=service1 rewrite=rewrite1"),
            (SSL_SERVICES, "service1"),
            (HSTS, "True"),
            (HSTS_MAX_AGE, "2700000"),
            (HSTS_INCLUDE_SUBDOMAINS, "True"),
        ]);
        let removed = filter_master_annotations(&mut master);
        assert_eq!(vec![REWRITES.to_owned(), SSL_SERVICES.to_owned()], removed);
        assert_eq!(annotations(&[(HSTS, "True"), (HSTS_MAX_AGE, "2700000"), (HSTS_INCLUDE_SUBDOMAINS, "True")]), master);
    }

    #[test]
    pub fn test_filter_minion_annotations() {
        let mut minion = annotations(&[
            (REWRITES, "serviceName=service1 rewrite=rewrite1"),
            (SSL_SERVICES, "service1"),
            (HSTS, "True"),
            (HSTS_MAX_AGE, "2700000"),
            (HSTS_INCLUDE_SUBDOMAINS, "True"),
        ]);
        let removed = filter_minion_annotations(&mut minion);
        assert_eq!(vec![HSTS.to_owned(), HSTS_INCLUDE_SUBDOMAINS.to_owned(), HSTS_MAX_AGE.to_owned()], removed);
        assert_eq!(annotations(&[(REWRITES, "serviceName=service1 rewrite=rewrite1"), (SSL_SERVICES, "service1")]), minion);
    }

    #[test]
    pub fn test_merge_master_annotations_into_minion() {
        let master = annotations(&[
            (PROXY_BUFFERING, "True"),
            (PROXY_BUFFERS, "2"),
            (PROXY_BUFFER_SIZE, "8k"),
            (HSTS, "True"),
            (HSTS_MAX_AGE, "2700000"),
            (PROXY_CONNECT_TIMEOUT, "50s"),
            (JWT_TOKEN, "$cookie_auth_token"),
        ]);
        let mut minion = annotations(&[(CLIENT_MAX_BODY_SIZE, "2m"), (PROXY_CONNECT_TIMEOUT, "20s")]);
        merge_master_annotations_into_minion(&mut minion, &master);
        let expected = annotations(&[
            (PROXY_BUFFERING, "True"),
            (PROXY_BUFFERS, "2"),
            (PROXY_BUFFER_SIZE, "8k"),
            (CLIENT_MAX_BODY_SIZE, "2m"),
            (PROXY_CONNECT_TIMEOUT, "20s"),
        ]);
        assert_eq!(expected, minion);
    }

    #[test]
    pub fn test_parse_rate_limit_annotations() {
        let mut params = ConfigParams::new_default(false);
        let valid = annotations(&[
            (LIMIT_REQ_RATE, "200r/s"),
            (LIMIT_REQ_KEY, "${request_uri}"),
            (LIMIT_REQ_BURST, "100"),
            (LIMIT_REQ_DELAY, "80"),
            (LIMIT_REQ_NO_DELAY, "true"),
            (LIMIT_REQ_REJECT_CODE, "429"),
            (LIMIT_REQ_ZONE_SIZE, "11m"),
            (LIMIT_REQ_DRY_RUN, "true"),
            (LIMIT_REQ_LOG_LEVEL, "info"),
        ]);
        assert_eq!(Vec::<AnnotationError>::new(), parse_rate_limit_annotations(&valid, &mut params));
        assert_eq!("200r/s", params.limit_req_rate);
        assert_eq!(100, params.limit_req_burst);
        assert_eq!("info", params.limit_req_log_level);

        for (annotation, value) in
            [(LIMIT_REQ_RATE, "200"), (LIMIT_REQ_RATE, "200r/h"), (LIMIT_REQ_RATE, "0r/s"), (LIMIT_REQ_ZONE_SIZE, "10abc"), (LIMIT_REQ_LOG_LEVEL, "foobar")]
        {
            let mut params = ConfigParams::new_default(false);
            assert_eq!(1, parse_rate_limit_annotations(&annotations(&[(annotation, value)]), &mut params).len(), "{annotation}: {value}");
        }
    }

    #[test]
    pub fn test_parse_annotations() {
        let ingress = Ingress {
            metadata: ObjectMeta {
                name: Some("cafe-ingress".to_owned()),
                namespace: Some("default".to_owned()),
                annotations: Some(annotations(&[
                    (PROXY_CONNECT_TIMEOUT, "30s"),
                    (SERVER_TOKENS, "False"),
                    (MAX_FAILS, "not-a-number"),
                    (LISTEN_PORTS, "80,8080"),
                    (HSTS, "true"),
                    (HSTS_MAX_AGE, "100"),
                    (JWT_KEY, "jwk-secret"),
                ])),
                ..Default::default()
            },
            ..Default::default()
        };
        let ing_ex = IngressEx::new(ingress);
        let base = ConfigParams::new_default(false);

        let params = parse_annotations(&ing_ex, &base, false);
        assert_eq!("30s", params.proxy_connect_timeout);
        assert_eq!("off", params.server_tokens);
        assert_eq!(base.max_fails, params.max_fails);
        assert_eq!(vec![80, 8080], params.ports);
        assert!(params.hsts);
        assert_eq!(100, params.hsts_max_age);
        assert_eq!("", params.jwt_key);

        let params = parse_annotations(&ing_ex, &base, true);
        assert_eq!("jwk-secret", params.jwt_key);
    }
}
