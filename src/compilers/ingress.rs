use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::{
    core::v1::Probe,
    networking::v1::{IngressBackend, IngressTLS},
};
use tracing::{debug, error, warn};

use super::annotations::{
    get_rewrites, get_session_persistence_services, parse_annotations, service_set, GRPC_SERVICES, SSL_SERVICES, WEBSOCKET_SERVICES,
};
use crate::{
    common::{
        generate_proxy_ssl_name,
        secrets::{check_secret, SecretCheck, SECRET_TYPE_HTPASSWD, SECRET_TYPE_JWK, SECRET_TYPE_TLS, WILDCARD_SECRET_PATH},
        ResourceKey, Warnings,
    },
    config::ConfigParams,
    nginx::{
        version1::{self, BasicAuth, HealthCheck, IngressNginxConfig, JwtAuth, JwtRedirectLocation, LimitReq, LimitReqZone, Location, Server, Upstream, UpstreamServer},
        version2::UpstreamLabels,
    },
    resources::IngressEx,
    Configuration,
};

const EXACT_PATH_TYPE: &str = "Exact";

/// Output of compiling one Ingress.
#[derive(Clone, Debug, Default)]
pub struct IngressCompileResult {
    pub config: IngressNginxConfig,
    pub warnings: Warnings,
}

/// Per service settings taken from the service list annotations.
struct ServiceAnnotations {
    websocket: BTreeSet<String>,
    ssl: BTreeSet<String>,
    grpc: BTreeSet<String>,
    rewrites: BTreeMap<String, String>,
    sticky_cookies: BTreeMap<String, String>,
}

/// Compiles a regular Ingress, or a minion of a mergeable Ingress, into server blocks and upstreams.
pub struct IngressCompiler<'a> {
    params: &'a ConfigParams,
    configuration: &'a Configuration,
}

impl<'a> IngressCompiler<'a> {
    pub fn new(params: &'a ConfigParams, configuration: &'a Configuration) -> Self {
        Self { params, configuration }
    }

    pub fn compile(&self, ing_ex: &IngressEx, is_minion: bool) -> IngressCompileResult {
        let key = ing_ex.key();
        let namespace = ing_ex.namespace();
        let name = ing_ex.name();
        let params = parse_annotations(ing_ex, self.params, self.configuration.is_plus);
        let annotations = ing_ex.annotations();

        let mut services = ServiceAnnotations {
            websocket: service_set(annotations, WEBSOCKET_SERVICES),
            ssl: service_set(annotations, SSL_SERVICES),
            grpc: service_set(annotations, GRPC_SERVICES),
            rewrites: get_rewrites(&key, annotations),
            sticky_cookies: get_session_persistence_services(&key, annotations),
        };
        if !services.grpc.is_empty() && !params.http2 {
            error!("{key} annotation {GRPC_SERVICES} requires HTTP2, ignoring");
            services.grpc.clear();
        }

        let mut warnings = Warnings::new();
        let mut upstreams = BTreeMap::new();
        let spec = ing_ex.ingress.spec.clone().unwrap_or_default();
        let default_backend = spec.default_backend.as_ref().filter(|backend| backend.service.is_some());

        if let Some(backend) = default_backend {
            let upstream_name = ingress_upstream_name(&namespace, &name, "", backend);
            let upstream = self.create_upstream(ing_ex, &upstream_name, backend, &services, &params);
            upstreams.insert(upstream_name, upstream);
        }

        let mut servers = vec![];
        let mut limit_req_zones: Vec<LimitReqZone> = vec![];
        let tls = spec.tls.unwrap_or_default();

        for rule in spec.rules.unwrap_or_default() {
            let host = rule.host.unwrap_or_default();
            if !ing_ex.valid_hosts.contains(&host) {
                debug!("{key} skipping host {host}");
                continue;
            }
            let paths = rule.http.map(|http| http.paths).unwrap_or_default();

            let mut server = self.create_server(&host, &params);
            add_ssl_config(&mut server, &key, &host, &tls, ing_ex, self.configuration.is_wildcard_enabled, &mut warnings);
            if !is_minion {
                server.app_protect_policy = ing_ex.app_protect_policy.clone().unwrap_or_default();
                server.app_protect_log_conf.clone_from(&ing_ex.app_protect_log_confs);
                if !params.jwt_key.is_empty() {
                    let (jwt_auth, redirect) = generate_jwt_config(&key, ing_ex, &params, &mut warnings);
                    server.jwt_auth = Some(jwt_auth);
                    server.jwt_redirect_locations.extend(redirect);
                }
                if !params.basic_auth_secret.is_empty() {
                    server.basic_auth = Some(generate_basic_auth_config(&key, ing_ex, &params, &mut warnings));
                }
            }

            let mut grpc_only = !services.grpc.is_empty() && paths.iter().all(|path| services.grpc.contains(&backend_service_name(&path.backend)));
            let mut locations = vec![];
            let mut health_checks = BTreeMap::new();
            let mut root_location = false;

            for path in &paths {
                let path_value = path.path.clone().unwrap_or_default();
                if is_minion && !ing_ex.valid_minion_paths.contains(&path_value) {
                    continue;
                }
                let service = backend_service_name(&path.backend);
                let upstream_name = ingress_upstream_name(&namespace, &name, &host, &path.backend);
                if params.health_check_enabled {
                    if let Some(probe) = ing_ex.health_checks.get(&endpoints_key(&path.backend)) {
                        health_checks.insert(upstream_name.clone(), create_health_check(probe, &upstream_name, &params));
                    }
                }
                let upstream = upstreams
                    .entry(upstream_name.clone())
                    .or_insert_with(|| self.create_upstream(ing_ex, &upstream_name, &path.backend, &services, &params))
                    .clone();

                let mut location = create_location(&path_or_default(&path_value), upstream, &params, &services, &service, &namespace, Some(path.path_type.as_str()));
                if is_minion && !params.jwt_key.is_empty() {
                    let (jwt_auth, redirect) = generate_jwt_config(&key, ing_ex, &params, &mut warnings);
                    location.jwt_auth = Some(jwt_auth);
                    server.jwt_redirect_locations.extend(redirect);
                }
                if is_minion && !params.basic_auth_secret.is_empty() {
                    location.basic_auth = Some(generate_basic_auth_config(&key, ing_ex, &params, &mut warnings));
                }
                if !params.limit_req_rate.is_empty() {
                    let zone_name = format!("{namespace}/{name}");
                    location.limit_req = Some(LimitReq {
                        zone: zone_name.clone(),
                        burst: params.limit_req_burst,
                        delay: params.limit_req_delay,
                        no_delay: params.limit_req_no_delay,
                        reject_code: params.limit_req_reject_code,
                        dry_run: params.limit_req_dry_run,
                        log_level: params.limit_req_log_level.clone(),
                    });
                    if !limit_req_zones.iter().any(|zone| zone.name == zone_name) {
                        limit_req_zones.push(LimitReqZone {
                            name: zone_name,
                            key: params.limit_req_key.clone(),
                            size: params.limit_req_zone_size.clone(),
                            rate: params.limit_req_rate.clone(),
                        });
                    }
                }
                root_location |= location.path == "/";
                locations.push(location);
            }

            if let (false, Some(backend)) = (root_location, default_backend) {
                let service = backend_service_name(backend);
                let upstream_name = ingress_upstream_name(&namespace, &name, "", backend);
                let upstream = upstreams.get(&upstream_name).cloned().unwrap_or_default();
                locations.push(create_location("/", upstream, &params, &services, &service, &namespace, Some("Prefix")));
                if params.health_check_enabled {
                    if let Some(probe) = ing_ex.health_checks.get(&endpoints_key(backend)) {
                        health_checks.insert(upstream_name.clone(), create_health_check(probe, &upstream_name, &params));
                    }
                }
                grpc_only &= services.grpc.contains(&service);
            }

            server.locations = locations;
            server.health_checks = health_checks;
            server.grpc_only = grpc_only;
            servers.push(server);
        }

        let config = IngressNginxConfig {
            upstreams: upstreams.into_values().collect(),
            servers,
            keepalive: if params.keepalive > 0 { params.keepalive.to_string() } else { String::new() },
            ingress: version1::Ingress { name, namespace, annotations: annotations.clone() },
            limit_req_zones,
        };
        IngressCompileResult { config, warnings }
    }

    fn create_server(&self, host: &str, params: &ConfigParams) -> Server {
        Server {
            name: host.to_owned(),
            server_tokens: params.server_tokens.clone(),
            http2: params.http2,
            redirect_to_https: params.redirect_to_https,
            ssl_redirect: params.ssl_redirect,
            proxy_protocol: params.proxy_protocol,
            hsts: params.hsts,
            hsts_max_age: params.hsts_max_age,
            hsts_include_subdomains: params.hsts_include_subdomains,
            hsts_behind_proxy: params.hsts_behind_proxy,
            status_zone: host.to_owned(),
            real_ip_header: params.real_ip_header.clone(),
            set_real_ip_from: params.set_real_ip_from.clone(),
            real_ip_recursive: params.real_ip_recursive,
            proxy_hide_headers: params.proxy_hide_headers.clone(),
            proxy_pass_headers: params.proxy_pass_headers.clone(),
            server_snippets: params.server_snippets.clone(),
            ports: params.ports.clone(),
            ssl_ports: params.ssl_ports.clone(),
            tls_passthrough: self.configuration.tls_passthrough,
            app_protect_enable: params.app_protect_enable.clone(),
            app_protect_log_enable: params.app_protect_log_enable.clone(),
            ..Default::default()
        }
    }

    fn create_upstream(&self, ing_ex: &IngressEx, name: &str, backend: &IngressBackend, services: &ServiceAnnotations, params: &ConfigParams) -> Upstream {
        let service = backend_service_name(backend);
        let labels = UpstreamLabels {
            service: service.clone(),
            resource_type: "ingress".to_owned(),
            resource_name: ing_ex.name(),
            resource_namespace: ing_ex.namespace(),
        };
        let endpoints_key = endpoints_key(backend);
        let mut upstream = if self.configuration.is_plus {
            let (queue, queue_timeout) = upstream_requires_queue(&endpoints_key, ing_ex, params);
            Upstream {
                name: name.to_owned(),
                sticky_cookie: services.sticky_cookies.get(&service).cloned().unwrap_or_default(),
                queue,
                queue_timeout,
                upstream_labels: labels,
                ..Default::default()
            }
        } else {
            let mut upstream = Upstream::with_default_server(name);
            if self.configuration.is_latency_metrics_enabled {
                upstream.upstream_labels = labels;
            }
            upstream
        };

        if let Some(endpoints) = ing_ex.endpoints.get(&endpoints_key) {
            let is_external_name = ing_ex.external_name_svcs.contains(&service);
            let endpoints: &[String] = if is_external_name && !params.is_resolver_configured() {
                warn!("{} a resolver must be configured for Type ExternalName service {service}, no upstream servers will be created", ing_ex.key());
                &[]
            } else {
                endpoints
            };
            let server = |address: String| UpstreamServer {
                address,
                max_fails: params.max_fails,
                max_conns: params.max_conns,
                fail_timeout: params.fail_timeout.clone(),
                slow_start: params.slow_start.clone(),
                resolve: is_external_name,
            };
            if params.use_cluster_ip {
                let port = backend.service.as_ref().and_then(|s| s.port.as_ref()).and_then(|p| p.number).unwrap_or_default();
                upstream.upstream_servers = vec![server(format!("{service}.{}.svc.cluster.local:{port}", ing_ex.namespace()))];
            } else if !endpoints.is_empty() {
                let mut servers: Vec<_> = endpoints.iter().cloned().map(server).collect();
                servers.sort_by(|a, b| a.address.cmp(&b.address));
                upstream.upstream_servers = servers;
            }
        }

        upstream.lb_method.clone_from(&params.lb_method);
        upstream.upstream_zone_size.clone_from(&params.upstream_zone_size);
        upstream
    }
}

fn backend_service_name(backend: &IngressBackend) -> String {
    backend.service.as_ref().map(|s| s.name.clone()).unwrap_or_default()
}

/// The port of a service backend, by name when it is named.
pub fn backend_port(backend: &IngressBackend) -> String {
    let Some(port) = backend.service.as_ref().and_then(|s| s.port.as_ref()) else {
        return "0".to_owned();
    };
    match &port.name {
        Some(name) if !name.is_empty() => name.clone(),
        _ => port.number.unwrap_or_default().to_string(),
    }
}

/// Endpoints and probes of an Ingress backend are keyed by service name followed by the port.
fn endpoints_key(backend: &IngressBackend) -> String {
    format!("{}{}", backend_service_name(backend), backend_port(backend))
}

pub fn ingress_upstream_name(namespace: &str, name: &str, host: &str, backend: &IngressBackend) -> String {
    format!("{namespace}-{name}-{host}-{}-{}", backend_service_name(backend), backend_port(backend))
}

/// Upstream names and endpoints of an Ingress as pushed through the Plus API on endpoint changes.
/// Backends without known endpoints and ExternalName services are left out.
pub fn ingress_upstream_endpoints_for_plus(ing_ex: &IngressEx) -> Vec<(String, Vec<String>)> {
    let namespace = ing_ex.namespace();
    let name = ing_ex.name();
    let Some(spec) = ing_ex.ingress.spec.as_ref() else {
        return vec![];
    };

    let default_backend = spec.default_backend.iter().map(|backend| ("", backend));
    let rule_backends = spec.rules.iter().flatten().flat_map(|rule| {
        let host = rule.host.as_deref().unwrap_or_default();
        rule.http.iter().flat_map(|http| http.paths.iter()).map(move |path| (host, &path.backend))
    });

    let mut upstreams = vec![];
    for (host, backend) in default_backend.chain(rule_backends) {
        let Some(endpoints) = ing_ex.endpoints.get(&endpoints_key(backend)) else {
            continue;
        };
        let service = backend_service_name(backend);
        if ing_ex.external_name_svcs.contains(&service) {
            debug!("{} service {service} is of type ExternalName, skipping Plus API endpoints update", ing_ex.key());
            continue;
        }
        upstreams.push((ingress_upstream_name(&namespace, &name, host, backend), endpoints.clone()));
    }
    upstreams
}

fn redirect_location_name(namespace: &str, name: &str) -> String {
    format!("@login_url_{namespace}-{name}")
}

fn path_or_default(path: &str) -> String {
    if path.is_empty() {
        "/".to_owned()
    } else {
        path.to_owned()
    }
}

fn generate_ingress_path(path: &str, path_type: Option<&str>) -> String {
    if path_type == Some(EXACT_PATH_TYPE) {
        format!("= {path}")
    } else {
        path.to_owned()
    }
}

fn create_location(
    path: &str,
    upstream: Upstream,
    params: &ConfigParams,
    services: &ServiceAnnotations,
    service: &str,
    namespace: &str,
    path_type: Option<&str>,
) -> Location {
    Location {
        path: generate_ingress_path(path, path_type),
        upstream,
        proxy_connect_timeout: params.proxy_connect_timeout.clone(),
        proxy_read_timeout: params.proxy_read_timeout.clone(),
        proxy_send_timeout: params.proxy_send_timeout.clone(),
        client_max_body_size: params.client_max_body_size.clone(),
        websocket: services.websocket.contains(service),
        rewrite: services.rewrites.get(service).cloned().unwrap_or_default(),
        ssl: services.ssl.contains(service),
        grpc: services.grpc.contains(service),
        proxy_buffering: params.proxy_buffering,
        proxy_buffers: params.proxy_buffers.clone(),
        proxy_buffer_size: params.proxy_buffer_size.clone(),
        proxy_max_temp_file_size: params.proxy_max_temp_file_size.clone(),
        proxy_ssl_name: generate_proxy_ssl_name(service, namespace),
        location_snippets: params.location_snippets.clone(),
        service_name: service.to_owned(),
        ..Default::default()
    }
}

/// Mandatory health checks start every upstream unhealthy, so a queue keeps requests waiting instead of failing during a reload.
fn upstream_requires_queue(endpoints_key: &str, ing_ex: &IngressEx, params: &ConfigParams) -> (i64, i64) {
    if params.health_check_enabled && params.health_check_mandatory && params.health_check_mandatory_queue > 0 {
        if let Some(probe) = ing_ex.health_checks.get(endpoints_key) {
            return (params.health_check_mandatory_queue, i64::from(probe.timeout_seconds.unwrap_or_default()));
        }
    }
    (0, 0)
}

fn create_health_check(probe: &Probe, upstream_name: &str, params: &ConfigParams) -> HealthCheck {
    let http_get = probe.http_get.clone().unwrap_or_default();
    HealthCheck {
        upstream_name: upstream_name.to_owned(),
        fails: probe.failure_threshold.unwrap_or_default(),
        interval: probe.period_seconds.unwrap_or_default(),
        passes: probe.success_threshold.unwrap_or_default(),
        uri: http_get.path.unwrap_or_default(),
        scheme: http_get.scheme.unwrap_or_default().to_lowercase(),
        mandatory: params.health_check_mandatory,
        headers: http_get.http_headers.unwrap_or_default().into_iter().map(|h| (h.name, h.value)).collect(),
        time_out_seconds: i64::from(probe.timeout_seconds.unwrap_or_default()),
    }
}

/// Secret path for the key even when the secret is unusable. NGINX Plus then rejects the key at runtime and answers 500.
fn generate_jwt_config(owner: &ResourceKey, ing_ex: &IngressEx, params: &ConfigParams, warnings: &mut Warnings) -> (JwtAuth, Option<JwtRedirectLocation>) {
    let secret = &params.jwt_key;
    match check_secret(&ing_ex.secret_refs, secret, SECRET_TYPE_JWK) {
        SecretCheck::Valid(_) => {},
        SecretCheck::WrongType(actual) => warnings.add(owner, format!("JWK secret {secret} is of a wrong type '{actual}', must be '{SECRET_TYPE_JWK}'")),
        SecretCheck::Invalid(e) => warnings.add(owner, format!("JWK secret {secret} is invalid: {e}")),
    }
    let mut jwt_auth = JwtAuth {
        key: ing_ex.secret_refs.get(secret).map(|r| r.path.clone()).unwrap_or_default(),
        realm: params.jwt_realm.clone(),
        token: params.jwt_token.clone(),
        redirect_location_name: String::new(),
    };
    let redirect = (!params.jwt_login_url.is_empty()).then(|| {
        let name = redirect_location_name(&ing_ex.namespace(), &ing_ex.name());
        jwt_auth.redirect_location_name.clone_from(&name);
        JwtRedirectLocation { name, login_url: params.jwt_login_url.clone() }
    });
    (jwt_auth, redirect)
}

fn generate_basic_auth_config(owner: &ResourceKey, ing_ex: &IngressEx, params: &ConfigParams, warnings: &mut Warnings) -> BasicAuth {
    let secret = &params.basic_auth_secret;
    match check_secret(&ing_ex.secret_refs, secret, SECRET_TYPE_HTPASSWD) {
        SecretCheck::Valid(_) => {},
        SecretCheck::WrongType(actual) => {
            warnings.add(owner, format!("Basic auth secret {secret} is of a wrong type '{actual}', must be '{SECRET_TYPE_HTPASSWD}'"));
        },
        SecretCheck::Invalid(e) => warnings.add(owner, format!("Basic auth secret {secret} is invalid: {e}")),
    }
    BasicAuth {
        secret: ing_ex.secret_refs.get(secret).map(|r| r.path.clone()).unwrap_or_default(),
        realm: params.basic_auth_realm.clone(),
    }
}

/// TLS for a host listed in the Ingress TLS section. An unusable secret makes the server reject handshakes.
fn add_ssl_config(server: &mut Server, owner: &ResourceKey, host: &str, tls: &[IngressTLS], ing_ex: &IngressEx, is_wildcard_enabled: bool, warnings: &mut Warnings) {
    let Some(entry) = tls.iter().find(|entry| entry.hosts.as_ref().is_some_and(|hosts| hosts.iter().any(|h| h == host))) else {
        return;
    };
    let secret = entry.secret_name.clone().unwrap_or_default();

    let (pem_file, reject_handshake) = if !secret.is_empty() {
        match check_secret(&ing_ex.secret_refs, &secret, SECRET_TYPE_TLS) {
            SecretCheck::Valid(reference) => (reference.path.clone(), false),
            SecretCheck::WrongType(actual) => {
                warnings.add(owner, format!("TLS secret {secret} is of a wrong type '{actual}', must be '{SECRET_TYPE_TLS}'"));
                (String::new(), true)
            },
            SecretCheck::Invalid(e) => {
                warnings.add(owner, format!("TLS secret {secret} is invalid: {e}"));
                (String::new(), true)
            },
        }
    } else if is_wildcard_enabled {
        (WILDCARD_SECRET_PATH.to_owned(), false)
    } else {
        warnings.add(owner, format!("TLS termination for host '{host}' requires specifying a TLS secret or configuring a global wildcard TLS secret"));
        (String::new(), true)
    };

    server.ssl = true;
    server.ssl_certificate.clone_from(&pem_file);
    server.ssl_certificate_key = pem_file;
    server.ssl_reject_handshake = reject_handshake;
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::networking::v1::{IngressServiceBackend, ServiceBackendPort};

    use super::*;

    fn backend(service: &str, number: Option<i32>, name: Option<&str>) -> IngressBackend {
        IngressBackend {
            service: Some(IngressServiceBackend {
                name: service.to_owned(),
                port: Some(ServiceBackendPort { number, name: name.map(ToOwned::to_owned) }),
            }),
            ..Default::default()
        }
    }

    #[test]
    pub fn test_upstream_name() {
        assert_eq!("default-cafe-ingress-cafe.example.com-coffee-svc-80", ingress_upstream_name("default", "cafe-ingress", "cafe.example.com", &backend("coffee-svc", Some(80), None)));
        assert_eq!("default-cafe-ingress--tea-svc-http", ingress_upstream_name("default", "cafe-ingress", "", &backend("tea-svc", None, Some("http"))));
    }

    #[test]
    pub fn test_generate_ingress_path() {
        assert_eq!("= /coffee", generate_ingress_path("/coffee", Some("Exact")));
        assert_eq!("/coffee", generate_ingress_path("/coffee", Some("Prefix")));
        assert_eq!("/coffee", generate_ingress_path("/coffee", None));
        assert_eq!("/", path_or_default(""));
    }
}
