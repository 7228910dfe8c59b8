use std::collections::BTreeMap;

use tracing::debug;

use super::{
    endpoints::{EndpointResolver, EndpointTarget},
    naming::UpstreamNamer,
};
use crate::{
    common::{generate_lb_method, generate_time, generate_time_with_default, ResourceKey, Warnings, VIRTUAL_SERVER_ROUTE_KIND},
    config::ConfigParams,
    nginx::version2::{self, HealthCheck, Queue, SessionCookie, StatusMatch, UpstreamLabels, UpstreamServer},
    resources::{self, Upstream, UpstreamQueue, VirtualServerEx},
};

const INCOMPATIBLE_LB_METHODS_FOR_SLOW_START: [&str; 6] =
    ["random", "ip_hash", "random two", "random two least_conn", "random two least_time=header", "random two least_time=last_byte"];

pub fn upstream_resource_labels(owner: &ResourceKey, service: &str) -> UpstreamLabels {
    let resource_type = if owner.kind == VIRTUAL_SERVER_ROUTE_KIND { "virtualserverroute" } else { "virtualserver" };
    UpstreamLabels {
        service: service.to_owned(),
        resource_type: resource_type.to_owned(),
        resource_name: owner.name.clone(),
        resource_namespace: owner.namespace.clone(),
    }
}

/// Builds HTTP upstreams of VirtualServers and VirtualServerRoutes.
pub struct UpstreamGenerator<'a> {
    pub params: &'a ConfigParams,
    pub is_plus: bool,
}

impl UpstreamGenerator<'_> {
    pub fn generate(
        &self,
        owner: &ResourceKey,
        name: &str,
        upstream: &Upstream,
        is_external_name_svc: bool,
        endpoints: &[String],
        backup_endpoints: &[String],
        warnings: &mut Warnings,
    ) -> version2::Upstream {
        let lb_method = generate_lb_method(&upstream.lb_method, &self.params.lb_method);
        let mut generated = version2::Upstream {
            name: name.to_owned(),
            servers: sorted_servers(endpoints),
            backup_servers: sorted_servers(backup_endpoints),
            resolve: is_external_name_svc,
            keepalive: upstream.keepalive.unwrap_or(self.params.keepalive),
            max_fails: upstream.max_fails.unwrap_or(self.params.max_fails),
            max_conns: upstream.max_conns.unwrap_or(self.params.max_conns),
            fail_timeout: generate_time_with_default(&upstream.fail_timeout, &self.params.fail_timeout),
            upstream_zone_size: self.params.upstream_zone_size.clone(),
            upstream_labels: upstream_resource_labels(owner, &upstream.service),
            lb_method,
            ..Default::default()
        };

        if self.is_plus {
            generated.slow_start = self.generate_slow_start(owner, upstream, &generated.lb_method, warnings);
            generated.queue = generate_queue(upstream.queue.as_ref(), "60s");
            generated.session_cookie = generate_session_cookie(upstream.session_cookie.as_ref());
            generated.ntlm = upstream.ntlm;
        }
        generated
    }

    fn generate_slow_start(&self, owner: &ResourceKey, upstream: &Upstream, lb_method: &str, warnings: &mut Warnings) -> String {
        if upstream.slow_start.is_empty() {
            return String::new();
        }
        if INCOMPATIBLE_LB_METHODS_FOR_SLOW_START.contains(&lb_method) || lb_method.starts_with("hash") {
            warnings.add(
                owner,
                format!("Slow start will be disabled for upstream {} because lb method '{lb_method}' is incompatible with slow start", upstream.name),
            );
            return String::new();
        }
        generate_time(&upstream.slow_start)
    }
}

fn sorted_servers(endpoints: &[String]) -> Vec<UpstreamServer> {
    let mut servers: Vec<_> = endpoints.iter().map(|address| UpstreamServer { address: address.clone() }).collect();
    servers.sort_by(|a, b| a.address.cmp(&b.address));
    servers
}

pub fn generate_queue(queue: Option<&UpstreamQueue>, default_timeout: &str) -> Option<Queue> {
    queue.map(|queue| Queue { size: queue.size, timeout: generate_time_with_default(&queue.timeout, default_timeout) })
}

pub fn generate_session_cookie(cookie: Option<&resources::SessionCookie>) -> Option<SessionCookie> {
    let cookie = cookie.filter(|c| c.enable)?;
    Some(SessionCookie {
        enable: true,
        name: cookie.name.clone(),
        path: cookie.path.clone(),
        expires: cookie.expires.clone(),
        domain: cookie.domain.clone(),
        http_only: cookie.http_only,
        secure: cookie.secure,
        same_site: cookie.same_site.clone(),
    })
}

pub fn generate_proxy_pass_protocol(tls: bool) -> &'static str {
    if tls {
        "https"
    } else {
        "http"
    }
}

pub fn generate_grpc_pass(grpc: bool, tls: bool, upstream_name: &str) -> String {
    if !grpc {
        return String::new();
    }
    let protocol = if tls { "grpcs" } else { "grpc" };
    format!("{protocol}://{upstream_name}")
}

pub fn status_match_name(upstream_name: &str) -> String {
    format!("{upstream_name}_match")
}

pub fn generate_status_match(upstream_name: &str, status: &str) -> StatusMatch {
    StatusMatch { name: status_match_name(upstream_name), code: status.to_owned() }
}

fn health_check_with_defaults(upstream: &Upstream, upstream_name: &str, params: &ConfigParams) -> HealthCheck {
    HealthCheck {
        name: upstream_name.to_owned(),
        uri: if upstream.is_grpc() { String::new() } else { "/".to_owned() },
        interval: "5s".to_owned(),
        jitter: "0s".to_owned(),
        keepalive_time: "60s".to_owned(),
        fails: 1,
        passes: 1,
        proxy_pass: format!("{}://{upstream_name}", generate_proxy_pass_protocol(upstream.tls.enable)),
        proxy_connect_timeout: generate_time_with_default(&upstream.proxy_connect_timeout, &params.proxy_connect_timeout),
        proxy_read_timeout: generate_time_with_default(&upstream.proxy_read_timeout, &params.proxy_read_timeout),
        proxy_send_timeout: generate_time_with_default(&upstream.proxy_send_timeout, &params.proxy_send_timeout),
        headers: BTreeMap::new(),
        grpc_pass: generate_grpc_pass(upstream.is_grpc(), upstream.tls.enable, upstream_name),
        ..Default::default()
    }
}

/// Active health check of an upstream, `None` unless enabled.
pub fn generate_health_check(upstream: &Upstream, upstream_name: &str, params: &ConfigParams) -> Option<HealthCheck> {
    let spec = upstream.health_check.as_ref().filter(|hc| hc.enable)?;
    let mut hc = health_check_with_defaults(upstream, upstream_name, params);

    if !spec.path.is_empty() {
        hc.uri = spec.path.clone();
    }
    if !spec.interval.is_empty() {
        hc.interval = generate_time(&spec.interval);
    }
    if !spec.jitter.is_empty() {
        hc.jitter = generate_time(&spec.jitter);
    }
    if !spec.keepalive_time.is_empty() {
        hc.keepalive_time = generate_time(&spec.keepalive_time);
    }
    if spec.fails > 0 {
        hc.fails = spec.fails;
    }
    if spec.passes > 0 {
        hc.passes = spec.passes;
    }
    if !spec.connect_timeout.is_empty() {
        hc.proxy_connect_timeout = generate_time(&spec.connect_timeout);
    }
    if !spec.read_timeout.is_empty() {
        hc.proxy_read_timeout = generate_time(&spec.read_timeout);
    }
    if !spec.send_timeout.is_empty() {
        hc.proxy_send_timeout = generate_time(&spec.send_timeout);
    }
    for header in &spec.headers {
        hc.headers.insert(header.name.clone(), header.value.clone());
    }
    if let Some(tls) = &spec.tls {
        hc.proxy_pass = format!("{}://{upstream_name}", generate_proxy_pass_protocol(tls.enable));
    }
    if !spec.status_match.is_empty() {
        hc.match_ = status_match_name(upstream_name);
    }
    hc.port = spec.port;
    hc.mandatory = spec.mandatory;
    hc.persistent = spec.persistent;
    hc.grpc_status = spec.grpc_status;
    hc.grpc_service = spec.grpc_service.clone();
    Some(hc)
}

/// Upstreams of a VirtualServer as pushed through the Plus API on endpoint changes.
/// ExternalName services are resolved by NGINX itself and are left out.
pub fn create_upstreams_for_plus(vs_ex: &VirtualServerEx, params: &ConfigParams) -> Vec<version2::Upstream> {
    let generator = UpstreamGenerator { params, is_plus: true };
    let resolver = EndpointResolver::new(&vs_ex.endpoints, &vs_ex.external_name_svcs, true, true);
    let mut warnings = Warnings::new();
    let mut upstreams = vec![];

    let vs_key = vs_ex.key();
    let namer = UpstreamNamer::for_virtual_server(&vs_ex.virtual_server);
    let owned = vs_ex.virtual_server.spec.upstreams.iter().map(|u| (vs_key.clone(), namer.clone(), u));
    let routed = vs_ex.virtual_server_routes.iter().flat_map(|route| {
        let key = ResourceKey::from(route);
        let namer = UpstreamNamer::for_virtual_server_route(&vs_ex.virtual_server, route);
        route.spec.upstreams.iter().map(move |u| (key.clone(), namer.clone(), u))
    });

    for (owner, namer, upstream) in owned.chain(routed) {
        if resolver.is_external_name(namer.namespace(), &upstream.service) {
            debug!("{owner} service {} is of type ExternalName, skipping Plus API endpoints update", upstream.service);
            continue;
        }
        let target = EndpointTarget {
            namespace: namer.namespace(),
            upstream: &upstream.name,
            service: &upstream.service,
            subselector: &upstream.subselector,
            port: upstream.port,
        };
        let endpoints = resolver.resolve(&owner, &target, &mut warnings);
        let backup = resolver.resolve_backup(&owner, &target, &upstream.backup, upstream.backup_port, &mut warnings);
        upstreams.push(generator.generate(&owner, &namer.upstream_name(&upstream.name), upstream, false, &endpoints, &backup, &mut warnings));
    }
    upstreams
}
