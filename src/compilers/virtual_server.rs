use std::collections::BTreeMap;

use tracing::debug;

use super::{
    endpoints::{EndpointResolver, EndpointTarget},
    locations::{generate_error_page_locations, ErrorPageDetails, LocationScope},
    naming::{UpstreamNamer, VariableNamer},
    policies::{generate_policies, remove_duplicate_limit_req_zones, PoliciesConfig, PolicyContext, PolicyOptions, PolicyOwner},
    routing::{RouteCompiler, RoutingConfig},
    upstreams::{generate_health_check, generate_status_match, UpstreamGenerator},
    CompileContext,
};
use crate::{
    common::{
        generate_snippets,
        secrets::{check_secret, SecretCheck, SECRET_TYPE_TLS, WILDCARD_SECRET_PATH},
        ResourceKey, SecretReference, Warnings,
    },
    config::ConfigParams,
    nginx::version2::{self, HealthCheck, Server, Ssl, StatusMatch, TlsRedirect, VirtualServerConfig},
    resources::{self, PolicyReference, Route, Upstream, VirtualServerEx},
    Configuration,
};

/// Compiles a VirtualServer and the VirtualServerRoutes it delegates to into one server block.
pub struct VirtualServerCompiler<'a> {
    params: &'a ConfigParams,
    configuration: &'a Configuration,
}

/// Route level settings a VirtualServer hands down to the VirtualServerRoute a route delegates to.
#[derive(Default)]
struct DelegatedRouteSettings<'a> {
    location_snippets: BTreeMap<String, &'a str>,
    error_pages: BTreeMap<String, (&'a [resources::ErrorPage], usize)>,
    policies: BTreeMap<String, &'a [PolicyReference]>,
}

/// Accumulates the http and server level output while the routes are walked.
#[derive(Default)]
struct ServerParts {
    routing: RoutingConfig,
    internal_redirect_locations: Vec<version2::InternalRedirectLocation>,
    error_page_locations: Vec<version2::ErrorPageLocation>,
    limit_req_zones: Vec<version2::LimitReqZone>,
}

impl ServerParts {
    fn add_routing(&mut self, cfg: RoutingConfig, internal_redirect: bool) {
        let RoutingConfig { maps, split_clients, locations, internal_redirect_location, return_locations, key_val_zones, key_vals, two_way_split_clients } = cfg;
        if internal_redirect {
            self.internal_redirect_locations.push(internal_redirect_location);
        }
        self.routing.maps.extend(maps);
        self.routing.split_clients.extend(split_clients);
        self.routing.locations.extend(locations);
        self.routing.return_locations.extend(return_locations);
        self.routing.key_val_zones.extend(key_val_zones);
        self.routing.key_vals.extend(key_vals);
        self.routing.two_way_split_clients.extend(two_way_split_clients);
    }
}

fn merge_jwks(spec_policies: &mut PoliciesConfig, route_policies: &PoliciesConfig) {
    if !route_policies.jwks_auth_enabled {
        return;
    }
    spec_policies.jwks_auth_enabled = true;
    if let Some(jwt_auth) = &route_policies.jwt_auth {
        spec_policies.jwt_auth_list.entry(jwt_auth.key.clone()).or_insert_with(|| jwt_auth.clone());
    }
}

impl<'a> VirtualServerCompiler<'a> {
    pub fn new(params: &'a ConfigParams, configuration: &'a Configuration) -> Self {
        Self { params, configuration }
    }

    pub fn compile(&self, vs_ex: &VirtualServerEx) -> (VirtualServerConfig, Warnings) {
        let mut ctx = CompileContext::new();
        let vs = &vs_ex.virtual_server;
        let vs_key = vs_ex.key();
        let vs_namespace = vs_ex.namespace();
        let vs_name = vs_ex.name();
        debug!("{vs_key} compiling with {} VirtualServerRoutes", vs_ex.virtual_server_routes.len());

        let ssl = self.generate_ssl_config(&vs_key, vs.spec.tls.as_ref(), &vs_namespace, &vs_ex.secret_refs, &mut ctx.warnings);
        let tls_redirect = generate_tls_redirect_config(vs.spec.tls.as_ref());

        let options = PolicyOptions { tls: ssl.is_some(), secret_refs: &vs_ex.secret_refs, ap_resources: &vs_ex.ap_resources };
        let vs_owner = PolicyOwner { key: &vs_key, namespace: &vs_namespace, vs_namespace: &vs_namespace, vs_name: &vs_name };
        let mut policies = generate_policies(&vs_owner, &vs.spec.policies, &vs_ex.policies, PolicyContext::Spec, &options, &mut ctx);
        if policies.jwks_auth_enabled {
            if let Some(jwt_auth) = &policies.jwt_auth {
                policies.jwt_auth_list.insert(jwt_auth.key.clone(), jwt_auth.clone());
            }
        }

        if vs.spec.internal_route && !self.configuration.enable_internal_routes {
            ctx.warnings.add(
                &vs_key,
                format!(
                    "Internal Route cannot be configured for virtual server {vs_name}. Internal Routes can be enabled by setting the enable-internal-routes flag"
                ),
            );
        }

        let resolver =
            EndpointResolver::new(&vs_ex.endpoints, &vs_ex.external_name_svcs, self.configuration.is_plus, self.params.is_resolver_configured());
        let mut upstream_set = UpstreamSet::default();
        let vs_namer = UpstreamNamer::for_virtual_server(vs);
        let grpc_enabled = ssl.is_some() && self.params.http2;
        for upstream in &vs.spec.upstreams {
            if !grpc_enabled && upstream.is_grpc() {
                ctx.warnings.add(
                    &vs_key,
                    format!("gRPC cannot be configured for upstream {}. gRPC requires enabled HTTP/2 and TLS termination.", upstream.name),
                );
            }
            self.add_upstream(&mut upstream_set, &resolver, &vs_key, &vs_key, &vs_namer, upstream, &mut ctx.warnings);
        }
        let vsr_namers: Vec<_> = vs_ex.virtual_server_routes.iter().map(|vsr| (ResourceKey::from(vsr), UpstreamNamer::for_virtual_server_route(vs, vsr))).collect();
        for (vsr, (vsr_key, namer)) in vs_ex.virtual_server_routes.iter().zip(&vsr_namers) {
            for upstream in &vsr.spec.upstreams {
                if !grpc_enabled && upstream.is_grpc() {
                    ctx.warnings.add(
                        vsr_key,
                        format!("gRPC cannot be configured for upstream {}. gRPC requires enabled HTTP/2 and TLS termination", upstream.name),
                    );
                }
                self.add_upstream(&mut upstream_set, &resolver, vsr_key, &vs_key, namer, upstream, &mut ctx.warnings);
            }
        }

        let variable_namer = VariableNamer::new(vs);
        let mut parts = ServerParts { limit_req_zones: policies.limit_req_zones.clone(), ..Default::default() };
        let mut delegated = DelegatedRouteSettings::default();

        let vs_routes = RouteCompiler {
            upstream_namer: &vs_namer,
            upstreams: &upstream_set.by_name,
            variable_namer: &variable_namer,
            dynamic_weight_changes: self.configuration.dynamic_weight_change_reload,
        };
        for route in &vs.spec.routes {
            let pages = route.error_pages.as_deref().unwrap_or_default();
            let error_pages = ErrorPageDetails { pages, index: ctx.error_page_index, owner: &vs_key };
            self.add_error_page_locations(&mut parts, &error_pages, &mut ctx);

            if !route.route.is_empty() {
                let name = if route.route.contains('/') { route.route.clone() } else { format!("{vs_namespace}/{}", route.route) };
                if !route.location_snippets.is_empty() {
                    delegated.location_snippets.insert(name.clone(), route.location_snippets.as_str());
                }
                if !pages.is_empty() {
                    delegated.error_pages.insert(name.clone(), (pages, error_pages.index));
                }
                if !route.policies.is_empty() {
                    delegated.policies.insert(name, route.policies.as_slice());
                }
                continue;
            }

            let mut route_policies = generate_policies(&vs_owner, &route.policies, &vs_ex.policies, PolicyContext::Route, &options, &mut ctx);
            if policies.oidc {
                route_policies.oidc = true;
            }
            merge_jwks(&mut policies, &route_policies);
            parts.limit_req_zones.extend(route_policies.limit_req_zones.iter().cloned());

            let scope = LocationScope {
                params: self.params,
                error_pages,
                location_snippets: &route.location_snippets,
                enable_snippets: self.configuration.enable_snippets,
                vsr: None,
            };
            self.compile_route(&vs_routes, route, &scope, &route_policies, &mut parts, &mut ctx);
        }

        for (vsr, (vsr_key, namer)) in vs_ex.virtual_server_routes.iter().zip(&vsr_namers) {
            let vsr_routes = RouteCompiler {
                upstream_namer: namer,
                upstreams: &upstream_set.by_name,
                variable_namer: &variable_namer,
                dynamic_weight_changes: self.configuration.dynamic_weight_change_reload,
            };
            let vsr_namespaced_name = vsr_key.namespaced_name();
            for route in &vsr.spec.subroutes {
                let pages = route.error_pages.as_deref().unwrap_or_default();
                let mut error_pages = ErrorPageDetails { pages, index: ctx.error_page_index, owner: vsr_key };
                self.add_error_page_locations(&mut parts, &error_pages, &mut ctx);
                if route.error_pages.is_none() {
                    if let Some((pages, index)) = delegated.error_pages.get(&vsr_namespaced_name) {
                        error_pages.pages = *pages;
                        error_pages.index = *index;
                    }
                }

                let location_snippets = if route.location_snippets.is_empty() {
                    delegated.location_snippets.get(&vsr_namespaced_name).copied().unwrap_or_default()
                } else {
                    route.location_snippets.as_str()
                };

                let vsr_namespace = vsr_key.namespace.as_str();
                let vsr_owner = PolicyOwner { key: vsr_key, namespace: vsr_namespace, vs_namespace: &vs_namespace, vs_name: &vs_name };
                let mut route_policies = if route.policies.is_empty() {
                    let references = delegated.policies.get(&vsr_namespaced_name).copied().unwrap_or_default();
                    generate_policies(&vs_owner, references, &vs_ex.policies, PolicyContext::Route, &options, &mut ctx)
                } else {
                    generate_policies(&vsr_owner, &route.policies, &vs_ex.policies, PolicyContext::Subroute, &options, &mut ctx)
                };
                if policies.oidc {
                    route_policies.oidc = true;
                }
                merge_jwks(&mut policies, &route_policies);
                parts.limit_req_zones.extend(route_policies.limit_req_zones.iter().cloned());

                let scope = LocationScope {
                    params: self.params,
                    error_pages,
                    location_snippets,
                    enable_snippets: self.configuration.enable_snippets,
                    vsr: Some(vsr_key),
                };
                self.compile_route(&vsr_routes, route, &scope, &route_policies, &mut parts, &mut ctx);
            }
        }

        let http_snippets = generate_snippets(self.configuration.enable_snippets, &vs.spec.http_snippets, &[]);
        let server_snippets = generate_snippets(self.configuration.enable_snippets, &vs.spec.server_snippets, &self.params.server_snippets);

        let mut upstreams = upstream_set.upstreams;
        upstreams.sort_by(|a, b| a.name.cmp(&b.name));

        let ServerParts { routing, internal_redirect_locations, error_page_locations, limit_req_zones } = parts;
        let server = Server {
            server_name: vs.spec.host.clone(),
            status_zone: vs.spec.host.clone(),
            gunzip: vs.spec.gunzip,
            http_port: vs_ex.http_port,
            https_port: vs_ex.https_port,
            custom_listeners: vs.spec.listener.is_some(),
            proxy_protocol: self.params.proxy_protocol,
            ssl,
            server_tokens: self.params.server_tokens.clone(),
            real_ip_header: self.params.real_ip_header.clone(),
            set_real_ip_from: self.params.set_real_ip_from.clone(),
            real_ip_recursive: self.params.real_ip_recursive,
            snippets: server_snippets,
            internal_redirect_locations,
            locations: routing.locations,
            return_locations: routing.return_locations,
            health_checks: upstream_set.health_checks,
            tls_redirect,
            error_page_locations,
            tls_passthrough: self.configuration.tls_passthrough,
            allow: policies.allow,
            deny: policies.deny,
            limit_req_options: policies.limit_req_options,
            limit_reqs: policies.limit_reqs,
            jwt_auth: policies.jwt_auth,
            jwt_auth_list: policies.jwt_auth_list,
            jwks_auth_enabled: policies.jwks_auth_enabled,
            basic_auth: policies.basic_auth,
            ingress_mtls: policies.ingress_mtls,
            egress_mtls: policies.egress_mtls,
            oidc: ctx.oidc.map(|slot| slot.config),
            waf: policies.waf,
            policies_error_return: policies.error_return,
            vs_namespace,
            vs_name,
        };

        let config = VirtualServerConfig {
            upstreams,
            split_clients: routing.split_clients,
            maps: routing.maps,
            status_matches: upstream_set.status_matches,
            limit_req_zones: remove_duplicate_limit_req_zones(limit_req_zones),
            http_snippets,
            server,
            key_val_zones: routing.key_val_zones,
            key_vals: routing.key_vals,
            two_way_split_clients: routing.two_way_split_clients,
        };
        (config, ctx.warnings)
    }

    fn add_error_page_locations(&self, parts: &mut ServerParts, error_pages: &ErrorPageDetails, ctx: &mut CompileContext) {
        let locations = generate_error_page_locations(error_pages.index, error_pages.pages);
        ctx.error_page_index += locations.len();
        parts.error_page_locations.extend(locations);
    }

    fn compile_route(
        &self,
        compiler: &RouteCompiler,
        route: &Route,
        scope: &LocationScope,
        route_policies: &PoliciesConfig,
        parts: &mut ServerParts,
        ctx: &mut CompileContext,
    ) {
        if !route.matches.is_empty() {
            let mut cfg = compiler.generate_matches_config(route, scope, ctx);
            route_policies.apply_to_locations(&mut cfg.locations);
            parts.add_routing(cfg, true);
        } else if !route.splits.is_empty() {
            let mut cfg = compiler.generate_default_splits_config(route, scope, ctx);
            route_policies.apply_to_locations(&mut cfg.locations);
            parts.add_routing(cfg, true);
        } else {
            let mut generated = compiler.generate_action_location(&route.path, route.action.as_ref(), scope, false, &route.path, ctx);
            route_policies.apply_to_location(&mut generated.location);
            parts.routing.locations.push(generated.location);
            parts.routing.return_locations.extend(generated.return_location);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn add_upstream(
        &self,
        set: &mut UpstreamSet,
        resolver: &EndpointResolver,
        owner: &ResourceKey,
        backup_owner: &ResourceKey,
        namer: &UpstreamNamer,
        upstream: &Upstream,
        warnings: &mut Warnings,
    ) {
        let generator = UpstreamGenerator { params: self.params, is_plus: self.configuration.is_plus };
        let name = namer.upstream_name(&upstream.name);
        let target = EndpointTarget {
            namespace: namer.namespace(),
            upstream: &upstream.name,
            service: &upstream.service,
            subselector: &upstream.subselector,
            port: upstream.port,
        };
        let endpoints = resolver.resolve(owner, &target, warnings);
        let backup = resolver.resolve_backup(backup_owner, &target, &upstream.backup, upstream.backup_port, warnings);
        let is_external_name = resolver.is_external_name(namer.namespace(), &upstream.service);

        set.upstreams.push(generator.generate(owner, &name, upstream, is_external_name, &endpoints, &backup, warnings));
        if let Some(hc) = generate_health_check(upstream, &name, self.params) {
            set.health_checks.push(hc);
            if let Some(status_match) = upstream.health_check.as_ref().map(|hc| &hc.status_match).filter(|s| !s.is_empty()) {
                set.status_matches.push(generate_status_match(&name, status_match));
            }
        }
        set.by_name.insert(name, upstream.clone());
    }

    /// SSL settings of the server. A TLS secret that cannot be used makes the server reject handshakes instead of failing the whole resource.
    fn generate_ssl_config(
        &self,
        owner: &ResourceKey,
        tls: Option<&resources::Tls>,
        namespace: &str,
        secret_refs: &BTreeMap<String, SecretReference>,
        warnings: &mut Warnings,
    ) -> Option<Ssl> {
        let tls = tls?;
        if tls.secret.is_empty() {
            return self.configuration.is_wildcard_enabled.then(|| Ssl {
                http2: self.params.http2,
                certificate: WILDCARD_SECRET_PATH.to_owned(),
                certificate_key: WILDCARD_SECRET_PATH.to_owned(),
                reject_handshake: false,
            });
        }

        let (path, reject_handshake) = match check_secret(secret_refs, &format!("{namespace}/{}", tls.secret), SECRET_TYPE_TLS) {
            SecretCheck::Valid(reference) => (reference.path.clone(), false),
            SecretCheck::WrongType(actual) => {
                warnings.add(owner, format!("TLS secret {} is of a wrong type '{actual}', must be '{SECRET_TYPE_TLS}'", tls.secret));
                (String::new(), true)
            },
            SecretCheck::Invalid(error) => {
                warnings.add(owner, format!("TLS secret {} is invalid: {error}", tls.secret));
                (String::new(), true)
            },
        };
        Some(Ssl { http2: self.params.http2, certificate: path.clone(), certificate_key: path, reject_handshake })
    }
}

/// Upstreams compiled so far, with the spec each name was generated from.
#[derive(Default)]
struct UpstreamSet {
    upstreams: Vec<version2::Upstream>,
    by_name: BTreeMap<String, Upstream>,
    health_checks: Vec<HealthCheck>,
    status_matches: Vec<StatusMatch>,
}

pub fn generate_tls_redirect_config(tls: Option<&resources::Tls>) -> Option<TlsRedirect> {
    let redirect = tls?.redirect.as_ref().filter(|r| r.enable)?;
    let based_on = if redirect.based_on == "x-forwarded-proto" { "$http_x_forwarded_proto" } else { "$scheme" };
    Some(TlsRedirect { code: redirect.code.unwrap_or(301), based_on: based_on.to_owned() })
}
