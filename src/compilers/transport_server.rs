use std::collections::BTreeMap;

use tracing::debug;

use super::{
    endpoints::{EndpointResolver, EndpointTarget},
    naming::{tls_passthrough_socket, UpstreamNamer},
};
use crate::{
    common::{
        generate_snippets, generate_time_with_default,
        secrets::{check_secret, SecretCheck, SECRET_TYPE_TLS},
        ResourceKey, SecretReference, Warnings, NON_EXISTING_UNIX_SOCKET,
    },
    config::ConfigParams,
    nginx::{
        stream::{Match, StreamHealthCheck, StreamServer, StreamSsl, StreamUpstream, StreamUpstreamBackupServer, StreamUpstreamServer, TransportServerConfig},
        version2::UpstreamLabels,
    },
    resources::{TransportServerMatch, TransportServerTls, TransportServerUpstream, TransportServerEx, TLS_PASSTHROUGH_LISTENER_NAME, UDP_PROTOCOL},
    Configuration,
};

const DEFAULT_STREAM_LB_METHOD: &str = "random two least_conn";

/// Compiles a TransportServer into a stream server and its upstreams.
pub struct TransportServerCompiler<'a> {
    params: &'a ConfigParams,
    configuration: &'a Configuration,
}

impl<'a> TransportServerCompiler<'a> {
    pub fn new(params: &'a ConfigParams, configuration: &'a Configuration) -> Self {
        Self { params, configuration }
    }

    pub fn compile(&self, ts_ex: &TransportServerEx) -> (TransportServerConfig, Warnings) {
        let mut warnings = Warnings::new();
        let ts = &ts_ex.transport_server;
        let key = ts_ex.key();
        let namespace = ts_ex.namespace();
        let name = ts_ex.name();
        let namer = UpstreamNamer::for_transport_server(ts);
        debug!("{key} compiling with {} upstreams", ts.spec.upstreams.len());

        let upstreams = self.generate_stream_upstreams(ts_ex, &key, &namer, &mut warnings);

        let pass = ts.spec.action.as_ref().map(|action| action.pass.as_str()).unwrap_or_default();
        let proxy_pass = namer.upstream_name(pass);
        let (health_check, match_) = generate_health_check(pass, &proxy_pass, &ts.spec.upstreams);
        let ssl = generate_stream_ssl(&key, ts.spec.tls.as_ref(), &namespace, &ts_ex.secret_refs, &mut warnings);

        let mut server = StreamServer {
            port: ts_ex.listener_port,
            udp: ts.spec.listener.protocol == UDP_PROTOCOL,
            proxy_pass,
            proxy_connect_timeout: "60s".to_owned(),
            proxy_timeout: generate_time_with_default(ts.spec.session_parameters.as_ref().map(|s| s.timeout.as_str()).unwrap_or_default(), "10m"),
            proxy_next_upstream_timeout: "0s".to_owned(),
            health_check,
            server_snippets: generate_snippets(true, &ts.spec.server_snippets, &[]),
            ssl: Some(ssl),
            ..Default::default()
        };
        if ts.spec.listener.name == TLS_PASSTHROUGH_LISTENER_NAME {
            server.tls_passthrough = true;
            server.unix_socket = tls_passthrough_socket(&namespace, &name);
            server.status_zone.clone_from(&ts.spec.host);
        } else {
            server.status_zone.clone_from(&ts.spec.listener.name);
        }
        if let Some(parameters) = &ts.spec.upstream_parameters {
            server.proxy_requests = parameters.udp_requests;
            server.proxy_responses = parameters.udp_responses;
            server.proxy_connect_timeout = generate_time_with_default(&parameters.connect_timeout, "60s");
            server.proxy_next_upstream = parameters.next_upstream;
            if parameters.next_upstream {
                server.proxy_next_upstream_tries = parameters.next_upstream_tries;
                server.proxy_next_upstream_timeout = generate_time_with_default(&parameters.next_upstream_timeout, "0s");
            }
        }
        server.name = name;
        server.namespace = namespace;

        let config = TransportServerConfig {
            server,
            upstreams,
            stream_snippets: generate_snippets(true, &ts.spec.stream_snippets, &[]),
            match_,
        };
        (config, warnings)
    }

    fn generate_stream_upstreams(&self, ts_ex: &TransportServerEx, key: &ResourceKey, namer: &UpstreamNamer, warnings: &mut Warnings) -> Vec<StreamUpstream> {
        let resolver =
            EndpointResolver::new(&ts_ex.endpoints, &ts_ex.external_name_svcs, self.configuration.is_plus, self.params.is_resolver_configured());
        let no_subselector = BTreeMap::new();
        let mut upstreams: Vec<_> = ts_ex
            .transport_server
            .spec
            .upstreams
            .iter()
            .map(|upstream| {
                let target = EndpointTarget {
                    namespace: namer.namespace(),
                    upstream: &upstream.name,
                    service: &upstream.service,
                    subselector: &no_subselector,
                    port: upstream.port,
                };
                let endpoints = resolver.resolve_stream(key, &target, warnings);
                let backup = resolver.resolve_backup(key, &target, &upstream.backup, upstream.backup_port, warnings);
                let mut generated = generate_stream_upstream(upstream, namer, &endpoints, &backup, self.configuration.is_plus);
                generated.resolve = resolver.is_external_name(namer.namespace(), &upstream.service);
                generated.upstream_labels = UpstreamLabels {
                    service: upstream.service.clone(),
                    resource_type: "transportserver".to_owned(),
                    resource_name: key.name.clone(),
                    resource_namespace: key.namespace.clone(),
                };
                generated
            })
            .collect();
        upstreams.sort_by(|a, b| a.name.cmp(&b.name));
        upstreams
    }
}

fn generate_stream_upstream(upstream: &TransportServerUpstream, namer: &UpstreamNamer, endpoints: &[String], backup: &[String], is_plus: bool) -> StreamUpstream {
    let max_fails = upstream.max_fails.unwrap_or(1);
    let max_connections = upstream.max_conns.unwrap_or(0);
    let fail_timeout = generate_time_with_default(&upstream.fail_timeout, "10s");

    let mut servers: Vec<_> = endpoints
        .iter()
        .map(|address| StreamUpstreamServer { address: address.clone(), max_fails, fail_timeout: fail_timeout.clone(), max_connections })
        .collect();
    if !is_plus && endpoints.is_empty() {
        servers.push(StreamUpstreamServer { address: NON_EXISTING_UNIX_SOCKET.to_owned(), max_fails, fail_timeout, max_connections: 0 });
    }
    servers.sort_by(|a, b| a.address.cmp(&b.address));

    let mut backup_servers: Vec<_> = backup.iter().map(|address| StreamUpstreamBackupServer { address: address.clone() }).collect();
    backup_servers.sort_by(|a, b| a.address.cmp(&b.address));

    StreamUpstream {
        name: namer.upstream_name(&upstream.name),
        servers,
        backup_servers,
        load_balancing_method: generate_load_balancing_method(&upstream.load_balancing_method),
        ..Default::default()
    }
}

/// NGINX defaults to round robin when no method is set, so `round_robin` is expressed by leaving it out.
pub fn generate_load_balancing_method(method: &str) -> String {
    match method {
        "" => DEFAULT_STREAM_LB_METHOD.to_owned(),
        "round_robin" => String::new(),
        method => method.to_owned(),
    }
}

/// Health check of the upstream the action passes to, if that upstream enables one.
fn generate_health_check(pass: &str, upstream_name: &str, upstreams: &[TransportServerUpstream]) -> (Option<StreamHealthCheck>, Option<Match>) {
    let Some(hc) = upstreams.iter().find(|u| u.name == pass).and_then(|u| u.health_check.as_ref()).filter(|hc| hc.enabled) else {
        return (None, None);
    };

    let mut health_check = StreamHealthCheck {
        enabled: true,
        interval: generate_time_with_default(&hc.interval, "5s"),
        port: hc.port,
        passes: if hc.passes > 0 { hc.passes } else { 1 },
        jitter: generate_time_with_default(&hc.jitter, "0s"),
        fails: if hc.fails > 0 { hc.fails } else { 1 },
        timeout: generate_time_with_default(&hc.timeout, "5s"),
        match_: String::new(),
    };
    let match_ = hc.match_.as_ref().map(|m| {
        let name = format!("match_{upstream_name}");
        health_check.match_.clone_from(&name);
        generate_health_check_match(m, name)
    });
    (Some(health_check), match_)
}

fn generate_health_check_match(m: &TransportServerMatch, name: String) -> Match {
    let (modifier, expect) = if let Some(expect) = m.expect.strip_prefix("~*") {
        ("~*", expect)
    } else if let Some(expect) = m.expect.strip_prefix('~') {
        ("~", expect)
    } else {
        ("", m.expect.as_str())
    };
    Match { name, send: m.send.clone(), expect_regex_modifier: modifier.to_owned(), expect: expect.to_owned() }
}

/// Stream TLS termination. An unusable secret disables termination for the server with a warning.
fn generate_stream_ssl(
    owner: &ResourceKey,
    tls: Option<&TransportServerTls>,
    namespace: &str,
    secret_refs: &BTreeMap<String, SecretReference>,
    warnings: &mut Warnings,
) -> StreamSsl {
    let Some(tls) = tls else {
        return StreamSsl::default();
    };
    let (path, enabled) = match check_secret(secret_refs, &format!("{namespace}/{}", tls.secret), SECRET_TYPE_TLS) {
        SecretCheck::Valid(reference) => (reference.path.clone(), true),
        SecretCheck::WrongType(actual) => {
            warnings.add(
                owner,
                format!(
                    "TLS secret {} is of a wrong type '{actual}', must be '{SECRET_TYPE_TLS}'. SSL termination will not be enabled for this server.",
                    tls.secret
                ),
            );
            (String::new(), false)
        },
        SecretCheck::Invalid(error) => {
            warnings.add(owner, format!("TLS secret {} is invalid: {error}. SSL termination will not be enabled for this server.", tls.secret));
            (String::new(), false)
        },
    };
    StreamSsl { enabled, certificate: path.clone(), certificate_key: path }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::TransportServerHealthCheck;

    #[test]
    pub fn test_generate_load_balancing_method() {
        assert_eq!("random two least_conn", generate_load_balancing_method(""));
        assert_eq!("", generate_load_balancing_method("round_robin"));
        assert_eq!("least_conn", generate_load_balancing_method("least_conn"));
    }

    #[test]
    pub fn test_generate_health_check_with_match() {
        let upstreams = vec![TransportServerUpstream {
            name: "tcp-app".to_owned(),
            health_check: Some(TransportServerHealthCheck {
                enabled: true,
                interval: "20s".to_owned(),
                fails: 3,
                match_: Some(TransportServerMatch { send: "GET / HTTP/1.0\\r\\n".to_owned(), expect: "~*200 OK".to_owned() }),
                ..Default::default()
            }),
            ..Default::default()
        }];
        let (hc, m) = generate_health_check("tcp-app", "ts_default_tcp-server_tcp-app", &upstreams);
        let hc = hc.unwrap();
        assert_eq!("20s", hc.interval);
        assert_eq!("5s", hc.timeout);
        assert_eq!("0s", hc.jitter);
        assert_eq!(3, hc.fails);
        assert_eq!(1, hc.passes);
        assert_eq!("match_ts_default_tcp-server_tcp-app", hc.match_);
        let m = m.unwrap();
        assert_eq!("~*", m.expect_regex_modifier);
        assert_eq!("200 OK", m.expect);

        assert_eq!((None, None), generate_health_check("other", "ts_default_tcp-server_other", &upstreams));
    }

    #[test]
    pub fn test_generate_health_check_match_modifiers() {
        let m = generate_health_check_match(&TransportServerMatch { send: String::new(), expect: "~ok".to_owned() }, "match_a".to_owned());
        assert_eq!("~", m.expect_regex_modifier);
        assert_eq!("ok", m.expect);
        let m = generate_health_check_match(&TransportServerMatch { send: String::new(), expect: "ok".to_owned() }, "match_a".to_owned());
        assert_eq!("", m.expect_regex_modifier);
        assert_eq!("ok", m.expect);
    }

    #[test]
    pub fn test_generate_stream_ssl() {
        let owner = ResourceKey::with_kind("tcp-server", "default", crate::common::TRANSPORT_SERVER_KIND);
        let mut warnings = Warnings::new();
        let refs = BTreeMap::new();
        assert_eq!(StreamSsl::default(), generate_stream_ssl(&owner, None, "default", &refs, &mut warnings));

        let tls = TransportServerTls { secret: "missing".to_owned() };
        let ssl = generate_stream_ssl(&owner, Some(&tls), "default", &refs, &mut warnings);
        assert!(!ssl.enabled);
        assert!(warnings.contains(
            &owner,
            "TLS secret missing is invalid: secret doesn't exist or of an unsupported type. SSL termination will not be enabled for this server."
        ));
    }
}
