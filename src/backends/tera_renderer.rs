use std::error::Error as _;

use lazy_static::lazy_static;
use tera::{Context, Tera};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    nginx::{IngressNginxConfig, TlsPassthroughHostsConfig, TransportServerConfig, VirtualServerConfig},
    state::TemplateRenderer,
    Result,
};

const INGRESS_TEMPLATE: &str = "ingress.conf.tera";
const VIRTUAL_SERVER_TEMPLATE: &str = "virtualserver.conf.tera";
const TRANSPORT_SERVER_TEMPLATE: &str = "transportserver.conf.tera";
const TLS_PASSTHROUGH_HOSTS_TEMPLATE: &str = "tls_passthrough_hosts.conf.tera";

lazy_static! {
    pub static ref TEMPLATES: Tera = {
        let mut tera = Tera::default();
        let templates = vec![
            (INGRESS_TEMPLATE, include_str!("../../templates/ingress.conf.tera")),
            (VIRTUAL_SERVER_TEMPLATE, include_str!("../../templates/virtualserver.conf.tera")),
            (TRANSPORT_SERVER_TEMPLATE, include_str!("../../templates/transportserver.conf.tera")),
            (TLS_PASSTHROUGH_HOSTS_TEMPLATE, include_str!("../../templates/tls_passthrough_hosts.conf.tera")),
        ];
        match tera.add_raw_templates(templates) {
            Ok(()) => tera,
            Err(e) => {
                warn!("Parsing error(s): {}", e);
                ::std::process::exit(1);
            },
        }
    };
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("{template} can't be rendered {error}")]
    Template { template: &'static str, error: String },
}

impl RenderError {
    fn new(template: &'static str, error: &tera::Error) -> Self {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message = format!("{message}: {cause}");
            source = cause.source();
        }
        Self::Template { template, error: message }
    }
}

/// Renders the compiled configuration with the templates embedded in the binary.
#[derive(Clone, Copy, Debug, Default)]
pub struct TeraRenderer;

impl TeraRenderer {
    fn render(template: &'static str, context: &Context) -> Result<Vec<u8>> {
        debug!("{template} rendering");
        match TEMPLATES.render(template, context) {
            Ok(content) => Ok(content.into_bytes()),
            Err(e) => Err(RenderError::new(template, &e).into()),
        }
    }
}

impl TemplateRenderer for TeraRenderer {
    fn render_ingress(&self, config: &IngressNginxConfig) -> Result<Vec<u8>> {
        Self::render(INGRESS_TEMPLATE, &Context::from_serialize(config)?)
    }

    fn render_virtual_server(&self, config: &VirtualServerConfig) -> Result<Vec<u8>> {
        Self::render(VIRTUAL_SERVER_TEMPLATE, &Context::from_serialize(config)?)
    }

    fn render_transport_server(&self, config: &TransportServerConfig) -> Result<Vec<u8>> {
        Self::render(TRANSPORT_SERVER_TEMPLATE, &Context::from_serialize(config)?)
    }

    fn render_tls_passthrough_hosts(&self, config: &TlsPassthroughHostsConfig) -> Result<Vec<u8>> {
        let mut tera_context = Context::new();
        tera_context.insert("hosts", config);
        Self::render(TLS_PASSTHROUGH_HOSTS_TEMPLATE, &tera_context)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::nginx::{
        stream::{StreamServer, StreamUpstream, StreamUpstreamServer},
        version1, version2,
    };

    fn rendered(bytes: Result<Vec<u8>>) -> String {
        String::from_utf8(bytes.unwrap()).unwrap()
    }

    #[test]
    pub fn test_render_ingress() {
        let upstream = version1::Upstream {
            name: "default-cafe-ingress-cafe.example.com-tea-svc-80".to_owned(),
            upstream_servers: vec![version1::UpstreamServer {
                address: "10.0.0.1:80".to_owned(),
                max_fails: 1,
                max_conns: 0,
                fail_timeout: "10s".to_owned(),
                ..Default::default()
            }],
            upstream_zone_size: "256k".to_owned(),
            ..Default::default()
        };
        let config = IngressNginxConfig {
            upstreams: vec![upstream.clone()],
            servers: vec![version1::Server {
                name: "cafe.example.com".to_owned(),
                server_tokens: "on".to_owned(),
                ports: vec![80],
                ssl_ports: vec![443],
                ssl: true,
                ssl_certificate: "/etc/nginx/secrets/default-cafe-secret".to_owned(),
                ssl_certificate_key: "/etc/nginx/secrets/default-cafe-secret".to_owned(),
                locations: vec![version1::Location {
                    path: "/tea".to_owned(),
                    upstream,
                    proxy_connect_timeout: "60s".to_owned(),
                    proxy_read_timeout: "60s".to_owned(),
                    proxy_send_timeout: "60s".to_owned(),
                    client_max_body_size: "1m".to_owned(),
                    proxy_buffering: true,
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ingress: version1::Ingress { name: "cafe-ingress".to_owned(), namespace: "default".to_owned(), ..Default::default() },
            ..Default::default()
        };

        let content = rendered(TeraRenderer.render_ingress(&config));
        assert!(content.contains("upstream default-cafe-ingress-cafe.example.com-tea-svc-80 {"));
        assert!(content.contains("server 10.0.0.1:80 max_fails=1 fail_timeout=10s max_conns=0;"));
        assert!(content.contains("listen 443 ssl;"));
        assert!(content.contains("ssl_certificate /etc/nginx/secrets/default-cafe-secret;"));
        assert!(content.contains("location /tea {"));
        assert!(content.contains("proxy_pass http://default-cafe-ingress-cafe.example.com-tea-svc-80;"));
    }

    #[test]
    pub fn test_render_virtual_server() {
        let config = VirtualServerConfig {
            upstreams: vec![version2::Upstream {
                name: "vs_default_cafe_tea".to_owned(),
                servers: vec![version2::UpstreamServer { address: "10.0.0.1:80".to_owned() }],
                max_fails: 1,
                fail_timeout: "10s".to_owned(),
                upstream_zone_size: "512k".to_owned(),
                keepalive: 16,
                ..Default::default()
            }],
            split_clients: vec![version2::SplitClient {
                source: "$request_id".to_owned(),
                variable: "$vs_default_cafe_splits_0".to_owned(),
                distributions: vec![
                    version2::Distribution { weight: "90%".to_owned(), value: "/internal_location_splits_0_split_0".to_owned() },
                    version2::Distribution { weight: "10%".to_owned(), value: "/internal_location_splits_0_split_1".to_owned() },
                ],
            }],
            server: version2::Server {
                server_name: "cafe.example.com".to_owned(),
                status_zone: "cafe.example.com".to_owned(),
                http_port: 80,
                https_port: 443,
                server_tokens: "on".to_owned(),
                vs_name: "cafe".to_owned(),
                vs_namespace: "default".to_owned(),
                ssl: Some(version2::Ssl { http2: true, reject_handshake: true, ..Default::default() }),
                locations: vec![version2::Location {
                    path: "/tea".to_owned(),
                    proxy_pass: "http://vs_default_cafe_tea".to_owned(),
                    proxy_next_upstream: "error timeout".to_owned(),
                    proxy_next_upstream_timeout: "0s".to_owned(),
                    has_keepalive: true,
                    proxy_pass_request_headers: true,
                    service_name: "tea-svc".to_owned(),
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        };

        let content = rendered(TeraRenderer.render_virtual_server(&config));
        assert!(content.contains("server 10.0.0.1:80 max_fails=1 fail_timeout=10s max_conns=0;"));
        assert!(content.contains("keepalive 16;"));
        assert!(content.contains("split_clients $request_id $vs_default_cafe_splits_0 {"));
        assert!(content.contains("90% /internal_location_splits_0_split_0;"));
        assert!(content.contains("ssl_reject_handshake on;"));
        assert!(content.contains("http2 on;"));
        assert!(content.contains("proxy_set_header Connection \"\";"));
        assert!(content.contains("proxy_pass http://vs_default_cafe_tea;"));
        assert!(!content.contains("proxy_pass_request_headers off;"));
    }

    #[test]
    pub fn test_render_transport_server() {
        let config = TransportServerConfig {
            upstreams: vec![StreamUpstream {
                name: "ts_default_dns_dns-app".to_owned(),
                servers: vec![StreamUpstreamServer {
                    address: "10.0.0.20:5353".to_owned(),
                    max_fails: 1,
                    fail_timeout: "10s".to_owned(),
                    max_connections: 0,
                }],
                ..Default::default()
            }],
            server: StreamServer {
                port: 5353,
                udp: true,
                status_zone: "dns-udp".to_owned(),
                proxy_pass: "ts_default_dns_dns-app".to_owned(),
                proxy_responses: Some(1),
                name: "dns".to_owned(),
                namespace: "default".to_owned(),
                proxy_timeout: "10m".to_owned(),
                proxy_connect_timeout: "60s".to_owned(),
                proxy_next_upstream_timeout: "0s".to_owned(),
                ..Default::default()
            },
            ..Default::default()
        };

        let content = rendered(TeraRenderer.render_transport_server(&config));
        assert!(content.contains("upstream ts_default_dns_dns-app {"));
        assert!(content.contains("listen 5353 udp;"));
        assert!(content.contains("proxy_responses 1;"));
        assert!(!content.contains("proxy_requests"));
        assert!(content.contains("proxy_pass ts_default_dns_dns-app;"));
    }

    #[test]
    pub fn test_render_error_names_the_template() {
        let error = TeraRenderer::render(INGRESS_TEMPLATE, &Context::new()).unwrap_err();
        assert!(error.to_string().starts_with("ingress.conf.tera can't be rendered"));
    }

    #[test]
    pub fn test_render_tls_passthrough_hosts() {
        let hosts = BTreeMap::from([
            ("app.example.com".to_owned(), "unix:/var/lib/nginx/passthrough-default_secure-app.sock".to_owned()),
            ("api.example.com".to_owned(), "unix:/var/lib/nginx/passthrough-default_secure-api.sock".to_owned()),
        ]);

        let content = rendered(TeraRenderer.render_tls_passthrough_hosts(&hosts));
        let api = content.find("api.example.com").unwrap();
        let app = content.find("app.example.com").unwrap();
        assert!(api < app);
        assert!(content.contains("    app.example.com unix:/var/lib/nginx/passthrough-default_secure-app.sock;"));

        let content = rendered(TeraRenderer.render_tls_passthrough_hosts(&BTreeMap::new()));
        assert!(content.starts_with("map $ssl_preread_server_name $dest_internal_passthrough {"));
    }
}
