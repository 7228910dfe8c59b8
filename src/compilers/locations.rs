//! Locations of a VirtualServer: proxying, redirects, returns and the error pages attached to them.

use itertools::Itertools;

use super::{upstreams::generate_grpc_pass, CompileContext};
use crate::{
    common::{generate_bool, generate_path, generate_snippets, generate_string, generate_time_with_default, ResourceKey, NGINX_418_SERVER},
    config::ConfigParams,
    nginx::version2::{AddHeader, ErrorPage, ErrorPageLocation, Header, Location, Return, ReturnLocation},
    resources::{self, Action, ActionProxy, ActionRedirect, ActionReturn, Upstream, UpstreamBuffers},
};

const GRPC_CONFLICTING_ERRORS: [i32; 19] = [400, 401, 403, 404, 405, 408, 413, 414, 415, 426, 429, 495, 496, 497, 500, 501, 502, 503, 504];

/// Error pages in effect for a route, the index their named locations were generated with and the resource declaring them.
#[derive(Clone, Copy)]
pub struct ErrorPageDetails<'a> {
    pub pages: &'a [resources::ErrorPage],
    pub index: usize,
    pub owner: &'a ResourceKey,
}

/// Everything a location inherits from the route it is generated for.
#[derive(Clone, Copy)]
pub struct LocationScope<'a> {
    pub params: &'a ConfigParams,
    pub error_pages: ErrorPageDetails<'a>,
    pub location_snippets: &'a str,
    pub enable_snippets: bool,
    /// The VirtualServerRoute owning the route, if any.
    pub vsr: Option<&'a ResourceKey>,
}

/// A location generated for one action, with the named location backing a `return` action.
pub struct GeneratedLocation {
    pub location: Location,
    pub return_location: Option<ReturnLocation>,
}

/// Builds the location of an action. `original_path` is the path of the route an internal location serves.
#[allow(clippy::too_many_arguments)]
pub fn generate_location(
    path: &str,
    upstream_name: &str,
    upstream: &Upstream,
    action: &Action,
    scope: &LocationScope,
    internal: bool,
    proxy_ssl_name: &str,
    original_path: &str,
    ctx: &mut CompileContext,
) -> GeneratedLocation {
    let location_snippets = generate_snippets(scope.enable_snippets, scope.location_snippets, &scope.params.location_snippets);

    if let Some(redirect) = &action.redirect {
        return GeneratedLocation { location: generate_location_for_redirect(path, location_snippets, redirect), return_location: None };
    }

    if let Some(action_return) = &action.return_ {
        let index = ctx.return_location_index;
        ctx.return_location_index += 1;
        let (location, return_location) = generate_location_for_return(path, scope.params.location_snippets.clone(), action_return, index);
        return GeneratedLocation { location, return_location: Some(return_location) };
    }

    check_grpc_error_page_codes(&scope.error_pages, upstream.is_grpc(), &upstream.name, ctx);

    let location = generate_location_for_proxying(
        path,
        upstream_name,
        upstream,
        scope,
        internal,
        proxy_ssl_name,
        action.proxy.as_ref(),
        original_path,
        location_snippets,
    );
    GeneratedLocation { location, return_location: None }
}

#[allow(clippy::too_many_arguments)]
fn generate_location_for_proxying(
    path: &str,
    upstream_name: &str,
    upstream: &Upstream,
    scope: &LocationScope,
    internal: bool,
    proxy_ssl_name: &str,
    proxy: Option<&ActionProxy>,
    original_path: &str,
    snippets: Vec<String>,
) -> Location {
    let params = scope.params;
    let error_pages = scope.error_pages;
    Location {
        path: generate_path(path),
        internal,
        snippets,
        proxy_connect_timeout: generate_time_with_default(&upstream.proxy_connect_timeout, &params.proxy_connect_timeout),
        proxy_read_timeout: generate_time_with_default(&upstream.proxy_read_timeout, &params.proxy_read_timeout),
        proxy_send_timeout: generate_time_with_default(&upstream.proxy_send_timeout, &params.proxy_send_timeout),
        client_max_body_size: generate_string(&upstream.client_max_body_size, &params.client_max_body_size),
        proxy_max_temp_file_size: params.proxy_max_temp_file_size.clone(),
        proxy_buffering: generate_bool(upstream.proxy_buffering, params.proxy_buffering),
        proxy_buffers: generate_buffers(upstream.proxy_buffers.as_ref(), &params.proxy_buffers),
        proxy_buffer_size: generate_string(&upstream.proxy_buffer_size, &params.proxy_buffer_size),
        proxy_pass: generate_proxy_pass(upstream.tls.enable, upstream_name, internal, proxy),
        proxy_next_upstream: generate_string(&upstream.proxy_next_upstream, "error timeout"),
        proxy_next_upstream_timeout: generate_time_with_default(&upstream.proxy_next_upstream_timeout, "0s"),
        proxy_next_upstream_tries: upstream.proxy_next_upstream_tries,
        proxy_intercept_errors: !error_pages.pages.is_empty(),
        proxy_pass_request_headers: generate_proxy_pass_request_headers(proxy),
        proxy_set_headers: generate_proxy_set_headers(proxy),
        proxy_hide_headers: proxy.and_then(|p| p.response_headers.as_ref()).map(|h| h.hide.clone()).unwrap_or_default(),
        proxy_pass_headers: proxy.and_then(|p| p.response_headers.as_ref()).map(|h| h.pass.clone()).unwrap_or_default(),
        proxy_ignore_headers: proxy.and_then(|p| p.response_headers.as_ref()).map(|h| h.ignore.join(" ")).unwrap_or_default(),
        add_headers: generate_proxy_add_headers(proxy),
        proxy_pass_rewrite: generate_proxy_pass_rewrite(path, proxy, internal),
        rewrites: generate_rewrites(path, proxy, internal, original_path, upstream.is_grpc()),
        has_keepalive: upstream_has_keepalive(upstream, params),
        error_pages: generate_error_pages(error_pages.index, error_pages.pages),
        proxy_ssl_name: proxy_ssl_name.to_owned(),
        service_name: upstream.service.clone(),
        is_vsr: scope.vsr.is_some(),
        vsr_name: scope.vsr.map(|k| k.name.clone()).unwrap_or_default(),
        vsr_namespace: scope.vsr.map(|k| k.namespace.clone()).unwrap_or_default(),
        grpc_pass: generate_grpc_pass(upstream.is_grpc(), upstream.tls.enable, upstream_name),
        ..Default::default()
    }
}

/// Redirects are served by proxying to the 418 server and turning its answer into a redirect through `error_page`.
pub fn generate_location_for_redirect(path: &str, snippets: Vec<String>, redirect: &ActionRedirect) -> Location {
    let code = if redirect.code == 0 { 301 } else { redirect.code };
    Location {
        path: path.to_owned(),
        snippets,
        proxy_intercept_errors: true,
        internal_proxy_pass: format!("http://{NGINX_418_SERVER}"),
        error_pages: vec![ErrorPage { name: redirect.url.clone(), codes: "418".to_owned(), response_code: code }],
        ..Default::default()
    }
}

pub fn generate_location_for_return(path: &str, snippets: Vec<String>, action_return: &ActionReturn, index: usize) -> (Location, ReturnLocation) {
    let default_type = generate_string(&action_return.return_type, "text/plain");
    let code = if action_return.code == 0 { 200 } else { action_return.code };
    let name = format!("@return_{index}");

    let location = Location {
        path: path.to_owned(),
        snippets,
        proxy_intercept_errors: true,
        internal_proxy_pass: format!("http://{NGINX_418_SERVER}"),
        error_pages: vec![ErrorPage { name: name.clone(), codes: "418".to_owned(), response_code: code }],
        ..Default::default()
    };
    let return_location = ReturnLocation { name, default_type, return_: Return { code: 0, text: action_return.body.clone() } };
    (location, return_location)
}

fn generate_buffers(buffers: Option<&UpstreamBuffers>, default: &str) -> String {
    match buffers {
        Some(buffers) => format!("{} {}", buffers.number, buffers.size),
        None => default.to_owned(),
    }
}

pub fn generate_proxy_pass(tls: bool, upstream_name: &str, internal: bool, proxy: Option<&ActionProxy>) -> String {
    let protocol = super::upstreams::generate_proxy_pass_protocol(tls);
    let proxy_pass = format!("{protocol}://{upstream_name}");
    if internal && proxy.map_or(true, |p| p.rewrite_path.is_empty()) {
        return format!("{proxy_pass}$request_uri");
    }
    proxy_pass
}

fn generate_proxy_pass_request_headers(proxy: Option<&ActionProxy>) -> bool {
    proxy.and_then(|p| p.request_headers.as_ref()).and_then(|h| h.pass).unwrap_or(true)
}

/// Request headers to set. `Host` is always passed on unless the action overrides it.
pub fn generate_proxy_set_headers(proxy: Option<&ActionProxy>) -> Vec<Header> {
    let mut headers: Vec<_> = proxy
        .and_then(|p| p.request_headers.as_ref())
        .map(|h| h.set.iter().map(|h| Header { name: h.name.clone(), value: h.value.clone() }).collect())
        .unwrap_or_default();
    if !headers.iter().any(|h| h.name.eq_ignore_ascii_case("host")) {
        headers.push(Header { name: "Host".to_owned(), value: "$host".to_owned() });
    }
    headers
}

fn generate_proxy_add_headers(proxy: Option<&ActionProxy>) -> Vec<AddHeader> {
    proxy
        .and_then(|p| p.response_headers.as_ref())
        .map(|h| h.add.iter().map(|h| AddHeader { name: h.name.clone(), value: h.value.clone(), always: h.always }).collect())
        .unwrap_or_default()
}

pub fn generate_proxy_pass_rewrite(path: &str, proxy: Option<&ActionProxy>, internal: bool) -> String {
    match proxy {
        Some(proxy) if !internal && (path.starts_with('/') || path.starts_with('=')) => proxy.rewrite_path.clone(),
        _ => String::new(),
    }
}

pub fn generate_rewrites(path: &str, proxy: Option<&ActionProxy>, internal: bool, original_path: &str, grpc: bool) -> Vec<String> {
    let Some(proxy) = proxy.filter(|p| !p.rewrite_path.is_empty()) else {
        if grpc && internal {
            return vec!["^ $request_uri break".to_owned()];
        }
        return vec![];
    };

    let path = if original_path.is_empty() { path } else { original_path };
    let is_regex = path.starts_with('~');
    let trimmed = path.strip_prefix('~').unwrap_or(path);
    let trimmed = trimmed.strip_prefix('*').unwrap_or(trimmed).trim();

    let mut rewrites = vec![];
    if internal {
        // $request_uri would carry the arguments twice once rewritten
        rewrites.push("^ $request_uri_no_args".to_owned());
    }
    if is_regex {
        rewrites.push(format!("\"^{trimmed}\" \"{}\" break", proxy.rewrite_path));
    } else if internal {
        rewrites.push(format!("\"^{trimmed}(.*)$\" \"{}$1\" break", proxy.rewrite_path));
    }
    rewrites
}

fn upstream_has_keepalive(upstream: &Upstream, params: &ConfigParams) -> bool {
    upstream.keepalive.unwrap_or(params.keepalive) != 0
}

fn error_page_name(error_page_index: usize, index: usize) -> String {
    format!("@error_page_{error_page_index}_{index}")
}

fn check_grpc_error_page_codes(error_pages: &ErrorPageDetails, grpc: bool, upstream_name: &str, ctx: &mut CompileContext) {
    if !grpc {
        return;
    }
    let codes: Vec<i32> = error_pages.pages.iter().flat_map(|p| p.codes.iter().copied()).filter(|c| GRPC_CONFLICTING_ERRORS.contains(c)).collect();
    if !codes.is_empty() {
        ctx.warnings.add(
            error_pages.owner,
            format!(
                "The error page configuration for the upstream {upstream_name} is ignored for status code(s) [{}], which cannot be used for GRPC upstreams.",
                codes.iter().join(" ")
            ),
        );
    }
}

pub fn generate_error_pages(error_page_index: usize, error_pages: &[resources::ErrorPage]) -> Vec<ErrorPage> {
    error_pages
        .iter()
        .enumerate()
        .map(|(i, page)| {
            let (name, response_code) = match (&page.redirect, &page.return_) {
                (Some(redirect), _) => (redirect.url.clone(), if redirect.code == 0 { 301 } else { redirect.code }),
                (None, ret) => (error_page_name(error_page_index, i), ret.as_ref().map(|r| r.code).unwrap_or_default()),
            };
            ErrorPage { name, codes: page.codes.iter().join(" "), response_code }
        })
        .collect()
}

/// Named locations answering the `return` error pages. Redirect pages are handled by `error_page` directly.
pub fn generate_error_page_locations(error_page_index: usize, error_pages: &[resources::ErrorPage]) -> Vec<ErrorPageLocation> {
    error_pages
        .iter()
        .enumerate()
        .filter(|(_, page)| page.redirect.is_none())
        .map(|(i, page)| {
            let page_return = page.return_.clone().unwrap_or_default();
            ErrorPageLocation {
                name: error_page_name(error_page_index, i),
                default_type: generate_string(&page_return.return_type, "text/html"),
                return_: Some(Return { code: 0, text: page_return.body }),
                headers: page_return.headers.into_iter().map(|h| Header { name: h.name, value: h.value }).collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{ErrorPageReturn, ProxyRequestHeaders, ProxyResponseHeaders, UpstreamTls};

    fn proxy(rewrite_path: &str) -> ActionProxy {
        ActionProxy { upstream: "tea".to_owned(), rewrite_path: rewrite_path.to_owned(), ..Default::default() }
    }

    #[test]
    pub fn test_generate_rewrites() {
        assert!(generate_rewrites("/path", None, false, "", false).is_empty());
        assert_eq!(vec!["^ $request_uri break".to_owned()], generate_rewrites("/path", None, true, "", true));
        assert!(generate_rewrites("/path", Some(&proxy("/rewrite")), false, "", false).is_empty());
        assert_eq!(
            vec!["^ $request_uri_no_args".to_owned(), "\"^/path(.*)$\" \"/rewrite$1\" break".to_owned()],
            generate_rewrites("/_internal_path", Some(&proxy("/rewrite")), true, "/path", false)
        );
        assert_eq!(
            vec!["\"^/path/(.*)\" \"/rewrite/$1\" break".to_owned()],
            generate_rewrites("~* /path/(.*)", Some(&proxy("/rewrite/$1")), false, "", false)
        );
    }

    #[test]
    pub fn test_generate_proxy_pass_rewrite() {
        assert_eq!("/rewrite", generate_proxy_pass_rewrite("/path", Some(&proxy("/rewrite")), false));
        assert_eq!("/rewrite", generate_proxy_pass_rewrite("=/path", Some(&proxy("/rewrite")), false));
        assert_eq!("", generate_proxy_pass_rewrite("~ /path", Some(&proxy("/rewrite")), false));
        assert_eq!("", generate_proxy_pass_rewrite("/path", Some(&proxy("/rewrite")), true));
        assert_eq!("", generate_proxy_pass_rewrite("/path", None, false));
    }

    #[test]
    pub fn test_generate_proxy_pass() {
        assert_eq!("http://up", generate_proxy_pass(false, "up", false, None));
        assert_eq!("https://up$request_uri", generate_proxy_pass(true, "up", true, None));
        assert_eq!("http://up", generate_proxy_pass(false, "up", true, Some(&proxy("/rewrite"))));
    }

    #[test]
    pub fn test_generate_proxy_set_headers() {
        assert_eq!(vec![Header { name: "Host".to_owned(), value: "$host".to_owned() }], generate_proxy_set_headers(None));
        let proxy = ActionProxy {
            request_headers: Some(ProxyRequestHeaders {
                pass: None,
                set: vec![resources::Header { name: "host".to_owned(), value: "example.com".to_owned() }],
            }),
            ..Default::default()
        };
        assert_eq!(vec![Header { name: "host".to_owned(), value: "example.com".to_owned() }], generate_proxy_set_headers(Some(&proxy)));
    }

    #[test]
    pub fn test_generate_location_for_proxying() {
        let params = ConfigParams::default();
        let owner = ResourceKey::with_kind("cafe", "default", "VirtualServer");
        let scope = LocationScope {
            params: &params,
            error_pages: ErrorPageDetails { pages: &[], index: 0, owner: &owner },
            location_snippets: "",
            enable_snippets: false,
            vsr: None,
        };
        let upstream = Upstream {
            name: "tea".to_owned(),
            service: "tea-svc".to_owned(),
            keepalive: Some(16),
            tls: UpstreamTls { enable: true },
            ..Default::default()
        };
        let action = Action {
            pass: "tea".to_owned(),
            proxy: Some(ActionProxy {
                upstream: "tea".to_owned(),
                response_headers: Some(ProxyResponseHeaders { ignore: vec!["Expires".to_owned(), "Set-Cookie".to_owned()], ..Default::default() }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut ctx = CompileContext::new();

        let generated = generate_location("/tea", "vs_default_cafe_tea", &upstream, &action, &scope, false, "tea-svc.default.svc", "/tea", &mut ctx);

        let location = generated.location;
        assert!(generated.return_location.is_none());
        assert_eq!("https://vs_default_cafe_tea", location.proxy_pass);
        assert_eq!("60s", location.proxy_connect_timeout);
        assert_eq!("1m", location.client_max_body_size);
        assert_eq!("error timeout", location.proxy_next_upstream);
        assert_eq!("0s", location.proxy_next_upstream_timeout);
        assert_eq!("Expires Set-Cookie", location.proxy_ignore_headers);
        assert!(location.has_keepalive);
        assert!(location.proxy_pass_request_headers);
        assert!(!location.proxy_intercept_errors);
        assert_eq!("tea-svc", location.service_name);
        assert_eq!("tea-svc.default.svc", location.proxy_ssl_name);
    }

    #[test]
    pub fn test_generate_location_for_return_uses_global_index() {
        let params = ConfigParams { location_snippets: vec!["# global".to_owned()], ..Default::default() };
        let owner = ResourceKey::with_kind("cafe", "default", "VirtualServer");
        let scope = LocationScope {
            params: &params,
            error_pages: ErrorPageDetails { pages: &[], index: 0, owner: &owner },
            location_snippets: "# route",
            enable_snippets: true,
            vsr: None,
        };
        let action = Action { return_: Some(ActionReturn { code: 0, return_type: String::new(), body: "hello".to_owned() }), ..Default::default() };
        let mut ctx = CompileContext::new();
        ctx.return_location_index = 2;

        let generated = generate_location("/", "", &Upstream::default(), &action, &scope, false, "", "/", &mut ctx);

        assert_eq!(3, ctx.return_location_index);
        assert_eq!(vec!["# global".to_owned()], generated.location.snippets);
        assert_eq!(vec![ErrorPage { name: "@return_2".to_owned(), codes: "418".to_owned(), response_code: 200 }], generated.location.error_pages);
        assert_eq!(
            Some(ReturnLocation {
                name: "@return_2".to_owned(),
                default_type: "text/plain".to_owned(),
                return_: Return { code: 0, text: "hello".to_owned() }
            }),
            generated.return_location
        );
    }

    #[test]
    pub fn test_generate_location_for_redirect() {
        let location = generate_location_for_redirect("/coffee", vec![], &ActionRedirect { url: "http://example.com".to_owned(), code: 0 });
        assert_eq!("http://unix:/var/lib/nginx/nginx-418-server.sock", location.internal_proxy_pass);
        assert_eq!(vec![ErrorPage { name: "http://example.com".to_owned(), codes: "418".to_owned(), response_code: 301 }], location.error_pages);
    }

    #[test]
    pub fn test_error_pages_and_locations() {
        let pages = vec![
            resources::ErrorPage {
                codes: vec![404, 405],
                return_: Some(ErrorPageReturn { code: 200, return_type: String::new(), body: "oops".to_owned(), headers: vec![] }),
                redirect: None,
            },
            resources::ErrorPage { codes: vec![500], return_: None, redirect: Some(ActionRedirect { url: "http://nginx.org".to_owned(), code: 302 }) },
        ];

        assert_eq!(
            vec![
                ErrorPage { name: "@error_page_1_0".to_owned(), codes: "404 405".to_owned(), response_code: 200 },
                ErrorPage { name: "http://nginx.org".to_owned(), codes: "500".to_owned(), response_code: 302 },
            ],
            generate_error_pages(1, &pages)
        );
        assert_eq!(
            vec![ErrorPageLocation {
                name: "@error_page_1_0".to_owned(),
                default_type: "text/html".to_owned(),
                return_: Some(Return { code: 0, text: "oops".to_owned() }),
                headers: vec![],
            }],
            generate_error_page_locations(1, &pages)
        );
    }

    #[test]
    pub fn test_grpc_error_page_codes_warning() {
        let owner = ResourceKey::with_kind("cafe", "default", "VirtualServer");
        let pages = vec![resources::ErrorPage { codes: vec![404, 418, 502], ..Default::default() }];
        let details = ErrorPageDetails { pages: &pages, index: 0, owner: &owner };
        let mut ctx = CompileContext::new();

        check_grpc_error_page_codes(&details, true, "grpc", &mut ctx);

        assert!(ctx.warnings.contains(
            &owner,
            "The error page configuration for the upstream grpc is ignored for status code(s) [404 502], which cannot be used for GRPC upstreams."
        ));
    }
}
