mod helpers;
mod resource_key;
pub mod secrets;
mod warnings;


pub use helpers::*;
pub use resource_key::{
    create_id, ResourceKey, DEFAULT_NAMESPACE_NAME, INGRESS_KIND, POLICY_KIND, TRANSPORT_SERVER_KIND, VIRTUAL_SERVER_KIND, VIRTUAL_SERVER_ROUTE_KIND,
};
pub use secrets::{SecretReference, SecretResolver};
pub use warnings::Warnings;

/// Unix socket that answers every request with 502. Used when an upstream has no endpoints.
pub const NGINX_502_SERVER: &str = "unix:/var/lib/nginx/nginx-502-server.sock";
/// Unix socket that answers every request with 418. Used to turn actions into error-page redirects.
pub const NGINX_418_SERVER: &str = "unix:/var/lib/nginx/nginx-418-server.sock";
pub const NON_EXISTING_UNIX_SOCKET: &str = "unix:/var/lib/nginx/non-existing-unix-socket.sock";

pub const ANNOTATION_PREFIX: &str = "nginx.org/";
pub const MERGEABLE_INGRESS_TYPE_ANNOTATION: &str = "nginx.org/mergeable-ingress-type";
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

pub fn key_to_file_name(key: &str) -> String {
    key.replace('/', "-")
}

pub fn namespaced_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}
