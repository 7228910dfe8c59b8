//! Deterministic names for upstreams, config files and NGINX variables. Names are part of the contract
//! with the templates and the Plus API, so their formats never change between releases.

use std::collections::BTreeMap;

use crate::resources::{Action, TransportServer, VirtualServer, VirtualServerRoute};

pub const INTERNAL_LOCATION_PREFIX: &str = "internal_location_";

/// Key of the endpoints map: `ns/svc:port` or `ns/svc_k1=v1,k2=v2:port` when a subselector is set.
pub fn generate_endpoints_key(namespace: &str, service: &str, subselector: &BTreeMap<String, String>, port: u16) -> String {
    if subselector.is_empty() {
        return format!("{namespace}/{service}:{port}");
    }
    let labels = subselector.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",");
    format!("{namespace}/{service}_{labels}:{port}")
}

pub fn generate_external_name_svc_key(namespace: &str, service: &str) -> String {
    format!("{namespace}/{service}")
}

pub fn virtual_server_file_name(namespace: &str, name: &str) -> String {
    format!("vs_{namespace}_{name}")
}

pub fn transport_server_file_name(namespace: &str, name: &str) -> String {
    format!("ts_{namespace}_{name}")
}

pub fn ingress_file_name(namespace: &str, name: &str) -> String {
    format!("{namespace}-{name}")
}

/// File name of a VirtualServer from its `namespace/name` key.
pub fn virtual_server_file_name_from_key(key: &str) -> String {
    format!("vs_{}", key.replace('/', "_"))
}

pub fn transport_server_file_name_from_key(key: &str) -> String {
    format!("ts_{}", key.replace('/', "_"))
}

pub fn tls_passthrough_socket(namespace: &str, name: &str) -> String {
    format!("unix:/var/lib/nginx/passthrough-{namespace}_{name}.sock")
}

#[derive(Clone, Debug)]
pub struct UpstreamNamer {
    prefix: String,
    namespace: String,
}

impl UpstreamNamer {
    pub fn for_virtual_server(virtual_server: &VirtualServer) -> Self {
        let namespace = crate::resources::namespace_of(virtual_server);
        Self {
            prefix: format!("vs_{namespace}_{}", name_of(virtual_server)),
            namespace,
        }
    }

    pub fn for_virtual_server_route(virtual_server: &VirtualServer, route: &VirtualServerRoute) -> Self {
        let vs_namespace = crate::resources::namespace_of(virtual_server);
        let namespace = crate::resources::namespace_of(route);
        Self {
            prefix: format!("vs_{vs_namespace}_{}_vsr_{namespace}_{}", name_of(virtual_server), name_of(route)),
            namespace,
        }
    }

    pub fn for_transport_server(transport_server: &TransportServer) -> Self {
        let namespace = crate::resources::namespace_of(transport_server);
        Self {
            prefix: format!("ts_{namespace}_{}", name_of(transport_server)),
            namespace,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn upstream_name(&self, upstream: &str) -> String {
        format!("{}_{upstream}", self.prefix)
    }

    pub fn upstream_name_from_action(&self, action: Option<&Action>) -> String {
        self.upstream_name(action.map(Action::upstream).unwrap_or_default())
    }
}

fn name_of<K: kube::Resource>(resource: &K) -> String {
    kube::ResourceExt::name_any(resource)
}

/// Names of the variables, maps and key-value zones a VirtualServer declares in the http context.
#[derive(Clone, Debug)]
pub struct VariableNamer {
    safe_ns_name: String,
}

impl VariableNamer {
    pub fn new(virtual_server: &VirtualServer) -> Self {
        let namespace = crate::resources::namespace_of(virtual_server);
        Self {
            safe_ns_name: format!("{namespace}_{}", name_of(virtual_server)).replace('-', "_"),
        }
    }

    pub fn keyval_zone_for_split_clients(&self, index: usize) -> String {
        format!("vs_{}_keyval_zone_split_clients_{index}", self.safe_ns_name)
    }

    pub fn keyval_for_split_clients(&self, index: usize) -> String {
        format!("$vs_{}_keyval_split_clients_{index}", self.safe_ns_name)
    }

    pub fn keyval_key_for_split_clients(&self, index: usize) -> String {
        format!("\"vs_{}_keyval_key_split_clients_{index}\"", self.safe_ns_name)
    }

    pub fn map_for_split_clients(&self, index: usize) -> String {
        format!("$vs_{}_map_split_clients_{index}", self.safe_ns_name)
    }

    pub fn map_key_for_weights(&self, index: usize, i: i32, j: i32) -> String {
        format!("\"vs_{}_split_clients_{index}_{i}_{j}\"", self.safe_ns_name)
    }

    pub fn split_clients_for_weights(&self, index: usize, i: i32, j: i32) -> String {
        format!("$vs_{}_split_clients_{index}_{i}_{j}", self.safe_ns_name)
    }

    pub fn split_client_variable(&self, index: usize) -> String {
        format!("$vs_{}_splits_{index}", self.safe_ns_name)
    }

    pub fn matches_route_map_variable(&self, matches_index: usize, match_index: usize, condition_index: usize) -> String {
        format!("$vs_{}_matches_{matches_index}_match_{match_index}_cond_{condition_index}", self.safe_ns_name)
    }

    pub fn matches_route_main_map_variable(&self, matches_index: usize) -> String {
        format!("$vs_{}_matches_{matches_index}", self.safe_ns_name)
    }
}

#[cfg(test)]
mod tests {
    use kube::api::ObjectMeta;

    use super::*;
    use crate::resources::{ActionProxy, VirtualServerRouteSpec, VirtualServerSpec};

    fn virtual_server(name: &str) -> VirtualServer {
        VirtualServer {
            metadata: ObjectMeta { name: Some(name.to_owned()), namespace: Some("default".to_owned()), ..Default::default() },
            spec: VirtualServerSpec::default(),
        }
    }

    #[test]
    pub fn test_generate_endpoints_key() {
        let mut subselector = BTreeMap::new();
        assert_eq!("default/test:80", generate_endpoints_key("default", "test", &subselector, 80));
        subselector.insert("version".to_owned(), "v1".to_owned());
        subselector.insert("app".to_owned(), "tea".to_owned());
        assert_eq!("default/test_app=tea,version=v1:8080", generate_endpoints_key("default", "test", &subselector, 8080));
    }

    #[test]
    pub fn test_file_names() {
        assert_eq!("vs_default_virtual-server", virtual_server_file_name("default", "virtual-server"));
        assert_eq!("ts_default_test-server", transport_server_file_name("default", "test-server"));
        assert_eq!("vs_default_cafe", virtual_server_file_name_from_key("default/cafe"));
        assert_eq!("ts_default_cafe", transport_server_file_name_from_key("default/cafe"));
        assert_eq!("default-cafe-ingress", ingress_file_name("default", "cafe-ingress"));
        assert_eq!("unix:/var/lib/nginx/passthrough-default_secure.sock", tls_passthrough_socket("default", "secure"));
    }

    #[test]
    pub fn test_upstream_namer() {
        let vs = virtual_server("cafe");
        let namer = UpstreamNamer::for_virtual_server(&vs);
        assert_eq!("vs_default_cafe_test", namer.upstream_name("test"));

        let action = Action {
            pass: "tea".to_owned(),
            proxy: Some(ActionProxy { upstream: "coffee".to_owned(), ..Default::default() }),
            ..Default::default()
        };
        assert_eq!("vs_default_cafe_coffee", namer.upstream_name_from_action(Some(&action)));

        let route = VirtualServerRoute {
            metadata: ObjectMeta { name: Some("coffee".to_owned()), namespace: Some("prod".to_owned()), ..Default::default() },
            spec: VirtualServerRouteSpec::default(),
        };
        let namer = UpstreamNamer::for_virtual_server_route(&vs, &route);
        assert_eq!("vs_default_cafe_vsr_prod_coffee_test", namer.upstream_name("test"));
        assert_eq!("prod", namer.namespace());
    }

    #[test]
    pub fn test_variable_namer() {
        let namer = VariableNamer::new(&virtual_server("cafe-vs"));
        assert_eq!("$vs_default_cafe_vs_splits_1", namer.split_client_variable(1));
        assert_eq!("$vs_default_cafe_vs_matches_2_match_1_cond_0", namer.matches_route_map_variable(2, 1, 0));
        assert_eq!("$vs_default_cafe_vs_matches_3", namer.matches_route_main_map_variable(3));
        assert_eq!("vs_default_cafe_vs_keyval_zone_split_clients_0", namer.keyval_zone_for_split_clients(0));
        assert_eq!("\"vs_default_cafe_vs_split_clients_0_10_90\"", namer.map_key_for_weights(0, 10, 90));
    }
}
