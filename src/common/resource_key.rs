use std::fmt::Display;

use k8s_openapi::api::networking::v1::Ingress;
use kube::{Resource, ResourceExt};

use crate::resources::{Policy, TransportServer, VirtualServer, VirtualServerRoute};

pub const DEFAULT_GROUP_NAME: &str = "k8s.nginx.org";
pub const INGRESS_GROUP_NAME: &str = "networking.k8s.io";
pub const DEFAULT_NAMESPACE_NAME: &str = "default";
pub const DEFAULT_KIND_NAME: &str = "VirtualServer";

pub const INGRESS_KIND: &str = "Ingress";
pub const VIRTUAL_SERVER_KIND: &str = "VirtualServer";
pub const VIRTUAL_SERVER_ROUTE_KIND: &str = "VirtualServerRoute";
pub const TRANSPORT_SERVER_KIND: &str = "TransportServer";
pub const POLICY_KIND: &str = "Policy";

/// Stable identity of a resource. Warnings and stored artifacts are keyed by it,
/// so two deep copies of the same object always land on the same entry.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceKey {
    pub group: String,
    pub namespace: String,
    pub name: String,
    pub kind: String,
}

impl ResourceKey {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn namespaced(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_owned(),
            namespace: namespace.to_owned(),
            ..Default::default()
        }
    }

    pub fn with_kind(name: &str, namespace: &str, kind: &str) -> Self {
        let group = if kind == INGRESS_KIND { INGRESS_GROUP_NAME } else { DEFAULT_GROUP_NAME };
        Self {
            group: group.to_owned(),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            kind: kind.to_owned(),
        }
    }

    /// Parses a `namespace/name` key as used by the watch layer.
    pub fn from_namespaced_key(key: &str, kind: &str) -> Self {
        match key.split_once('/') {
            Some((namespace, name)) => Self::with_kind(name, namespace, kind),
            None => Self::with_kind(key, DEFAULT_NAMESPACE_NAME, kind),
        }
    }

    pub fn namespaced_name(&self) -> String {
        create_id(&self.name, &self.namespace)
    }
}

impl Default for ResourceKey {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP_NAME.to_owned(),
            namespace: DEFAULT_NAMESPACE_NAME.to_owned(),
            name: String::default(),
            kind: DEFAULT_KIND_NAME.to_owned(),
        }
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, create_id(&self.name, &self.namespace))
    }
}

pub fn create_id(name: &str, namespace: &str) -> String {
    namespace.to_owned() + "/" + name
}

fn key_for<R: Resource>(value: &R, kind: &str) -> ResourceKey {
    let namespace = value.meta().namespace.clone().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned());
    ResourceKey::with_kind(&value.name_any(), &namespace, kind)
}

impl From<&Ingress> for ResourceKey {
    fn from(value: &Ingress) -> Self {
        key_for(value, INGRESS_KIND)
    }
}

impl From<&VirtualServer> for ResourceKey {
    fn from(value: &VirtualServer) -> Self {
        key_for(value, VIRTUAL_SERVER_KIND)
    }
}

impl From<&VirtualServerRoute> for ResourceKey {
    fn from(value: &VirtualServerRoute) -> Self {
        key_for(value, VIRTUAL_SERVER_ROUTE_KIND)
    }
}

impl From<&TransportServer> for ResourceKey {
    fn from(value: &TransportServer) -> Self {
        key_for(value, TRANSPORT_SERVER_KIND)
    }
}

impl From<&Policy> for ResourceKey {
    fn from(value: &Policy) -> Self {
        key_for(value, POLICY_KIND)
    }
}
