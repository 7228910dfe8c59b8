//! Input model: the custom resources and the bundles that carry everything a single compile pass needs.

mod policy;
mod transport_server;
mod virtual_server;

#[cfg(test)]
mod test;

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::{core::v1::Probe, networking::v1::Ingress};
use kube::ResourceExt;
pub use policy::*;
pub use transport_server::*;
pub use virtual_server::*;

use crate::common::{ResourceKey, SecretReference, DEFAULT_NAMESPACE_NAME};

pub type Endpoints = BTreeMap<String, Vec<String>>;

/// Pod behind an endpoint address, reported as the peer label of upstream metrics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
}

/// App Protect artifacts already written to disk, by `namespace/name` of the resource.
#[derive(Clone, Debug, Default)]
pub struct AppProtectResources {
    pub policies: BTreeMap<String, String>,
    pub log_confs: BTreeMap<String, String>,
    /// File names of the precompiled bundles present in the bundle folder.
    pub bundles: BTreeSet<String>,
}

pub fn namespace_of<K: kube::Resource>(resource: &K) -> String {
    resource.namespace().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned())
}

/// A VirtualServer with the routes, endpoints, policies and secrets it references.
#[derive(Clone, Debug, Default)]
pub struct VirtualServerEx {
    pub virtual_server: VirtualServer,
    pub http_port: i32,
    pub https_port: i32,
    pub endpoints: Endpoints,
    pub virtual_server_routes: Vec<VirtualServerRoute>,
    pub external_name_svcs: BTreeSet<String>,
    pub policies: BTreeMap<String, Policy>,
    pub pods_by_ip: BTreeMap<String, PodInfo>,
    pub secret_refs: BTreeMap<String, SecretReference>,
    pub ap_resources: AppProtectResources,
}

impl VirtualServerEx {
    pub fn new(virtual_server: VirtualServer) -> Self {
        Self {
            virtual_server,
            http_port: 80,
            https_port: 443,
            ..Default::default()
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::from(&self.virtual_server)
    }

    pub fn namespace(&self) -> String {
        namespace_of(&self.virtual_server)
    }

    pub fn name(&self) -> String {
        self.virtual_server.name_any()
    }
}

/// A TransportServer with the endpoints and secrets it references.
#[derive(Clone, Debug)]
pub struct TransportServerEx {
    pub listener_port: i32,
    pub transport_server: TransportServer,
    pub endpoints: Endpoints,
    pub pods_by_ip: BTreeMap<String, String>,
    pub external_name_svcs: BTreeSet<String>,
    pub secret_refs: BTreeMap<String, SecretReference>,
}

impl TransportServerEx {
    pub fn new(transport_server: TransportServer, listener_port: i32) -> Self {
        Self {
            listener_port,
            transport_server,
            endpoints: Endpoints::new(),
            pods_by_ip: BTreeMap::new(),
            external_name_svcs: BTreeSet::new(),
            secret_refs: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::from(&self.transport_server)
    }

    pub fn namespace(&self) -> String {
        namespace_of(&self.transport_server)
    }

    pub fn name(&self) -> String {
        self.transport_server.name_any()
    }
}

/// An Ingress with the endpoints, probes and secrets it references.
#[derive(Clone, Debug, Default)]
pub struct IngressEx {
    pub ingress: Ingress,
    pub endpoints: Endpoints,
    /// Readiness probes keyed by service name followed by the backend port.
    pub health_checks: BTreeMap<String, Probe>,
    pub external_name_svcs: BTreeSet<String>,
    pub pods_by_ip: BTreeMap<String, PodInfo>,
    pub valid_hosts: BTreeSet<String>,
    pub valid_minion_paths: BTreeSet<String>,
    pub app_protect_policy: Option<String>,
    pub app_protect_log_confs: Vec<String>,
    /// Secrets by name; Ingress references are always in the Ingress namespace.
    pub secret_refs: BTreeMap<String, SecretReference>,
}

impl IngressEx {
    pub fn new(ingress: Ingress) -> Self {
        Self {
            ingress,
            ..Default::default()
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::from(&self.ingress)
    }

    pub fn namespace(&self) -> String {
        namespace_of(&self.ingress)
    }

    pub fn name(&self) -> String {
        self.ingress.name_any()
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        self.ingress.annotations()
    }
}

/// A master Ingress and the minions that contribute locations to its server.
#[derive(Clone, Debug, Default)]
pub struct MergeableIngresses {
    pub master: IngressEx,
    pub minions: Vec<IngressEx>,
}
