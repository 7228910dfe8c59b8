//! Bookkeeping of the metric label sets exposed per resource, so exporters can be updated with deltas.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    nginx::{
        stream::StreamUpstream,
        version1,
        version2::{self, UpstreamLabels},
    },
    resources::PodInfo,
};

/// Label values keyed by the label set key (upstream name, `upstream/address` peer or zone name).
pub type LabelSets = BTreeMap<String, Vec<String>>;

/// Returns the keys of `current` that are missing from `new`, in their original order.
pub fn find_removed_keys(current: &[String], new: &BTreeSet<String>) -> Vec<String> {
    current.iter().filter(|key| !new.contains(*key)).cloned().collect()
}

/// Label sets generated for one resource.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceLabels {
    pub upstreams: LabelSets,
    pub peers: LabelSets,
    pub zones: LabelSets,
    upstream_keys: Vec<String>,
    peer_keys: Vec<String>,
    zone_keys: Vec<String>,
}

impl ResourceLabels {
    fn add_upstream(&mut self, name: &str, labels: &UpstreamLabels) {
        self.upstreams.insert(
            name.to_owned(),
            vec![labels.service.clone(), labels.resource_type.clone(), labels.resource_name.clone(), labels.resource_namespace.clone()],
        );
        self.upstream_keys.push(name.to_owned());
    }

    fn add_peer(&mut self, upstream: &str, address: &str, pod_name: &str) {
        let key = format!("{upstream}/{address}");
        self.peers.insert(key.clone(), vec![pod_name.to_owned()]);
        self.peer_keys.push(key);
    }

    fn add_zone(&mut self, zone: &str, resource_type: &str, name: &str, namespace: &str) {
        self.zones.insert(zone.to_owned(), vec![resource_type.to_owned(), name.to_owned(), namespace.to_owned()]);
        if !self.zone_keys.iter().any(|key| key == zone) {
            self.zone_keys.push(zone.to_owned());
        }
    }

    pub fn for_ingress(upstreams: &[version1::Upstream], pods_by_ip: &BTreeMap<String, PodInfo>, hosts: &[String], name: &str, namespace: &str) -> Self {
        let mut labels = Self::default();
        for upstream in upstreams {
            labels.add_upstream(&upstream.name, &upstream.upstream_labels);
            for server in &upstream.upstream_servers {
                let pod = pods_by_ip.get(&server.address).map(|pod| pod.name.as_str()).unwrap_or_default();
                labels.add_peer(&upstream.name, &server.address, pod);
            }
        }
        for host in hosts {
            labels.add_zone(host, "ingress", name, namespace);
        }
        labels
    }

    pub fn for_virtual_server(upstreams: &[version2::Upstream], pods_by_ip: &BTreeMap<String, PodInfo>, host: &str, name: &str, namespace: &str) -> Self {
        let mut labels = Self::default();
        for upstream in upstreams {
            labels.add_upstream(&upstream.name, &upstream.upstream_labels);
            for server in &upstream.servers {
                let pod = pods_by_ip.get(&server.address).map(|pod| pod.name.as_str()).unwrap_or_default();
                labels.add_peer(&upstream.name, &server.address, pod);
            }
        }
        labels.add_zone(host, "virtualserver", name, namespace);
        labels
    }

    /// Stream zones are named after the host of TLS passthrough servers and after the listener otherwise.
    pub fn for_transport_server(upstreams: &[StreamUpstream], pods_by_ip: &BTreeMap<String, String>, zone: &str, name: &str, namespace: &str) -> Self {
        let mut labels = Self::default();
        for upstream in upstreams {
            labels.add_upstream(&upstream.name, &upstream.upstream_labels);
            for server in &upstream.servers {
                let pod = pods_by_ip.get(&server.address).map(String::as_str).unwrap_or_default();
                labels.add_peer(&upstream.name, &server.address, pod);
            }
        }
        labels.add_zone(zone, "transportserver", name, namespace);
        labels
    }
}

/// Label keys that stopped being exposed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemovedLabels {
    pub upstreams: Vec<String>,
    pub peers: Vec<String>,
    pub zones: Vec<String>,
}

/// Label keys currently exposed for every resource of one kind, by `namespace/name`.
#[derive(Clone, Debug, Default)]
pub struct LabelIndex {
    upstreams: BTreeMap<String, Vec<String>>,
    zones: BTreeMap<String, Vec<String>>,
    peers: BTreeMap<String, Vec<String>>,
}

impl LabelIndex {
    pub fn update(&mut self, key: &str, labels: &ResourceLabels) -> RemovedLabels {
        fn replace(index: &mut BTreeMap<String, Vec<String>>, key: &str, keys: &[String]) -> Vec<String> {
            let new: BTreeSet<String> = keys.iter().cloned().collect();
            let removed = index.get(key).map(|current| find_removed_keys(current, &new)).unwrap_or_default();
            index.insert(key.to_owned(), keys.to_vec());
            removed
        }

        RemovedLabels {
            upstreams: replace(&mut self.upstreams, key, &labels.upstream_keys),
            peers: replace(&mut self.peers, key, &labels.peer_keys),
            zones: replace(&mut self.zones, key, &labels.zone_keys),
        }
    }

    pub fn remove(&mut self, key: &str) -> RemovedLabels {
        RemovedLabels {
            upstreams: self.upstreams.remove(key).unwrap_or_default(),
            peers: self.peers.remove(key).unwrap_or_default(),
            zones: self.zones.remove(key).unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MetricLabelsIndex {
    pub ingresses: LabelIndex,
    pub virtual_servers: LabelIndex,
    pub transport_servers: LabelIndex,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nginx::version2::UpstreamServer;

    fn keys(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| (*k).to_owned()).collect()
    }

    #[test]
    pub fn test_find_removed_keys() {
        let current = vec!["key1".to_owned(), "key2".to_owned()];
        assert_eq!(vec!["key1".to_owned()], find_removed_keys(&current, &keys(&["key2", "key3"])));
        assert_eq!(current, find_removed_keys(&current, &keys(&[])));
        assert!(find_removed_keys(&[], &keys(&["key1"])).is_empty());
    }

    #[test]
    pub fn test_label_index_update_and_remove() {
        let upstream = |name: &str, addresses: &[&str]| version2::Upstream {
            name: name.to_owned(),
            servers: addresses.iter().map(|a| UpstreamServer { address: (*a).to_owned() }).collect(),
            upstream_labels: UpstreamLabels {
                service: "tea-svc".to_owned(),
                resource_type: "virtualserver".to_owned(),
                resource_name: "cafe".to_owned(),
                resource_namespace: "default".to_owned(),
            },
            ..Default::default()
        };
        let pods = BTreeMap::from([("10.0.0.1:80".to_owned(), PodInfo { name: "tea-1".to_owned() })]);

        let mut index = LabelIndex::default();
        let first = ResourceLabels::for_virtual_server(
            &[upstream("vs_default_cafe_tea", &["10.0.0.1:80", "10.0.0.2:80"]), upstream("vs_default_cafe_coffee", &[])],
            &pods,
            "cafe.example.com",
            "cafe",
            "default",
        );
        assert_eq!(Some(&vec!["tea-1".to_owned()]), first.peers.get("vs_default_cafe_tea/10.0.0.1:80"));
        assert_eq!(Some(&vec![String::new()]), first.peers.get("vs_default_cafe_tea/10.0.0.2:80"));
        assert_eq!(
            Some(&vec!["virtualserver".to_owned(), "cafe".to_owned(), "default".to_owned()]),
            first.zones.get("cafe.example.com")
        );
        assert_eq!(RemovedLabels::default(), index.update("default/cafe", &first));

        let second = ResourceLabels::for_virtual_server(&[upstream("vs_default_cafe_tea", &["10.0.0.2:80"])], &pods, "cafe.example.com", "cafe", "default");
        let removed = index.update("default/cafe", &second);
        assert_eq!(vec!["vs_default_cafe_coffee".to_owned()], removed.upstreams);
        assert_eq!(vec!["vs_default_cafe_tea/10.0.0.1:80".to_owned()], removed.peers);
        assert!(removed.zones.is_empty());

        let removed = index.remove("default/cafe");
        assert_eq!(vec!["vs_default_cafe_tea".to_owned()], removed.upstreams);
        assert_eq!(vec!["cafe.example.com".to_owned()], removed.zones);
        assert_eq!(RemovedLabels::default(), index.remove("default/cafe"));
    }
}
