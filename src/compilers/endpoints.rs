use std::collections::{BTreeMap, BTreeSet};

use super::naming::{generate_endpoints_key, generate_external_name_svc_key};
use crate::{
    common::{ResourceKey, Warnings, NGINX_502_SERVER},
    resources::Endpoints,
};

/// Resolves logical upstream references to the backend addresses the watch layer collected.
pub struct EndpointResolver<'a> {
    endpoints: &'a Endpoints,
    external_name_svcs: &'a BTreeSet<String>,
    is_plus: bool,
    is_resolver_configured: bool,
}

/// What an upstream points at.
pub struct EndpointTarget<'a> {
    pub namespace: &'a str,
    pub upstream: &'a str,
    pub service: &'a str,
    pub subselector: &'a BTreeMap<String, String>,
    pub port: u16,
}

impl<'a> EndpointResolver<'a> {
    pub fn new(endpoints: &'a Endpoints, external_name_svcs: &'a BTreeSet<String>, is_plus: bool, is_resolver_configured: bool) -> Self {
        Self { endpoints, external_name_svcs, is_plus, is_resolver_configured }
    }

    pub fn is_external_name(&self, namespace: &str, service: &str) -> bool {
        self.external_name_svcs.contains(&generate_external_name_svc_key(namespace, service))
    }

    fn lookup(&self, namespace: &str, service: &str, subselector: &BTreeMap<String, String>, port: u16) -> Vec<String> {
        self.endpoints.get(&generate_endpoints_key(namespace, service, subselector, port)).cloned().unwrap_or_default()
    }

    /// Endpoints of an HTTP upstream. An ExternalName service without a resolver has none.
    /// OSS NGINX cannot start with an empty upstream, so an empty result becomes the 502 socket there.
    pub fn resolve(&self, owner: &ResourceKey, target: &EndpointTarget, warnings: &mut Warnings) -> Vec<String> {
        let endpoints = if self.is_external_name(target.namespace, target.service) && !self.is_resolver_configured {
            warnings.add(owner, external_name_warning(target.service, target.upstream));
            vec![]
        } else {
            self.lookup(target.namespace, target.service, target.subselector, target.port)
        };
        if !self.is_plus && endpoints.is_empty() {
            return vec![NGINX_502_SERVER.to_owned()];
        }
        endpoints
    }

    /// Endpoints of a stream upstream. Placeholders for empty upstreams are added by the stream compiler.
    pub fn resolve_stream(&self, owner: &ResourceKey, target: &EndpointTarget, warnings: &mut Warnings) -> Vec<String> {
        if self.is_external_name(target.namespace, target.service) && !self.is_resolver_configured {
            warnings.add(owner, external_name_warning(target.service, target.upstream));
            return vec![];
        }
        self.lookup(target.namespace, target.service, target.subselector, target.port)
    }

    /// Endpoints of the backup service of an upstream, empty when no backup is declared.
    pub fn resolve_backup(&self, owner: &ResourceKey, target: &EndpointTarget, backup: &str, backup_port: Option<u16>, warnings: &mut Warnings) -> Vec<String> {
        let Some(backup_port) = backup_port else {
            return vec![];
        };
        if backup.is_empty() {
            return vec![];
        }
        if self.is_external_name(target.namespace, backup) && !self.is_resolver_configured {
            warnings.add(owner, external_name_warning(backup, target.upstream));
            return vec![];
        }
        self.lookup(target.namespace, backup, target.subselector, backup_port)
    }
}

fn external_name_warning(service: &str, upstream: &str) -> String {
    format!(
        "Type ExternalName service {service} in upstream {upstream} will be ignored. To use ExternalName services, a resolver must be configured in the ConfigMap"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target<'a>(subselector: &'a BTreeMap<String, String>, service: &'a str) -> EndpointTarget<'a> {
        EndpointTarget { namespace: "default", upstream: "tea", service, subselector, port: 80 }
    }

    #[test]
    pub fn test_resolve_uses_502_server_for_oss_without_endpoints() {
        let endpoints = Endpoints::new();
        let external = BTreeSet::new();
        let subselector = BTreeMap::new();
        let mut warnings = Warnings::new();
        let owner = ResourceKey::new("cafe");

        let resolver = EndpointResolver::new(&endpoints, &external, false, false);
        assert_eq!(vec![NGINX_502_SERVER.to_owned()], resolver.resolve(&owner, &target(&subselector, "tea-svc"), &mut warnings));

        let resolver = EndpointResolver::new(&endpoints, &external, true, false);
        assert!(resolver.resolve(&owner, &target(&subselector, "tea-svc"), &mut warnings).is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    pub fn test_resolve_external_name_without_resolver() {
        let mut endpoints = Endpoints::new();
        endpoints.insert("default/tea-svc:80".to_owned(), vec!["tea.example.com:80".to_owned()]);
        let external = BTreeSet::from(["default/tea-svc".to_owned()]);
        let subselector = BTreeMap::new();
        let mut warnings = Warnings::new();
        let owner = ResourceKey::new("cafe");

        let resolver = EndpointResolver::new(&endpoints, &external, true, false);
        assert!(resolver.resolve(&owner, &target(&subselector, "tea-svc"), &mut warnings).is_empty());
        assert_eq!(1, warnings.get(&owner).map(Vec::len).unwrap_or_default());

        let mut warnings = Warnings::new();
        let resolver = EndpointResolver::new(&endpoints, &external, true, true);
        assert_eq!(vec!["tea.example.com:80".to_owned()], resolver.resolve(&owner, &target(&subselector, "tea-svc"), &mut warnings));
        assert!(warnings.is_empty());
    }

    #[test]
    pub fn test_resolve_external_name_without_resolver_on_oss() {
        let mut endpoints = Endpoints::new();
        endpoints.insert("default/tea-svc:80".to_owned(), vec!["tea.example.com:80".to_owned()]);
        let external = BTreeSet::from(["default/tea-svc".to_owned()]);
        let subselector = BTreeMap::new();
        let mut warnings = Warnings::new();
        let owner = ResourceKey::new("cafe");

        let resolver = EndpointResolver::new(&endpoints, &external, false, false);
        assert_eq!(vec![NGINX_502_SERVER.to_owned()], resolver.resolve(&owner, &target(&subselector, "tea-svc"), &mut warnings));
        assert_eq!(1, warnings.get(&owner).map(Vec::len).unwrap_or_default());
    }

    #[test]
    pub fn test_resolve_backup() {
        let mut endpoints = Endpoints::new();
        endpoints.insert("default/backup-svc:8090".to_owned(), vec!["10.0.0.9:8090".to_owned()]);
        let external = BTreeSet::new();
        let subselector = BTreeMap::new();
        let mut warnings = Warnings::new();
        let owner = ResourceKey::new("cafe");
        let resolver = EndpointResolver::new(&endpoints, &external, true, false);

        let t = target(&subselector, "tea-svc");
        assert_eq!(vec!["10.0.0.9:8090".to_owned()], resolver.resolve_backup(&owner, &t, "backup-svc", Some(8090), &mut warnings));
        assert!(resolver.resolve_backup(&owner, &t, "backup-svc", None, &mut warnings).is_empty());
        assert!(resolver.resolve_backup(&owner, &t, "", Some(8090), &mut warnings).is_empty());
    }
}
