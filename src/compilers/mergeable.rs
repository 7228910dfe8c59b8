use std::collections::BTreeMap;

use itertools::Itertools;
use kube::ResourceExt;
use tracing::error;

use super::{
    annotations::{filter_master_annotations, filter_minion_annotations, merge_master_annotations_into_minion},
    ingress::{IngressCompileResult, IngressCompiler},
};
use crate::{
    config::ConfigParams,
    nginx::version1::IngressNginxConfig,
    resources::MergeableIngresses,
    Configuration,
};

/// Compiles a master Ingress and its minions into a single server block.
///
/// The master and every minion are compiled from copies, since their annotations and default backend are rewritten
/// first. Warnings are keyed by resource identity, so those raised against a copy are reported for the original.
pub struct MergeableIngressCompiler<'a> {
    params: &'a ConfigParams,
    configuration: &'a Configuration,
}

impl<'a> MergeableIngressCompiler<'a> {
    pub fn new(params: &'a ConfigParams, configuration: &'a Configuration) -> Self {
        Self { params, configuration }
    }

    pub fn compile(&self, mergeable: &MergeableIngresses) -> IngressCompileResult {
        let compiler = IngressCompiler::new(self.params, self.configuration);

        let mut master = mergeable.master.clone();
        let removed = filter_master_annotations(master.ingress.annotations_mut());
        if !removed.is_empty() {
            error!(
                "{} with the annotation 'nginx.org/mergeable-ingress-type' set to 'master' cannot contain the '{}' annotation(s). They will be ignored",
                master.key(),
                removed.iter().join(",")
            );
        }

        let IngressCompileResult { config: master_config, mut warnings } = compiler.compile(&master, false);
        let mut master_server = master_config.servers.into_iter().next().unwrap_or_default();
        master_server.locations.clear();

        let mut upstreams = master_config.upstreams;
        let mut locations = vec![];
        let mut health_checks = BTreeMap::new();
        let mut limit_req_zones = vec![];

        for original in &mergeable.minions {
            let mut minion = original.clone();
            if let Some(spec) = minion.ingress.spec.as_mut() {
                spec.default_backend = None;
            }
            merge_master_annotations_into_minion(minion.ingress.annotations_mut(), master.annotations());
            let removed = filter_minion_annotations(minion.ingress.annotations_mut());
            if !removed.is_empty() {
                error!(
                    "{} with the annotation 'nginx.org/mergeable-ingress-type' set to 'minion' cannot contain the {} annotation(s). They will be ignored",
                    minion.key(),
                    removed.iter().join(",")
                );
            }

            let IngressCompileResult { config, warnings: minion_warnings } = compiler.compile(&minion, true);
            warnings.merge(minion_warnings);

            for server in config.servers {
                locations.extend(server.locations.into_iter().map(|mut location| {
                    location.minion_ingress = Some(config.ingress.clone());
                    location
                }));
                health_checks.extend(server.health_checks);
                master_server.jwt_redirect_locations.extend(server.jwt_redirect_locations);
            }
            upstreams.extend(config.upstreams);
            limit_req_zones.extend(config.limit_req_zones);
        }

        master_server.health_checks = health_checks;
        master_server.locations = locations;
        upstreams.sort_by(|a, b| a.name.cmp(&b.name));

        let config = IngressNginxConfig {
            upstreams,
            servers: vec![master_server],
            keepalive: master_config.keepalive,
            ingress: master_config.ingress,
            limit_req_zones,
        };
        IngressCompileResult { config, warnings }
    }
}
