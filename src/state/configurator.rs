//! The resident state store. It owns the compiled view of every resource the controller handles, writes the
//! rendered configuration through the [`ConfigSink`] and decides when NGINX has to be reloaded.
//!
//! Reloads are gated: while the initial bulk load runs they are disabled, so N applied resources cost one reload
//! once [`Configurator::enable_reloads`] is called instead of N.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::{core::v1::Secret, networking::v1::Ingress};
use kube::ResourceExt;
use thiserror::Error;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use super::{
    collaborators::{
        ConfigSink, LabelUpdater, NoopLabelUpdater, ReloadReason, ServerOptions, TemplateRenderer, HTPASSWD_SECRET_FILE_MODE, JWK_SECRET_FILE_MODE,
        TLS_SECRET_FILE_MODE,
    },
    metric_labels::{MetricLabelsIndex, RemovedLabels, ResourceLabels},
};
use crate::{
    common::{
        key_to_file_name, namespaced_key,
        secrets::{CA_KEY, CRL_KEY, HTPASSWD_FILE_KEY, JWT_KEY, SECRET_TYPE_CA, SECRET_TYPE_HTPASSWD, SECRET_TYPE_JWK, SECRET_TYPE_OIDC, TLS_CERT_KEY, TLS_KEY_KEY},
        ResourceKey, Warnings, MERGEABLE_INGRESS_TYPE_ANNOTATION,
    },
    compilers::{
        create_upstreams_for_plus, ingress_upstream_endpoints_for_plus,
        naming::{
            generate_endpoints_key, ingress_file_name, transport_server_file_name, transport_server_file_name_from_key, virtual_server_file_name,
            virtual_server_file_name_from_key, UpstreamNamer, VariableNamer,
        },
        parse_annotations, IngressCompileResult, IngressCompiler, MergeableIngressCompiler, TransportServerCompiler, VirtualServerCompiler, BASIC_AUTH_SECRET,
        JWT_KEY_ANNOTATION,
    },
    config::ConfigParams,
    nginx::{IngressNginxConfig, TlsPassthroughHostsConfig},
    resources::{namespace_of, IngressEx, MergeableIngresses, TransportServerEx, VirtualServerEx, VirtualServerRoute},
    Configuration,
};

#[derive(Error, Debug)]
pub enum ConfiguratorError {
    #[error("{key} error generating configuration {name}: {error}")]
    Render { key: ResourceKey, name: String, error: String },
    #[error("error generating config for TLS Passthrough Unix Sockets map: {0}")]
    TlsPassthroughHosts(String),
    #[error("error reloading NGINX {context}: {error}")]
    Reload { context: String, error: String },
}

impl ConfiguratorError {
    fn with_warnings(self, warnings: Warnings) -> ApplyError {
        ApplyError { error: self, warnings }
    }
}

/// A failed add or update. Keeps the warnings of everything compiled before the failure.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ApplyError {
    #[source]
    pub error: ConfiguratorError,
    pub warnings: Warnings,
}

/// Every resource the controller handles, as applied in one pass on start-up or after a ConfigMap change.
#[derive(Clone, Debug, Default)]
pub struct ConfigurationResources {
    pub ingresses: Vec<IngressEx>,
    pub mergeable_ingresses: Vec<MergeableIngresses>,
    pub virtual_servers: Vec<VirtualServerEx>,
    pub transport_servers: Vec<TransportServerEx>,
}

/// A key-value entry selecting the active weights of a two-way split.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightUpdate {
    pub zone: String,
    pub key: String,
    pub value: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngressCounts {
    pub master: usize,
    pub regular: usize,
    pub minion: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct TlsPassthroughPair {
    host: String,
    unix_socket: String,
}

/// What applying one or more resources did.
#[derive(Debug, Default)]
struct Applied {
    changed: bool,
    warnings: Warnings,
    weight_updates: Vec<WeightUpdate>,
}

impl Applied {
    fn merge(&mut self, other: Applied) {
        self.changed |= other.changed;
        self.warnings.merge(other.warnings);
        self.weight_updates.extend(other.weight_updates);
    }
}

trait StoredResource {
    fn resource_key(&self) -> ResourceKey;
}

impl StoredResource for IngressEx {
    fn resource_key(&self) -> ResourceKey {
        self.key()
    }
}

impl StoredResource for MergeableIngresses {
    fn resource_key(&self) -> ResourceKey {
        self.master.key()
    }
}

impl StoredResource for VirtualServerEx {
    fn resource_key(&self) -> ResourceKey {
        self.key()
    }
}

impl StoredResource for TransportServerEx {
    fn resource_key(&self) -> ResourceKey {
        self.key()
    }
}

type ApplyFn<T> = fn(&mut Configurator, &T) -> Result<Applied, ApplyError>;
type PushFn<T> = fn(&mut Configurator, &T) -> crate::Result<()>;

#[derive(TypedBuilder)]
pub struct Configurator {
    #[builder(default)]
    params: ConfigParams,
    #[builder(default)]
    configuration: Configuration,
    sink: Box<dyn ConfigSink>,
    renderer: Box<dyn TemplateRenderer>,
    #[builder(default = Box::new(NoopLabelUpdater))]
    http_labels: Box<dyn LabelUpdater>,
    #[builder(default = Box::new(NoopLabelUpdater))]
    stream_labels: Box<dyn LabelUpdater>,
    /// Regular and master Ingresses by configuration file name.
    #[builder(default, setter(skip))]
    ingresses: BTreeMap<String, IngressEx>,
    /// Minion file names by the file name of their master.
    #[builder(default, setter(skip))]
    minions: BTreeMap<String, BTreeSet<String>>,
    #[builder(default, setter(skip))]
    virtual_servers: BTreeMap<String, VirtualServerEx>,
    #[builder(default, setter(skip))]
    transport_servers: BTreeMap<String, TransportServerEx>,
    /// By `namespace/name` of the TransportServer.
    #[builder(default, setter(skip))]
    tls_passthrough_pairs: BTreeMap<String, TlsPassthroughPair>,
    #[builder(default, setter(skip))]
    metric_labels: MetricLabelsIndex,
    #[builder(default, setter(skip))]
    reloads_enabled: bool,
}

impl Configurator {
    pub fn params(&self) -> &ConfigParams {
        &self.params
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn is_resolver_configured(&self) -> bool {
        self.params.is_resolver_configured()
    }

    pub fn reloads_enabled(&self) -> bool {
        self.reloads_enabled
    }

    pub fn enable_reloads(&mut self) {
        self.reloads_enabled = true;
    }

    pub fn disable_reloads(&mut self) {
        self.reloads_enabled = false;
    }

    /// Reloads once after a batch of changes applied with their own reloads skipped.
    pub fn reload_for_batch_updates(&mut self, batch_reloads_enabled: bool) -> Result<(), ConfiguratorError> {
        if !batch_reloads_enabled {
            return Ok(());
        }
        self.reload(ReloadReason::OtherUpdate, "after a batch event")
    }

    pub fn add_or_update_ingress(&mut self, ing_ex: &IngressEx) -> Result<Warnings, ApplyError> {
        let applied = self.apply_ingress(ing_ex)?;
        self.reload_keeping_warnings(&format!("for {}", ing_ex.key()), applied.warnings)
    }

    pub fn add_or_update_mergeable_ingress(&mut self, mergeable: &MergeableIngresses) -> Result<Warnings, ApplyError> {
        let applied = self.apply_mergeable_ingress(mergeable)?;
        self.reload_keeping_warnings(&format!("for {}", mergeable.master.key()), applied.warnings)
    }

    /// Applies a VirtualServer and reloads. Pending dynamic weight updates turn reloads on first.
    pub fn add_or_update_virtual_server(&mut self, vs_ex: &VirtualServerEx) -> Result<Warnings, ApplyError> {
        let applied = self.apply_virtual_server(vs_ex)?;
        if !applied.weight_updates.is_empty() {
            self.enable_reloads();
        }
        let warnings = self.reload_keeping_warnings(&format!("for {}", vs_ex.key()), applied.warnings)?;
        self.apply_weight_updates(&applied.weight_updates);
        Ok(warnings)
    }

    /// Applies every VirtualServer and reloads once. The first failure aborts the remaining ones.
    pub fn add_or_update_virtual_servers(&mut self, vs_exes: &[VirtualServerEx]) -> Result<Warnings, ApplyError> {
        let mut outcome = Applied::default();
        self.apply_all(vs_exes, Self::apply_virtual_server, &mut outcome)?;
        let warnings = self.reload_keeping_warnings("when updating VirtualServers", outcome.warnings)?;
        self.apply_weight_updates(&outcome.weight_updates);
        Ok(warnings)
    }

    pub fn add_or_update_transport_server(&mut self, ts_ex: &TransportServerEx) -> Result<Warnings, ApplyError> {
        let applied = self.apply_transport_server(ts_ex)?;
        self.reload_keeping_warnings(&format!("for {}", ts_ex.key()), applied.warnings)
    }

    /// Applies a full set of resources, aborting on the first failure. NGINX is reloaded when any configuration
    /// file changed, or unconditionally with `reload_if_unchanged`.
    pub fn add_or_update_resources(&mut self, resources: &ConfigurationResources, reload_if_unchanged: bool) -> Result<Warnings, ApplyError> {
        let outcome = self.apply_resources(resources)?;
        let warnings = if outcome.changed || reload_if_unchanged {
            self.reload_keeping_warnings("when updating resources", outcome.warnings)?
        } else {
            debug!("no configuration changed, skipping reload");
            outcome.warnings
        };
        self.apply_weight_updates(&outcome.weight_updates);
        Ok(warnings)
    }

    /// Replaces the ConfigMap parameters and regenerates the configuration of every resource.
    pub fn update_config(&mut self, params: ConfigParams, resources: &ConfigurationResources) -> Result<Warnings, ApplyError> {
        self.params = params;
        let outcome = self.apply_resources(resources)?;
        let warnings = self.reload_keeping_warnings("when updating config from ConfigMap", outcome.warnings)?;
        self.apply_weight_updates(&outcome.weight_updates);
        Ok(warnings)
    }

    /// Applies the updated VirtualServers and removes the deleted ones, then reloads once.
    /// Failures are collected and do not stop the remaining resources.
    pub fn update_virtual_servers(&mut self, updated: &[VirtualServerEx], deleted_keys: &[String]) -> (Warnings, Vec<ConfiguratorError>) {
        let mut errors = vec![];
        let outcome = self.apply_each(updated, Self::apply_virtual_server, &mut errors);
        for key in deleted_keys {
            self.remove_virtual_server(key);
        }
        if let Err(e) = self.reload(ReloadReason::OtherUpdate, "when updating VirtualServers") {
            errors.push(e);
        }
        self.apply_weight_updates(&outcome.weight_updates);
        (outcome.warnings, errors)
    }

    pub fn update_transport_servers(&mut self, updated: &[TransportServerEx], deleted_keys: &[String]) -> (Warnings, Vec<ConfiguratorError>) {
        let mut errors = vec![];
        let outcome = self.apply_each(updated, Self::apply_transport_server, &mut errors);
        for key in deleted_keys {
            if let Err(e) = self.remove_transport_server(key) {
                errors.push(e);
            }
        }
        if let Err(e) = self.reload(ReloadReason::OtherUpdate, "when updating TransportServers") {
            errors.push(e);
        }
        (outcome.warnings, errors)
    }

    pub fn delete_ingress(&mut self, key: &str, skip_reload: bool) -> Result<(), ConfiguratorError> {
        let name = key_to_file_name(key);
        self.sink.delete_config(&name);
        self.ingresses.remove(&name);
        self.minions.remove(&name);
        if self.configuration.http_metrics_enabled() {
            let removed = self.metric_labels.ingresses.remove(key);
            report_removed_labels(&mut *self.http_labels, &removed, self.configuration.is_plus);
        }
        info!("Ingress {key} deleted");
        if skip_reload {
            return Ok(());
        }
        self.reload(ReloadReason::OtherUpdate, &format!("when removing Ingress {key}"))
    }

    pub fn batch_delete_ingresses(&mut self, keys: &[String]) -> Result<(), ConfiguratorError> {
        for key in keys {
            self.delete_ingress(key, true)?;
        }
        self.reload(ReloadReason::OtherUpdate, "when removing Ingresses")
    }

    pub fn delete_virtual_server(&mut self, key: &str, skip_reload: bool) -> Result<(), ConfiguratorError> {
        self.remove_virtual_server(key);
        if skip_reload {
            return Ok(());
        }
        self.reload(ReloadReason::OtherUpdate, &format!("when removing VirtualServer {key}"))
    }

    pub fn batch_delete_virtual_servers(&mut self, keys: &[String]) -> Result<(), ConfiguratorError> {
        for key in keys {
            self.remove_virtual_server(key);
        }
        self.reload(ReloadReason::OtherUpdate, "when removing VirtualServers")
    }

    pub fn delete_transport_server(&mut self, key: &str) -> Result<(), ConfiguratorError> {
        self.remove_transport_server(key)?;
        self.reload(ReloadReason::OtherUpdate, &format!("when removing TransportServer {key}"))
    }

    pub fn update_endpoints(&mut self, ing_exes: &[IngressEx]) -> Result<(), ConfiguratorError> {
        self.refresh_endpoints(ing_exes, Self::apply_ingress, Self::push_ingress_endpoints)
    }

    pub fn update_endpoints_for_mergeable_ingress(&mut self, mergeables: &[MergeableIngresses]) -> Result<(), ConfiguratorError> {
        self.refresh_endpoints(mergeables, Self::apply_mergeable_ingress, Self::push_mergeable_ingress_endpoints)
    }

    pub fn update_endpoints_for_virtual_servers(&mut self, vs_exes: &[VirtualServerEx]) -> Result<(), ConfiguratorError> {
        self.refresh_endpoints(vs_exes, Self::apply_virtual_server, Self::push_virtual_server_endpoints)
    }

    pub fn update_endpoints_for_transport_servers(&mut self, ts_exes: &[TransportServerEx]) -> Result<(), ConfiguratorError> {
        self.refresh_endpoints(ts_exes, Self::apply_transport_server, Self::push_transport_server_endpoints)
    }

    /// Writes the files of a secret and returns their paths. CA secrets yield the certificate and the CRL path
    /// separated by a space. OIDC client secrets are inlined in the configuration and have no file.
    pub fn add_or_update_secret(&mut self, secret: &Secret) -> String {
        let name = secret_file_name(secret);
        match secret.type_.as_deref().unwrap_or_default() {
            SECRET_TYPE_CA => {
                let crt = self.sink.create_secret_file(&format!("{name}-{CA_KEY}"), &secret_data(secret, CA_KEY), TLS_SECRET_FILE_MODE);
                let crl = self.sink.create_secret_file(&format!("{name}-{CRL_KEY}"), &secret_data(secret, CRL_KEY), TLS_SECRET_FILE_MODE);
                format!("{crt} {crl}")
            },
            SECRET_TYPE_JWK => self.sink.create_secret_file(&name, &secret_data(secret, JWT_KEY), JWK_SECRET_FILE_MODE),
            SECRET_TYPE_HTPASSWD => self.sink.create_secret_file(&name, &secret_data(secret, HTPASSWD_FILE_KEY), HTPASSWD_SECRET_FILE_MODE),
            SECRET_TYPE_OIDC => String::new(),
            _ => self.sink.create_secret_file(&name, &cert_and_key(secret), TLS_SECRET_FILE_MODE),
        }
    }

    pub fn delete_secret(&mut self, key: &str) {
        self.sink.delete_secret_file(&key_to_file_name(key));
    }

    /// Writes a TLS secret used outside of any resource, such as the default server or the wildcard secret,
    /// under each of the given names.
    pub fn add_or_update_special_tls_secrets(&mut self, secret: &Secret, secret_names: &[String]) -> Result<(), ConfiguratorError> {
        let content = cert_and_key(secret);
        for name in secret_names {
            self.sink.create_secret_file(name, &content, TLS_SECRET_FILE_MODE);
        }
        self.reload(ReloadReason::OtherUpdate, "when updating special secrets")
    }

    pub fn upsert_split_clients_key_val(&mut self, zone: &str, key: &str, value: &str) {
        self.sink.upsert_key_value(zone, key, value);
    }

    pub fn has_ingress(&self, ingress: &Ingress) -> bool {
        self.ingresses.contains_key(&ingress_file_name(&namespace_of(ingress), &ingress.name_any()))
    }

    pub fn has_minion(&self, master: &Ingress, minion: &Ingress) -> bool {
        let master = ingress_file_name(&namespace_of(master), &master.name_any());
        let minion = ingress_file_name(&namespace_of(minion), &minion.name_any());
        self.minions.get(&master).is_some_and(|minions| minions.contains(&minion))
    }

    pub fn ingress_counts(&self) -> IngressCounts {
        let master = self
            .ingresses
            .values()
            .filter(|ing_ex| ing_ex.annotations().get(MERGEABLE_INGRESS_TYPE_ANNOTATION).is_some_and(|t| t == "master"))
            .count();
        IngressCounts {
            master,
            regular: self.ingresses.len() - master,
            minion: self.minions.values().map(BTreeSet::len).sum(),
        }
    }

    /// The number of VirtualServers and of the VirtualServerRoutes they reference.
    pub fn virtual_server_counts(&self) -> (usize, usize) {
        let routes = self.virtual_servers.values().map(|vs_ex| vs_ex.virtual_server_routes.len()).sum();
        (self.virtual_servers.len(), routes)
    }

    pub fn transport_server_counts(&self) -> usize {
        self.transport_servers.len()
    }

    /// Upstream names of the VirtualServer serving `host`.
    pub fn upstreams_for_host(&self, host: &str) -> Vec<String> {
        debug!("get upstreams for host {host}");
        let Some(vs_ex) = self.virtual_servers.values().find(|vs_ex| vs_ex.virtual_server.spec.host == host) else {
            return vec![];
        };
        let namer = UpstreamNamer::for_virtual_server(&vs_ex.virtual_server);
        vs_ex.virtual_server.spec.upstreams.iter().map(|upstream| namer.upstream_name(&upstream.name)).collect()
    }

    /// Stream upstream names of the TransportServer whose action passes to `name`.
    pub fn stream_upstreams_for_name(&self, name: &str) -> Vec<String> {
        debug!("get stream upstreams for name '{name}'");
        let Some(ts_ex) = self
            .transport_servers
            .values()
            .find(|ts_ex| ts_ex.transport_server.spec.action.as_ref().is_some_and(|action| action.pass == name))
        else {
            return vec![];
        };
        let namer = UpstreamNamer::for_transport_server(&ts_ex.transport_server);
        ts_ex.transport_server.spec.upstreams.iter().map(|upstream| namer.upstream_name(&upstream.name)).collect()
    }

    pub fn virtual_server_routes_for_virtual_server(&self, key: &str) -> &[VirtualServerRoute] {
        self.virtual_servers
            .get(&virtual_server_file_name_from_key(key))
            .map(|vs_ex| vs_ex.virtual_server_routes.as_slice())
            .unwrap_or_default()
    }

    /// The SNI host to unix socket map of every TLS passthrough TransportServer.
    pub fn tls_passthrough_hosts_config(&self) -> TlsPassthroughHostsConfig {
        self.tls_passthrough_pairs.values().map(|pair| (pair.host.clone(), pair.unix_socket.clone())).collect()
    }

    fn reload(&mut self, reason: ReloadReason, context: &str) -> Result<(), ConfiguratorError> {
        if !self.reloads_enabled {
            debug!("reloads are disabled, skipping reload {context}");
            return Ok(());
        }
        info!("reloading NGINX {context} ({reason})");
        self.sink.reload(reason).map_err(|e| ConfiguratorError::Reload {
            context: context.to_owned(),
            error: e.to_string(),
        })
    }

    fn reload_keeping_warnings(&mut self, context: &str, warnings: Warnings) -> Result<Warnings, ApplyError> {
        match self.reload(ReloadReason::OtherUpdate, context) {
            Ok(()) => Ok(warnings),
            Err(error) => Err(error.with_warnings(warnings)),
        }
    }

    fn push_dynamic_upstream(&mut self, upstream: &str, servers: &[String], options: &ServerOptions) -> crate::Result<()> {
        if !self.reloads_enabled {
            return Ok(());
        }
        self.sink.push_dynamic_upstream(upstream, servers, options)
    }

    fn push_dynamic_stream_upstream(&mut self, upstream: &str, servers: &[String]) -> crate::Result<()> {
        if !self.reloads_enabled {
            return Ok(());
        }
        self.sink.push_dynamic_stream_upstream(upstream, servers)
    }

    fn apply_weight_updates(&mut self, updates: &[WeightUpdate]) {
        for update in updates {
            self.sink.upsert_key_value(&update.zone, &update.key, &update.value);
        }
    }

    fn apply_resources(&mut self, resources: &ConfigurationResources) -> Result<Applied, ApplyError> {
        let mut outcome = Applied::default();
        self.apply_all(&resources.ingresses, Self::apply_ingress, &mut outcome)?;
        self.apply_all(&resources.mergeable_ingresses, Self::apply_mergeable_ingress, &mut outcome)?;
        self.apply_all(&resources.virtual_servers, Self::apply_virtual_server, &mut outcome)?;
        self.apply_all(&resources.transport_servers, Self::apply_transport_server, &mut outcome)?;
        Ok(outcome)
    }

    fn apply_all<T>(&mut self, items: &[T], apply: ApplyFn<T>, outcome: &mut Applied) -> Result<(), ApplyError> {
        for item in items {
            match apply(self, item) {
                Ok(applied) => outcome.merge(applied),
                Err(e) => {
                    let mut warnings = std::mem::take(&mut outcome.warnings);
                    warnings.merge(e.warnings);
                    return Err(e.error.with_warnings(warnings));
                },
            }
        }
        Ok(())
    }

    fn apply_each<T: StoredResource>(&mut self, items: &[T], apply: ApplyFn<T>, errors: &mut Vec<ConfiguratorError>) -> Applied {
        let mut outcome = Applied::default();
        for item in items {
            match apply(self, item) {
                Ok(applied) => outcome.merge(applied),
                Err(e) => {
                    warn!("{} error adding or updating: {e}", item.resource_key());
                    outcome.warnings.merge(e.warnings);
                    errors.push(e.error);
                },
            }
        }
        outcome
    }

    /// Regenerates the configuration of resources whose endpoints changed. With Plus the new endpoints are pushed
    /// through the API and NGINX is only reloaded when a push fails.
    fn refresh_endpoints<T: StoredResource>(&mut self, items: &[T], apply: ApplyFn<T>, push: PushFn<T>) -> Result<(), ConfiguratorError> {
        let mut push_failed = false;
        for item in items {
            apply(self, item).map_err(|e| e.error)?;
            if self.configuration.is_plus {
                if let Err(e) = push(self, item) {
                    warn!("{} couldn't update the endpoints via the API: {e}; reloading configuration instead", item.resource_key());
                    push_failed = true;
                }
            }
        }
        if self.configuration.is_plus && !push_failed {
            debug!("endpoints pushed through the API, no need to reload NGINX");
            return Ok(());
        }
        self.reload(ReloadReason::EndpointsUpdate, "after endpoints update")
    }

    /// JWT and basic auth secrets are referenced by their file path even when the secret is not on disk yet.
    fn set_auth_secret_paths(&self, ing_ex: &mut IngressEx) {
        let namespace = ing_ex.namespace();
        let secrets: Vec<String> = [JWT_KEY_ANNOTATION, BASIC_AUTH_SECRET].iter().filter_map(|a| ing_ex.annotations().get(*a).cloned()).collect();
        for secret in secrets {
            if let Some(reference) = ing_ex.secret_refs.get_mut(&secret) {
                reference.path = self.sink.secret_file_name(&format!("{namespace}-{secret}"));
            }
        }
    }

    fn render_ingress(&self, key: &ResourceKey, name: &str, config: &IngressNginxConfig) -> Result<Vec<u8>, ConfiguratorError> {
        self.renderer.render_ingress(config).map_err(|e| ConfiguratorError::Render {
            key: key.clone(),
            name: name.to_owned(),
            error: e.to_string(),
        })
    }

    fn apply_ingress(&mut self, ing_ex: &IngressEx) -> Result<Applied, ApplyError> {
        let mut ing_ex = ing_ex.clone();
        self.set_auth_secret_paths(&mut ing_ex);
        let key = ing_ex.key();
        let name = ingress_file_name(&ing_ex.namespace(), &ing_ex.name());

        let IngressCompileResult { config, warnings } = IngressCompiler::new(&self.params, &self.configuration).compile(&ing_ex, false);
        let content = match self.render_ingress(&key, &name, &config) {
            Ok(content) => content,
            Err(error) => return Err(error.with_warnings(warnings)),
        };
        let changed = self.sink.write_config(&name, &content);
        debug!("{key} configuration {name} written, changed {changed}");

        self.update_ingress_labels(&ing_ex, &config);
        self.ingresses.insert(name, ing_ex);
        Ok(Applied { changed, warnings, ..Default::default() })
    }

    fn apply_mergeable_ingress(&mut self, mergeable: &MergeableIngresses) -> Result<Applied, ApplyError> {
        let mut mergeable = mergeable.clone();
        self.set_auth_secret_paths(&mut mergeable.master);
        for minion in &mut mergeable.minions {
            self.set_auth_secret_paths(minion);
        }
        let key = mergeable.master.key();
        let name = ingress_file_name(&mergeable.master.namespace(), &mergeable.master.name());

        let IngressCompileResult { config, warnings } = MergeableIngressCompiler::new(&self.params, &self.configuration).compile(&mergeable);
        let content = match self.render_ingress(&key, &name, &config) {
            Ok(content) => content,
            Err(error) => return Err(error.with_warnings(warnings)),
        };
        let changed = self.sink.write_config(&name, &content);
        debug!("{key} configuration {name} written with {} minions, changed {changed}", mergeable.minions.len());

        self.update_ingress_labels(&mergeable.master, &config);
        let minions = mergeable.minions.iter().map(|minion| ingress_file_name(&minion.namespace(), &minion.name())).collect();
        self.minions.insert(name.clone(), minions);
        self.ingresses.insert(name, mergeable.master);
        Ok(Applied { changed, warnings, ..Default::default() })
    }

    fn apply_virtual_server(&mut self, vs_ex: &VirtualServerEx) -> Result<Applied, ApplyError> {
        let key = vs_ex.key();
        let namespace = vs_ex.namespace();
        let vs_name = vs_ex.name();
        let name = virtual_server_file_name(&namespace, &vs_name);

        let (config, warnings) = VirtualServerCompiler::new(&self.params, &self.configuration).compile(vs_ex);
        let content = match self.renderer.render_virtual_server(&config) {
            Ok(content) => content,
            Err(e) => {
                let error = ConfiguratorError::Render { key, name, error: e.to_string() };
                return Err(error.with_warnings(warnings));
            },
        };
        let changed = self.sink.write_config(&name, &content);
        debug!("{key} configuration {name} written, changed {changed}");

        if self.configuration.http_metrics_enabled() {
            let labels = ResourceLabels::for_virtual_server(&config.upstreams, &vs_ex.pods_by_ip, &vs_ex.virtual_server.spec.host, &vs_name, &namespace);
            let removed = self.metric_labels.virtual_servers.update(&namespaced_key(&namespace, &vs_name), &labels);
            report_labels(&mut *self.http_labels, &labels, &removed, self.configuration.is_plus);
        }

        let mut weight_updates = vec![];
        if self.configuration.dynamic_weight_change_reload {
            let namer = VariableNamer::new(&vs_ex.virtual_server);
            for split in config.two_way_split_clients.iter().filter(|split| split.weights.len() == 2) {
                weight_updates.push(WeightUpdate {
                    zone: split.zone_name.clone(),
                    key: split.key.clone(),
                    value: namer.map_key_for_weights(split.split_client_index, split.weights[0], split.weights[1]),
                });
            }
        }

        self.virtual_servers.insert(name, vs_ex.clone());
        Ok(Applied { changed, warnings, weight_updates })
    }

    fn apply_transport_server(&mut self, ts_ex: &TransportServerEx) -> Result<Applied, ApplyError> {
        let key = ts_ex.key();
        let namespace = ts_ex.namespace();
        let ts_name = ts_ex.name();
        let name = transport_server_file_name(&namespace, &ts_name);

        let (config, warnings) = TransportServerCompiler::new(&self.params, &self.configuration).compile(ts_ex);
        let content = match self.renderer.render_transport_server(&config) {
            Ok(content) => content,
            Err(e) => {
                let error = ConfiguratorError::Render { key, name, error: e.to_string() };
                return Err(error.with_warnings(warnings));
            },
        };
        let mut changed = self.sink.write_stream_config(&name, &content);
        debug!("{key} stream configuration {name} written, changed {changed}");

        if self.configuration.stream_metrics_enabled() {
            let labels = ResourceLabels::for_transport_server(&config.upstreams, &ts_ex.pods_by_ip, &config.server.status_zone, &ts_name, &namespace);
            let removed = self.metric_labels.transport_servers.update(&namespaced_key(&namespace, &ts_name), &labels);
            report_labels(&mut *self.stream_labels, &labels, &removed, true);
        }
        self.transport_servers.insert(name, ts_ex.clone());

        // only TLS passthrough TransportServers have a host
        let host = &ts_ex.transport_server.spec.host;
        if !host.is_empty() {
            let pair = TlsPassthroughPair {
                host: host.clone(),
                unix_socket: config.server.unix_socket.clone(),
            };
            self.tls_passthrough_pairs.insert(namespaced_key(&namespace, &ts_name), pair);
            match self.write_tls_passthrough_hosts_config() {
                Ok(written) => changed |= written,
                Err(error) => return Err(error.with_warnings(warnings)),
            }
        }
        Ok(Applied { changed, warnings, ..Default::default() })
    }

    fn write_tls_passthrough_hosts_config(&mut self) -> Result<bool, ConfiguratorError> {
        let config = self.tls_passthrough_hosts_config();
        let content = self
            .renderer
            .render_tls_passthrough_hosts(&config)
            .map_err(|e| ConfiguratorError::TlsPassthroughHosts(e.to_string()))?;
        Ok(self.sink.write_tls_passthrough_hosts_config(&content))
    }

    fn remove_virtual_server(&mut self, key: &str) {
        let name = virtual_server_file_name_from_key(key);
        self.sink.delete_config(&name);
        self.virtual_servers.remove(&name);
        if self.configuration.is_plus {
            self.sink.delete_key_val_state_files(&name);
        }
        if self.configuration.http_metrics_enabled() {
            let removed = self.metric_labels.virtual_servers.remove(key);
            report_removed_labels(&mut *self.http_labels, &removed, self.configuration.is_plus);
        }
        info!("VirtualServer {key} deleted");
    }

    fn remove_transport_server(&mut self, key: &str) -> Result<(), ConfiguratorError> {
        let name = transport_server_file_name_from_key(key);
        self.sink.delete_stream_config(&name);
        self.transport_servers.remove(&name);
        if self.configuration.stream_metrics_enabled() {
            let removed = self.metric_labels.transport_servers.remove(key);
            report_removed_labels(&mut *self.stream_labels, &removed, true);
        }
        if self.tls_passthrough_pairs.remove(key).is_some() {
            self.write_tls_passthrough_hosts_config()?;
        }
        info!("TransportServer {key} deleted");
        Ok(())
    }

    fn update_ingress_labels(&mut self, ing_ex: &IngressEx, config: &IngressNginxConfig) {
        if !self.configuration.http_metrics_enabled() {
            return;
        }
        let hosts: Vec<String> = config.servers.iter().map(|server| server.name.clone()).collect();
        let labels = ResourceLabels::for_ingress(&config.upstreams, &ing_ex.pods_by_ip, &hosts, &ing_ex.name(), &ing_ex.namespace());
        let removed = self.metric_labels.ingresses.update(&namespaced_key(&ing_ex.namespace(), &ing_ex.name()), &labels);
        report_labels(&mut *self.http_labels, &labels, &removed, self.configuration.is_plus);
    }

    fn push_ingress_endpoints(&mut self, ing_ex: &IngressEx) -> crate::Result<()> {
        let params = parse_annotations(ing_ex, &self.params, true);
        let options = ServerOptions {
            max_fails: params.max_fails,
            max_conns: params.max_conns,
            fail_timeout: params.fail_timeout,
            slow_start: params.slow_start,
        };
        for (upstream, servers) in ingress_upstream_endpoints_for_plus(ing_ex) {
            self.push_dynamic_upstream(&upstream, &servers, &options)?;
        }
        Ok(())
    }

    fn push_mergeable_ingress_endpoints(&mut self, mergeable: &MergeableIngresses) -> crate::Result<()> {
        for minion in &mergeable.minions {
            self.push_ingress_endpoints(minion)?;
        }
        Ok(())
    }

    fn push_virtual_server_endpoints(&mut self, vs_ex: &VirtualServerEx) -> crate::Result<()> {
        for upstream in create_upstreams_for_plus(vs_ex, &self.params) {
            let options = ServerOptions {
                max_fails: upstream.max_fails,
                max_conns: upstream.max_conns,
                fail_timeout: upstream.fail_timeout.clone(),
                slow_start: upstream.slow_start.clone(),
            };
            let servers: Vec<String> = upstream.servers.iter().map(|server| server.address.clone()).collect();
            self.push_dynamic_upstream(&upstream.name, &servers, &options)?;
        }
        Ok(())
    }

    fn push_transport_server_endpoints(&mut self, ts_ex: &TransportServerEx) -> crate::Result<()> {
        let namespace = ts_ex.namespace();
        let namer = UpstreamNamer::for_transport_server(&ts_ex.transport_server);
        for upstream in &ts_ex.transport_server.spec.upstreams {
            let endpoints_key = generate_endpoints_key(&namespace, &upstream.service, &BTreeMap::new(), upstream.port);
            let servers = ts_ex.endpoints.get(&endpoints_key).cloned().unwrap_or_default();
            self.push_dynamic_stream_upstream(&namer.upstream_name(&upstream.name), &servers)?;
        }
        Ok(())
    }
}

fn report_labels(updater: &mut dyn LabelUpdater, labels: &ResourceLabels, removed: &RemovedLabels, with_zones: bool) {
    updater.update_upstream_labels(&labels.upstreams);
    updater.update_peer_labels(&labels.peers);
    if with_zones {
        updater.update_zone_labels(&labels.zones);
    }
    report_removed_labels(updater, removed, with_zones);
}

fn report_removed_labels(updater: &mut dyn LabelUpdater, removed: &RemovedLabels, with_zones: bool) {
    if !removed.upstreams.is_empty() {
        updater.delete_upstream_labels(&removed.upstreams);
    }
    if !removed.peers.is_empty() {
        updater.delete_peer_labels(&removed.peers);
    }
    if with_zones && !removed.zones.is_empty() {
        updater.delete_zone_labels(&removed.zones);
    }
}

fn secret_file_name(secret: &Secret) -> String {
    format!("{}-{}", namespace_of(secret), secret.name_any())
}

fn secret_data(secret: &Secret, key: &str) -> Vec<u8> {
    secret.data.as_ref().and_then(|data| data.get(key)).map(|bytes| bytes.0.clone()).unwrap_or_default()
}

fn cert_and_key(secret: &Secret) -> Vec<u8> {
    let mut content = secret_data(secret, TLS_CERT_KEY);
    content.push(b'\n');
    content.extend(secret_data(secret, TLS_KEY_KEY));
    content
}
