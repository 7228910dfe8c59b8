use k8s_openapi::api::core::v1::Secret;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, span, warn, Level};
use typed_builder::TypedBuilder;

use super::configurator::{ApplyError, ConfigurationResources, Configurator, ConfiguratorError, IngressCounts};
use crate::{
    common::Warnings,
    config::ConfigParams,
    resources::{IngressEx, MergeableIngresses, TransportServerEx, VirtualServerEx},
    Result,
};

pub type Responder<T> = oneshot::Sender<T>;
type Outcome<T> = std::result::Result<T, ConfiguratorError>;
type ApplyOutcome = std::result::Result<Warnings, ApplyError>;
/// Warnings of the resources that compiled, and the failures of the ones that did not.
type BatchOutcome = (Warnings, Vec<ConfiguratorError>);

const COMMAND_CHANNEL_SIZE: usize = 1024;

/// Requests served by the [`ConfiguratorService`]. Each carries the channel its answer is sent on.
#[derive(Debug)]
pub enum ConfiguratorCommand {
    AddOrUpdateIngress(Box<IngressEx>, Responder<ApplyOutcome>),
    AddOrUpdateMergeableIngress(Box<MergeableIngresses>, Responder<ApplyOutcome>),
    AddOrUpdateVirtualServer(Box<VirtualServerEx>, Responder<ApplyOutcome>),
    AddOrUpdateTransportServer(Box<TransportServerEx>, Responder<ApplyOutcome>),
    AddOrUpdateResources {
        resources: Box<ConfigurationResources>,
        reload_if_unchanged: bool,
        response: Responder<ApplyOutcome>,
    },
    UpdateConfig {
        params: Box<ConfigParams>,
        resources: Box<ConfigurationResources>,
        response: Responder<ApplyOutcome>,
    },
    UpdateVirtualServers {
        updated: Vec<VirtualServerEx>,
        deleted_keys: Vec<String>,
        response: Responder<BatchOutcome>,
    },
    UpdateTransportServers {
        updated: Vec<TransportServerEx>,
        deleted_keys: Vec<String>,
        response: Responder<BatchOutcome>,
    },
    DeleteIngress {
        key: String,
        skip_reload: bool,
        response: Responder<Outcome<()>>,
    },
    DeleteVirtualServer {
        key: String,
        skip_reload: bool,
        response: Responder<Outcome<()>>,
    },
    DeleteTransportServer(String, Responder<Outcome<()>>),
    UpdateEndpoints(Vec<IngressEx>, Responder<Outcome<()>>),
    UpdateEndpointsForMergeableIngress(Vec<MergeableIngresses>, Responder<Outcome<()>>),
    UpdateEndpointsForVirtualServers(Vec<VirtualServerEx>, Responder<Outcome<()>>),
    UpdateEndpointsForTransportServers(Vec<TransportServerEx>, Responder<Outcome<()>>),
    AddOrUpdateSecret(Box<Secret>, Responder<String>),
    DeleteSecret(String),
    UpsertSplitClientsKeyVal { zone: String, key: String, value: String },
    EnableReloads,
    DisableReloads,
    ReloadForBatchUpdates(bool, Responder<Outcome<()>>),
    IngressCounts(Responder<IngressCounts>),
    VirtualServerCounts(Responder<(usize, usize)>),
    TransportServerCounts(Responder<usize>),
}

/// Single writer of the [`Configurator`]. Every mutation arrives as a command on one channel, so callers on
/// different tasks never touch the store concurrently.
#[derive(TypedBuilder)]
pub struct ConfiguratorService {
    configurator: Configurator,
    command_receiver: mpsc::Receiver<ConfiguratorCommand>,
}

impl ConfiguratorService {
    pub fn new(configurator: Configurator) -> (mpsc::Sender<ConfiguratorCommand>, Self) {
        let (sender, receiver) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        (sender, Self::builder().configurator(configurator).command_receiver(receiver).build())
    }

    pub async fn start(self) -> Result<()> {
        let mut command_receiver = self.command_receiver;
        let mut configurator = self.configurator;
        loop {
            tokio::select! {
                Some(command) = command_receiver.recv() => {
                    handle_command(&mut configurator, command);
                },
                else => {
                    warn!("Configurator command channel is closed...exiting");
                    return Ok(());
                }
            }
        }
    }
}

fn handle_command(configurator: &mut Configurator, command: ConfiguratorCommand) {
    let span = span!(Level::INFO, "ConfiguratorService");
    let _entered = span.enter();
    match command {
        ConfiguratorCommand::AddOrUpdateIngress(ing_ex, response) => {
            let _ = response.send(configurator.add_or_update_ingress(&ing_ex));
        },
        ConfiguratorCommand::AddOrUpdateMergeableIngress(mergeable, response) => {
            let _ = response.send(configurator.add_or_update_mergeable_ingress(&mergeable));
        },
        ConfiguratorCommand::AddOrUpdateVirtualServer(vs_ex, response) => {
            let _ = response.send(configurator.add_or_update_virtual_server(&vs_ex));
        },
        ConfiguratorCommand::AddOrUpdateTransportServer(ts_ex, response) => {
            let _ = response.send(configurator.add_or_update_transport_server(&ts_ex));
        },
        ConfiguratorCommand::AddOrUpdateResources { resources, reload_if_unchanged, response } => {
            let _ = response.send(configurator.add_or_update_resources(&resources, reload_if_unchanged));
        },
        ConfiguratorCommand::UpdateConfig { params, resources, response } => {
            let _ = response.send(configurator.update_config(*params, &resources));
        },
        ConfiguratorCommand::UpdateVirtualServers { updated, deleted_keys, response } => {
            let _ = response.send(configurator.update_virtual_servers(&updated, &deleted_keys));
        },
        ConfiguratorCommand::UpdateTransportServers { updated, deleted_keys, response } => {
            let _ = response.send(configurator.update_transport_servers(&updated, &deleted_keys));
        },
        ConfiguratorCommand::DeleteIngress { key, skip_reload, response } => {
            let _ = response.send(configurator.delete_ingress(&key, skip_reload));
        },
        ConfiguratorCommand::DeleteVirtualServer { key, skip_reload, response } => {
            let _ = response.send(configurator.delete_virtual_server(&key, skip_reload));
        },
        ConfiguratorCommand::DeleteTransportServer(key, response) => {
            let _ = response.send(configurator.delete_transport_server(&key));
        },
        ConfiguratorCommand::UpdateEndpoints(ing_exes, response) => {
            let _ = response.send(configurator.update_endpoints(&ing_exes));
        },
        ConfiguratorCommand::UpdateEndpointsForMergeableIngress(mergeables, response) => {
            let _ = response.send(configurator.update_endpoints_for_mergeable_ingress(&mergeables));
        },
        ConfiguratorCommand::UpdateEndpointsForVirtualServers(vs_exes, response) => {
            let _ = response.send(configurator.update_endpoints_for_virtual_servers(&vs_exes));
        },
        ConfiguratorCommand::UpdateEndpointsForTransportServers(ts_exes, response) => {
            let _ = response.send(configurator.update_endpoints_for_transport_servers(&ts_exes));
        },
        ConfiguratorCommand::AddOrUpdateSecret(secret, response) => {
            let _ = response.send(configurator.add_or_update_secret(&secret));
        },
        ConfiguratorCommand::DeleteSecret(key) => configurator.delete_secret(&key),
        ConfiguratorCommand::UpsertSplitClientsKeyVal { zone, key, value } => configurator.upsert_split_clients_key_val(&zone, &key, &value),
        ConfiguratorCommand::EnableReloads => {
            debug!("reloads enabled");
            configurator.enable_reloads();
        },
        ConfiguratorCommand::DisableReloads => {
            debug!("reloads disabled");
            configurator.disable_reloads();
        },
        ConfiguratorCommand::ReloadForBatchUpdates(enabled, response) => {
            let _ = response.send(configurator.reload_for_batch_updates(enabled));
        },
        ConfiguratorCommand::IngressCounts(response) => {
            let _ = response.send(configurator.ingress_counts());
        },
        ConfiguratorCommand::VirtualServerCounts(response) => {
            let _ = response.send(configurator.virtual_server_counts());
        },
        ConfiguratorCommand::TransportServerCounts(response) => {
            let _ = response.send(configurator.transport_server_counts());
        },
    }
}
