use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use clap::Parser;
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use nginx_config_core::{
    resources::{namespace_of, Endpoints, IngressEx, Policy, TransportServer, TransportServerEx, VirtualServer, VirtualServerEx, VirtualServerRoute},
    state::{ConfigSink, ConfigurationResources, ConfiguratorCommand, ReloadReason, ServerOptions},
    ConfigParams, Configuration, Configurator, ConfiguratorService, TeraRenderer, Warnings,
};
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Compiles a bundle of Ingress, VirtualServer and TransportServer resources into NGINX configuration")]
struct Args {
    /// YAML bundle with the resources, their endpoints and the configuration.
    #[arg(short, long)]
    bundle: PathBuf,
    /// Directory the configuration files are written to. Printed to stdout when omitted.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    plus: bool,
}

/// Listener ports of TransportServers are looked up by listener name.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct Bundle {
    configuration: Option<Configuration>,
    config_params: Option<ConfigParams>,
    endpoints: Endpoints,
    listeners: BTreeMap<String, i32>,
    ingresses: Vec<Ingress>,
    virtual_servers: Vec<VirtualServer>,
    virtual_server_routes: Vec<VirtualServerRoute>,
    transport_servers: Vec<TransportServer>,
    policies: Vec<Policy>,
}

impl Bundle {
    fn into_resources(self) -> ConfigurationResources {
        let policies: BTreeMap<String, Policy> = self.policies.into_iter().map(|p| (format!("{}/{}", namespace_of(&p), p.name_any()), p)).collect();
        let endpoints = self.endpoints;

        let ingresses = self
            .ingresses
            .into_iter()
            .map(|ingress| IngressEx {
                endpoints: endpoints.clone(),
                ..IngressEx::new(ingress)
            })
            .collect();

        let virtual_servers = self
            .virtual_servers
            .into_iter()
            .map(|virtual_server| {
                let namespace = namespace_of(&virtual_server);
                let routes = virtual_server
                    .spec
                    .routes
                    .iter()
                    .filter(|route| !route.route.is_empty())
                    .filter_map(|route| {
                        let route_key = if route.route.contains('/') { route.route.clone() } else { format!("{namespace}/{}", route.route) };
                        self.virtual_server_routes.iter().find(|vsr| format!("{}/{}", namespace_of(*vsr), vsr.name_any()) == route_key).cloned()
                    })
                    .collect();
                VirtualServerEx {
                    endpoints: endpoints.clone(),
                    virtual_server_routes: routes,
                    policies: policies.clone(),
                    ..VirtualServerEx::new(virtual_server)
                }
            })
            .collect();

        let transport_servers = self
            .transport_servers
            .into_iter()
            .map(|transport_server| {
                let port = self.listeners.get(&transport_server.spec.listener.name).copied().unwrap_or_default();
                let mut ts_ex = TransportServerEx::new(transport_server, port);
                ts_ex.endpoints = endpoints.clone();
                ts_ex
            })
            .collect();

        ConfigurationResources {
            ingresses,
            mergeable_ingresses: vec![],
            virtual_servers,
            transport_servers,
        }
    }
}

/// Writes every configuration file either into a directory or to stdout. Reloads and API calls are only logged.
struct OutputSink {
    output_dir: Option<PathBuf>,
}

impl OutputSink {
    fn write(&self, dir: &str, name: &str, content: &[u8]) -> bool {
        let result = match &self.output_dir {
            Some(output_dir) => write_file(&output_dir.join(dir), &format!("{name}.conf"), content),
            None => {
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "# {dir}/{name}.conf").and_then(|()| stdout.write_all(content))
            },
        };
        if let Err(e) = result {
            warn!("{dir}/{name} can't be written {e}");
        }
        true
    }
}

fn write_file(dir: &Path, name: &str, content: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(name), content)
}

impl ConfigSink for OutputSink {
    fn write_config(&mut self, name: &str, content: &[u8]) -> bool {
        self.write("conf.d", name, content)
    }

    fn delete_config(&mut self, name: &str) {
        info!("{name} deleted");
    }

    fn write_stream_config(&mut self, name: &str, content: &[u8]) -> bool {
        self.write("stream-conf.d", name, content)
    }

    fn delete_stream_config(&mut self, name: &str) {
        info!("{name} deleted");
    }

    fn write_tls_passthrough_hosts_config(&mut self, content: &[u8]) -> bool {
        self.write("stream-conf.d", "tls-passthrough-hosts", content)
    }

    fn delete_key_val_state_files(&mut self, _: &str) {}

    fn create_secret_file(&mut self, name: &str, _: &[u8], _: u32) -> String {
        self.secret_file_name(name)
    }

    fn delete_secret_file(&mut self, _: &str) {}

    fn secret_file_name(&self, name: &str) -> String {
        format!("/etc/nginx/secrets/{name}")
    }

    fn reload(&mut self, reason: ReloadReason) -> nginx_config_core::Result<()> {
        info!("NGINX reload skipped ({reason})");
        Ok(())
    }

    fn upsert_key_value(&mut self, zone: &str, key: &str, value: &str) {
        info!("{zone} keyval {key}={value}");
    }

    fn push_dynamic_upstream(&mut self, upstream: &str, servers: &[String], _: &ServerOptions) -> nginx_config_core::Result<()> {
        info!("{upstream} servers {servers:?}");
        Ok(())
    }

    fn push_dynamic_stream_upstream(&mut self, upstream: &str, servers: &[String]) -> nginx_config_core::Result<()> {
        info!("{upstream} servers {servers:?}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> nginx_config_core::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let bundle: Bundle = serde_yaml::from_str(&fs::read_to_string(&args.bundle)?)?;
    let mut configuration = bundle.configuration.clone().unwrap_or_default();
    configuration.is_plus |= args.plus;
    configuration.validate()?;
    let params = bundle.config_params.clone().unwrap_or_else(|| ConfigParams::new_default(configuration.is_plus));
    params.validate()?;

    let configurator = Configurator::builder()
        .params(params)
        .configuration(configuration)
        .sink(Box::new(OutputSink { output_dir: args.output_dir }))
        .renderer(Box::new(TeraRenderer))
        .build();
    let (command_sender, service) = ConfiguratorService::new(configurator);
    let service_task = tokio::spawn(service.start());

    let (response, receiver) = oneshot::channel();
    command_sender
        .send(ConfiguratorCommand::AddOrUpdateResources {
            resources: Box::new(bundle.into_resources()),
            reload_if_unchanged: false,
            response,
        })
        .await?;
    let outcome = receiver.await?;
    let warnings = match &outcome {
        Ok(warnings) => warnings,
        Err(e) => &e.warnings,
    };
    log_warnings(warnings);

    drop(command_sender);
    service_task.await??;
    outcome.map(|_| ()).map_err(Into::into)
}

fn log_warnings(warnings: &Warnings) {
    for (key, messages) in warnings.iter() {
        for message in messages {
            warn!("{key} {message}");
        }
    }
}
