pub mod backends;
pub mod common;
pub mod compilers;
pub mod config;
pub mod nginx;
pub mod resources;
pub mod state;

use serde::Deserialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

pub use backends::TeraRenderer;
pub use common::{ResourceKey, Warnings};
pub use config::ConfigParams;
pub use state::{Configurator, ConfiguratorService};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

/// Controller-wide parameters fixed at start-up. Everything that may change at runtime lives in [`ConfigParams`].
#[derive(Clone, Debug, Default, TypedBuilder, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    #[builder(default)]
    pub is_plus: bool,
    #[builder(default)]
    pub is_wildcard_enabled: bool,
    #[builder(default)]
    pub is_prometheus_enabled: bool,
    #[builder(default)]
    pub is_latency_metrics_enabled: bool,
    #[builder(default)]
    pub enable_snippets: bool,
    #[builder(default)]
    pub enable_internal_routes: bool,
    #[builder(default)]
    pub tls_passthrough: bool,
    #[builder(default)]
    pub dynamic_weight_change_reload: bool,
}

#[derive(Error, Debug)]
enum ConfigurationError {
    #[error("dynamic weight changes require NGINX Plus")]
    DynamicWeightChangesWithoutPlus,
    #[error("latency metrics require prometheus metrics to be enabled")]
    LatencyMetricsWithoutPrometheus,
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        if self.dynamic_weight_change_reload && !self.is_plus {
            return Err(ConfigurationError::DynamicWeightChangesWithoutPlus.into());
        }
        if self.is_latency_metrics_enabled && !self.is_prometheus_enabled {
            return Err(ConfigurationError::LatencyMetricsWithoutPrometheus.into());
        }
        Ok(())
    }

    /// Whether HTTP upstream label sets have to be reported to a metrics sink.
    pub fn http_metrics_enabled(&self) -> bool {
        (self.is_plus && self.is_prometheus_enabled) || self.is_latency_metrics_enabled
    }

    pub fn stream_metrics_enabled(&self) -> bool {
        self.is_plus && self.is_prometheus_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_configuration_validation() {
        let configuration = Configuration::builder().dynamic_weight_change_reload(true).build();
        assert!(configuration.validate().is_err());

        let configuration = Configuration::builder().is_plus(true).dynamic_weight_change_reload(true).build();
        assert!(configuration.validate().is_ok());

        let configuration = Configuration::builder().is_latency_metrics_enabled(true).build();
        assert!(configuration.validate().is_err());
    }

    #[test]
    pub fn test_configuration_from_yaml() {
        let c = r"
is-plus: true
is-prometheus-enabled: true
enable-snippets: true
";
        let configuration: Configuration = serde_yaml::from_str(c).unwrap();
        assert!(configuration.is_plus);
        assert!(configuration.enable_snippets);
        assert!(!configuration.tls_passthrough);
        assert!(configuration.http_metrics_enabled());
        assert!(configuration.stream_metrics_enabled());
    }
}
