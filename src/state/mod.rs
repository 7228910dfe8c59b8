mod collaborators;
mod configurator;
mod metric_labels;
mod service;


pub use collaborators::{
    ConfigSink, LabelUpdater, NoopLabelUpdater, ReloadReason, ServerOptions, TemplateRenderer, HTPASSWD_SECRET_FILE_MODE, JWK_SECRET_FILE_MODE, TLS_SECRET_FILE_MODE,
};
pub use configurator::{ApplyError, ConfigurationResources, Configurator, ConfiguratorError, IngressCounts, WeightUpdate};
pub use metric_labels::{find_removed_keys, LabelIndex, LabelSets, MetricLabelsIndex, RemovedLabels, ResourceLabels};
pub use service::{ConfiguratorCommand, ConfiguratorService, Responder};
