//! Compilers turning a resource bundle into the output model. They are pure functions of their input:
//! no I/O and no shared state, so independent resources can be compiled in parallel.

mod annotations;
mod endpoints;
mod ingress;
mod locations;
mod mergeable;
pub mod naming;
mod policies;
mod routing;
mod transport_server;
mod upstreams;
mod virtual_server;


pub use annotations::{
    filter_master_annotations, filter_minion_annotations, merge_master_annotations_into_minion, parse_annotations, BASIC_AUTH_SECRET, JWT_KEY as JWT_KEY_ANNOTATION,
};
pub use ingress::{ingress_upstream_endpoints_for_plus, IngressCompiler, IngressCompileResult};
pub use mergeable::MergeableIngressCompiler;
pub use policies::PolicyError;
pub use transport_server::TransportServerCompiler;
pub use upstreams::create_upstreams_for_plus;
pub use virtual_server::VirtualServerCompiler;

use crate::{common::Warnings, nginx::version2::Oidc};

/// The OIDC policy a VirtualServer family settled on. Only one may exist across a VirtualServer and all its routes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OidcSlot {
    pub key: String,
    pub config: Oidc,
}

/// State threaded through the whole recursive walk of a VirtualServer and its VirtualServerRoutes.
/// Every counter is global to the compiled server so generated names never collide.
#[derive(Debug, Default)]
pub struct CompileContext {
    pub oidc: Option<OidcSlot>,
    pub error_page_index: usize,
    pub split_client_index: usize,
    pub return_location_index: usize,
    pub matches_index: usize,
    pub warnings: Warnings,
}

impl CompileContext {
    pub fn new() -> Self {
        Self::default()
    }
}
