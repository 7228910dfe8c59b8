//! Output model handed to the template renderer. Every collection is ordered so that equal inputs serialize identically.

pub mod stream;
pub mod version1;
pub mod version2;

pub use stream::{TlsPassthroughHostsConfig, TransportServerConfig};
pub use version1::IngressNginxConfig;
pub use version2::VirtualServerConfig;
