//! Upstream-facing services.
//!
//! This layer owns everything that talks to the upstream chat API:
//! request signing, the shared HTTP client, and the cached model/user
//! metadata the normalizer consults.

pub mod catalog;
pub mod signature;
pub mod upstream;
pub mod user;

// Re-export commonly used types
pub use catalog::{CatalogModel, ModelCatalog};
pub use signature::{generate_signature, window_signature, SignatureResult};
pub use upstream::UpstreamClient;
pub use user::{Clock, SystemClock, UserInfo, UserService};
