//! Vajra Common - Shared resource model and capability traits
//!
//! This crate provides the types, traits, and errors used across the
//! Vajra scan orchestrator.
//!
//! Key pieces:
//! - Resource model for assets, scans, asset scans, scan configs and estimations
//! - Typed filters and patch documents for the backend
//! - `Backend` and `Provider` capability traits
//! - Backend and provider error taxonomy

pub mod error;
pub mod query;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{BackendError, BackendResult, MergeError, ProviderError, ProviderResult};
pub use traits::{AssetDiscoverer, Backend, Provider};
pub use types::*;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
