//! Context-conditioned module mounting
//!
//! This module provides access to facet-mount.
//!
//! ## Architecture
//!
//! - **Registry**: module paths, options and aliases
//! - **Monitors**: live boolean conditions combined per element
//! - **Bound modules**: the per-element mount lifecycle
//! - **Conditioner**: discovers elements and binds modules to them

// Re-export all facet-mount functionality
pub use facet_mount::*;
