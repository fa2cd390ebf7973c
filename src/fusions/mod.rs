//! Built-in pass collections
//!
//! Each submodule registers the passes of one backend.
//!
//! # Example
//!
//! ```
//! use graph_fusion::fusions::{register_fake_backend_passes, FAKE_BACKEND};
//! use graph_fusion::pass::PassRegistry;
//!
//! let mut registry = PassRegistry::new();
//! register_fake_backend_passes(&mut registry).unwrap();
//! assert_eq!(registry.get_passes_for(FAKE_BACKEND)[0].name(), "conv_bias_act");
//! ```

/// Passes of the `fake` test backend
pub mod fake;

// Re-export registration entry points
pub use fake::{register_fake_backend_passes, FAKE_BACKEND};
