//! Host capability abstractions
//!
//! The core never touches hardware directly. Everything it needs from the
//! host (GPIO lines, pin control, regulators, interrupt delivery, wake
//! assertions and attribute exposure) is expressed as a provider trait here,
//! and a backend bundles its implementations into a [`Platform`].

mod traits;

pub use traits::*;
