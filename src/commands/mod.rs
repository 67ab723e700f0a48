//! CLI command implementations
//!
//! Commands only see `fpctl-platform` handles and the board file types from
//! `fpctl-core`; the provider traits stay behind the backend registry.

mod attach;
mod check;
mod list;

pub use attach::run_attach;
pub use check::run_check;
pub use list::{list_backends, list_variants};
