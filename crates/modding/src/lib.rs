//! Mod discovery, the mod registry and the script backends.

pub mod api;
pub mod loader;
pub mod registry;
pub mod runtime;

pub use api::*;
pub use loader::*;
pub use registry::*;
pub use runtime::*;
