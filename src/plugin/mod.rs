pub mod loader;
pub mod manifest;
pub mod registry;

pub use loader::*;
pub use manifest::*;
pub use registry::*;
