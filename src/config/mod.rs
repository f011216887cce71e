//! INI settings: base file, local override, typed section views.

pub mod types;
pub mod loader;

pub use types::*;
pub use loader::*;
