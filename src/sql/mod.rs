//! Parameter marshalling for named-argument SQL function calls.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
