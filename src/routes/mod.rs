//! Bundled runtime: serves registered actions over HTTP with axum.

mod http;
pub use http::{HttpAction, HttpService};
