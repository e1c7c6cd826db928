//! REST client for the reagent dispense backend
//!
//! - [`DispenseApi`], [`PlateApi`], [`ReagentApi`]: one trait per resource
//! - [`HttpBackend`]: reqwest implementation of all three
//! - [`MockBackend`]: in-memory backend with failure injection, for tests

pub mod api;
pub mod error;
pub mod http;
pub mod mock;

pub use api::*;
pub use error::*;
pub use http::*;
pub use mock::*;
