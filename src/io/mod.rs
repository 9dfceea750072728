//! Remote-service boundary: credential bootstrap and the catalog client

pub mod auth;
pub mod catalog;

pub use auth::{bootstrap, Credentials};
pub use catalog::EarthEngineClient;
