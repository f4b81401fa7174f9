//! Backend interface: wire types, the `DocumentApi` trait, the reqwest
//! implementation, and a scripted mock for tests.

pub mod client;
pub mod mock;
pub mod types;

pub use client::{ApiError, DocumentApi, HttpApi};
pub use mock::MockApi;
