//! Integration test utilities for the chat client
//!
//! This crate provides a mock platform (REST and gateway in one axum
//! server) and payload builders for end-to-end tests.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
