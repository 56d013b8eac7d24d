//! Error types shared across crates

mod api_error;

pub use api_error::{ApiError, ApiErrorBody};
