//! Outbound HTTP to the line backend

mod client;

pub use client::{BackendClient, BackendError};
