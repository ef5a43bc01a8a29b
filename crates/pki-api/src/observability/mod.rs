//! Observability for the PKI API.
//!
//! Provides metrics definitions and recording helpers.

pub mod metrics;
