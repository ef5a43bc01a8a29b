//! Common utilities and types shared across PKI UI components.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (segment splitting, header decoding, constants)
pub mod jwt;
