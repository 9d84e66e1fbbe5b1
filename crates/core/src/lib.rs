//! Core domain types and shared logic for the Archivista attestation store.
//!
//! This crate defines the data model used across all other crates:
//! - Content identifiers (gitoid-SHA256)
//! - DSSE envelopes and in-toto statements
//! - Sigstore bundles, their limits and their reconstruction
//! - Payload format routing
//! - RFC3161 timestamp token parsing
//! - Service configuration

pub mod bundle;
pub mod config;
pub mod dsse;
pub mod encoding;
pub mod error;
pub mod export;
pub mod format;
pub mod gitoid;
pub mod intoto;
pub mod rfc3161;

pub use bundle::{Bundle, BundleLimits};
pub use dsse::{Envelope, Signature, SignatureTimestamp};
pub use error::{Error, Result};
pub use format::{FormatRouter, Payload};
pub use gitoid::Gitoid;
pub use intoto::{Statement, Subject};
