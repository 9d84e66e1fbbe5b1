//! HTTP request handlers.

pub mod attestations;
pub mod export;
pub mod graphql;
pub mod health;

pub use attestations::*;
pub use export::*;
pub use graphql::*;
pub use health::*;
