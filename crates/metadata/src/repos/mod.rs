//! Repository traits for metadata operations.

pub mod envelopes;
pub mod ingest;
pub mod predicates;
pub mod statements;

pub use envelopes::{EnvelopeRepo, StoredEnvelope};
pub use ingest::IngestRepo;
pub use predicates::PredicateRepo;
pub use statements::StatementRepo;
