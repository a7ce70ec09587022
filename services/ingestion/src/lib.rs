//! Alert ingestion: HMAC-verified webhook intake, provider normalization,
//! fingerprinting, and idempotent persistence.

pub mod adapters;
pub mod fingerprint;
pub mod handler;
pub mod signature;
pub mod state;

pub use handler::ingest_webhook;
pub use state::{AppState, DedupeJob, DedupeQueueJob};
