pub mod client;
pub mod error;
pub mod types;

pub use client::{ProverClient, ProvingService};
pub use error::ProverError;
pub use types::{ApiKey, ProofTask, TaskStatus};
