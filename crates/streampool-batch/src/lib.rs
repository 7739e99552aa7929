//! streampool-batch — capability layer over a managed batch-compute service.
//!
//! The orchestration core never talks to a vendor SDK directly. Everything
//! it needs from the compute provider — pool CRUD, job/task submission,
//! node inspection — goes through the [`BatchProvider`] trait. Real
//! deployments implement the trait against their cloud SDK; tests and the
//! daemon's standalone mode use the bundled [`InMemoryBatch`].

pub mod error;
pub mod provider;
pub mod sim;
pub mod types;

pub use error::{ProviderError, ProviderResult};
pub use provider::BatchProvider;
pub use sim::InMemoryBatch;
pub use types::*;
