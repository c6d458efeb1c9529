//! Pipeline orchestration
//!
//! A staged state machine drives one job through the fixed media pipeline:
//! progress accounting, per-stage cost checkpoints, fallback for degradable
//! stages, and cancellation checks at every stage boundary.

mod analysis_cache;
mod collaborators;
mod orchestrator;
mod stages;

pub use analysis_cache::AnalysisCache;
pub use collaborators::{ObjectStore, StageCollaborators, StubCollaborators};
pub use orchestrator::Orchestrator;
pub use stages::{pipeline_stages, StageDescriptor};
