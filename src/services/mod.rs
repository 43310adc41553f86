//! Service layer: the research controllers and the orchestrator that drives them.

pub mod context_window;
pub mod discovery;
pub mod prompts;
pub mod quality_gate;
pub mod references;
pub mod research_orchestrator;
pub mod tool_catalog;
pub mod tool_executor;

pub use discovery::{DiscoverySession, GuardRejection};
pub use quality_gate::GateVerdict;
pub use references::{normalize_references, NormalizedReferences, Tier};
pub use research_orchestrator::{
    ProgressCallback, ProgressEvent, ResearchOrchestrator, ResearchRequest,
};
pub use tool_catalog::ToolCatalog;
pub use tool_executor::{CompressionPolicy, OutcomeStatus, ToolExecutor, ToolOutcome};
