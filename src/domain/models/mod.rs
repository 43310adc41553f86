pub mod code_tree;
pub mod config;
pub mod imports;
pub mod message;
pub mod research;
pub mod structured;
pub mod tool_input;

pub use code_tree::{language_for_path, CodeFile, CodeTree};
pub use config::{AnalysisConfig, Config, LlmConfig, LoggingConfig, QualityPolicy, ResearchConfig};
pub use message::{
    ChatMessage, ModelRequest, ModelResponse, Role, TokenUsage, ToolCall, ToolSpec,
};
pub use research::{
    Acceptance, ArchitectureFinding, CriticalFlow, ReferenceStats, ResearchResult, ResearchStep,
    RiskItem, Stage,
};
pub use structured::{parse_structured_final, FinalStatus, StructuredFinal, StructuredParseError};
pub use tool_input::{
    FilePathArgs, FileSetArgs, ReadRangeArgs, RootArgs, TargetPathArgs, ToolInput, ToolInputError,
    ToolName,
};
