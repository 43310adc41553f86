//! Model adapters.

pub mod errors;
pub mod openai_compatible;
pub mod scripted;

pub use errors::LlmError;
pub use openai_compatible::{normalize_response, OpenAiCompatibleModel};
pub use scripted::{ScriptHook, ScriptedModel, ScriptedReply};
