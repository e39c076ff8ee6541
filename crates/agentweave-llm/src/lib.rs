mod client;
pub mod prompt;
pub mod synthesis;
mod types;

pub use client::{ChatBackend, LlmClient, LlmConfig, generate};
pub use prompt::{GENERIC_AGENT_INSTRUCTION, classifier_system_prompt, match_intent};
pub use synthesis::{SynthesisResult, synthesize_graph, synthesize_graph_with_backend};
pub use types::*;
