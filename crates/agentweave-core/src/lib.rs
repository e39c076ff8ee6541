pub mod agents;
pub mod context;
pub mod storage;
pub mod template;
mod log;
mod validation;
mod workflow;

pub use agents::{AgentDefinition, AgentRegistry, StaticAgentRegistry};
pub use context::{ContextPatch, ExecutionContext, UserProfile};
pub use log::*;
pub use validation::*;
pub use workflow::*;
