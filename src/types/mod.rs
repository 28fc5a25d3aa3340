pub mod message;
pub mod plan;
pub mod state;

pub use message::{ChatMessage, Role, ToolInvocation};
pub use plan::{CurrentPlan, Plan, Step, StepType};
pub use state::{Resource, RunState, StateUpdate, StepCompletion};
