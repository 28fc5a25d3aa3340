//! 工作流图：阶段、路由、检查点与执行引擎

pub mod builder;
pub mod checkpoint;
pub mod context;
pub mod engine;
pub mod node;
pub mod nodes;
pub mod outlet;
pub mod router;
pub mod types;
pub mod workflow;

pub use builder::{StateGraph, build_graph};
pub use context::WorkflowContext;
pub use engine::{CompiledGraph, Execution};
pub use types::{RunConfig, RunError, RunEvent, RunInput, RunOutcome, StageName};
