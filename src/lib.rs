pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod i18n;
pub mod llm;
pub mod logging;
pub mod prompts;
pub mod types;
pub mod utils;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use error::WorkflowError;
pub use graph::workflow::launch;
pub use graph::{CompiledGraph, RunConfig, RunInput, RunOutcome, WorkflowContext, build_graph};
