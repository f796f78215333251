//! Widget assembly: loads a definition, runs its queries and functions, and
//! resolves every region through the post-processor registry.

mod builder;
mod config;
mod engine;
mod functions;

pub use builder::{BuildStage, WidgetBuilder};
pub use config::{load_engine_config, EngineConfig};
pub use engine::Engine;
pub use functions::{BranchAutomations, FunctionError, FunctionRegistry, OrgSummary, WidgetFunction};
