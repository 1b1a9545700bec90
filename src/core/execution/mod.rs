pub mod config;
pub mod logical_process;

// Re-export commonly used types
pub use config::{DispatchMode, SimulationConfig};
pub use logical_process::{EventContext, EventExecutor, LogicalProcess, RunSummary};
