#[macro_use]
pub mod macros;

pub mod core;

// Re-export commonly used types
pub use crate::core::admission::{Admission, DurationFn, WorkItem, WorkItemPhase};
pub use crate::core::builder::topology::{Topology, TopologyBuilder};
pub use crate::core::errors::{KernelError, LpSnapshot};
pub use crate::core::event::{Completion, Event, EventKind};
pub use crate::core::execution::config::{DispatchMode, SimulationConfig};
pub use crate::core::execution::logical_process::{EventContext, RunSummary};
pub use crate::core::model::Model;
pub use crate::core::resources::RoleWindow;
pub use crate::core::simulation_engine::{FlowListener, NoopListener, Simulation};
pub use crate::core::types::{
    ActivityId, ElementId, ManagerId, ResourceId, ResourceTypeId, SimTime, WorkGroupId,
    WorkItemId,
};
