pub mod activity;
pub mod activity_manager;
pub mod conflict_zone;
pub mod work_group;
pub mod work_item;

// Re-export commonly used types
pub use activity::Activity;
pub use activity_manager::{ActivityManager, Admission, Release};
pub use conflict_zone::{ConflictZones, ZoneLock};
pub use work_group::{DurationFn, WorkGroup};
pub use work_item::{WorkItem, WorkItemPhase};
