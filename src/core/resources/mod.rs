pub mod entry;
pub mod resource;
pub mod resource_type;

// Re-export commonly used types
pub use entry::{BookOutcome, Booking, MultiRoleEntry};
pub use resource::{Resource, RoleWindow};
pub use resource_type::{Availability, Caught, ResourceType};
