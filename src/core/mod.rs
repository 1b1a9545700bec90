pub mod admission;
pub mod builder;
pub mod errors;
pub mod event;
pub mod event_scheduler;
pub mod execution;
pub mod model;
pub mod resources;
pub mod simulation_engine;
pub mod sync;
pub mod types;

#[cfg(test)]
mod tests;
