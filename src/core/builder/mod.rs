pub mod topology;

pub use topology::{Topology, TopologyBuilder};
