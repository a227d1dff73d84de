pub mod executor;
pub mod graph;
pub mod hazard;

pub use executor::execute_command;
pub use graph::DependencyGraph;
pub use hazard::{Hazard, HazardSet};
