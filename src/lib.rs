pub mod core;
pub mod scheduler;
pub mod sim;

pub use scheduler::{PolicyKind, SchedError, Scheduler, SchedulingPolicy};
pub use sim::{Report, Sim, TaskSpec, Workload};
