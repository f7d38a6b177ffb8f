pub mod driver;
pub mod workload;

pub use driver::{Report, Sim, TaskReport};
pub use workload::{Synthetic, TaskSpec, Workload, WorkloadError, bernoulli_tasks};
