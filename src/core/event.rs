use crate::core::{TaskId, TaskState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedCoreEvent {
    TaskStateChange {
        task: TaskId,
        from: TaskState,
        to: TaskState,
    },
    RunningChange {
        from: Option<TaskId>,
        to: Option<TaskId>,
    },
    // CPU idle even after the scheduling decision
    CpuIdle,
}
