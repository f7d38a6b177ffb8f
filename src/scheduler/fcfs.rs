use std::collections::VecDeque;

use super::{Dispatch, Pick, PolicyKind, SchedulingPolicy};
use crate::core::{Process, TaskId, TaskState};

/// Cooperative first-come-first-served. The running task keeps the CPU
/// until it stops running or its quantum runs out, after which it goes to
/// the back of the ready queue.
#[derive(Debug, Default)]
pub struct FcfsPolicy {
    ready: VecDeque<TaskId>,
}

impl FcfsPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    // Drop tasks that left READY, then queue new arrivals in task-set order
    fn sync(&mut self, process: &Process) {
        self.ready
            .retain(|&id| process.task(id).state == TaskState::Ready);
        for task in process.tasks() {
            if task.state == TaskState::Ready && !self.ready.contains(&task.id) {
                self.ready.push_back(task.id);
            }
        }
    }
}

impl SchedulingPolicy for FcfsPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Fcfs
    }

    fn pick(&mut self, pick: &Pick<'_>) -> Option<TaskId> {
        self.sync(pick.process);

        if pick.running.is_some() && !pick.quantum_expired {
            return pick.running;
        }

        let next = self
            .ready
            .iter()
            .position(|&id| pick.eligible(pick.process.task(id)));
        match next {
            Some(pos) => self.ready.remove(pos),
            None => pick.running,
        }
    }

    fn preempted_state(&self) -> TaskState {
        TaskState::Ready
    }

    fn dispatched(&mut self, process: &mut Process, _scheduled: TaskId, how: Dispatch) {
        if let Dispatch::Switched {
            preempted: Some(id),
        } = how
        {
            if process.task(id).state == TaskState::Ready && !self.ready.contains(&id) {
                self.ready.push_back(id);
            }
        }
    }
}
