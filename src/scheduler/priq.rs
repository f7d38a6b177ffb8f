use super::{Dispatch, Pick, PolicyKind, SchedulingPolicy, first_max_by_key};
use crate::core::{Priority, Process, TaskId, TaskState};

/// Preemptive priority scheduling, highest value first. With `aging` set,
/// every READY task passed over by a decision gains `aging` current
/// priority, and a task put on the CPU falls back to its initial priority.
/// Aged priority is kept only while waiting; a task that wins the CPU
/// competes again from its own priority.
#[derive(Debug)]
pub struct PriorityPolicy {
    aging: Option<Priority>,
}

impl PriorityPolicy {
    pub fn new(aging: Option<Priority>) -> Self {
        Self { aging }
    }
}

impl SchedulingPolicy for PriorityPolicy {
    fn kind(&self) -> PolicyKind {
        match self.aging {
            Some(_) => PolicyKind::PriorityPreemptiveAging,
            None => PolicyKind::PriorityPreemptive,
        }
    }

    fn pick(&mut self, pick: &Pick<'_>) -> Option<TaskId> {
        let aging = self.aging.is_some();
        first_max_by_key(pick.contenders(), |task| {
            if aging {
                task.current_priority
            } else {
                task.initial_priority
            }
        })
        .map(|task| task.id)
    }

    fn dispatched(&mut self, process: &mut Process, scheduled: TaskId, how: Dispatch) {
        let Some(step) = self.aging else {
            return;
        };

        let preempted = match how {
            Dispatch::Kept => None,
            Dispatch::Switched { preempted } => {
                let task = process.task_mut(scheduled);
                task.current_priority = task.initial_priority;
                preempted
            }
        };

        for id in 0..process.len() {
            if id == scheduled || Some(id) == preempted {
                continue;
            }
            let task = process.task_mut(id);
            if task.state == TaskState::Ready {
                task.current_priority = task.current_priority.saturating_add(step);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Compat, Mutex};
    use crate::scheduler::Scheduler;

    fn process() -> Process {
        let mut process = Process::new();
        process.add_task("H", "red", 0, 10, 5, Vec::new()).unwrap();
        process.add_task("L", "blue", 0, 2, 1, Vec::new()).unwrap();
        process
    }

    fn tick(process: &mut Process, mutex: &mut Mutex, scheduler: &mut Scheduler, now: u64) {
        process.update_all(now, mutex, &Compat::default());
        scheduler.execute(process, mutex);
    }

    #[test]
    fn without_aging_low_priority_waits_for_completion() {
        let mut process = process();
        let mut mutex = Mutex::new();
        let mut scheduler = Scheduler::with_policy(Box::new(PriorityPolicy::new(None)), 0);

        for now in 0..10 {
            tick(&mut process, &mut mutex, &mut scheduler, now);
            assert_eq!(process.running(), Some(0));
        }
        tick(&mut process, &mut mutex, &mut scheduler, 10);
        assert_eq!(process.task(0).state, TaskState::Terminated);
        assert_eq!(process.running(), Some(1));
        assert_eq!(process.task(1).current_priority, 1);
    }

    #[test]
    fn aging_lifts_starved_task_past_running_one() {
        let mut process = process();
        let mut mutex = Mutex::new();
        let mut scheduler = Scheduler::with_policy(Box::new(PriorityPolicy::new(Some(2))), 0);

        // L: 1 -> 3 -> 5 -> 7, overtaking H (5) on the fourth decision
        let mut seen = Vec::new();
        for now in 0..3 {
            tick(&mut process, &mut mutex, &mut scheduler, now);
            assert_eq!(process.running(), Some(0));
            seen.push(process.task(1).current_priority);
        }
        assert_eq!(seen, vec![3, 5, 7]);

        tick(&mut process, &mut mutex, &mut scheduler, 3);
        assert_eq!(process.running(), Some(1));
        assert_eq!(process.task(1).current_priority, 1);
        assert_eq!(process.task(0).state, TaskState::Suspended);
    }
}
