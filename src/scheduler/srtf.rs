use super::{Pick, PolicyKind, SchedulingPolicy};
use crate::core::TaskId;

/// Preemptive shortest-remaining-time-first. Ties go to the task that
/// comes first in the task set.
#[derive(Debug, Default)]
pub struct SrtfPolicy;

impl SchedulingPolicy for SrtfPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Srtf
    }

    fn pick(&mut self, pick: &Pick<'_>) -> Option<TaskId> {
        pick.contenders()
            .into_iter()
            .min_by_key(|task| task.remaining_service())
            .map(|task| task.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Compat, Mutex, Process, TaskState};
    use crate::scheduler::Scheduler;

    #[test]
    fn shorter_arrival_preempts_and_previous_is_suspended() {
        let mut process = Process::new();
        process.add_task("A", "red", 0, 5, 1, Vec::new()).unwrap();
        process.add_task("B", "blue", 2, 2, 1, Vec::new()).unwrap();
        let mut mutex = Mutex::new();
        let mut scheduler = Scheduler::with_policy(Box::new(SrtfPolicy), 0);

        for now in 0..3 {
            process.update_all(now, &mut mutex, &Compat::default());
            scheduler.execute(&mut process, &mutex);
        }
        assert_eq!(process.running(), Some(1));
        assert_eq!(process.task(0).state, TaskState::Suspended);

        process.update_all(3, &mut mutex, &Compat::default());
        assert_eq!(process.task(0).state, TaskState::Ready);
        scheduler.execute(&mut process, &mutex);
        assert_eq!(process.running(), Some(1));
    }

    #[test]
    fn equal_remaining_goes_to_first_in_task_set() {
        let mut process = Process::new();
        process.add_task("A", "red", 0, 3, 1, Vec::new()).unwrap();
        process.add_task("B", "blue", 0, 3, 1, Vec::new()).unwrap();
        let mut mutex = Mutex::new();
        let mut scheduler = Scheduler::with_policy(Box::new(SrtfPolicy), 0);

        process.update_all(0, &mut mutex, &Compat::default());
        scheduler.execute(&mut process, &mutex);
        assert_eq!(process.running(), Some(0));
    }
}
