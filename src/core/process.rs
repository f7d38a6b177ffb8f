use rustc_hash::FxHashMap;

use super::{
    mutex::Mutex,
    state::{Compat, Priority, TaskEvent, TaskId, TaskState, Tcb, Ticks},
};
use crate::scheduler::SchedError;

/// The simulated task set: every TCB plus the one currently holding the CPU.
#[derive(Debug, Default)]
pub struct Process {
    tasks: Vec<Tcb>,
    running: Option<TaskId>,
    by_name: FxHashMap<String, TaskId>,
}

impl Process {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(
        &mut self,
        name: &str,
        color: &str,
        arrival: Ticks,
        required_service: Ticks,
        priority: Priority,
        events: Vec<TaskEvent>,
    ) -> Result<TaskId, SchedError> {
        if self.by_name.contains_key(name) {
            return Err(SchedError::DuplicateTask(name.to_string()));
        }

        let id = self.tasks.len();
        self.tasks.push(Tcb::new(
            id,
            name,
            color,
            arrival,
            required_service,
            priority,
            events,
        ));
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Stable sort by arrival; ids are reassigned to match the new order.
    pub fn sort_by_arrival(&mut self) {
        debug_assert!(self.running.is_none(), "Task set reordered mid-run");
        self.tasks.sort_by_key(|task| task.arrival);
        self.by_name.clear();
        for (id, task) in self.tasks.iter_mut().enumerate() {
            task.id = id;
            self.by_name.insert(task.name.clone(), id);
        }
    }

    pub fn tasks(&self) -> &[Tcb] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> &Tcb {
        &self.tasks[id]
    }

    pub fn task_mut(&mut self, id: TaskId) -> &mut Tcb {
        &mut self.tasks[id]
    }

    pub fn lookup(&self, name: &str) -> Option<&Tcb> {
        self.by_name.get(name).map(|&id| &self.tasks[id])
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn running(&self) -> Option<TaskId> {
        self.running
    }

    pub fn has_live_task(&self) -> bool {
        self.tasks.iter().any(Tcb::is_live)
    }

    /// Advance every task by one tick, in task-set order. Mutex wake-ups
    /// land before later tasks are updated.
    pub fn update_all(&mut self, now: Ticks, mutex: &mut Mutex, compat: &Compat) {
        for id in 0..self.tasks.len() {
            let woken = self.tasks[id].update(now, mutex, compat);
            for task in woken {
                self.wake(task);
            }
        }

        if let Some(id) = self.running {
            if self.tasks[id].state != TaskState::Running {
                self.running = None;
            }
        }
    }

    pub fn wake(&mut self, id: TaskId) {
        let task = &mut self.tasks[id];
        if task.state == TaskState::Suspended {
            task.state = TaskState::Ready;
        }
    }

    // Only reached through scheduler::task_swap
    pub(crate) fn switch_to(&mut self, next: TaskId, preempted_state: TaskState) {
        if let Some(prev) = self.running {
            let prev = &mut self.tasks[prev];
            if prev.state == TaskState::Running {
                prev.state = preempted_state;
            }
        }

        self.tasks[next].state = TaskState::Running;
        self.running = Some(next);
    }
}
