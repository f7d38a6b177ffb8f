use super::{
    event::SchedCoreEvent,
    mutex::Mutex,
    observer::Observer,
    process::Process,
    state::{Compat, TaskState, Ticks},
};
use crate::scheduler::Scheduler;

pub struct SchedCore {
    pub process: Process,
    pub mutex: Mutex,
    pub scheduler: Scheduler,
    compat: Compat,
    observer: Observer,
    now: Ticks,
}

impl SchedCore {
    pub fn new(mut process: Process, scheduler: Scheduler, compat: Compat) -> Self {
        process.sort_by_arrival();
        Self {
            process,
            mutex: Mutex::new(),
            scheduler,
            compat,
            observer: Observer::new(),
            now: 0,
        }
    }

    /// Process tick `now`: advance every task, then make exactly one
    /// scheduling decision. Returns what changed during the tick.
    pub fn tick(&mut self) -> Vec<SchedCoreEvent> {
        let before: Vec<TaskState> = self.process.tasks().iter().map(|t| t.state).collect();
        let running_before = self.process.running();

        self.process
            .update_all(self.now, &mut self.mutex, &self.compat);
        self.scheduler.execute(&mut self.process, &self.mutex);
        self.observer.observe(self.now, &self.process, &self.mutex);

        let mut events: Vec<SchedCoreEvent> = self
            .process
            .tasks()
            .iter()
            .zip(before)
            .filter(|(task, from)| task.state != *from)
            .map(|(task, from)| SchedCoreEvent::TaskStateChange {
                task: task.id,
                from,
                to: task.state,
            })
            .collect();

        let running_after = self.process.running();
        if running_after != running_before {
            events.push(SchedCoreEvent::RunningChange {
                from: running_before,
                to: running_after,
            });
        }
        if running_after.is_none() && self.process.has_live_task() {
            events.push(SchedCoreEvent::CpuIdle);
        }

        self.now = self.now.saturating_add(1);
        events
    }

    pub fn now(&self) -> Ticks {
        self.now
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }
}
