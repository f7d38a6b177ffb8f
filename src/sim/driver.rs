use log::{debug, warn};
use serde::Serialize;

use super::workload::Workload;
use crate::{
    core::{Process, SchedCore, SchedCoreEvent, Ticks},
    scheduler::{PolicyKind, SchedError, Scheduler},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub id: String,
    pub arrival: Ticks,
    pub stop: Option<Ticks>,
    pub waiting_time: Ticks,
    pub longest_starvation: Ticks,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub policy: PolicyKind,
    pub ticks: Ticks,
    pub turnaround_time: f64,
    pub waiting_time: f64,
    pub longest_starvation: Ticks,
    pub tasks: Vec<TaskReport>,
}

pub struct Sim {
    pub core: SchedCore,
    max_ticks: Option<Ticks>,
}

impl Sim {
    pub fn new(workload: Workload) -> Result<Self, SchedError> {
        let mut process = Process::new();
        for task in workload.tasks {
            process.add_task(
                &task.id,
                &task.color,
                task.arrival,
                task.duration,
                task.priority,
                task.events,
            )?;
        }

        let scheduler = Scheduler::new(&workload.config);
        Ok(Self {
            core: SchedCore::new(process, scheduler, workload.compat),
            max_ticks: None,
        })
    }

    /// Give up with [`SchedError::TickLimitExceeded`] once this many ticks
    /// have passed with tasks still live.
    pub fn with_tick_limit(mut self, max_ticks: Ticks) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    pub fn step(&mut self) -> Vec<SchedCoreEvent> {
        self.core.tick()
    }

    pub fn all_tasks_completed(&self) -> bool {
        !self.core.process.has_live_task()
    }

    /// Tick until every task has terminated, then compute the report.
    pub fn run(&mut self) -> Result<Report, SchedError> {
        while !self.all_tasks_completed() {
            let now = self.core.now();
            if self.max_ticks.is_some_and(|limit| now >= limit) {
                warn!("giving up at t={now}, mutex held by {:?}", self.core.mutex.owner());
                return Err(SchedError::TickLimitExceeded(now));
            }

            for event in self.step() {
                debug!("t={} {:?}", now, event);
            }
        }

        self.report()
    }

    pub fn report(&mut self) -> Result<Report, SchedError> {
        let core = &mut self.core;
        let metrics = core.scheduler.update_metrics(&core.process)?;

        let tasks: Vec<TaskReport> = core
            .process
            .tasks()
            .iter()
            .map(|task| TaskReport {
                id: task.name.clone(),
                arrival: task.arrival,
                stop: task.stop,
                waiting_time: task.total_waiting_time,
                longest_starvation: task.longest_waiting_streak,
            })
            .collect();

        Ok(Report {
            policy: core.scheduler.kind(),
            ticks: core.now(),
            turnaround_time: metrics.turnaround_time,
            waiting_time: metrics.waiting_time,
            longest_starvation: tasks.iter().map(|t| t.longest_starvation).max().unwrap_or(0),
            tasks,
        })
    }
}
