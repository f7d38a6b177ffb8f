pub mod fcfs;
pub mod priq;
pub mod srtf;

use std::{fmt, str::FromStr};

use average::{Estimate, Mean};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::{
    Ticks,
    mutex::Mutex,
    process::Process,
    state::{Priority, TaskId, TaskState, Tcb},
};
pub use fcfs::FcfsPolicy;
pub use priq::PriorityPolicy;
pub use srtf::SrtfPolicy;

#[derive(Debug)]
pub enum SchedError {
    UnsupportedPolicy(String),
    DuplicateTask(String),
    EmptyTaskSet,
    UnfinishedTask(String),
    TickLimitExceeded(Ticks),
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedPolicy(name) => write!(f, "unsupported scheduling policy {name:?}"),
            Self::DuplicateTask(name) => write!(f, "task {name:?} declared twice"),
            Self::EmptyTaskSet => write!(f, "metrics requested for an empty task set"),
            Self::UnfinishedTask(name) => write!(f, "task {name:?} never terminated"),
            Self::TickLimitExceeded(ticks) => {
                write!(f, "tasks still live after {ticks} ticks (deadlock?)")
            }
        }
    }
}

impl std::error::Error for SchedError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PolicyKind {
    Fcfs,
    Srtf,
    PriorityPreemptive,
    PriorityPreemptiveAging,
}

impl PolicyKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Fcfs => "FCFS",
            Self::Srtf => "SRTF",
            Self::PriorityPreemptive => "PRIOP",
            Self::PriorityPreemptiveAging => "PRIOPEnv",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolicyKind {
    type Err = SchedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FCFS" => Ok(Self::Fcfs),
            "SRTF" => Ok(Self::Srtf),
            "PRIOP" => Ok(Self::PriorityPreemptive),
            "PRIOPENV" => Ok(Self::PriorityPreemptiveAging),
            _ => Err(SchedError::UnsupportedPolicy(s.to_string())),
        }
    }
}

impl TryFrom<String> for PolicyKind {
    type Error = SchedError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PolicyKind> for String {
    fn from(kind: PolicyKind) -> Self {
        kind.name().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub policy: PolicyKind,
    /// Ticks a task may hold the CPU before re-evaluation; 0 disables.
    #[serde(default)]
    pub quantum: Ticks,
    #[serde(default)]
    pub aging: Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub turnaround_time: f64,
    pub waiting_time: f64,
}

/// Snapshot handed to a policy when it has to pick a task for this tick.
pub struct Pick<'a> {
    pub process: &'a Process,
    pub mutex: &'a Mutex,
    pub running: Option<TaskId>,
    pub quantum_expired: bool,
}

impl Pick<'_> {
    /// Whether `task` may take the CPU this tick.
    pub fn eligible(&self, task: &Tcb) -> bool {
        match task.state {
            TaskState::Running => true,
            TaskState::Ready => admits(self.process, self.mutex, task.id),
            _ => false,
        }
    }

    /// Eligible tasks in task-set order. After quantum expiry the running
    /// task is left out unless nobody else is eligible.
    pub fn contenders(&self) -> Vec<&Tcb> {
        let mut tasks: Vec<&Tcb> = self
            .process
            .tasks()
            .iter()
            .filter(|task| self.eligible(task))
            .collect();
        if self.quantum_expired && tasks.len() > 1 {
            tasks.retain(|task| Some(task.id) != self.running);
        }
        tasks
    }
}

pub trait SchedulingPolicy {
    fn kind(&self) -> PolicyKind;

    /// Task that should hold the CPU for this tick, possibly the one
    /// already running.
    fn pick(&mut self, pick: &Pick<'_>) -> Option<TaskId>;

    /// State a task is moved to when it loses the CPU to another one.
    fn preempted_state(&self) -> TaskState {
        TaskState::Suspended
    }

    /// Called after every decision that leaves `scheduled` on the CPU.
    fn dispatched(&mut self, _process: &mut Process, _scheduled: TaskId, _how: Dispatch) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The running task keeps the CPU.
    Kept,
    /// `scheduled` was just put on the CPU, taking it from `preempted`.
    Switched { preempted: Option<TaskId> },
}

/// Whether the mutex lets `candidate` onto the CPU: a holder that can
/// still run keeps everybody else off until it releases.
pub fn admits(process: &Process, mutex: &Mutex, candidate: TaskId) -> bool {
    match mutex.owner() {
        None => true,
        Some(owner) if owner == candidate => true,
        Some(owner) => !matches!(
            process.task(owner).state,
            TaskState::Ready | TaskState::Running
        ),
    }
}

/// Put `candidate` on the CPU, moving the running task to `preempted_state`.
/// Returns false when nothing changed.
pub fn task_swap(
    process: &mut Process,
    candidate: TaskId,
    mutex: &Mutex,
    preempted_state: TaskState,
) -> bool {
    if process.running() == Some(candidate) {
        return false;
    }
    if !admits(process, mutex, candidate) {
        return false;
    }

    process.switch_to(candidate, preempted_state);
    true
}

// First element with the largest key; `Iterator::max_by_key` keeps the last.
pub(crate) fn first_max_by_key<T, K: Ord>(
    items: impl IntoIterator<Item = T>,
    key: impl Fn(&T) -> K,
) -> Option<T> {
    let mut best: Option<(K, T)> = None;
    for item in items {
        let k = key(&item);
        if best.as_ref().is_none_or(|(best_k, _)| k > *best_k) {
            best = Some((k, item));
        }
    }
    best.map(|(_, item)| item)
}

pub struct Scheduler {
    policy: Box<dyn SchedulingPolicy>,
    quantum: Option<Ticks>,
    // Ticks the running task has held the CPU since it was dispatched
    slice_used: Ticks,
    metrics: Option<Metrics>,
}

impl Scheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        let policy: Box<dyn SchedulingPolicy> = match config.policy {
            PolicyKind::Fcfs => Box::new(FcfsPolicy::new()),
            PolicyKind::Srtf => Box::new(SrtfPolicy),
            PolicyKind::PriorityPreemptive => Box::new(PriorityPolicy::new(None)),
            PolicyKind::PriorityPreemptiveAging => {
                Box::new(PriorityPolicy::new(Some(config.aging)))
            }
        };
        Self::with_policy(policy, config.quantum)
    }

    pub fn from_name(name: &str, quantum: Ticks, aging: Priority) -> Result<Self, SchedError> {
        Ok(Self::new(&SchedulerConfig {
            policy: name.parse()?,
            quantum,
            aging,
        }))
    }

    pub fn with_policy(policy: Box<dyn SchedulingPolicy>, quantum: Ticks) -> Self {
        Self {
            policy,
            quantum: (quantum > 0).then_some(quantum),
            slice_used: 0,
            metrics: None,
        }
    }

    pub fn kind(&self) -> PolicyKind {
        self.policy.kind()
    }

    pub fn quantum(&self) -> Option<Ticks> {
        self.quantum
    }

    /// Make this tick's scheduling decision. Never decides whether the
    /// simulation is over.
    pub fn execute(&mut self, process: &mut Process, mutex: &Mutex) {
        let running = process.running();
        if let Some(current) = running {
            self.slice_used += 1;
            // Critical sections are never preempted
            if mutex.is_owned_by(current) {
                return;
            }
        }

        let quantum_expired =
            running.is_some() && self.quantum.is_some_and(|q| self.slice_used >= q);
        let pick = Pick {
            process: &*process,
            mutex,
            running,
            quantum_expired,
        };
        let Some(next) = self.policy.pick(&pick) else {
            return;
        };

        if Some(next) == running {
            if quantum_expired {
                self.slice_used = 0;
            }
            self.policy.dispatched(process, next, Dispatch::Kept);
            return;
        }

        let preempted_state = self.policy.preempted_state();
        if task_swap(process, next, mutex, preempted_state) {
            debug!(
                "{}: {:?} -> {}",
                self.policy.kind(),
                running.map(|id| process.task(id).name.as_str()),
                process.task(next).name
            );
            self.slice_used = 0;
            self.policy
                .dispatched(process, next, Dispatch::Switched { preempted: running });
        }
    }

    /// Final averages over every task. Only meaningful once all tasks have
    /// terminated; repeated calls give the same answer.
    pub fn update_metrics(&mut self, process: &Process) -> Result<Metrics, SchedError> {
        if process.is_empty() {
            return Err(SchedError::EmptyTaskSet);
        }

        let mut turnaround = Mean::new();
        let mut waiting = Mean::new();
        for task in process.tasks() {
            let stop = task
                .stop
                .ok_or_else(|| SchedError::UnfinishedTask(task.name.clone()))?;
            turnaround.add(stop.saturating_sub(task.arrival) as f64);
            waiting.add(task.total_waiting_time as f64);
        }

        let metrics = Metrics {
            turnaround_time: turnaround.estimate(),
            waiting_time: waiting.estimate(),
        };
        self.metrics = Some(metrics);
        Ok(metrics)
    }

    pub fn metrics(&self) -> Option<Metrics> {
        self.metrics
    }
}
