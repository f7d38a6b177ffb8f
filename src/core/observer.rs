use super::{
    mutex::Mutex,
    process::Process,
    state::{TaskState, Ticks},
};

/// What a task looked like on the timeline for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Idle,
    Ready,
    Suspended,
    Running(String),
    Terminated,
}

impl Cell {
    pub fn symbol(&self) -> char {
        match self {
            Cell::Idle => ' ',
            Cell::Ready => '.',
            Cell::Suspended => '-',
            Cell::Running(_) => '#',
            Cell::Terminated => 'x',
        }
    }
}

#[derive(Debug, Default)]
pub struct Observer {
    step: u64,
    timeline: Vec<Vec<Cell>>,
    last: Vec<(TaskState, Ticks)>,
}

impl Observer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, now: Ticks, process: &Process, mutex: &Mutex) {
        self.step += 1;

        let running: Vec<_> = process
            .tasks()
            .iter()
            .filter(|task| task.state == TaskState::Running)
            .map(|task| task.id)
            .collect();
        debug_assert!(
            running.len() <= 1,
            "t={now}: more than one running task: {running:?}"
        );
        debug_assert_eq!(
            process.running(),
            running.first().copied(),
            "t={now}: running pointer out of sync with task states"
        );

        if let Some(owner) = mutex.owner() {
            debug_assert!(
                !mutex.is_waiting(owner),
                "Mutex owner {owner} also queued on it"
            );
        }

        for task in process.tasks() {
            debug_assert!(
                task.consumed_service <= task.required_service,
                "Task {} consumed more service than required",
                task.name
            );
            debug_assert!(
                task.state != TaskState::Terminated || task.finished(),
                "Task {} terminated before finishing",
                task.name
            );
            if let Some(&(state, consumed)) = self.last.get(task.id) {
                debug_assert!(
                    consumed <= task.consumed_service,
                    "Task {} lost consumed service",
                    task.name
                );
                debug_assert!(
                    state != TaskState::Terminated || task.state == TaskState::Terminated,
                    "Task {} left TERMINATED",
                    task.name
                );
            }
        }

        self.last = process
            .tasks()
            .iter()
            .map(|task| (task.state, task.consumed_service))
            .collect();
        self.timeline.push(
            process
                .tasks()
                .iter()
                .map(|task| match task.state {
                    TaskState::New => Cell::Idle,
                    TaskState::Ready => Cell::Ready,
                    TaskState::Suspended => Cell::Suspended,
                    TaskState::Running => Cell::Running(task.color.clone()),
                    TaskState::Terminated => Cell::Terminated,
                })
                .collect(),
        );
    }

    pub fn steps(&self) -> u64 {
        self.step
    }

    /// One row per observed tick, one cell per task in task-set order.
    pub fn timeline(&self) -> &[Vec<Cell>] {
        &self.timeline
    }
}
