use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::mutex::{Mutex, Release};

// Index into Process task Vec
pub type TaskId = usize;
pub type Ticks = u64;
pub type Priority = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    New,
    Ready,
    Running,
    Suspended,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Io,
    MutexLock,
    MutexUnlock,
}

/// Abstract marker attached to a task. `trigger` is measured in ticks of
/// consumed service; lock/unlock markers are instantaneous (`duration == 0`).
/// Events are checked after a running tick has been consumed, so a trigger
/// of 0 fires at the end of the first tick of service, like a trigger of 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub kind: EventKind,
    pub trigger: Ticks,
    #[serde(default)]
    pub duration: Ticks,
    #[serde(skip)]
    pub elapsed: Ticks,
}

impl TaskEvent {
    pub fn io(trigger: Ticks, duration: Ticks) -> Self {
        Self {
            kind: EventKind::Io,
            trigger,
            duration,
            elapsed: 0,
        }
    }

    pub fn lock(trigger: Ticks) -> Self {
        Self {
            kind: EventKind::MutexLock,
            trigger,
            duration: 0,
            elapsed: 0,
        }
    }

    pub fn unlock(trigger: Ticks) -> Self {
        Self {
            kind: EventKind::MutexUnlock,
            trigger,
            duration: 0,
            elapsed: 0,
        }
    }

    fn expired(&self) -> bool {
        self.kind == EventKind::Io && self.elapsed >= self.duration
    }
}

/// Switches for behaviour kept only for compatibility with older workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Compat {
    /// After an unlock, take the mutex straight back if the task still has
    /// another unlock queued before any lock.
    pub reacquire_on_pending_unlock: bool,
    /// Keep moving `stop` forward every tick a task spends terminated.
    pub restamp_stop: bool,
}

impl Default for Compat {
    fn default() -> Self {
        Self {
            reacquire_on_pending_unlock: true,
            restamp_stop: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tcb {
    pub id: TaskId,
    pub name: String,
    pub color: String,
    pub state: TaskState,
    pub arrival: Ticks,
    pub stop: Option<Ticks>,
    pub required_service: Ticks,
    pub consumed_service: Ticks,
    pub waiting_streak: Ticks,
    pub longest_waiting_streak: Ticks,
    pub total_waiting_time: Ticks,
    pub initial_priority: Priority,
    pub current_priority: Priority,
    pub events: Vec<TaskEvent>,
}

impl Tcb {
    pub fn new(
        id: TaskId,
        name: impl Into<String>,
        color: impl Into<String>,
        arrival: Ticks,
        required_service: Ticks,
        priority: Priority,
        events: Vec<TaskEvent>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            color: color.into(),
            state: TaskState::New,
            arrival,
            stop: None,
            required_service,
            consumed_service: 0,
            waiting_streak: 0,
            longest_waiting_streak: 0,
            total_waiting_time: 0,
            initial_priority: priority,
            current_priority: priority,
            events,
        }
    }

    pub fn finished(&self) -> bool {
        self.consumed_service >= self.required_service
    }

    pub fn remaining_service(&self) -> Ticks {
        self.required_service.saturating_sub(self.consumed_service)
    }

    pub fn is_live(&self) -> bool {
        self.state != TaskState::Terminated
    }

    /// Advance this task by one tick. Returns the tasks woken by mutex
    /// releases made during the tick; the caller is responsible for
    /// moving them back to READY.
    pub fn update(&mut self, now: Ticks, mutex: &mut Mutex, compat: &Compat) -> Vec<TaskId> {
        let mut woken = Vec::new();

        match self.state {
            TaskState::New => {
                if now >= self.arrival {
                    self.state = TaskState::Ready;
                    // Zero-service tasks end on arrival without touching the CPU
                    if self.finished() {
                        self.terminate(now, mutex);
                    }
                }
            }
            TaskState::Ready => self.wait_one_tick(),
            TaskState::Suspended => {
                if self.finished() {
                    self.terminate(now, mutex);
                } else {
                    self.wait_one_tick();
                    self.process_events(mutex, compat, &mut woken);
                }
            }
            TaskState::Running => {
                self.waiting_streak = 0;
                self.consumed_service = self
                    .consumed_service
                    .saturating_add(1)
                    .min(self.required_service);
                self.process_events(mutex, compat, &mut woken);
                if self.finished() {
                    self.terminate(now, mutex);
                }
            }
            TaskState::Terminated => {
                if compat.restamp_stop {
                    self.stop = Some(now);
                }
            }
        }

        woken
    }

    fn wait_one_tick(&mut self) {
        self.waiting_streak += 1;
        self.total_waiting_time += 1;
        self.longest_waiting_streak = self.longest_waiting_streak.max(self.waiting_streak);
    }

    fn terminate(&mut self, now: Ticks, mutex: &mut Mutex) {
        self.state = TaskState::Terminated;
        self.stop = Some(now);
        mutex.withdraw(self.id);
        if mutex.is_owned_by(self.id) {
            warn!("task {} terminated while holding the mutex", self.name);
        }
    }

    fn process_events(&mut self, mutex: &mut Mutex, compat: &Compat, woken: &mut Vec<TaskId>) {
        self.events.retain(|event| !event.expired());

        // Parked on the mutex until its holder hands it over
        if mutex.is_waiting(self.id) {
            self.state = TaskState::Suspended;
            return;
        }

        let mut i = 0;
        while i < self.events.len() {
            if self.events[i].trigger > self.consumed_service {
                i += 1;
                continue;
            }

            match self.events[i].kind {
                EventKind::Io => {
                    self.state = TaskState::Suspended;
                    self.events[i].elapsed += 1;
                    return;
                }
                EventKind::MutexLock => {
                    if !mutex.try_acquire(self.id) {
                        debug!(
                            "task {} blocked on mutex held by {:?}",
                            self.name,
                            mutex.owner()
                        );
                        self.state = TaskState::Suspended;
                        return;
                    }
                    self.events.remove(i);
                }
                EventKind::MutexUnlock => {
                    self.events.remove(i);
                    match mutex.release(self.id) {
                        Release::Released { woken: next } => {
                            woken.extend(next);
                            if compat.reacquire_on_pending_unlock && self.unlock_pending() {
                                mutex.try_acquire(self.id);
                            }
                        }
                        Release::NotOwner => {
                            warn!(
                                "task {} discarded unlock of a mutex it does not hold",
                                self.name
                            );
                        }
                    }
                }
            }
        }

        if self.state == TaskState::Suspended {
            self.state = TaskState::Ready;
        }
    }

    // Next lock-related marker is another unlock
    fn unlock_pending(&self) -> bool {
        self.events
            .iter()
            .find(|event| event.kind != EventKind::Io)
            .is_some_and(|event| event.kind == EventKind::MutexUnlock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcb(arrival: Ticks, service: Ticks, events: Vec<TaskEvent>) -> Tcb {
        Tcb::new(0, "A", "red", arrival, service, 1, events)
    }

    #[test]
    fn new_task_becomes_ready_on_arrival() {
        let mut mutex = Mutex::new();
        let mut task = tcb(2, 3, Vec::new());

        task.update(1, &mut mutex, &Compat::default());
        assert_eq!(task.state, TaskState::New);
        task.update(2, &mut mutex, &Compat::default());
        assert_eq!(task.state, TaskState::Ready);
        assert_eq!(task.total_waiting_time, 0);
    }

    #[test]
    fn zero_service_task_terminates_on_arrival() {
        let mut mutex = Mutex::new();
        let mut task = tcb(3, 0, Vec::new());

        task.update(2, &mut mutex, &Compat::default());
        assert_eq!(task.state, TaskState::New);
        task.update(3, &mut mutex, &Compat::default());
        assert_eq!(task.state, TaskState::Terminated);
        assert_eq!(task.stop, Some(3));
        assert_eq!(task.total_waiting_time, 0);
    }

    #[test]
    fn io_trigger_zero_fires_after_first_tick() {
        let mut mutex = Mutex::new();
        let mut task = tcb(0, 5, vec![TaskEvent::io(0, 1)]);
        task.state = TaskState::Running;

        task.update(1, &mut mutex, &Compat::default());
        assert_eq!(task.consumed_service, 1);
        assert_eq!(task.state, TaskState::Suspended);
    }

    #[test]
    fn running_task_terminates_once_service_is_delivered() {
        let mut mutex = Mutex::new();
        let mut task = tcb(0, 2, Vec::new());
        task.state = TaskState::Running;

        task.update(1, &mut mutex, &Compat::default());
        assert_eq!(task.consumed_service, 1);
        assert_eq!(task.state, TaskState::Running);

        task.update(2, &mut mutex, &Compat::default());
        assert_eq!(task.state, TaskState::Terminated);
        assert_eq!(task.stop, Some(2));

        task.update(3, &mut mutex, &Compat::default());
        assert_eq!(task.stop, Some(2));
        assert_eq!(task.consumed_service, 2);
    }

    #[test]
    fn restamp_compat_moves_stop_forward() {
        let mut mutex = Mutex::new();
        let compat = Compat {
            restamp_stop: true,
            ..Compat::default()
        };
        let mut task = tcb(0, 1, Vec::new());
        task.state = TaskState::Running;

        task.update(4, &mut mutex, &compat);
        assert_eq!(task.stop, Some(4));
        task.update(5, &mut mutex, &compat);
        task.update(6, &mut mutex, &compat);
        assert_eq!(task.state, TaskState::Terminated);
        assert_eq!(task.stop, Some(6));
    }

    #[test]
    fn io_event_suspends_for_its_duration() {
        let mut mutex = Mutex::new();
        let mut task = tcb(0, 5, vec![TaskEvent::io(1, 2)]);
        task.state = TaskState::Running;

        task.update(1, &mut mutex, &Compat::default());
        assert_eq!(task.state, TaskState::Suspended);

        task.update(2, &mut mutex, &Compat::default());
        assert_eq!(task.state, TaskState::Suspended);
        assert_eq!(task.waiting_streak, 1);

        task.update(3, &mut mutex, &Compat::default());
        assert_eq!(task.state, TaskState::Ready);
        assert!(task.events.is_empty());
        assert_eq!(task.total_waiting_time, 2);
        assert_eq!(task.consumed_service, 1);
    }

    #[test]
    fn preempted_task_returns_to_ready() {
        let mut mutex = Mutex::new();
        let mut task = tcb(0, 5, Vec::new());
        task.state = TaskState::Suspended;

        task.update(3, &mut mutex, &Compat::default());
        assert_eq!(task.state, TaskState::Ready);
        assert_eq!(task.waiting_streak, 1);
    }

    #[test]
    fn lock_and_unlock_in_critical_section() {
        let mut mutex = Mutex::new();
        let mut task = tcb(0, 4, vec![TaskEvent::lock(1), TaskEvent::unlock(2)]);
        task.state = TaskState::Running;

        task.update(1, &mut mutex, &Compat::default());
        assert_eq!(mutex.owner(), Some(0));
        assert_eq!(task.events.len(), 1);

        let woken = task.update(2, &mut mutex, &Compat::default());
        assert!(woken.is_empty());
        assert!(!mutex.is_locked());
        assert!(task.events.is_empty());
        assert_eq!(task.state, TaskState::Running);
    }

    #[test]
    fn unlock_by_non_owner_is_discarded() {
        let mut mutex = Mutex::new();
        assert!(mutex.try_acquire(7));
        let mut task = tcb(0, 4, vec![TaskEvent::unlock(1)]);
        task.state = TaskState::Running;

        task.update(1, &mut mutex, &Compat::default());
        assert_eq!(mutex.owner(), Some(7));
        assert!(task.events.is_empty());
        assert_eq!(task.state, TaskState::Running);
    }

    #[test]
    fn pending_unlock_reacquires_under_compat() {
        let events = vec![TaskEvent::lock(1), TaskEvent::unlock(2), TaskEvent::unlock(3)];

        let mut mutex = Mutex::new();
        let mut task = tcb(0, 5, events.clone());
        task.state = TaskState::Running;
        task.update(1, &mut mutex, &Compat::default());
        task.update(2, &mut mutex, &Compat::default());
        assert_eq!(mutex.owner(), Some(0));

        let compat = Compat {
            reacquire_on_pending_unlock: false,
            ..Compat::default()
        };
        let mut mutex = Mutex::new();
        let mut task = tcb(0, 5, events);
        task.state = TaskState::Running;
        task.update(1, &mut mutex, &compat);
        task.update(2, &mut mutex, &compat);
        assert!(!mutex.is_locked());
    }
}
