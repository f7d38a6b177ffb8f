use std::collections::VecDeque;

use super::state::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Lock dropped; `woken` was popped off the wait queue and must retry
    /// acquisition itself once it is scheduled again.
    Released { woken: Option<TaskId> },
    NotOwner,
}

/// Single-holder lock with a FIFO wait queue. Ownership is never handed
/// over on release, and there is no timeout.
#[derive(Debug, Default)]
pub struct Mutex {
    owner: Option<TaskId>,
    waiting: VecDeque<TaskId>,
}

impl Mutex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.owner.is_some()
    }

    pub fn owner(&self) -> Option<TaskId> {
        self.owner
    }

    pub fn is_owned_by(&self, task: TaskId) -> bool {
        self.owner == Some(task)
    }

    pub fn is_waiting(&self, task: TaskId) -> bool {
        self.waiting.contains(&task)
    }

    pub fn waiting(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.waiting.iter().copied()
    }

    pub fn try_acquire(&mut self, task: TaskId) -> bool {
        match self.owner {
            None => {
                self.owner = Some(task);
                true
            }
            Some(owner) if owner == task => true,
            Some(_) => {
                if !self.waiting.contains(&task) {
                    self.waiting.push_back(task);
                }
                false
            }
        }
    }

    /// Drop `task` from the wait queue, e.g. when it terminates while parked.
    pub fn withdraw(&mut self, task: TaskId) {
        self.waiting.retain(|&id| id != task);
    }

    pub fn release(&mut self, task: TaskId) -> Release {
        if self.owner != Some(task) {
            return Release::NotOwner;
        }

        let woken = self.waiting.pop_front();
        self.owner = None;
        Release::Released { woken }
    }
}
