pub mod driver;
pub mod event;
pub mod mutex;
pub mod observer;
pub mod process;
pub mod state;

pub use driver::SchedCore;
pub use event::SchedCoreEvent;
pub use mutex::{Mutex, Release};
pub use observer::{Cell, Observer};
pub use process::Process;
pub use state::{Compat, EventKind, Priority, TaskEvent, TaskId, TaskState, Tcb, Ticks};
