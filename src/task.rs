//! Tasks: the resource ledger behind teardown.
//!
//! A task owns the main thread and records every kernel resource created
//! under it. Teardown walks the ledger and deletes the survivors, matching
//! on the resource kind.

use crate::arch::Arch;
use crate::config::MAX_RESOURCES;
use crate::kernel::Kernel;
use crate::sched::Criterion;
use crate::sync::SyncId;
use crate::thread::ThreadId;
use crate::time::alarm::AlarmId;
use log::trace;

/// A kernel resource enrolled with a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Thread(ThreadId),
    Mutex(SyncId),
    Semaphore(SyncId),
    Condition(SyncId),
    Alarm(AlarmId),
}

/// Resource ledger of the running application.
pub struct Task {
    main: ThreadId,
    resources: heapless::Vec<Resource, MAX_RESOURCES>,
}

impl Task {
    pub fn new(main: ThreadId) -> Self {
        let mut resources = heapless::Vec::new();
        let _ = resources.push(Resource::Thread(main));
        Task { main, resources }
    }

    pub fn main(&self) -> ThreadId {
        self.main
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn enroll(&mut self, resource: Resource) {
        trace!("task enroll({:?})", resource);
        let _ = self.resources.push(resource);
    }

    pub fn dismiss(&mut self, resource: Resource) {
        trace!("task dismiss({:?})", resource);
        if let Some(at) = self.resources.iter().position(|&r| r == resource) {
            self.resources.swap_remove(at);
        }
    }
}

impl<A: Arch, C: Criterion> Kernel<A, C> {
    pub fn enroll(&mut self, resource: Resource) {
        if let Some(task) = self.task.as_mut() {
            task.enroll(resource);
        }
    }

    pub fn dismiss(&mut self, resource: Resource) {
        if let Some(task) = self.task.as_mut() {
            task.dismiss(resource);
        }
    }

    /// Delete every resource still enrolled with the task, threads first so
    /// no survivor wakes up against a destroyed synchronizer.
    pub fn teardown_task(&mut self) {
        let Some(task) = self.task.take() else { return };
        trace!("task teardown: {} resources", task.resources().len());

        for &resource in task.resources() {
            if let Resource::Thread(id) = resource {
                if id != task.main() {
                    let _ = self.destroy(id);
                }
            }
        }
        for &resource in task.resources() {
            match resource {
                Resource::Thread(_) => {}
                Resource::Mutex(id) | Resource::Semaphore(id) | Resource::Condition(id) => {
                    self.destroy_synchronizer(id)
                }
                Resource::Alarm(id) => self.destroy_alarm(id),
            }
        }
    }
}
