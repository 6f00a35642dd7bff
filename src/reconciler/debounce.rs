//! Single-slot scheduled task
//!
//! Scheduling replaces whatever was armed before; at most one task is ever
//! pending. Dropping the slot cancels the pending task.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug, Default)]
pub struct ScheduledTask {
    slot: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, cancelling any task already armed
    pub fn schedule<F>(&mut self, delay: Duration, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        let Ok(runtime) = Handle::try_current() else {
            warn!("No tokio runtime available, scheduled task dropped");
            return;
        };
        self.slot = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        }));
    }

    /// Cancel the armed task. Returns true if one was still pending.
    pub fn cancel(&mut self) -> bool {
        match self.slot.take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.slot.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
