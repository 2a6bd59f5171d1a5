use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{Instant, sleep_until};

/// One-shot task running after a fixed delay.
pub struct ScheduledFlush {
    deadline: Instant,
    handle: AbortHandle,
}

impl ScheduledFlush {
    /// Spawns `task` on `runtime`, to be run once `delay` has elapsed.
    pub fn arm<F>(runtime: &Handle, delay: Duration, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let deadline = Instant::now() + delay;
        let handle = runtime
            .spawn(async move {
                sleep_until(deadline).await;
                task.await;
            })
            .abort_handle();

        Self { deadline, handle }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Aborts the task if it has not completed yet.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}
