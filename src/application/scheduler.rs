use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Whether a repeating task should be armed for another interval.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Repeat {
    Continue,
    Stop,
}

/// A set of repeating timer tasks scoped to one phase of a session.
///
/// Arming a new phase replaces the previous set wholesale: `abort_all` is
/// called before new timers go in, so a retry can never accumulate timers
/// from the prior attempt. Each task re-checks its own continuation
/// condition every interval and winds down on `Repeat::Stop`.
#[derive(Default)]
pub struct TaskSet {
    handles: Vec<JoinHandle<()>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a task that sleeps `period`, runs `step`, and repeats until
    /// the step asks to stop or the set is aborted.
    ///
    /// The first execution happens one full period after arming, matching an
    /// interval timer rather than an immediate callback.
    pub fn spawn_repeating<F, Fut>(&mut self, period: Duration, mut step: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Repeat> + Send,
    {
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if step().await == Repeat::Stop {
                    break;
                }
            }
        });
        self.handles.push(handle);
    }

    /// Aborts every task in the set and forgets the handles.
    pub fn abort_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    /// Number of tasks that are still running. Finished or aborted tasks do
    /// not count even if their handles are still held.
    pub fn active_count(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        self.abort_all();
    }
}
