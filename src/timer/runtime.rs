use core::time::Duration;
use std::io;

use parking_lot::Mutex;
use tokio::{
  runtime::{Builder, Handle, Runtime},
  task::JoinHandle,
};

use super::{ScheduledTask, Task, TimerService};

const THREAD_NAME: &str = "active-resolver-timer";

/// A [`TimerService`] backed by tokio timers.
///
/// The service either owns a small runtime of its own or schedules onto a
/// runtime owned by the caller.
pub struct TokioTimerService {
  handle: Handle,
  runtime: Mutex<Option<Runtime>>,
}

impl core::fmt::Debug for TokioTimerService {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("TokioTimerService")
      .field("owns_runtime", &self.runtime.lock().is_some())
      .finish()
  }
}

impl TokioTimerService {
  /// Create a new [`TokioTimerService`] with a dedicated single worker runtime.
  pub fn new() -> io::Result<Self> {
    let runtime = Builder::new_multi_thread()
      .worker_threads(1)
      .thread_name(THREAD_NAME)
      .enable_time()
      .build()?;
    Ok(Self {
      handle: runtime.handle().clone(),
      runtime: Mutex::new(Some(runtime)),
    })
  }

  /// Create a new [`TokioTimerService`] which schedules onto an existing runtime.
  ///
  /// The runtime must have the time driver enabled.
  pub fn from_handle(handle: Handle) -> Self {
    Self {
      handle,
      runtime: Mutex::new(None),
    }
  }

  /// Stops the owned runtime, if any, without waiting for running tasks.
  ///
  /// Tasks scheduled afterwards never run.
  pub fn shutdown(&self) {
    if let Some(runtime) = self.runtime.lock().take() {
      runtime.shutdown_background();
    }
  }
}

impl Drop for TokioTimerService {
  fn drop(&mut self) {
    // dropping a runtime blocks, which panics inside async contexts
    if let Some(runtime) = self.runtime.get_mut().take() {
      runtime.shutdown_background();
    }
  }
}

impl TimerService for TokioTimerService {
  fn schedule(&self, delay: Duration, task: Task) -> Box<dyn ScheduledTask> {
    let handle = self.handle.spawn(async move {
      tokio::time::sleep(delay).await;
      task();
    });
    Box::new(TokioTask(handle))
  }
}

struct TokioTask(JoinHandle<()>);

impl ScheduledTask for TokioTask {
  fn cancel(&self) {
    self.0.abort();
  }

  fn is_finished(&self) -> bool {
    self.0.is_finished()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  use super::*;
  use crate::testing::wait_for;

  #[tokio::test]
  async fn test_schedule_and_cancel() {
    let timer = TokioTimerService::from_handle(Handle::current());
    let fired = Arc::new(AtomicUsize::new(0));

    let f = fired.clone();
    let task = timer.schedule(
      Duration::from_millis(20),
      Box::new(move || {
        f.fetch_add(1, Ordering::SeqCst);
      }),
    );
    let f = fired.clone();
    let cancelled = timer.schedule(
      Duration::from_millis(20),
      Box::new(move || {
        f.fetch_add(10, Ordering::SeqCst);
      }),
    );
    cancelled.cancel();

    wait_for(Duration::from_secs(1), || task.is_finished()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(cancelled.is_finished());
  }

  #[tokio::test]
  async fn test_dedicated_runtime() {
    let timer = TokioTimerService::new().unwrap();
    let fired = Arc::new(AtomicUsize::new(0));

    let f = fired.clone();
    let _task = timer.schedule(
      Duration::from_millis(10),
      Box::new(move || {
        assert!(std::thread::current()
          .name()
          .is_some_and(|name| name.starts_with(THREAD_NAME)));
        f.fetch_add(1, Ordering::SeqCst);
      }),
    );
    wait_for(Duration::from_secs(1), || fired.load(Ordering::SeqCst) == 1).await;

    timer.shutdown();
    let f = fired.clone();
    let _task = timer.schedule(
      Duration::from_millis(1),
      Box::new(move || {
        f.fetch_add(1, Ordering::SeqCst);
      }),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // dropped inside an async context
    drop(timer);
  }
}
