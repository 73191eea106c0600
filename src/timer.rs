use core::time::Duration;

mod runtime;
mod shared;

pub use runtime::TokioTimerService;
pub use shared::SharedTimerHolder;

/// A one-shot task handed to a [`TimerService`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks once after a delay.
///
/// Tasks may run on any thread, concurrently with whatever scheduled them.
pub trait TimerService: Send + Sync + 'static {
  /// Schedules `task` to run once after `delay`.
  fn schedule(&self, delay: Duration, task: Task) -> Box<dyn ScheduledTask>;
}

/// A handle to a task scheduled on a [`TimerService`].
pub trait ScheduledTask: Send + Sync {
  /// Cancels the task if it has not started yet.
  ///
  /// Cancellation is best-effort: a task which was already picked up for
  /// execution still runs.
  fn cancel(&self);

  /// Returns `true` once the task ran to completion or was cancelled.
  fn is_finished(&self) -> bool;
}
