//! Helpers shared by the unit tests.

use core::time::Duration;
use std::{
  net::SocketAddr,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use parking_lot::Mutex;

use crate::{
  Error, ResolveError,
  resolver::{Listener, NameResolver},
  timer::{ScheduledTask, SharedTimerHolder, Task, TimerService},
};

/// Returns a holder private to the calling test.
pub(crate) fn leaked_holder() -> &'static SharedTimerHolder {
  Box::leak(Box::new(SharedTimerHolder::new()))
}

/// Polls `condition` until it holds, panicking after `timeout`.
pub(crate) async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) {
  let deadline = tokio::time::Instant::now() + timeout;
  while !condition() {
    assert!(
      tokio::time::Instant::now() < deadline,
      "condition not met within {timeout:?}"
    );
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
}

/// Keeps the most recent result delivered by a resolver.
#[derive(Default)]
pub(crate) struct CapturingListener {
  addresses: Mutex<Option<Vec<SocketAddr>>>,
  error: Mutex<Option<ResolveError>>,
}

impl CapturingListener {
  pub(crate) fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub(crate) fn addresses(&self) -> Option<Vec<SocketAddr>> {
    self.addresses.lock().clone()
  }

  pub(crate) fn take_error(&self) -> Option<ResolveError> {
    self.error.lock().take()
  }
}

impl Listener for CapturingListener {
  fn on_addresses(&self, addresses: Vec<SocketAddr>) {
    *self.addresses.lock() = Some(addresses);
  }

  fn on_error(&self, error: ResolveError) {
    *self.error.lock() = Some(error);
  }
}

/// How a [`CountingResolver`] answers `refresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshBehavior {
  Succeed,
  Fail,
  Panic,
}

/// A resolver which only records how it was called.
pub(crate) struct CountingResolver {
  pub(crate) starts: AtomicUsize,
  pub(crate) refreshes: AtomicUsize,
  pub(crate) shutdowns: AtomicUsize,
  behavior: Mutex<RefreshBehavior>,
}

impl CountingResolver {
  pub(crate) fn new() -> Arc<Self> {
    Arc::new(Self {
      starts: AtomicUsize::new(0),
      refreshes: AtomicUsize::new(0),
      shutdowns: AtomicUsize::new(0),
      behavior: Mutex::new(RefreshBehavior::Succeed),
    })
  }

  pub(crate) fn set_behavior(&self, behavior: RefreshBehavior) {
    *self.behavior.lock() = behavior;
  }

  pub(crate) fn counts(&self) -> (usize, usize, usize) {
    (
      self.starts.load(Ordering::SeqCst),
      self.refreshes.load(Ordering::SeqCst),
      self.shutdowns.load(Ordering::SeqCst),
    )
  }
}

impl NameResolver for CountingResolver {
  fn service_authority(&self) -> &str {
    "counting"
  }

  fn start(&self, _listener: Arc<dyn Listener>) -> Result<(), Error> {
    self.starts.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  fn refresh(&self) -> Result<(), Error> {
    self.refreshes.fetch_add(1, Ordering::SeqCst);
    let behavior = *self.behavior.lock();
    match behavior {
      RefreshBehavior::Succeed => Ok(()),
      RefreshBehavior::Fail => Err(Error::NotStarted),
      RefreshBehavior::Panic => panic!("refresh exploded"),
    }
  }

  fn shutdown(&self) -> Result<(), Error> {
    self.shutdowns.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

impl NameResolver for Arc<CountingResolver> {
  fn service_authority(&self) -> &str {
    (**self).service_authority()
  }

  fn start(&self, listener: Arc<dyn Listener>) -> Result<(), Error> {
    (**self).start(listener)
  }

  fn refresh(&self) -> Result<(), Error> {
    (**self).refresh()
  }

  fn shutdown(&self) -> Result<(), Error> {
    (**self).shutdown()
  }
}

struct ManualEntry {
  delay: Duration,
  task: Option<Task>,
  cancelled: Arc<AtomicBool>,
}

/// A [`TimerService`] which only runs tasks when the test says so.
#[derive(Default)]
pub(crate) struct ManualTimer {
  entries: Mutex<Vec<ManualEntry>>,
}

impl ManualTimer {
  pub(crate) fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Returns the delays of the tasks which are neither cancelled nor run.
  pub(crate) fn pending(&self) -> Vec<Duration> {
    self
      .entries
      .lock()
      .iter()
      .filter(|ent| ent.task.is_some() && !ent.cancelled.load(Ordering::SeqCst))
      .map(|ent| ent.delay)
      .collect()
  }

  /// Returns the number of tasks which were cancelled.
  pub(crate) fn cancelled(&self) -> usize {
    self
      .entries
      .lock()
      .iter()
      .filter(|ent| ent.cancelled.load(Ordering::SeqCst))
      .count()
  }

  /// Takes the most recently scheduled task which has not run, ignoring
  /// cancellation, like a timer which already dequeued it.
  pub(crate) fn take_latest(&self) -> Option<Task> {
    self
      .entries
      .lock()
      .iter_mut()
      .rev()
      .find_map(|ent| ent.task.take())
  }

  /// Runs every pending, uncancelled task.
  pub(crate) fn fire_pending(&self) -> usize {
    let tasks: Vec<Task> = self
      .entries
      .lock()
      .iter_mut()
      .filter(|ent| !ent.cancelled.load(Ordering::SeqCst))
      .filter_map(|ent| ent.task.take())
      .collect();
    let fired = tasks.len();
    for task in tasks {
      task();
    }
    fired
  }
}

impl TimerService for ManualTimer {
  fn schedule(&self, delay: Duration, task: Task) -> Box<dyn ScheduledTask> {
    let cancelled = Arc::new(AtomicBool::new(false));
    self.entries.lock().push(ManualEntry {
      delay,
      task: Some(task),
      cancelled: cancelled.clone(),
    });
    Box::new(ManualTask { cancelled })
  }
}

struct ManualTask {
  cancelled: Arc<AtomicBool>,
}

impl ScheduledTask for ManualTask {
  fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
  }

  fn is_finished(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }
}

/// A subscriber which records the target of every event.
#[cfg(feature = "tracing")]
#[derive(Clone, Default)]
pub(crate) struct TargetRecorder {
  targets: Arc<Mutex<Vec<(&'static str, tracing::Level)>>>,
}

#[cfg(feature = "tracing")]
impl TargetRecorder {
  pub(crate) fn targets(&self) -> Vec<(&'static str, tracing::Level)> {
    self.targets.lock().clone()
  }
}

#[cfg(feature = "tracing")]
impl tracing::Subscriber for TargetRecorder {
  fn register_callsite(
    &self,
    _metadata: &'static tracing::Metadata<'static>,
  ) -> tracing::subscriber::Interest {
    tracing::subscriber::Interest::always()
  }

  fn enabled(&self, _metadata: &tracing::Metadata<'_>) -> bool {
    true
  }

  fn new_span(&self, _span: &tracing::span::Attributes<'_>) -> tracing::span::Id {
    tracing::span::Id::from_u64(1)
  }

  fn record(&self, _span: &tracing::span::Id, _values: &tracing::span::Record<'_>) {}

  fn record_follows_from(&self, _span: &tracing::span::Id, _follows: &tracing::span::Id) {}

  fn event(&self, event: &tracing::Event<'_>) {
    let metadata = event.metadata();
    self
      .targets
      .lock()
      .push((metadata.target(), *metadata.level()));
  }

  fn enter(&self, _span: &tracing::span::Id) {}

  fn exit(&self, _span: &tracing::span::Id) {}
}
