use core::time::Duration;
use std::{
  panic::{self, AssertUnwindSafe},
  sync::Arc,
  time::Instant,
};

use parking_lot::Mutex;

use crate::{
  Error,
  resolver::{Listener, NameResolver},
  timer::{ScheduledTask, SharedTimerHolder, TimerService, TokioTimerService},
};

mod factory;
pub use factory::ActiveResolverFactory;

const fn default_max_refresh_interval() -> Duration {
  Duration::from_secs(300)
}

/// The options used to construct an [`ActiveResolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActiveResolverOptions {
  #[cfg_attr(
    feature = "serde",
    serde(with = "humantime_serde", default = "default_max_refresh_interval")
  )]
  max_refresh_interval: Duration,
}

impl Default for ActiveResolverOptions {
  fn default() -> Self {
    Self {
      max_refresh_interval: default_max_refresh_interval(),
    }
  }
}

impl ActiveResolverOptions {
  /// Create a new [`ActiveResolverOptions`].
  pub fn new() -> Self {
    Self::default()
  }

  /// Set the time without any refresh after which a refresh is triggered, in builder pattern
  pub const fn with_max_refresh_interval(mut self, val: Duration) -> Self {
    self.max_refresh_interval = val;
    self
  }

  /// Set the time without any refresh after which a refresh is triggered
  pub fn set_max_refresh_interval(&mut self, val: Duration) {
    self.max_refresh_interval = val;
  }

  /// Returns the time without any refresh after which a refresh is triggered
  pub const fn max_refresh_interval(&self) -> Duration {
    self.max_refresh_interval
  }

  pub(crate) fn validate(&self) -> Result<(), Error> {
    if self.max_refresh_interval.is_zero() {
      return Err(Error::InvalidInterval);
    }
    Ok(())
  }
}

/// The phase of an [`ActiveResolver`].
///
/// Transitions only move forward: `Unstarted -> Active -> ShutDown`, or
/// straight from `Unstarted` to `ShutDown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
  /// Created, `start` not called yet.
  Unstarted,
  /// Started, a scheduled refresh is pending.
  Active,
  /// Shut down, terminal.
  ShutDown,
}

/// What caused a refresh of an [`ActiveResolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshTrigger {
  /// The owner of the resolver called `refresh`.
  ExplicitRequest,
  /// The max refresh interval elapsed without any other refresh.
  ScheduledTimeout,
}

impl RefreshTrigger {
  /// Returns a short name of the trigger.
  #[inline]
  pub const fn as_str(&self) -> &'static str {
    match self {
      Self::ExplicitRequest => "explicit",
      Self::ScheduledTimeout => "scheduled",
    }
  }
}

impl core::fmt::Display for RefreshTrigger {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Emitted every time an [`ActiveResolver`] triggers a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefreshEvent {
  trigger: RefreshTrigger,
  at: Instant,
}

impl RefreshEvent {
  /// Returns what caused the refresh.
  #[inline]
  pub const fn trigger(&self) -> RefreshTrigger {
    self.trigger
  }

  /// Returns when the refresh was triggered.
  #[inline]
  pub const fn at(&self) -> Instant {
    self.at
  }
}

/// Receives a [`RefreshEvent`] for every refresh an [`ActiveResolver`] triggers.
///
/// Observers are called while the resolver's state is locked and must not
/// call back into the resolver.
pub trait RefreshObserver: Send + Sync + 'static {
  /// Called right when a refresh is triggered.
  fn on_refresh(&self, event: RefreshEvent);
}

impl<F> RefreshObserver for F
where
  F: Fn(RefreshEvent) + Send + Sync + 'static,
{
  fn on_refresh(&self, event: RefreshEvent) {
    self(event)
  }
}

enum TimerSource {
  Dedicated(Arc<dyn TimerService>),
  Shared {
    holder: &'static SharedTimerHolder,
    service: Arc<TokioTimerService>,
  },
}

impl TimerSource {
  fn service(&self) -> &dyn TimerService {
    match self {
      Self::Dedicated(service) => service.as_ref(),
      Self::Shared { service, .. } => service.as_ref(),
    }
  }

  fn release(&self) -> Result<(), Error> {
    match self {
      Self::Dedicated(_) => Ok(()),
      Self::Shared { holder, service } => holder.release(service),
    }
  }
}

struct State {
  lifecycle: Lifecycle,
  scheduled: Option<Box<dyn ScheduledTask>>,
  // bumped whenever a timer is armed, a task whose generation is stale was superseded
  generation: u64,
}

impl State {
  fn cancel_scheduled(&mut self) {
    if let Some(task) = self.scheduled.take() {
      task.cancel();
    }
  }
}

struct Inner<R> {
  resolver: R,
  timer: TimerSource,
  max_refresh_interval: Duration,
  observer: Option<Arc<dyn RefreshObserver>>,
  state: Mutex<State>,
}

impl<R: NameResolver> Inner<R> {
  fn schedule_refresh(self: &Arc<Self>, state: &mut State) {
    state.cancel_scheduled();
    state.generation = state.generation.wrapping_add(1);

    let generation = state.generation;
    let this = Arc::downgrade(self);
    let task = self.timer.service().schedule(
      self.max_refresh_interval,
      Box::new(move || {
        if let Some(this) = this.upgrade() {
          this.scheduled_refresh(generation);
        }
      }),
    );
    state.scheduled = Some(task);
  }

  fn scheduled_refresh(self: &Arc<Self>, generation: u64) {
    let mut state = self.state.lock();
    // the task may have been dequeued before a concurrent refresh or shutdown cancelled it
    if state.lifecycle != Lifecycle::Active || state.generation != generation {
      return;
    }
    // the handle belongs to the task running right now
    state.scheduled = None;

    self.notify(RefreshTrigger::ScheduledTimeout);
    match panic::catch_unwind(AssertUnwindSafe(|| self.resolver.refresh())) {
      Ok(Ok(())) => {}
      Ok(Err(_e)) => {
        #[cfg(feature = "tracing")]
        tracing::error!(
          target: "active_resolver",
          authority = self.resolver.service_authority(),
          err = %_e,
          "scheduled refresh failed"
        );
      }
      Err(_) => {
        #[cfg(feature = "tracing")]
        tracing::error!(
          target: "active_resolver",
          authority = self.resolver.service_authority(),
          "scheduled refresh panicked"
        );
      }
    }
    self.schedule_refresh(&mut state);
  }

  fn notify(&self, trigger: RefreshTrigger) {
    #[cfg(feature = "tracing")]
    match trigger {
      RefreshTrigger::ExplicitRequest => tracing::debug!(
        target: "active_resolver",
        authority = self.resolver.service_authority(),
        "triggering explicitly requested refresh"
      ),
      RefreshTrigger::ScheduledTimeout => tracing::debug!(
        target: "active_resolver",
        authority = self.resolver.service_authority(),
        "triggering scheduled refresh"
      ),
    }

    if let Some(observer) = &self.observer {
      observer.on_refresh(RefreshEvent {
        trigger,
        at: Instant::now(),
      });
    }
  }
}

impl<R> Drop for Inner<R> {
  fn drop(&mut self) {
    let state = self.state.get_mut();
    if state.lifecycle == Lifecycle::ShutDown {
      return;
    }
    state.cancel_scheduled();
    if let Err(_e) = self.timer.release() {
      #[cfg(feature = "tracing")]
      tracing::warn!(
        target: "active_resolver",
        err = %_e,
        "failed to release timer service of a dropped resolver"
      );
    }
  }
}

/// A [`NameResolver`] which refreshes the resolver it wraps whenever no
/// refresh happened for a configured interval.
///
/// Every successful `start` and every refresh, explicit or scheduled, arms a
/// one-shot timer for [`max_refresh_interval`](ActiveResolverOptions::max_refresh_interval).
/// An explicit [`refresh`](NameResolver::refresh) therefore pushes the next
/// scheduled refresh back to a full interval from now. At most one timer is
/// pending per resolver at any time. A panic in the wrapped `refresh` is
/// propagated to the caller only after the next refresh has been armed.
///
/// Timers run on a dedicated [`TimerService`] when one is given, otherwise on a
/// process-wide [`TokioTimerService`] acquired from a [`SharedTimerHolder`] at
/// construction and released on the first [`shutdown`](NameResolver::shutdown),
/// or on drop if the resolver was never shut down.
///
/// The wrapped resolver is called with the state lock held, so it must not
/// call back into this resolver, neither directly nor from its listener.
///
/// ```
/// use std::{net::{IpAddr, Ipv4Addr}, time::Duration};
/// use active_resolver::{
///   ActiveResolverFactory, ActiveResolverOptions, Target,
///   resolver::{NameResolver, NameResolverFactory, ResolverArgs, memory::MemoryResolverFactory},
/// };
///
/// # struct Print;
/// # impl active_resolver::resolver::Listener for Print {
/// #   fn on_addresses(&self, addresses: Vec<std::net::SocketAddr>) { println!("{addresses:?}"); }
/// #   fn on_error(&self, error: active_resolver::ResolveError) { println!("{error}"); }
/// # }
/// let backend = MemoryResolverFactory::new();
/// backend.set_addresses("foo", [IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))]);
///
/// let factory = ActiveResolverFactory::new(
///   backend,
///   ActiveResolverOptions::new().with_max_refresh_interval(Duration::from_secs(30)),
/// )
/// .unwrap();
///
/// let target = Target::try_from("memory:///foo:1234").unwrap();
/// let resolver = factory.new_resolver(&target, &ResolverArgs::new()).unwrap().unwrap();
/// resolver.start(std::sync::Arc::new(Print)).unwrap();
/// resolver.refresh().unwrap();
/// resolver.shutdown().unwrap();
/// ```
pub struct ActiveResolver<R> {
  inner: Arc<Inner<R>>,
}

impl<R: NameResolver> core::fmt::Debug for ActiveResolver<R> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("ActiveResolver")
      .field("authority", &self.inner.resolver.service_authority())
      .field("max_refresh_interval", &self.inner.max_refresh_interval)
      .field(
        "lifecycle",
        &self.inner.state.try_lock().map(|state| state.lifecycle),
      )
      .finish()
  }
}

impl<R: NameResolver> ActiveResolver<R> {
  /// Wraps `resolver`, scheduling refreshes on the process-wide shared timer service.
  pub fn new(resolver: R, opts: ActiveResolverOptions) -> Result<Self, Error> {
    Self::builder(resolver).with_options(opts).build()
  }

  /// Wraps `resolver`, scheduling refreshes on `timer`.
  ///
  /// The timer is never shut down by the resolver.
  pub fn with_timer(
    resolver: R,
    opts: ActiveResolverOptions,
    timer: Arc<dyn TimerService>,
  ) -> Result<Self, Error> {
    Self::builder(resolver)
      .with_options(opts)
      .with_timer(timer)
      .build()
  }

  /// Returns a builder wrapping `resolver`.
  pub fn builder(resolver: R) -> ActiveResolverBuilder<R> {
    ActiveResolverBuilder {
      resolver,
      opts: ActiveResolverOptions::default(),
      timer: None,
      observer: None,
      holder: SharedTimerHolder::global(),
    }
  }

  /// Returns the current phase of the resolver.
  pub fn lifecycle(&self) -> Lifecycle {
    self.inner.state.lock().lifecycle
  }

  /// Returns `true` if refreshes are scheduled on a shared timer service.
  pub fn uses_shared_timer(&self) -> bool {
    matches!(self.inner.timer, TimerSource::Shared { .. })
  }

  /// Returns the time without any refresh after which a refresh is triggered.
  pub fn max_refresh_interval(&self) -> Duration {
    self.inner.max_refresh_interval
  }

  /// Returns the wrapped resolver.
  pub fn get_ref(&self) -> &R {
    &self.inner.resolver
  }
}

impl<R: NameResolver> NameResolver for ActiveResolver<R> {
  fn service_authority(&self) -> &str {
    self.inner.resolver.service_authority()
  }

  fn start(&self, listener: Arc<dyn Listener>) -> Result<(), Error> {
    let mut state = self.inner.state.lock();
    match state.lifecycle {
      Lifecycle::Unstarted => {}
      Lifecycle::Active => return Err(Error::AlreadyStarted),
      Lifecycle::ShutDown => return Err(Error::AlreadyShutdown),
    }

    self.inner.resolver.start(listener)?;
    state.lifecycle = Lifecycle::Active;
    self.inner.schedule_refresh(&mut state);
    Ok(())
  }

  fn refresh(&self) -> Result<(), Error> {
    let mut state = self.inner.state.lock();
    match state.lifecycle {
      Lifecycle::Active => {}
      Lifecycle::Unstarted => return Err(Error::NotStarted),
      Lifecycle::ShutDown => return Err(Error::AlreadyShutdown),
    }

    state.cancel_scheduled();
    let res = panic::catch_unwind(AssertUnwindSafe(|| self.inner.resolver.refresh()));
    self.inner.notify(RefreshTrigger::ExplicitRequest);
    self.inner.schedule_refresh(&mut state);
    match res {
      Ok(res) => res,
      Err(payload) => {
        drop(state);
        panic::resume_unwind(payload)
      }
    }
  }

  fn shutdown(&self) -> Result<(), Error> {
    let mut state = self.inner.state.lock();
    if state.lifecycle == Lifecycle::ShutDown {
      return Ok(());
    }

    state.lifecycle = Lifecycle::ShutDown;
    state.cancel_scheduled();
    let released = self.inner.timer.release();
    let res = self.inner.resolver.shutdown();

    #[cfg(feature = "tracing")]
    tracing::debug!(
      target: "active_resolver",
      authority = self.inner.resolver.service_authority(),
      "resolver shut down"
    );
    released.and(res)
  }
}

/// A builder of [`ActiveResolver`]s, see [`ActiveResolver::builder`].
pub struct ActiveResolverBuilder<R> {
  resolver: R,
  opts: ActiveResolverOptions,
  timer: Option<Arc<dyn TimerService>>,
  observer: Option<Arc<dyn RefreshObserver>>,
  holder: &'static SharedTimerHolder,
}

impl<R: NameResolver> ActiveResolverBuilder<R> {
  /// Set the options in builder pattern
  pub fn with_options(mut self, opts: ActiveResolverOptions) -> Self {
    self.opts = opts;
    self
  }

  /// Set a dedicated timer service in builder pattern
  pub fn with_timer(mut self, timer: Arc<dyn TimerService>) -> Self {
    self.timer = Some(timer);
    self
  }

  /// Set the observer of refresh events in builder pattern
  pub fn with_observer(mut self, observer: Arc<dyn RefreshObserver>) -> Self {
    self.observer = Some(observer);
    self
  }

  /// Set the holder the shared timer service is acquired from when no
  /// dedicated timer is given, in builder pattern. Defaults to
  /// [`SharedTimerHolder::global`].
  pub fn with_shared_holder(mut self, holder: &'static SharedTimerHolder) -> Self {
    self.holder = holder;
    self
  }

  /// Builds the resolver, acquiring the shared timer service if no dedicated one was set.
  pub fn build(self) -> Result<ActiveResolver<R>, Error> {
    self.opts.validate()?;

    let timer = match self.timer {
      Some(timer) => TimerSource::Dedicated(timer),
      None => TimerSource::Shared {
        holder: self.holder,
        service: self.holder.acquire()?,
      },
    };

    Ok(ActiveResolver {
      inner: Arc::new(Inner {
        resolver: self.resolver,
        timer,
        max_refresh_interval: self.opts.max_refresh_interval,
        observer: self.observer,
        state: Mutex::new(State {
          lifecycle: Lifecycle::Unstarted,
          scheduled: None,
          generation: 0,
        }),
      }),
    })
  }
}
