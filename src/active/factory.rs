use std::sync::Arc;

use tokio::runtime::Handle;

use super::{ActiveResolver, ActiveResolverOptions, RefreshObserver};
use crate::{
  Error, Target,
  resolver::{NameResolverFactory, ResolverArgs, system::SystemResolverFactory},
  timer::{SharedTimerHolder, TimerService},
};

/// A [`NameResolverFactory`] wrapping every resolver of an underlying factory
/// in an [`ActiveResolver`].
///
/// Without a dedicated timer service, each produced resolver acquires its own
/// reference to the shared one and gives it back on shutdown.
pub struct ActiveResolverFactory<F> {
  underlying: F,
  opts: ActiveResolverOptions,
  timer: Option<Arc<dyn TimerService>>,
  observer: Option<Arc<dyn RefreshObserver>>,
  holder: &'static SharedTimerHolder,
}

impl<F: NameResolverFactory> ActiveResolverFactory<F> {
  /// Create a new [`ActiveResolverFactory`] whose resolvers use the shared timer service.
  pub fn new(underlying: F, opts: ActiveResolverOptions) -> Result<Self, Error> {
    opts.validate()?;
    Ok(Self {
      underlying,
      opts,
      timer: None,
      observer: None,
      holder: SharedTimerHolder::global(),
    })
  }

  /// Create a new [`ActiveResolverFactory`] whose resolvers all schedule on `timer`.
  pub fn with_timer(
    underlying: F,
    opts: ActiveResolverOptions,
    timer: Arc<dyn TimerService>,
  ) -> Result<Self, Error> {
    let mut this = Self::new(underlying, opts)?;
    this.timer = Some(timer);
    Ok(this)
  }

  /// Set the observer given to every produced resolver in builder pattern
  pub fn with_observer(mut self, observer: Arc<dyn RefreshObserver>) -> Self {
    self.observer = Some(observer);
    self
  }

  /// Set the holder the shared timer service is acquired from in builder pattern
  pub fn with_shared_holder(mut self, holder: &'static SharedTimerHolder) -> Self {
    self.holder = holder;
    self
  }

  /// Returns the underlying factory.
  pub fn underlying(&self) -> &F {
    &self.underlying
  }

  /// Returns the options given to every produced resolver.
  pub fn options(&self) -> &ActiveResolverOptions {
    &self.opts
  }
}

impl ActiveResolverFactory<SystemResolverFactory> {
  /// Create a new [`ActiveResolverFactory`] over the operating system resolver,
  /// with lookups running on `handle`.
  pub fn system(handle: Handle, opts: ActiveResolverOptions) -> Result<Self, Error> {
    Self::new(SystemResolverFactory::new(handle), opts)
  }
}

impl<F: NameResolverFactory> NameResolverFactory for ActiveResolverFactory<F> {
  type Resolver = ActiveResolver<F::Resolver>;

  fn new_resolver(
    &self,
    target: &Target,
    args: &ResolverArgs,
  ) -> Result<Option<Self::Resolver>, Error> {
    let Some(resolver) = self.underlying.new_resolver(target, args)? else {
      return Ok(None);
    };

    let mut builder = ActiveResolver::builder(resolver)
      .with_options(self.opts)
      .with_shared_holder(self.holder);
    if let Some(timer) = &self.timer {
      builder = builder.with_timer(timer.clone());
    }
    if let Some(observer) = &self.observer {
      builder = builder.with_observer(observer.clone());
    }
    builder.build().map(Some)
  }

  fn default_scheme(&self) -> &str {
    self.underlying.default_scheme()
  }
}
