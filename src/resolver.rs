use std::{net::SocketAddr, sync::Arc};

use crate::{Error, ResolveError, Target};

mod impls;
pub use impls::*;

/// The port used when neither the target nor the [`ResolverArgs`] name one.
pub const DEFAULT_PORT: u16 = 443;

/// Receives the results of resolution passes.
///
/// Backends may call the listener while holding internal locks, so
/// implementations must not call back into the resolver which notified them.
pub trait Listener: Send + Sync + 'static {
  /// Called with the full, current address set of the target.
  fn on_addresses(&self, addresses: Vec<SocketAddr>);

  /// Called when a resolution pass fails.
  fn on_error(&self, error: ResolveError);
}

/// Resolves one target into a set of addresses, delivering updates to the
/// [`Listener`] registered by [`start`](NameResolver::start).
pub trait NameResolver: Send + Sync + 'static {
  /// Returns a stable identifier of the target this resolver resolves.
  fn service_authority(&self) -> &str;

  /// Starts resolution, the first result is delivered to `listener`.
  fn start(&self, listener: Arc<dyn Listener>) -> Result<(), Error>;

  /// Requests a new resolution pass. Results are delivered asynchronously
  /// to the listener registered by [`start`](NameResolver::start).
  fn refresh(&self) -> Result<(), Error>;

  /// Stops resolution and releases the resources held by the resolver.
  fn shutdown(&self) -> Result<(), Error>;
}

impl<R: NameResolver + ?Sized> NameResolver for Box<R> {
  #[inline]
  fn service_authority(&self) -> &str {
    (**self).service_authority()
  }

  #[inline]
  fn start(&self, listener: Arc<dyn Listener>) -> Result<(), Error> {
    (**self).start(listener)
  }

  #[inline]
  fn refresh(&self) -> Result<(), Error> {
    (**self).refresh()
  }

  #[inline]
  fn shutdown(&self) -> Result<(), Error> {
    (**self).shutdown()
  }
}

/// Creates [`NameResolver`]s for targets.
pub trait NameResolverFactory: Send + Sync + 'static {
  /// The resolver type produced by this factory.
  type Resolver: NameResolver;

  /// Creates a resolver for `target`.
  ///
  /// Returns `Ok(None)` if this factory does not handle the target, e.g. its
  /// scheme belongs to another backend.
  fn new_resolver(
    &self,
    target: &Target,
    args: &ResolverArgs,
  ) -> Result<Option<Self::Resolver>, Error>;

  /// Returns the scheme used for targets which do not name one.
  fn default_scheme(&self) -> &str;
}

/// Parameters passed to a [`NameResolverFactory`] alongside the target.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolverArgs {
  default_port: Option<u16>,
}

impl ResolverArgs {
  /// Create a new [`ResolverArgs`].
  pub const fn new() -> Self {
    Self { default_port: None }
  }

  /// Set the port used when the target does not name one in builder pattern
  pub const fn with_default_port(mut self, port: u16) -> Self {
    self.default_port = Some(port);
    self
  }

  /// Set the port used when the target does not name one
  pub fn set_default_port(&mut self, port: Option<u16>) {
    self.default_port = port;
  }

  /// Returns the port used when the target does not name one
  pub const fn default_port(&self) -> Option<u16> {
    self.default_port
  }

  /// Returns the port to resolve `target` with.
  pub fn port_for(&self, target: &Target) -> u16 {
    target
      .port()
      .or(self.default_port)
      .unwrap_or(DEFAULT_PORT)
  }
}
