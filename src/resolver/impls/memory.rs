use std::{
  net::{IpAddr, SocketAddr},
  sync::Arc,
};

use crossbeam_skiplist::SkipMap;
use smol_str::SmolStr;

use super::{
  super::{Listener, NameResolver, NameResolverFactory, ResolverArgs},
  Subscription,
};
use crate::{Error, ResolveError, Target};

const DEFAULT_SCHEME: &str = "memory";

/// A factory of resolvers which look hosts up in an in-memory table.
///
/// The table is shared by the factory and every resolver it created, so
/// [`set_addresses`](MemoryResolverFactory::set_addresses) changes what the
/// next resolution pass of each of them observes.
///
/// ```
/// use std::net::{IpAddr, Ipv4Addr};
/// use active_resolver::{Target, resolver::{NameResolverFactory, ResolverArgs, memory::MemoryResolverFactory}};
///
/// let factory = MemoryResolverFactory::new();
/// factory.set_addresses("foo", [IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))]);
///
/// let target = Target::try_from("memory:///foo:1234").unwrap();
/// assert!(factory.new_resolver(&target, &ResolverArgs::new()).unwrap().is_some());
///
/// let target = Target::try_from("dns:///foo:1234").unwrap();
/// assert!(factory.new_resolver(&target, &ResolverArgs::new()).unwrap().is_none());
/// ```
#[derive(Clone)]
pub struct MemoryResolverFactory {
  scheme: SmolStr,
  records: Arc<SkipMap<SmolStr, Vec<IpAddr>>>,
}

impl Default for MemoryResolverFactory {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryResolverFactory {
  /// Create a new [`MemoryResolverFactory`] handling the `memory` scheme.
  pub fn new() -> Self {
    Self {
      scheme: SmolStr::new_static(DEFAULT_SCHEME),
      records: Arc::new(SkipMap::new()),
    }
  }

  /// Set the scheme handled by this factory in builder pattern
  pub fn with_scheme(mut self, scheme: impl Into<SmolStr>) -> Self {
    self.scheme = scheme.into();
    self
  }

  /// Replace the addresses `host` resolves to.
  pub fn set_addresses(&self, host: impl Into<SmolStr>, addresses: impl IntoIterator<Item = IpAddr>) {
    self
      .records
      .insert(host.into(), addresses.into_iter().collect());
  }

  /// Forget `host`, later resolutions of it fail with [`ResolveError::NotFound`].
  pub fn remove(&self, host: &str) {
    self.records.remove(host);
  }
}

impl NameResolverFactory for MemoryResolverFactory {
  type Resolver = MemoryResolver;

  fn new_resolver(&self, target: &Target, args: &ResolverArgs) -> Result<Option<MemoryResolver>, Error> {
    if target.scheme() != self.scheme {
      return Ok(None);
    }

    Ok(Some(MemoryResolver {
      authority: SmolStr::new(target.endpoint()),
      host: SmolStr::new(target.host()),
      port: args.port_for(target),
      records: self.records.clone(),
      subscription: Subscription::default(),
    }))
  }

  fn default_scheme(&self) -> &str {
    &self.scheme
  }
}

/// A resolver created by [`MemoryResolverFactory`].
///
/// Resolution is synchronous: the listener is notified before
/// [`start`](NameResolver::start) and [`refresh`](NameResolver::refresh) return.
pub struct MemoryResolver {
  authority: SmolStr,
  host: SmolStr,
  port: u16,
  records: Arc<SkipMap<SmolStr, Vec<IpAddr>>>,
  subscription: Subscription,
}

impl MemoryResolver {
  fn resolve(&self) -> Result<(), Error> {
    if !self.subscription.begin()? {
      return Ok(());
    }

    let result = match self.host.parse::<IpAddr>() {
      Ok(ip) => Ok(vec![SocketAddr::new(ip, self.port)]),
      Err(_) => match self.records.get(self.host.as_str()) {
        Some(ent) if !ent.value().is_empty() => Ok(
          ent
            .value()
            .iter()
            .map(|ip| SocketAddr::new(*ip, self.port))
            .collect(),
        ),
        _ => Err(ResolveError::NotFound(self.host.clone())),
      },
    };
    self.subscription.complete(result);
    Ok(())
  }
}

impl NameResolver for MemoryResolver {
  fn service_authority(&self) -> &str {
    &self.authority
  }

  fn start(&self, listener: Arc<dyn Listener>) -> Result<(), Error> {
    self.subscription.subscribe(listener)?;
    self.resolve()
  }

  fn refresh(&self) -> Result<(), Error> {
    self.resolve()
  }

  fn shutdown(&self) -> Result<(), Error> {
    self.subscription.cancel();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::net::Ipv4Addr;

  use super::*;
  use crate::testing::CapturingListener;

  fn ip(a: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(a, a, a, a))
  }

  #[test]
  fn test_memory_resolver() {
    let factory = MemoryResolverFactory::new().with_scheme("dns");
    assert_eq!(factory.default_scheme(), "dns");
    factory.set_addresses("foo", [ip(1)]);

    let target = Target::try_from("dns:///foo:1234").unwrap();
    let resolver = factory
      .new_resolver(&target, &ResolverArgs::new())
      .unwrap()
      .unwrap();
    assert_eq!(resolver.service_authority(), "foo:1234");

    let listener = CapturingListener::new();
    resolver.start(listener.clone()).unwrap();
    assert_eq!(listener.addresses(), Some(vec![SocketAddr::new(ip(1), 1234)]));

    factory.set_addresses("foo", [ip(2), ip(3)]);
    assert_eq!(listener.addresses(), Some(vec![SocketAddr::new(ip(1), 1234)]));
    resolver.refresh().unwrap();
    assert_eq!(
      listener.addresses(),
      Some(vec![SocketAddr::new(ip(2), 1234), SocketAddr::new(ip(3), 1234)])
    );

    factory.remove("foo");
    resolver.refresh().unwrap();
    assert!(matches!(listener.take_error(), Some(ResolveError::NotFound(host)) if host == "foo"));

    resolver.shutdown().unwrap();
    assert!(matches!(resolver.refresh(), Err(Error::AlreadyShutdown)));
  }

  #[test]
  fn test_lifecycle_errors() {
    let factory = MemoryResolverFactory::new();
    let target = Target::try_from("memory:127.0.0.1").unwrap();
    let resolver = factory
      .new_resolver(&target, &ResolverArgs::new().with_default_port(80))
      .unwrap()
      .unwrap();

    assert!(matches!(resolver.refresh(), Err(Error::NotStarted)));

    let listener = CapturingListener::new();
    resolver.start(listener.clone()).unwrap();
    assert_eq!(
      listener.addresses(),
      Some(vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 80)])
    );
    assert!(matches!(
      resolver.start(listener),
      Err(Error::AlreadyStarted)
    ));
  }
}
