use std::{
  net::ToSocketAddrs,
  sync::Arc,
};

use smol_str::SmolStr;
use tokio::runtime::Handle;

use super::{
  super::{Listener, NameResolver, NameResolverFactory, ResolverArgs},
  Subscription,
};
use crate::{Error, ResolveError, Target};

const SCHEME: &str = "dns";

/// A factory of resolvers which use the operating system resolver
/// ([`ToSocketAddrs`]) for `dns` targets.
///
/// Lookups run on the blocking pool of the given tokio runtime.
#[derive(Clone)]
pub struct SystemResolverFactory {
  handle: Handle,
}

impl SystemResolverFactory {
  /// Create a new [`SystemResolverFactory`] running lookups on `handle`.
  pub const fn new(handle: Handle) -> Self {
    Self { handle }
  }
}

impl NameResolverFactory for SystemResolverFactory {
  type Resolver = SystemResolver;

  fn new_resolver(&self, target: &Target, args: &ResolverArgs) -> Result<Option<SystemResolver>, Error> {
    if target.scheme() != SCHEME {
      return Ok(None);
    }

    Ok(Some(SystemResolver {
      authority: SmolStr::new(target.endpoint()),
      host: SmolStr::new(target.host()),
      port: args.port_for(target),
      handle: self.handle.clone(),
      subscription: Arc::new(Subscription::default()),
    }))
  }

  fn default_scheme(&self) -> &str {
    SCHEME
  }
}

/// A resolver which supports both `domain:port` and socket address. However,
/// it will only use [`ToSocketAddrs`] to resolve the address.
///
/// - If you want to send DNS queries, you may want to use `DnsResolver` (feature `dns`).
///
/// A refresh requested while a lookup is in flight is folded into that lookup.
pub struct SystemResolver {
  authority: SmolStr,
  host: SmolStr,
  port: u16,
  handle: Handle,
  subscription: Arc<Subscription>,
}

impl SystemResolver {
  fn resolve(&self) -> Result<(), Error> {
    if !self.subscription.begin()? {
      return Ok(());
    }

    let host = self.host.clone();
    let port = self.port;
    let subscription = self.subscription.clone();
    self.handle.spawn_blocking(move || {
      let lookup = ToSocketAddrs::to_socket_addrs(&(host.as_str(), port));
      let result = match lookup {
        Ok(addrs) => {
          let addrs: Vec<_> = addrs.collect();
          if addrs.is_empty() {
            Err(ResolveError::NotFound(host))
          } else {
            Ok(addrs)
          }
        }
        Err(e) => {
          #[cfg(feature = "tracing")]
          tracing::warn!(
            target: "active_resolver.resolver.system",
            "failed to resolve {}:{}: {}",
            host,
            port,
            e
          );
          Err(ResolveError::Io(e))
        }
      };
      subscription.complete(result);
    });
    Ok(())
  }
}

impl NameResolver for SystemResolver {
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
