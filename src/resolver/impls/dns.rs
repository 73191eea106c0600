use std::{net::SocketAddr, sync::Arc};

pub use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use smol_str::SmolStr;
use tokio::runtime::Handle;

use super::{
  super::{Listener, NameResolver, NameResolverFactory, ResolverArgs},
  Subscription,
};
use crate::{Error, ResolveError, Target};

const SCHEME: &str = "dns";

/// The options used to construct a [`DnsResolverFactory`].
///
/// With the `serde` feature, missing fields deserialize to their defaults.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DnsResolverOptions {
  #[cfg_attr(feature = "serde", serde(rename = "options"))]
  resolver_opts: ResolverOpts,
  #[cfg_attr(feature = "serde", serde(rename = "config"))]
  resolver_config: ResolverConfig,
}

impl DnsResolverOptions {
  /// Create a new [`DnsResolverOptions`] using the name servers of the default configuration.
  pub fn new() -> Self {
    Self::default()
  }

  /// Set which name servers are queried, in builder pattern
  pub fn with_resolver_config(mut self, config: ResolverConfig) -> Self {
    self.resolver_config = config;
    self
  }

  /// Returns which name servers are queried.
  pub fn resolver_config(&self) -> &ResolverConfig {
    &self.resolver_config
  }

  /// Set how queries are sent and cached, in builder pattern
  pub fn with_resolver_opts(mut self, opts: ResolverOpts) -> Self {
    self.resolver_opts = opts;
    self
  }

  /// Returns how queries are sent and cached.
  pub fn resolver_opts(&self) -> &ResolverOpts {
    &self.resolver_opts
  }
}

/// A factory of resolvers which send DNS queries for `dns` targets.
///
/// All resolvers created by one factory share the same DNS client, and
/// therefore its cache.
#[derive(Clone)]
pub struct DnsResolverFactory {
  dns: TokioAsyncResolver,
  handle: Handle,
}

impl DnsResolverFactory {
  /// Create a new [`DnsResolverFactory`] with the given options, running
  /// queries on `handle`.
  pub fn new(handle: Handle, opts: DnsResolverOptions) -> Self {
    Self {
      dns: TokioAsyncResolver::tokio(opts.resolver_config, opts.resolver_opts),
      handle,
    }
  }
}

impl NameResolverFactory for DnsResolverFactory {
  type Resolver = DnsResolver;

  fn new_resolver(&self, target: &Target, args: &ResolverArgs) -> Result<Option<DnsResolver>, Error> {
    if target.scheme() != SCHEME {
      return Ok(None);
    }

    Ok(Some(DnsResolver {
      authority: SmolStr::new(target.endpoint()),
      host: SmolStr::new(target.host()),
      port: args.port_for(target),
      dns: self.dns.clone(),
      handle: self.handle.clone(),
      subscription: Arc::new(Subscription::default()),
    }))
  }

  fn default_scheme(&self) -> &str {
    SCHEME
  }
}

/// A resolver which sends A/AAAA queries for its host on every resolution pass.
///
/// A refresh requested while a query is in flight is folded into that query.
pub struct DnsResolver {
  authority: SmolStr,
  host: SmolStr,
  port: u16,
  dns: TokioAsyncResolver,
  handle: Handle,
  subscription: Arc<Subscription>,
}

impl DnsResolver {
  fn resolve(&self) -> Result<(), Error> {
    if !self.subscription.begin()? {
      return Ok(());
    }

    let dns = self.dns.clone();
    let host = self.host.clone();
    let port = self.port;
    let subscription = self.subscription.clone();
    self.handle.spawn(async move {
      let lookup = dns.lookup_ip(host.as_str()).await;
      let result = match lookup {
        Ok(lookup) => {
          let addrs: Vec<_> = lookup.iter().map(|ip| SocketAddr::new(ip, port)).collect();
          if addrs.is_empty() {
            Err(ResolveError::NotFound(host))
          } else {
            Ok(addrs)
          }
        }
        Err(e) => {
          #[cfg(feature = "tracing")]
          tracing::warn!(
            target: "active_resolver.resolver.dns",
            "failed to resolve {}: {}",
            host,
            e
          );
          Err(ResolveError::Dns(e))
        }
      };
      subscription.complete(result);
    });
    Ok(())
  }
}

impl NameResolver for DnsResolver {
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
