use std::{net::SocketAddr, sync::Arc};

use parking_lot::Mutex;

use super::Listener;
use crate::{Error, ResolveError};

/// In-memory resolver backed by a host table
pub mod memory;

/// Operating system resolver
pub mod system;

/// Async DNS resolver
#[cfg(feature = "dns")]
#[cfg_attr(docsrs, doc(cfg(feature = "dns")))]
pub mod dns;

/// Listener registration and in-flight bookkeeping shared by the backends.
#[derive(Default)]
pub(crate) struct Subscription {
  state: Mutex<SubscriptionState>,
}

#[derive(Default)]
struct SubscriptionState {
  listener: Option<Arc<dyn Listener>>,
  resolving: bool,
  shutdown: bool,
}

impl Subscription {
  pub(crate) fn subscribe(&self, listener: Arc<dyn Listener>) -> Result<(), Error> {
    let mut state = self.state.lock();
    if state.shutdown {
      return Err(Error::AlreadyShutdown);
    }
    if state.listener.is_some() {
      return Err(Error::AlreadyStarted);
    }
    state.listener = Some(listener);
    Ok(())
  }

  /// Returns `true` if the caller should run a resolution pass, `false` if
  /// one is already in flight and will deliver fresh results.
  pub(crate) fn begin(&self) -> Result<bool, Error> {
    let mut state = self.state.lock();
    if state.shutdown {
      return Err(Error::AlreadyShutdown);
    }
    if state.listener.is_none() {
      return Err(Error::NotStarted);
    }
    if state.resolving {
      return Ok(false);
    }
    state.resolving = true;
    Ok(true)
  }

  pub(crate) fn complete(&self, result: Result<Vec<SocketAddr>, ResolveError>) {
    let listener = {
      let mut state = self.state.lock();
      state.resolving = false;
      if state.shutdown {
        return;
      }
      state.listener.clone()
    };

    if let Some(listener) = listener {
      match result {
        Ok(addresses) => listener.on_addresses(addresses),
        Err(e) => listener.on_error(e),
      }
    }
  }

  pub(crate) fn cancel(&self) {
    let mut state = self.state.lock();
    state.shutdown = true;
    state.listener = None;
  }
}
