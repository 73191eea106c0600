use std::sync::Arc;

use parking_lot::{Mutex, const_mutex};

use super::TokioTimerService;
use crate::Error;

static GLOBAL: SharedTimerHolder = SharedTimerHolder::new();

struct Held {
  service: Arc<TokioTimerService>,
  refs: usize,
}

/// A reference-counted holder of a lazily created [`TokioTimerService`].
///
/// The first [`acquire`](SharedTimerHolder::acquire) creates the service, every
/// acquisition must be paired with exactly one
/// [`release`](SharedTimerHolder::release), and the release which drops the
/// count to zero shuts the service down. A later acquisition creates a fresh one.
pub struct SharedTimerHolder {
  held: Mutex<Option<Held>>,
}

impl Default for SharedTimerHolder {
  fn default() -> Self {
    Self::new()
  }
}

impl SharedTimerHolder {
  /// Create a new, empty [`SharedTimerHolder`].
  pub const fn new() -> Self {
    Self {
      held: const_mutex(None),
    }
  }

  /// Returns the process-wide holder.
  #[inline]
  pub fn global() -> &'static Self {
    &GLOBAL
  }

  /// Returns the shared service, creating it if nobody holds it.
  pub fn acquire(&self) -> Result<Arc<TokioTimerService>, Error> {
    let mut held = self.held.lock();
    match held.as_mut() {
      Some(held) => {
        held.refs += 1;
        Ok(held.service.clone())
      }
      None => {
        let service = Arc::new(TokioTimerService::new()?);
        *held = Some(Held {
          service: service.clone(),
          refs: 1,
        });
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "active_resolver.timer", "created shared timer service");
        Ok(service)
      }
    }
  }

  /// Gives back a service obtained from [`acquire`](SharedTimerHolder::acquire).
  pub fn release(&self, service: &Arc<TokioTimerService>) -> Result<(), Error> {
    let mut guard = self.held.lock();
    let held = match guard.as_mut() {
      Some(held) if Arc::ptr_eq(&held.service, service) => held,
      _ => return Err(Error::SharedTimerRelease),
    };

    held.refs -= 1;
    if held.refs == 0 {
      if let Some(held) = guard.take() {
        held.service.shutdown();
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "active_resolver.timer", "shut down shared timer service");
      }
    }
    Ok(())
  }

  /// Returns the number of outstanding acquisitions.
  pub fn ref_count(&self) -> usize {
    self.held.lock().as_ref().map_or(0, |held| held.refs)
  }
}
