use std::io;

use smol_str::SmolStr;

/// Errors returned by resolver, factory and timer operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// Returned when `start` is called on a resolver which is already running.
  #[error("resolver already started")]
  AlreadyStarted,
  /// Returned when `refresh` is called before `start`.
  #[error("resolver not started")]
  NotStarted,
  /// Returned when `start` or `refresh` is called after `shutdown`.
  #[error("resolver already shut down")]
  AlreadyShutdown,
  /// Returned when the max refresh interval is zero.
  #[error("max refresh interval must be greater than zero")]
  InvalidInterval,
  /// Returned when the runtime backing a timer service cannot be built.
  #[error("failed to build timer runtime: {0}")]
  Runtime(#[from] io::Error),
  /// Returned when a timer service is released to a holder which did not hand it out.
  #[error("timer service was not acquired from this shared holder")]
  SharedTimerRelease,
  /// Returned by a backend which fails synchronously.
  #[error(transparent)]
  Resolve(#[from] ResolveError),
}

impl Error {
  /// Returns `true` if the error was caused by calling an operation in the wrong lifecycle state.
  #[inline]
  pub const fn is_state_error(&self) -> bool {
    matches!(
      self,
      Self::AlreadyStarted | Self::NotStarted | Self::AlreadyShutdown
    )
  }
}

/// Errors delivered to a [`Listener`](crate::resolver::Listener) when a resolution pass fails.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
  /// Returned when the backend has no addresses for the host.
  #[error("cannot resolve an ip address for {0}")]
  NotFound(SmolStr),
  /// Returned when the operating system resolver fails.
  #[error("{0}")]
  Io(#[from] io::Error),
  /// Returned when a DNS query fails.
  #[cfg(feature = "dns")]
  #[cfg_attr(docsrs, doc(cfg(feature = "dns")))]
  #[error("{0}")]
  Dns(#[from] hickory_resolver::error::ResolveError),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_state_errors() {
    assert!(Error::AlreadyStarted.is_state_error());
    assert!(Error::NotStarted.is_state_error());
    assert!(Error::AlreadyShutdown.is_state_error());
    assert!(!Error::InvalidInterval.is_state_error());
    assert!(!Error::SharedTimerRelease.is_state_error());
  }

  #[test]
  fn test_display() {
    assert_eq!(Error::AlreadyShutdown.to_string(), "resolver already shut down");
    let err = Error::from(ResolveError::NotFound(SmolStr::new("foo")));
    assert_eq!(err.to_string(), "cannot resolve an ip address for foo");
  }
}
