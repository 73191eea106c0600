use core::str::FromStr;
use std::net::IpAddr;

use cheap_clone::CheapClone;
use smol_str::{SmolStr, format_smolstr};

/// An error which can be returned when parsing a [`Target`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseTargetError {
  /// Returned if the provided str does not start with `scheme:`.
  #[error("target is missing scheme")]
  MissingScheme,
  /// Returned if the scheme contains characters outside `[a-zA-Z0-9+.-]`.
  #[error("invalid scheme: {0}")]
  InvalidScheme(SmolStr),
  /// Returned if the endpoint has no host.
  #[error("target is missing host")]
  MissingHost,
  /// Returned if an IPv6 host is opened with `[` but never closed.
  #[error("unterminated bracket in {0}")]
  UnterminatedBracket(SmolStr),
  /// Returned if the provided str is not a valid port.
  #[error("invalid port: {0}")]
  InvalidPort(#[from] core::num::ParseIntError),
}

/// A resolution target such as `dns:///example.com:443`.
///
/// Two forms are understood:
/// 1. `scheme://authority/endpoint`, the authority may be empty (`dns:///foo:1234`)
/// 2. `scheme:endpoint` (`memory:foo`)
///
/// The endpoint is further split into a host and an optional port:
/// `[::1]:8080`, `::1`, `127.0.0.1:8080`, `example.com:8080` and `example.com`
/// are all valid endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
  scheme: SmolStr,
  authority: Option<SmolStr>,
  endpoint: SmolStr,
  host: SmolStr,
  port: Option<u16>,
  hierarchical: bool,
}

impl CheapClone for Target {}

impl core::fmt::Display for Target {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    if self.hierarchical {
      write!(
        f,
        "{}://{}/{}",
        self.scheme,
        self.authority.as_deref().unwrap_or_default(),
        self.endpoint
      )
    } else {
      write!(f, "{}:{}", self.scheme, self.endpoint)
    }
  }
}

impl FromStr for Target {
  type Err = ParseTargetError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let Some((scheme, rest)) = s.split_once(':') else {
      return Err(ParseTargetError::MissingScheme);
    };
    validate_scheme(scheme)?;

    let (authority, endpoint, hierarchical) = match rest.strip_prefix("//") {
      Some(rest) => {
        let (authority, endpoint) = rest.split_once('/').unwrap_or((rest, ""));
        let authority = (!authority.is_empty()).then(|| SmolStr::new(authority));
        (authority, endpoint, true)
      }
      None => (None, rest, false),
    };

    let (host, port) = split_host_port(endpoint)?;
    Ok(Self {
      scheme: SmolStr::new(scheme),
      authority,
      endpoint: SmolStr::new(endpoint),
      host,
      port,
      hierarchical,
    })
  }
}

impl TryFrom<&str> for Target {
  type Error = ParseTargetError;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    Self::from_str(value)
  }
}

impl TryFrom<String> for Target {
  type Error = ParseTargetError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::from_str(value.as_str())
  }
}

impl Target {
  /// Parses `input`, falling back to `{scheme}:///{input}` when `input`
  /// cannot be parsed as a target on its own, or when it is a bare
  /// `host:port` whose host merely looks like a scheme.
  ///
  /// ```
  /// use active_resolver::Target;
  ///
  /// let target = Target::with_default_scheme("[::1]:50051", "dns").unwrap();
  /// assert_eq!(target.scheme(), "dns");
  /// assert_eq!(target.port(), Some(50051));
  ///
  /// let target = Target::with_default_scheme("localhost:8080", "dns").unwrap();
  /// assert_eq!(target.host(), "localhost");
  /// assert_eq!(target.port(), Some(8080));
  /// ```
  pub fn with_default_scheme(input: &str, scheme: &str) -> Result<Self, ParseTargetError> {
    match Self::from_str(input) {
      Ok(target) if !target.is_host_port() => Ok(target),
      _ => Self::from_str(format_smolstr!("{scheme}:///{input}").as_str()),
    }
  }

  /// `localhost:8080` parses as scheme `localhost` with endpoint `8080`, an
  /// opaque endpoint made of digits only is a port.
  fn is_host_port(&self) -> bool {
    !self.hierarchical
      && !self.endpoint.is_empty()
      && self.endpoint.bytes().all(|b| b.is_ascii_digit())
  }

  /// Returns the scheme, which selects the resolver backend.
  #[inline]
  pub fn scheme(&self) -> &str {
    &self.scheme
  }

  /// Returns the authority, if the target carries a non-empty one.
  #[inline]
  pub fn authority(&self) -> Option<&str> {
    self.authority.as_deref()
  }

  /// Returns the endpoint, the part of the target naming what to resolve.
  #[inline]
  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  /// Returns the host of the endpoint, without brackets for IPv6 literals.
  #[inline]
  pub fn host(&self) -> &str {
    &self.host
  }

  /// Returns the port of the endpoint, if any.
  #[inline]
  pub const fn port(&self) -> Option<u16> {
    self.port
  }
}

fn validate_scheme(scheme: &str) -> Result<(), ParseTargetError> {
  let mut chars = scheme.chars();
  match chars.next() {
    None => Err(ParseTargetError::MissingScheme),
    Some(c) if !c.is_ascii_alphabetic() => Err(ParseTargetError::InvalidScheme(scheme.into())),
    Some(_) => {
      if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Ok(())
      } else {
        Err(ParseTargetError::InvalidScheme(scheme.into()))
      }
    }
  }
}

fn split_host_port(endpoint: &str) -> Result<(SmolStr, Option<u16>), ParseTargetError> {
  if let Some(rest) = endpoint.strip_prefix('[') {
    let Some((host, rest)) = rest.split_once(']') else {
      return Err(ParseTargetError::UnterminatedBracket(endpoint.into()));
    };
    if host.is_empty() {
      return Err(ParseTargetError::MissingHost);
    }
    let port = match rest.strip_prefix(':') {
      Some(port) => Some(port.parse()?),
      None if rest.is_empty() => None,
      None => return Err(ParseTargetError::MissingHost),
    };
    return Ok((SmolStr::new(host), port));
  }

  // bare IPv6 literal, every colon belongs to the address
  if endpoint.parse::<IpAddr>().is_ok() {
    return Ok((SmolStr::new(endpoint), None));
  }

  let (host, port) = match endpoint.rsplit_once(':') {
    Some((host, port)) => (host, Some(port.parse()?)),
    None => (endpoint, None),
  };
  if host.is_empty() {
    return Err(ParseTargetError::MissingHost);
  }
  Ok((SmolStr::new(host), port))
}
