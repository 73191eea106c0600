#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

mod active;
mod error;
mod target;

pub use active::*;
pub use error::*;
pub use target::*;

/// Name resolver contracts and backends.
pub mod resolver;

/// Timer dispatch services used to schedule refreshes.
pub mod timer;

pub use cheap_clone::CheapClone;

#[cfg(test)]
mod testing;
