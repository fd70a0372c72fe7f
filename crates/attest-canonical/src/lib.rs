//! Attest Canonical - deterministic value encoding for signing.
//!
//! This crate provides:
//! - A tagged-variant structured value type ([`CanonicalValue`])
//! - A deterministic, Unicode-normalized textual encoding ([`encode`])
//!
//! The encoding is the exact byte input to signature computation, so two
//! structurally equal values must always encode to the same text no matter
//! how they were built: mapping keys are sorted by their normalized form,
//! strings are normalized before emission, map/set members are sorted by
//! their encoded form, and every value kind without a native JSON
//! representation is emitted as a tagged marker so the output stays
//! parseable JSON.
//!
//! # Example
//!
//! ```
//! use attest_canonical::{encode, CanonicalOptions, CanonicalValue};
//!
//! let a = CanonicalValue::Mapping(vec![
//!     ("b".to_string(), CanonicalValue::from(1)),
//!     ("a".to_string(), CanonicalValue::from(2)),
//! ]);
//! let b = CanonicalValue::Mapping(vec![
//!     ("a".to_string(), CanonicalValue::from(2)),
//!     ("b".to_string(), CanonicalValue::from(1)),
//! ]);
//!
//! let opts = CanonicalOptions::default();
//! assert_eq!(encode(&a, &opts).unwrap(), encode(&b, &opts).unwrap());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod encode;
mod error;
mod value;

pub use encode::{CanonicalOptions, CyclePolicy, DateMode, UnicodeForm, encode};
pub use error::{EncodeError, EncodeResult};
pub use value::{CanonicalValue, SharedValue};
