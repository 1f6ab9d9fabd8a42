//! The policy scanners.
//!
//! Each scanner reads the same immutable metadata snapshot and appends to one shared
//! [`Violations`] sink, so they can run in any order or concurrently:
//!
//! - [`typerefs`] - every `TypeRef` must be an allowed type
//! - [`memberrefs`] - every `MemberRef` must target a whitelisted field or method overload
//! - [`inheritance`] - external base types and interfaces must allow inheritance
//! - [`unmanaged`] - no P/Invoke, native or unmanaged-export methods
//! - [`typeabuse`] - no explicit-layout types with fields
//!
//! Collection and checking are separate steps: references are collected once (recording
//! metadata the sandbox refuses to model as violations) and then checked against a policy.

pub mod inheritance;
pub mod memberrefs;
pub mod typeabuse;
pub mod typerefs;
pub mod unmanaged;

use crate::{sandbox::sink::Violations, Error, Result};

/// Turn [`Error::UnsupportedMetadata`] into a violation; every other error stays fatal
pub(crate) fn record_unsupported<T>(
    result: Result<T>,
    violations: &Violations,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::UnsupportedMetadata(message)) => {
            violations.push(message);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
