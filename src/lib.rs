// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # cilguard
//!
//! A content sandbox for .NET assemblies. `cilguard` decides whether an untrusted assembly (a
//! game mod, a plugin, a user supplied build artifact) is safe to load by verifying its IL and
//! checking every external type and member it references against a declarative whitelist.
//!
//! ## Features
//!
//! - **Metadata parsing** - PE images, the CLI header, heaps and the ECMA-335 tables
//! - **Signature decoding** - fields, methods and type specifications through a pluggable
//!   type provider
//! - **Whitelist policy** - namespaces, wholesale trusted assemblies and per-type field, method
//!   and inheritance rules loaded from JSON
//! - **Policy scanners** - type references, member references, inheritance, unmanaged methods
//!   and explicit layout abuse
//! - **IL verification** - structural checks of every method body, with tolerated finding kinds
//!   configurable per policy
//! - **Parallel scanning** - member references are checked on the `rayon` pool
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cilguard::{AssemblyChecker, SandboxConfig};
//!
//! let config = SandboxConfig::from_file("whitelist.json".as_ref())?;
//! let report = AssemblyChecker::new(&config).check_file("Mod.dll".as_ref())?;
//!
//! if report.is_safe() {
//!     println!("{} may be loaded", report.assembly_name);
//! } else {
//!     for violation in &report.violations {
//!         println!("{violation}");
//!     }
//! }
//! # Ok::<(), cilguard::Error>(())
//! ```
//!
//! ## Policy
//!
//! ```json
//! {
//!     "SystemAssemblyName": "System.Runtime",
//!     "WhitelistedNamespaces": ["System.Collections.Generic"],
//!     "MultiAssemblyOtherReferences": ["Game.Api"],
//!     "AllowedVerifierErrors": [],
//!     "Types": {
//!         "System": {
//!             "Object": { "All": true },
//!             "Math": { "Methods": ["double Sqrt(double)", "int Max(int, int)"] },
//!             "Exception": { "Inherit": "Allow", "Methods": ["void .ctor(string)"] }
//!         }
//!     }
//! }
//! ```
//!
//! A reference is allowed if its type is allowed and, unless the type is allowed with `All`,
//! its exact field type or method overload is listed. Policy violations never fail a scan;
//! they are collected into the [`ScanReport`]. Only malformed images and broken invariants are
//! returned as [`Error`].
//!
//! ## Logging
//!
//! Progress and violations are reported through the `log` facade and, optionally, to a
//! [`ScanLog`] sink supplied with [`AssemblyChecker::with_log_sink`].
//!
//! ## Standards Compliance
//!
//! Metadata structures and the CIL instruction set follow the **ECMA-335 specification**
//! (6th edition).
//!
//! - [ECMA-335 Standard](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Definitions and parsing of CIL metadata based on ECMA-335
///
/// Read-only access to the CLI header, the metadata root, heaps and tables, and the signature
/// decoder. [`metadata::reader::MetadataReader`] is the entry point.
pub mod metadata;

/// The content sandbox: type model, policy, scanners, IL verification and the checker
pub mod sandbox;

/// `cilguard` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilguard` Error type
///
/// Covers malformed images, I/O failures, invalid policies and broken invariants. Policy
/// violations are not errors.
pub use error::Error;

pub use metadata::reader::MetadataReader;
pub use sandbox::{
    AssemblyChecker, MType, MemberRef, SandboxConfig, SandboxError, ScanLog, ScanLogKind,
    ScanOptions, ScanReport, TypeConfig, TypeReference,
};
