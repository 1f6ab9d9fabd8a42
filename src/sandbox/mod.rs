//! The content sandbox.
//!
//! Everything needed to decide whether an untrusted assembly may be loaded: the type model that
//! references are resolved into, the whitelist configuration and its access rules, the policy
//! scanners, IL verification and the [`AssemblyChecker`] that drives them.
//!
//! # Architecture
//!
//! ```text
//! bytes ──> MetadataReader ──> native code pre-check ──> verify_il
//!                                                          │
//!              MetadataTypeProvider (TypeRef cache) <──────┘
//!                │
//!                ├── collect: type refs, member refs, inherited types
//!                └── check:   types, inheritance, unmanaged methods, type abuse, member refs
//!                                        │
//!                                   Violations ──> ScanReport
//! ```
//!
//! Metadata the sandbox refuses to model (forwarded types, cross-module references, module
//! level members, vararg call sites) is reported as a violation rather than an error; only
//! malformed images and broken invariants fail a scan with [`crate::Error`].

pub mod access;
pub mod checker;
pub mod config;
pub mod log;
pub mod members;
pub mod provider;
pub mod scanners;
pub mod sink;
pub mod types;
pub mod verify;

pub use checker::{AssemblyChecker, ScanOptions, ScanReport};
pub use config::{InheritMode, SandboxConfig, TypeConfig};
pub use self::log::{ScanLog, ScanLogKind};
pub use members::MemberRef;
pub use sink::{SandboxError, Violations};
pub use types::{MType, ResolutionScope, TypeReference};
