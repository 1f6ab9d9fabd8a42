//! Signature blob decoding for .NET metadata.
//!
//! Signatures encode field types, method parameter lists and type specifications in a compact
//! binary format (ECMA-335 II.23.2). The [`SignatureDecoder`] walks that grammar and hands each
//! piece to a [`TypeProvider`], which builds whatever type representation the caller needs. The
//! sandbox uses this to build its policy type model without an intermediate tree.
//!
//! # Implementation Notes
//!
//! - Custom modifiers (`modreq` / `modopt`) are reported as wrappers around the type they
//!   precede, so a provider that ignores them can simply return the unmodified type
//! - Parameters after a vararg sentinel are decoded like any other parameter
//! - Nesting is bounded; overly deep types yield [`crate::Error::RecursionLimit`]
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 23.2 - Blobs and Signatures

mod parser;
mod types;

pub use parser::*;
pub use types::*;

use crate::Result;

/// Decode a method signature blob with `provider`
///
/// # Errors
/// Returns an error if the signature data is malformed or parsing fails
pub fn decode_method_signature<P: TypeProvider>(
    data: &[u8],
    provider: &P,
) -> Result<MethodSignature<P::Type>> {
    SignatureDecoder::new(data, provider).decode_method_signature()
}

/// Decode a field signature blob with `provider`
///
/// # Errors
/// Returns an error if the signature data is malformed or parsing fails
pub fn decode_field_signature<P: TypeProvider>(data: &[u8], provider: &P) -> Result<P::Type> {
    SignatureDecoder::new(data, provider).decode_field_signature()
}

/// Decode a `TypeSpec` signature blob with `provider`
///
/// # Errors
/// Returns an error if the signature data is malformed or parsing fails
pub fn decode_type_spec<P: TypeProvider>(data: &[u8], provider: &P) -> Result<P::Type> {
    SignatureDecoder::new(data, provider).decode_type()
}
