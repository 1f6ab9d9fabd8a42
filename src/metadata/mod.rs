//! Metadata parsing for .NET PE files.
//!
//! This module contains the read-only ECMA-335 parsing infrastructure the sandbox is built on:
//! the CLI header, the metadata root and its streams, the tables that describe definitions and
//! references, and the signature blobs that encode their types.
//!
//! # Key Components
//!
//! - [`reader::MetadataReader`] - Owns an image and hands out heap and table views
//! - [`tables`] - Typed row readers for the tables the sandbox inspects
//! - [`signatures`] - Signature decoding through a caller supplied type provider
//! - [`streams`] - `#Strings`, `#Blob`, `#US` and the `#~` tables header
//! - [`token`] - Metadata table row references
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilguard::metadata::{reader::MetadataReader, tables::TableId};
//!
//! let reader = MetadataReader::from_file("Mod.dll".as_ref())?;
//! println!("Assembly: {}", reader.assembly_name()?);
//! println!("MemberRefs: {}", reader.row_count(TableId::MemberRef));
//! # Ok::<(), cilguard::Error>(())
//! ```

/// Implementation of the Header of CIL
pub mod cor20header;
/// Owned, read-only access to the metadata of an image
pub mod reader;
/// Implementation of the root metadata structure
pub mod root;
/// Implementation of method and type signatures
pub mod signatures;
/// Implementation of the metadata streams (heaps and the tables header)
pub mod streams;
/// Implementation of the .NET metadata tables
pub mod tables;
/// Commonly used metadata token type
pub mod token;
