//! Shared fixtures for unit tests: a metadata writer and a PE wrapper, so scanners can be
//! exercised end-to-end without binary samples.


pub use builder::MetadataBuilder;
pub use pe::PeBuilder;
