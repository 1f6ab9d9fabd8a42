//! The metadata streams (ECMA-335 II.24.2.2 - II.24.2.6).

mod blob;
mod streamheader;
mod strings;
mod tablesheader;
mod userstrings;

pub use blob::Blob;
pub use streamheader::StreamHeader;
pub use strings::Strings;
pub use tablesheader::TablesHeader;
pub use userstrings::UserStrings;
