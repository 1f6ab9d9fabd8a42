use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

macro_rules! invariant_error {
    ($msg:expr) => {
        crate::Error::Invariant($msg.to_string())
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Invariant(format!($fmt, $($arg)*))
    };
}

/// The generic Error type, which covers every failure this library can return.
///
/// Policy violations found while scanning are *not* errors: they are collected into a
/// [`crate::ScanReport`]. An `Err` from this crate means the scan itself could not complete,
/// either because the input is not a readable .NET image or because the metadata contains
/// a shape that can only come from a corrupted or adversarially crafted binary.
///
/// # Error Categories
///
/// ## File Parsing Errors
/// - [`Error::Malformed`] - Corrupted or invalid file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond buffer boundaries
/// - [`Error::NotSupported`] - Unsupported file format or feature
/// - [`Error::Empty`] - Empty input provided
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::GoblinErr`] - PE parsing errors from the goblin crate
/// - [`Error::Json`] - Sandbox configuration could not be deserialized
///
/// ## Scan Errors
/// - [`Error::Invariant`] - Metadata shape the type model cannot represent (fatal)
/// - [`Error::UnsupportedMetadata`] - Construct recorded as a violation rather than modelled
/// - [`Error::RecursionLimit`] - Maximum signature / scope nesting depth exceeded
/// - [`Error::Config`] - Whitelist declaration could not be parsed
///
/// # Examples
///
/// ```rust,no_run
/// use cilguard::{Error, MetadataReader};
///
/// match MetadataReader::from_file(std::path::Path::new("Mod.dll")) {
///     Ok(reader) => println!("{} type definitions", reader.type_def_count()),
///     Err(Error::NotSupported) => eprintln!("not a supported .NET image"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("malformed: {} ({}:{})", message, file, line)
///     }
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The file is damaged and could not be parsed.
    ///
    /// Includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// This file type is not supported.
    ///
    /// The input is not a .NET PE image, or uses a metadata layout this library
    /// does not read (for example uncompressed `#-` tables or portable PDB tables).
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during PE parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// The metadata contains a shape the type model does not represent.
    ///
    /// Reachable only through corrupted or adversarially crafted input. The scan is
    /// aborted; this is distinct from a policy violation.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// The metadata uses a construct the sandbox refuses to model, such as a type forwarded
    /// through a nil resolution scope or a cross-module reference.
    ///
    /// Scanners record this as a policy violation and continue with the next reference.
    #[error("Unsupported metadata: {0}")]
    UnsupportedMetadata(String),

    /// Recursion limit reached while decoding nested signatures or scopes.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// A whitelist declaration in the sandbox configuration is invalid.
    #[error("Invalid sandbox configuration: {0}")]
    Config(String),

    /// The sandbox configuration document is not valid JSON for the expected shape.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}
