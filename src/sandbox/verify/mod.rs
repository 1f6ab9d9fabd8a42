//! Bytecode verification.
//!
//! Verification is a capability injected into the checker: an [`IlVerifier`] produces
//! [`VerificationFinding`]s for each type definition and a [`FindingClassifier`] decides which
//! of them are real violations and which are tolerated artifacts. [`verify_il`] drives both and
//! reduces the outcome to a single verdict.
//!
//! The default verifier, [`StructuralVerifier`], checks the structure of every method body:
//! header format, instruction decoding, branch targets, token operands and exception clauses.
//! It does not track evaluation stack types.
//!
//! # Example
//!
//! ```rust,no_run
//! use cilguard::{
//!     metadata::reader::MetadataReader,
//!     sandbox::{log::discard, verify::{verify_il, ConfigClassifier, StructuralVerifier}},
//!     SandboxConfig,
//! };
//!
//! let reader = MetadataReader::from_file("Mod.dll".as_ref())?;
//! let config = SandboxConfig::default();
//! let verifier = StructuralVerifier;
//! let valid = verify_il(&reader, &config, &verifier, &ConfigClassifier, "Mod", &discard)?;
//! println!("IL valid: {valid}");
//! # Ok::<(), cilguard::Error>(())
//! ```

pub mod body;
pub mod opcodes;
mod structural;

use std::{fmt, time::Instant};

use strum::{Display, EnumIter, EnumString};

use crate::{
    metadata::{reader::MetadataReader, token::Token},
    sandbox::{
        config::SandboxConfig,
        log::{emit, LogSink, ScanLog},
    },
    Result,
};

pub use structural::StructuralVerifier;

/// Categories of verification findings. The names are the spellings accepted in
/// `AllowedVerifierErrors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum VerifierErrorKind {
    /// Unknown body header format or header size
    InvalidMethodHeader,
    /// The code of a body runs past the image
    CodeOutOfBounds,
    /// An opcode that ECMA-335 does not assign
    UnknownOpcode,
    /// An operand runs past the end of the code
    TruncatedInstruction,
    /// A branch or switch target outside the code
    BranchOutOfBounds,
    /// A branch or switch target in the middle of an instruction
    BranchIntoInstruction,
    /// A token operand that names a missing row or the wrong table
    InvalidToken,
    /// A malformed exception section or clause range
    InvalidExceptionClause,
    /// A method that needs a body has none
    MissingBody,
}

/// A problem found in one method body, before it is attributed to a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defect {
    /// Category
    pub kind: VerifierErrorKind,
    /// IL offset, when the problem is tied to one
    pub offset: Option<u32>,
    /// Description
    pub detail: String,
}

impl Defect {
    pub(crate) fn new(kind: VerifierErrorKind, detail: impl Into<String>) -> Self {
        Defect {
            kind,
            offset: None,
            detail: detail.into(),
        }
    }

    pub(crate) fn at(kind: VerifierErrorKind, offset: usize, detail: impl Into<String>) -> Self {
        Defect {
            kind,
            offset: u32::try_from(offset).ok(),
            detail: detail.into(),
        }
    }
}

/// A verification finding attributed to a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationFinding {
    /// Category
    pub kind: VerifierErrorKind,
    /// The `MethodDef` token
    pub token: Token,
    /// `Namespace.Type.Method`
    pub method: String,
    /// IL offset, when the problem is tied to one
    pub offset: Option<u32>,
    /// Description
    pub detail: String,
}

impl fmt::Display for VerificationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.method)?;
        if let Some(offset) = self.offset {
            write!(f, " [IL_{offset:04X}]")?;
        }
        write!(f, ": {} ({})", self.kind, self.detail)
    }
}

/// The assembly under verification.
#[derive(Clone, Copy)]
pub struct VerifyContext<'a> {
    /// Its metadata
    pub reader: &'a MetadataReader,
    /// Its name
    pub assembly_name: &'a str,
    /// Name of the core library from [`SandboxConfig::system_assembly_name`], empty when unset
    pub system_assembly_name: &'a str,
}

impl<'a> VerifyContext<'a> {
    /// Context for verifying `reader` under `config`
    #[must_use]
    pub fn new(
        reader: &'a MetadataReader,
        config: &'a SandboxConfig,
        assembly_name: &'a str,
    ) -> Self {
        VerifyContext {
            reader,
            assembly_name,
            system_assembly_name: &config.system_assembly_name,
        }
    }

    /// Returns `true` if the assembly under verification is the configured core library
    #[must_use]
    pub fn is_system_assembly(&self) -> bool {
        !self.system_assembly_name.is_empty() && self.assembly_name == self.system_assembly_name
    }
}

/// Produces findings for the methods of one type definition.
pub trait IlVerifier: Send + Sync {
    /// Verify every method of TypeDef row `type_def`.
    ///
    /// # Errors
    /// Returns an error only if the metadata itself cannot be read. Problems in method bodies
    /// are reported as findings.
    fn verify(
        &self,
        context: &VerifyContext<'_>,
        type_def: u32,
    ) -> Result<Vec<VerificationFinding>>;
}

/// Decides whether a finding is a real violation or a tolerated artifact.
pub trait FindingClassifier: Send + Sync {
    /// Returns `true` if `finding` must fail the assembly
    fn is_true_violation(
        &self,
        config: &SandboxConfig,
        finding: &VerificationFinding,
        assembly_name: &str,
        reader: &MetadataReader,
    ) -> bool;
}

/// Tolerates exactly the kinds listed in [`SandboxConfig::allowed_verifier_errors`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigClassifier;

impl FindingClassifier for ConfigClassifier {
    fn is_true_violation(
        &self,
        config: &SandboxConfig,
        finding: &VerificationFinding,
        _assembly_name: &str,
        _reader: &MetadataReader,
    ) -> bool {
        !config.allowed_verifier_errors.contains(&finding.kind)
    }
}

/// Verify every type definition and classify the findings.
///
/// True violations are reported to `sink` as errors. Returns `false` if there was at least one.
///
/// # Errors
/// Returns an error if the verifier cannot read the metadata.
pub fn verify_il(
    reader: &MetadataReader,
    config: &SandboxConfig,
    verifier: &dyn IlVerifier,
    classifier: &dyn FindingClassifier,
    assembly_name: &str,
    sink: LogSink<'_>,
) -> Result<bool> {
    emit(sink, ScanLog::info(format!("{assembly_name}: Verifying IL...")));
    let start = Instant::now();

    let context = VerifyContext::new(reader, config, assembly_name);
    let mut valid = true;
    for type_def in 1..=reader.type_def_count() {
        for finding in verifier.verify(&context, type_def)? {
            if classifier.is_true_violation(config, &finding, assembly_name, reader) {
                emit(sink, ScanLog::error(format!("{assembly_name}: {finding}")));
                valid = false;
            } else {
                log::debug!("{assembly_name}: tolerated {finding}");
            }
        }
    }

    emit(
        sink,
        ScanLog::info(format!(
            "{assembly_name}: Verified IL in {}ms",
            start.elapsed().as_millis()
        )),
    );

    Ok(valid)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        metadata::tables::TypeAttributes,
        sandbox::log::{discard, ScanLogKind},
        test::MetadataBuilder,
    };

    /// Reports one scripted finding for TypeDef 2
    struct Scripted(VerifierErrorKind);

    impl IlVerifier for Scripted {
        fn verify(&self, _: &VerifyContext<'_>, type_def: u32) -> Result<Vec<VerificationFinding>> {
            if type_def != 2 {
                return Ok(Vec::new());
            }

            Ok(vec![VerificationFinding {
                kind: self.0,
                token: Token::new(0x0600_0001),
                method: "Mod.Broken.Run".to_string(),
                offset: Some(3),
                detail: "scripted".to_string(),
            }])
        }
    }

    fn reader() -> MetadataReader {
        let mut builder = MetadataBuilder::new("Mod");
        builder.type_def("Mod", "Broken", TypeAttributes::SEALED.bits(), None);
        builder.type_def("Mod", "Fine", TypeAttributes::SEALED.bits(), None);
        MetadataReader::from_metadata(builder.build()).unwrap()
    }

    #[test]
    fn true_violation() {
        let reader = reader();
        let events = Mutex::new(Vec::new());
        let sink = |event: ScanLog| events.lock().unwrap().push(event);

        let valid = verify_il(
            &reader,
            &SandboxConfig::default(),
            &Scripted(VerifierErrorKind::UnknownOpcode),
            &ConfigClassifier,
            "Mod",
            &sink,
        )
        .unwrap();
        assert!(!valid);

        let events = events.into_inner().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], ScanLog::info("Mod: Verifying IL..."));
        assert_eq!(
            events[1],
            ScanLog::error("Mod: Mod.Broken.Run [IL_0003]: UnknownOpcode (scripted)")
        );
        assert_eq!(events[2].kind, ScanLogKind::Info);
        assert!(events[2].message.starts_with("Mod: Verified IL in "));
    }

    #[test]
    fn tolerated() {
        let reader = reader();
        let mut config = SandboxConfig::default();
        config
            .allowed_verifier_errors
            .insert(VerifierErrorKind::InvalidToken);

        let valid = verify_il(
            &reader,
            &config,
            &Scripted(VerifierErrorKind::InvalidToken),
            &ConfigClassifier,
            "Mod",
            &discard,
        )
        .unwrap();
        assert!(valid);
    }

    /// Reports a finding only when verifying outside the configured core library
    struct SystemOnly;

    impl IlVerifier for SystemOnly {
        fn verify(
            &self,
            context: &VerifyContext<'_>,
            type_def: u32,
        ) -> Result<Vec<VerificationFinding>> {
            if type_def != 2 || context.is_system_assembly() {
                return Ok(Vec::new());
            }

            Ok(vec![VerificationFinding {
                kind: VerifierErrorKind::MissingBody,
                token: Token::new(0x0600_0001),
                method: "Mod.Broken.Run".to_string(),
                offset: None,
                detail: format!("not inside '{}'", context.system_assembly_name),
            }])
        }
    }

    #[test]
    fn system_assembly_reaches_the_verifier() {
        let reader = reader();
        let mut config = SandboxConfig::default();

        config.system_assembly_name = "Mod".to_string();
        let valid = verify_il(&reader, &config, &SystemOnly, &ConfigClassifier, "Mod", &discard);
        assert!(valid.unwrap());

        config.system_assembly_name = "System.Private.CoreLib".to_string();
        let events = Mutex::new(Vec::new());
        let sink = |event: ScanLog| events.lock().unwrap().push(event);
        let valid = verify_il(&reader, &config, &SystemOnly, &ConfigClassifier, "Mod", &sink);
        assert!(!valid.unwrap());
        assert!(events.into_inner().unwrap().contains(&ScanLog::error(
            "Mod: Mod.Broken.Run: MissingBody (not inside 'System.Private.CoreLib')"
        )));

        let unset = SandboxConfig::default();
        assert!(!VerifyContext::new(&reader, &unset, "Mod").is_system_assembly());
    }

    #[test]
    fn kind_names() {
        assert_eq!(VerifierErrorKind::BranchIntoInstruction.to_string(), "BranchIntoInstruction");
        assert_eq!(
            "MissingBody".parse::<VerifierErrorKind>().unwrap(),
            VerifierErrorKind::MissingBody
        );
        assert!("StackUnderflow".parse::<VerifierErrorKind>().is_err());
    }
}
