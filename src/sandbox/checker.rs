//! The scan entry point.
//!
//! [`AssemblyChecker`] runs the whole pipeline over one assembly: the native code pre-check,
//! IL verification, reference collection and then every policy scanner. Progress and every
//! violation are reported to the log sink; the verdict is returned as a [`ScanReport`].

use std::{path::Path, time::Instant};

use dashmap::DashMap;
use serde::Serialize;

use crate::{
    metadata::reader::MetadataReader,
    sandbox::{
        config::SandboxConfig,
        log::{discard, emit, LogSink, ScanLog},
        provider::MetadataTypeProvider,
        scanners::{
            inheritance::{check_inheritance, collect_inherited_types},
            memberrefs::{check_member_refs, collect_member_refs},
            typeabuse::check_type_abuse,
            typerefs::{check_type_refs, collect_type_refs},
            unmanaged::check_unmanaged_methods,
        },
        sink::{SandboxError, Violations},
        verify::{verify_il, ConfigClassifier, FindingClassifier, IlVerifier, StructuralVerifier},
    },
    Result,
};

/// Knobs of a scan. The defaults run everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Check member references on the rayon pool
    pub parallel: bool,
    /// Run IL verification before the policy scanners
    pub verify_il: bool,
    /// Memoize resolved `TypeRef` rows for the duration of the scan
    pub cache_type_refs: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            verify_il: true,
            cache_type_refs: true,
        }
    }
}

impl ScanOptions {
    /// Everything on a single thread, without caching. Produces the same report as the default.
    #[must_use]
    pub fn serial() -> Self {
        Self {
            parallel: false,
            verify_il: true,
            cache_type_refs: false,
        }
    }

    /// Policy scanners only
    #[must_use]
    pub fn policy_only() -> Self {
        Self {
            verify_il: false,
            ..Self::default()
        }
    }

    /// Set [`ScanOptions::parallel`]
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set [`ScanOptions::verify_il`]
    #[must_use]
    pub fn with_verify_il(mut self, verify_il: bool) -> Self {
        self.verify_il = verify_il;
        self
    }

    /// Set [`ScanOptions::cache_type_refs`]
    #[must_use]
    pub fn with_cache_type_refs(mut self, cache_type_refs: bool) -> Self {
        self.cache_type_refs = cache_type_refs;
        self
    }
}

/// Outcome of scanning one assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Name from the `Assembly` row
    pub assembly_name: String,
    /// `false` if the image carries native code or IL verification found a true violation
    pub bytecode_valid: bool,
    /// Policy violations, sorted by message
    pub violations: Vec<SandboxError>,
}

impl ScanReport {
    /// Returns `true` if the assembly may be loaded
    #[must_use]
    pub fn is_safe(&self) -> bool {
        self.bytecode_valid && self.violations.is_empty()
    }
}

/// Checks assemblies against one [`SandboxConfig`].
///
/// # Example
///
/// ```rust,no_run
/// use cilguard::{AssemblyChecker, SandboxConfig, ScanLog};
///
/// let config = SandboxConfig::from_file("whitelist.json".as_ref())?;
/// let checker = AssemblyChecker::new(&config)
///     .with_log_sink(|event: ScanLog| eprintln!("{event}"));
///
/// let report = checker.check_file("Mod.dll".as_ref())?;
/// if !report.is_safe() {
///     println!("{} violations", report.violations.len());
/// }
/// # Ok::<(), cilguard::Error>(())
/// ```
pub struct AssemblyChecker<'c> {
    config: &'c SandboxConfig,
    options: ScanOptions,
    verifier: Box<dyn IlVerifier + 'c>,
    classifier: Box<dyn FindingClassifier + 'c>,
    sink: Box<dyn Fn(ScanLog) + Send + Sync + 'c>,
}

impl<'c> AssemblyChecker<'c> {
    /// A checker with default options, the structural verifier and a sink that only forwards to
    /// the `log` facade.
    #[must_use]
    pub fn new(config: &'c SandboxConfig) -> Self {
        AssemblyChecker {
            config,
            options: ScanOptions::default(),
            verifier: Box::new(StructuralVerifier),
            classifier: Box::new(ConfigClassifier),
            sink: Box::new(discard),
        }
    }

    /// Replace the scan options
    #[must_use]
    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the IL verifier
    #[must_use]
    pub fn with_verifier(mut self, verifier: impl IlVerifier + 'c) -> Self {
        self.verifier = Box::new(verifier);
        self
    }

    /// Replace the finding classifier
    #[must_use]
    pub fn with_classifier(mut self, classifier: impl FindingClassifier + 'c) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Receive [`ScanLog`] events in addition to the `log` facade
    #[must_use]
    pub fn with_log_sink(mut self, sink: impl Fn(ScanLog) + Send + Sync + 'c) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Load and check the PE image at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be loaded or its metadata is malformed.
    pub fn check_file(&self, path: &Path) -> Result<ScanReport> {
        self.check(&MetadataReader::from_file(path)?)
    }

    /// Check a PE image held in memory.
    ///
    /// # Errors
    /// Returns an error if the image or its metadata is malformed.
    pub fn check_bytes(&self, data: Vec<u8>) -> Result<ScanReport> {
        self.check(&MetadataReader::from_mem(data)?)
    }

    /// Check an already loaded assembly.
    ///
    /// # Errors
    /// Returns an error for malformed metadata and broken invariants such as cyclic resolution
    /// scopes. Policy violations are never errors; they are part of the report.
    pub fn check(&self, reader: &MetadataReader) -> Result<ScanReport> {
        let sink: LogSink<'_> = self.sink.as_ref();
        let assembly_name = reader.assembly_name()?.to_string();
        let total = Instant::now();

        let rejected = |assembly_name: String| ScanReport {
            assembly_name,
            bytecode_valid: false,
            violations: Vec::new(),
        };

        if reader.has_native_code() {
            emit(
                sink,
                ScanLog::error(format!("Assembly {assembly_name} contains native code.")),
            );
            return Ok(rejected(assembly_name));
        }

        if self.options.verify_il
            && !verify_il(
                reader,
                self.config,
                self.verifier.as_ref(),
                self.classifier.as_ref(),
                &assembly_name,
                sink,
            )?
        {
            emit(
                sink,
                ScanLog::error(format!("Assembly {assembly_name} Has invalid IL code")),
            );
            return Ok(rejected(assembly_name));
        }

        let cache = DashMap::new();
        let provider = if self.options.cache_type_refs {
            MetadataTypeProvider::with_cache(reader, &cache)
        } else {
            MetadataTypeProvider::new(reader)
        };
        let violations = Violations::new();
        let parallel = self.options.parallel;

        let mut phase = Instant::now();
        let type_refs = collect_type_refs(&provider, &violations)?;
        let member_refs = collect_member_refs(&provider, &violations, parallel)?;
        let inherited = collect_inherited_types(&provider, &violations)?;
        log::debug!(
            "{assembly_name}: {} type references, {} member references, {} type definitions",
            type_refs.len(),
            member_refs.len(),
            inherited.len()
        );
        lap(sink, &violations, "References loaded", &mut phase);

        check_type_refs(self.config, &type_refs, &assembly_name, &violations);
        lap(sink, &violations, "Types", &mut phase);

        check_inheritance(self.config, &inherited, &violations);
        lap(sink, &violations, "Inheritance", &mut phase);

        check_unmanaged_methods(&provider, &violations)?;
        lap(sink, &violations, "Unmanaged methods", &mut phase);

        check_type_abuse(&provider, &violations)?;
        lap(sink, &violations, "Type abuse", &mut phase);

        check_member_refs(self.config, &member_refs, &violations, parallel)?;
        lap(sink, &violations, "Member References", &mut phase);

        let sorted = violations.sorted();
        for violation in &sorted {
            emit(sink, ScanLog::error(format!("Sandbox violation: {violation}")));
        }
        report_total(sink, &violations);
        emit(
            sink,
            ScanLog::info(format!(
                "Checked assembly in {}ms",
                total.elapsed().as_millis()
            )),
        );

        Ok(ScanReport {
            assembly_name,
            bytecode_valid: true,
            violations: sorted,
        })
    }
}

fn report_total(sink: LogSink<'_>, violations: &Violations) {
    let message = match violations.count() {
        0 => "No sandbox violations.".to_string(),
        count => format!("Total violations: {count}"),
    };
    emit(sink, ScanLog::info(message));
}

/// Running total, then the time spent in `phase`
fn lap(sink: LogSink<'_>, violations: &Violations, phase: &str, start: &mut Instant) {
    report_total(sink, violations);
    emit(
        sink,
        ScanLog::info(format!("{phase}... {}ms", start.elapsed().as_millis())),
    );
    *start = Instant::now();
}
