use std::path::Path;

use anyhow::Context;
use cilguard::{AssemblyChecker, SandboxConfig, ScanOptions, ScanReport};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    output::{emit, print_report},
};

pub struct ScanArgs<'a> {
    pub config: &'a Path,
    pub bundles: &'a [String],
    pub verify_il: bool,
    pub parallel: bool,
}

#[derive(Debug, Serialize)]
struct ScanOutput<'a> {
    file: String,
    safe: bool,
    #[serde(flatten)]
    report: &'a ScanReport,
}

/// Returns `true` if the assembly is safe to load.
pub fn run(path: &Path, args: &ScanArgs<'_>, opts: &GlobalOptions) -> anyhow::Result<bool> {
    let config = args.bundles.iter().fold(
        SandboxConfig::from_file(args.config)
            .with_context(|| format!("failed to load whitelist: {}", args.config.display()))?,
        |config, bundle| config.with_wholesale_reference(bundle.as_str()),
    );

    let options = ScanOptions::default()
        .with_verify_il(args.verify_il)
        .with_parallel(args.parallel);
    let report = AssemblyChecker::new(&config)
        .with_options(options)
        .check_file(path)
        .with_context(|| format!("failed to scan assembly: {}", path.display()))?;

    let output = ScanOutput {
        file: path.display().to_string(),
        safe: report.is_safe(),
        report: &report,
    };

    emit(&output, opts, |out| print_report(&out.file, out.report))?;

    Ok(output.safe)
}
