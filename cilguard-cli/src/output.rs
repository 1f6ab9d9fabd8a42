//! Rendering of scan verdicts and reference listings.

use std::io::{self, Write};

use cilguard::{SandboxError, ScanReport};
use comfy_table::{presets, CellAlignment, ContentArrangement, Table};
use serde::Serialize;

use crate::app::GlobalOptions;

const INDENT: &str = "  ";

/// Write `data` as pretty JSON under `--json`, otherwise hand it to `human`.
pub fn emit<T: Serialize>(
    data: &T,
    opts: &GlobalOptions,
    human: impl FnOnce(&T),
) -> anyhow::Result<()> {
    if !opts.json {
        human(data);
        return Ok(());
    }

    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, data)?;
    writeln!(stdout)?;
    Ok(())
}

/// The one word verdict for a report.
pub fn verdict(report: &ScanReport) -> &'static str {
    if report.is_safe() {
        "SAFE"
    } else {
        "REJECTED"
    }
}

/// Human form of a scan: verdict line, bytecode note, then the numbered violations.
pub fn print_report(file: &str, report: &ScanReport) {
    println!("{} ({file}): {}", report.assembly_name, verdict(report));

    if !report.bytecode_valid {
        println!("{INDENT}bytecode rejected (native code or invalid IL)");
    }

    if !report.violations.is_empty() {
        println!("{INDENT}{} violations:", report.violations.len());
        print_indented(&violation_table(&report.violations));
    }
}

/// Violations numbered from 1, in report order.
pub fn violation_table(violations: &[SandboxError]) -> Table {
    let mut table = borderless(&["#", "Violation"]);
    if let Some(column) = table.column_mut(0) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    for (index, violation) in violations.iter().enumerate() {
        table.add_row(vec![(index + 1).to_string(), violation.to_string()]);
    }
    table
}

/// Type references beside the form the whitelist matches them by.
pub fn type_table<'a>(rows: impl IntoIterator<Item = (&'a str, &'a str)>) -> Table {
    let mut table = borderless(&["Reference", "Whitelist"]);
    for (reference, whitelist) in rows {
        table.add_row(vec![reference, whitelist]);
    }
    table
}

/// Member references keyed by their MemberRef token.
pub fn member_table<'a>(rows: impl IntoIterator<Item = (&'a str, &'a str, &'a str)>) -> Table {
    let mut table = borderless(&["Token", "Kind", "Reference"]);
    for (token, kind, reference) in rows {
        table.add_row(vec![token, kind, reference]);
    }
    table
}

pub fn print_indented(table: &Table) {
    for line in table.to_string().lines() {
        println!("{INDENT}{}", line.trim_end());
    }
}

/// Whitespace separated columns, flush with the indent on the left.
fn borderless(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Disabled)
        .set_header(headers.to_vec());

    let last = headers.len().saturating_sub(1);
    for (index, column) in table.column_iter_mut().enumerate() {
        let left = u16::from(index != 0);
        let right = u16::from(index != last);
        column.set_padding((left, right));
    }
    table
}
