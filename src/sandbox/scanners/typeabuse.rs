//! Explicit layout types carrying fields.

use crate::{
    metadata::tables::{TypeAttributes, TypeDefRaw},
    sandbox::{provider::MetadataTypeProvider, sink::Violations},
    Result,
};

/// Record explicit-layout types that declare fields. Overlapping fields would let code
/// reinterpret references as integers.
///
/// # Errors
/// Returns an error for unreadable rows or invalid field ranges.
pub fn check_type_abuse(
    provider: &MetadataTypeProvider<'_>,
    violations: &Violations,
) -> Result<()> {
    let reader = provider.reader();

    for rid in 1..=reader.type_def_count() {
        let row = reader.row::<TypeDefRaw>(rid)?;
        if !row.attributes().contains(TypeAttributes::EXPLICIT_LAYOUT) {
            continue;
        }

        if !reader.type_fields(rid)?.is_empty() {
            violations.push(format!(
                "Explicit layout type {} may not have fields.",
                provider.type_definition(rid)?
            ));
        }
    }

    Ok(())
}
