//! Inheritance from and implementation of types outside the scanned assembly.
//!
//! Deriving from an external type is allowed only if the type is accessible and its policy
//! does not block inheritance. `Inherit: "Default"` blocks inheritance unless the type is
//! allowed wholesale.

use crate::{
    metadata::tables::{CodedIndex, TypeDefRaw},
    sandbox::{
        config::SandboxConfig,
        provider::MetadataTypeProvider,
        scanners::record_unsupported,
        sink::Violations,
        types::{MType, TypeReference},
    },
    Result,
};

/// A type declared in the scanned assembly with its resolved base type and interfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct InheritedType {
    /// The declaring type
    pub type_def: MType,
    /// The `Extends` column, if present
    pub base: Option<MType>,
    /// Implemented interfaces in `InterfaceImpl` order
    pub interfaces: Vec<MType>,
}

/// Resolve the base type and interfaces of every `TypeDef`.
///
/// # Errors
/// Returns an error for unreadable rows or malformed type specifications.
pub fn collect_inherited_types(
    provider: &MetadataTypeProvider<'_>,
    violations: &Violations,
) -> Result<Vec<InheritedType>> {
    let reader = provider.reader();
    let mut implementations = reader.interface_impls()?;
    let mut inherited = Vec::with_capacity(reader.type_def_count() as usize);

    for rid in 1..=reader.type_def_count() {
        let row = reader.row::<TypeDefRaw>(rid)?;

        let base = if row.extends.is_nil() {
            None
        } else {
            record_unsupported(provider.resolve(row.extends.token), violations)?
        };

        let mut interfaces = Vec::new();
        for interface in implementations.remove(&rid).unwrap_or_default() {
            if let Some(resolved) = resolve(provider, &interface, violations)? {
                interfaces.push(resolved);
            }
        }

        inherited.push(InheritedType {
            type_def: provider.type_definition(rid)?,
            base,
            interfaces,
        });
    }

    Ok(inherited)
}

fn resolve(
    provider: &MetadataTypeProvider<'_>,
    index: &CodedIndex,
    violations: &Violations,
) -> Result<Option<MType>> {
    if index.is_nil() {
        return Ok(None);
    }
    record_unsupported(provider.resolve(index.token), violations)
}

/// The external reference behind a base type, `None` for types of this assembly
fn external_reference(base: &MType) -> Option<&TypeReference> {
    match base {
        MType::Referenced(reference) => Some(reference),
        MType::Generic { definition, .. } => match definition.as_ref() {
            MType::Referenced(reference) => Some(reference),
            _ => None,
        },
        _ => None,
    }
}

fn can_inherit(config: &SandboxConfig, base: &MType) -> bool {
    match external_reference(base) {
        Some(reference) => config
            .is_type_access_allowed(reference)
            .is_some_and(|type_config| type_config.allows_inheritance()),
        None => true,
    }
}

/// Check every base type and interface.
pub fn check_inheritance(
    config: &SandboxConfig,
    inherited: &[InheritedType],
    violations: &Violations,
) {
    for inherited_type in inherited {
        if let Some(base) = &inherited_type.base {
            if !can_inherit(config, base) {
                violations.push(format!("Inheriting of type not allowed: {base}"));
            }
        }

        for interface in &inherited_type.interfaces {
            if !can_inherit(config, interface) {
                violations.push(format!("Implementing of interface not allowed: {interface}"));
            }
        }
    }
}
