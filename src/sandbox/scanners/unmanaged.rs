//! Methods implemented outside of managed IL: P/Invoke, native code and unmanaged exports.

use crate::{
    metadata::tables::{MethodAttributes, MethodDefRaw, MethodImplAttributes},
    sandbox::{provider::MetadataTypeProvider, sink::Violations},
    Result,
};

/// Record every method with a native, unmanaged, P/Invoke or unmanaged-export implementation.
///
/// # Errors
/// Returns an error for unreadable rows or invalid method ranges.
pub fn check_unmanaged_methods(
    provider: &MetadataTypeProvider<'_>,
    violations: &Violations,
) -> Result<()> {
    let reader = provider.reader();

    for type_rid in 1..=reader.type_def_count() {
        let methods = reader.methods_of(type_rid)?;
        if methods.is_empty() {
            continue;
        }
        let declaring_type = provider.type_definition(type_rid)?;

        for method in &methods {
            let display = || -> Result<String> {
                Ok(format!("{declaring_type}.{}", reader.string(method.name as usize)?))
            };

            if has_illegal_impl(method) {
                violations.push(format!(
                    "Method has illegal MethodImplAttributes: {}",
                    display()?
                ));
            }
            if has_illegal_attributes(method) {
                violations.push(format!("Method has illegal MethodAttributes: {}", display()?));
            }
        }
    }

    Ok(())
}

fn has_illegal_impl(method: &MethodDefRaw) -> bool {
    let code_type = method.code_type();
    method
        .impl_attributes()
        .contains(MethodImplAttributes::UNMANAGED)
        || (code_type != MethodImplAttributes::IL && code_type != MethodImplAttributes::RUNTIME)
}

fn has_illegal_attributes(method: &MethodDefRaw) -> bool {
    method
        .attributes()
        .intersects(MethodAttributes::PINVOKE_IMPL | MethodAttributes::UNMANAGED_EXPORT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::reader::MetadataReader, test::MetadataBuilder};

    const VOID: &[u8] = &[0x00, 0x00, 0x01];

    #[test]
    fn illegal_methods() {
        let mut builder = MetadataBuilder::new("Mod");
        let outer = builder.type_def("Mod", "Native", 0, None);
        let inner = builder.type_def("", "Inner", 0x02, None);
        builder.nested(inner, outer);

        builder.method(outer, "Managed", VOID, 0);
        builder.method_with_flags(outer, "Delegate", VOID, 0, 0x0086, 0x0003);
        builder.method_with_flags(outer, "MessageBox", VOID, 0, 0x2096, 0x0000);
        builder.method_with_flags(outer, "Export", VOID, 0, 0x008E, 0x0000);
        builder.method_with_flags(inner, "Raw", VOID, 0, 0x0086, 0x0001);
        builder.method_with_flags(inner, "Optimized", VOID, 0, 0x0086, 0x0002);
        builder.method_with_flags(inner, "Unmanaged", VOID, 0, 0x0086, 0x0004);
        let reader = MetadataReader::from_metadata(builder.build()).unwrap();

        let violations = Violations::new();
        check_unmanaged_methods(&MetadataTypeProvider::new(&reader), &violations).unwrap();
        let messages: Vec<String> = violations.sorted().into_iter().map(|v| v.message).collect();
        assert_eq!(
            messages,
            vec![
                "Method has illegal MethodAttributes: Mod.Native.Export".to_string(),
                "Method has illegal MethodAttributes: Mod.Native.MessageBox".to_string(),
                "Method has illegal MethodImplAttributes: Mod.Native/Inner.Optimized".to_string(),
                "Method has illegal MethodImplAttributes: Mod.Native/Inner.Raw".to_string(),
                "Method has illegal MethodImplAttributes: Mod.Native/Inner.Unmanaged".to_string(),
            ]
        );
    }
}
