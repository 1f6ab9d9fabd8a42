//! Access checks for every `TypeRef` row.

use crate::{
    metadata::tables::TableId,
    sandbox::{
        config::SandboxConfig,
        provider::MetadataTypeProvider,
        scanners::record_unsupported,
        sink::Violations,
        types::TypeReference,
    },
    Result,
};

/// Resolve every `TypeRef` row. Rows with unsupported scopes are recorded as violations and
/// left out.
///
/// # Errors
/// Returns an error for unreadable rows or cyclic scope chains.
pub fn collect_type_refs(
    provider: &MetadataTypeProvider<'_>,
    violations: &Violations,
) -> Result<Vec<TypeReference>> {
    let count = provider.reader().row_count(TableId::TypeRef);
    let mut references = Vec::with_capacity(count as usize);

    for rid in 1..=count {
        if let Some(reference) = record_unsupported(provider.type_reference(rid), violations)? {
            references.push(reference);
        }
    }

    Ok(references)
}

/// Every referenced type must be allowed, even if no member of it is used.
pub fn check_type_refs(
    config: &SandboxConfig,
    references: &[TypeReference],
    assembly_name: &str,
    violations: &Violations,
) {
    for reference in references {
        if config.is_type_access_allowed(reference).is_none() {
            violations.push(format!(
                "Access to type not allowed: {reference} asmName {assembly_name}"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::reader::MetadataReader, test::MetadataBuilder};

    #[test]
    fn denied_and_unsupported() {
        let mut builder = MetadataBuilder::new("Mod");
        let runtime = builder.assembly_ref("System.Runtime");
        builder.type_ref_in_assembly(runtime, "System", "Object");
        builder.type_ref_in_assembly(runtime, "System.IO", "File");
        builder.type_ref(None, "System", "Forwarded");
        let reader = MetadataReader::from_metadata(builder.build()).unwrap();

        let config = SandboxConfig::from_json(
            r#"{ "Types": { "System": { "Object": { "All": true } } } }"#,
        )
        .unwrap();

        let violations = Violations::new();
        let provider = MetadataTypeProvider::new(&reader);
        let references = collect_type_refs(&provider, &violations).unwrap();
        assert_eq!(references.len(), 2);
        assert_eq!(violations.count(), 1);

        check_type_refs(&config, &references, "Mod", &violations);
        let messages: Vec<String> = violations.sorted().into_iter().map(|v| v.message).collect();
        assert_eq!(
            messages,
            vec![
                "Access to type not allowed: [System.Runtime]System.IO.File asmName Mod"
                    .to_string(),
                "Null resolution scope on type Name: System.Forwarded. \
                 This indicates exported/forwarded types"
                    .to_string(),
            ]
        );
    }
}
