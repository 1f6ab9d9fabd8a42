//! Member reference collection and checking.
//!
//! A reference is checked against the policy of its base referenced type: generic
//! instantiations are unwrapped to their definition, and references to members of types
//! declared in the scanned assembly (or of multi-dimensional arrays) are internal and skipped.
//! When the type is whitelisted without `All`, the field must match by name and type, and the
//! method must match name, return type, parameter list and generic arity exactly.

use rayon::prelude::*;

use crate::{
    metadata::{
        signatures::{decode_field_signature, decode_method_signature, SignatureHeader},
        tables::{MemberRefRaw, TableId},
    },
    sandbox::{
        config::SandboxConfig,
        members::MemberRef,
        provider::MetadataTypeProvider,
        scanners::record_unsupported,
        sink::Violations,
        types::{MType, TypeReference},
    },
    Result,
};

/// Resolve every `MemberRef` row.
///
/// Parents the sandbox refuses (module-level members, vararg call sites, forwarded types) are
/// recorded as violations. Members of internal `TypeSpec` parents are left out.
///
/// # Errors
/// Returns an error for unreadable rows and malformed signatures.
pub fn collect_member_refs(
    provider: &MetadataTypeProvider<'_>,
    violations: &Violations,
    parallel: bool,
) -> Result<Vec<MemberRef>> {
    let count = provider.reader().row_count(TableId::MemberRef);
    let collect = |rid| member_ref(provider, rid, violations);

    let collected: Vec<Option<MemberRef>> = if parallel {
        (1..=count)
            .into_par_iter()
            .map(collect)
            .collect::<Result<_>>()?
    } else {
        (1..=count).map(collect).collect::<Result<_>>()?
    };

    Ok(collected.into_iter().flatten().collect())
}

fn member_ref(
    provider: &MetadataTypeProvider<'_>,
    rid: u32,
    violations: &Violations,
) -> Result<Option<MemberRef>> {
    let reader = provider.reader();
    let row = reader.row::<MemberRefRaw>(rid)?;
    let name = reader.string(row.name as usize)?;

    let parent = match row.class.tag {
        TableId::TypeRef | TableId::TypeDef => {
            record_unsupported(provider.resolve(row.class.token), violations)?
        }
        TableId::TypeSpec => {
            match record_unsupported(provider.resolve(row.class.token), violations)? {
                Some(parent) if is_core_type_defined(&parent) => None,
                parent => parent,
            }
        }
        TableId::ModuleRef => {
            violations.push(format!(
                "Module global variables and methods are unsupported. Name: {name}"
            ));
            None
        }
        TableId::MethodDef => {
            violations.push(format!("Vararg calls are unsupported. Name: {name}"));
            None
        }
        other => {
            violations.push(format!(
                "Unsupported member ref parent type: {other:?}. Name: {name}"
            ));
            None
        }
    };
    let Some(parent) = parent else {
        return Ok(None);
    };

    let signature = reader.blob_at(row.signature as usize)?;
    let Some(&header) = signature.first() else {
        return Err(malformed_error!("MemberRef {} has an empty signature", row.token));
    };

    let member = if SignatureHeader(header).is_field() {
        record_unsupported(decode_field_signature(signature, provider), violations)?.map(
            |field_type| MemberRef::Field {
                token: row.token,
                parent,
                name: name.to_string(),
                field_type,
            },
        )
    } else {
        record_unsupported(decode_method_signature(signature, provider), violations)?.map(
            |signature| MemberRef::Method {
                token: row.token,
                parent,
                name: name.to_string(),
                return_type: signature.return_type,
                parameter_types: signature.parameter_types,
                generic_parameter_count: signature.generic_parameter_count,
            },
        )
    };

    Ok(member)
}

/// Is `parent` a type of the scanned assembly, possibly instantiated
fn is_core_type_defined(parent: &MType) -> bool {
    match parent {
        MType::Defined { .. } => true,
        MType::Generic { definition, .. } => is_core_type_defined(definition),
        _ => false,
    }
}

/// The referenced type whose policy governs members of `parent`, or `None` for internal types.
///
/// # Errors
/// Returns [`crate::Error::Invariant`] for parents that cannot own members.
pub fn base_referenced_type(parent: &MType) -> Result<Option<&TypeReference>> {
    match parent {
        MType::Referenced(reference) => Ok(Some(reference)),
        MType::Generic { definition, .. } => base_referenced_type(definition),
        MType::IrregularArray { .. } | MType::Defined { .. } => Ok(None),
        other => Err(invariant_error!(
            "Unexpected member reference parent shape: {}",
            other
        )),
    }
}

/// Check one reference and record a violation if it is not allowed.
///
/// # Errors
/// Returns [`crate::Error::Invariant`] if the parent has an unexpected shape.
pub fn check_member_ref(
    config: &SandboxConfig,
    member: &MemberRef,
    violations: &Violations,
) -> Result<()> {
    let Some(base) = base_referenced_type(member.parent())? else {
        return Ok(());
    };

    let Some(type_config) = config.is_type_access_allowed(base) else {
        violations.push(format!("Access to type not allowed: {base}"));
        return Ok(());
    };

    if type_config.all {
        return Ok(());
    }

    match member {
        MemberRef::Field {
            name, field_type, ..
        } => {
            if !type_config.allows_field(name, field_type) {
                violations.push(format!("Access to field not allowed: {member}"));
            }
        }
        MemberRef::Method {
            name,
            return_type,
            parameter_types,
            generic_parameter_count,
            ..
        } => {
            if !type_config.allows_method(
                name,
                return_type,
                parameter_types,
                *generic_parameter_count,
            ) {
                violations.push(format!("Access to method not allowed: {member}"));
            }
        }
    }

    Ok(())
}

/// Check every reference, on the rayon pool when `parallel` is set.
///
/// # Errors
/// Returns the first invariant violation encountered.
pub fn check_member_refs(
    config: &SandboxConfig,
    members: &[MemberRef],
    violations: &Violations,
    parallel: bool,
) -> Result<()> {
    if parallel {
        members
            .par_iter()
            .try_for_each(|member| check_member_ref(config, member, violations))
    } else {
        members
            .iter()
            .try_for_each(|member| check_member_ref(config, member, violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            reader::MetadataReader, signatures::PrimitiveType, tables::TypeAttributes, token::Token,
        },
        sandbox::types::ResolutionScope,
        test::MetadataBuilder,
        Error,
    };

    const CONFIG: &str = r#"{
        "MultiAssemblyOtherReferences": ["TrustedLib"],
        "Types": {
            "Game": {
                "Point": { "Fields": ["int X"] },
                "Logger": { "Methods": ["void Write(string)", "!!0 Get<>()"] },
                "Everything": { "All": true }
            }
        }
    }"#;

    fn config() -> SandboxConfig {
        SandboxConfig::from_json(CONFIG).unwrap()
    }

    fn game(name: &str) -> MType {
        MType::Referenced(TypeReference::in_assembly("Engine", Some("Game"), name))
    }

    fn field(parent: MType, name: &str, field_type: PrimitiveType) -> MemberRef {
        MemberRef::Field {
            token: Token::new(0x0A00_0001),
            parent,
            name: name.to_string(),
            field_type: MType::Primitive(field_type),
        }
    }

    fn method(
        parent: MType,
        name: &str,
        parameters: Vec<MType>,
        generic_parameter_count: u32,
    ) -> MemberRef {
        MemberRef::Method {
            token: Token::new(0x0A00_0002),
            parent,
            name: name.to_string(),
            return_type: MType::Primitive(PrimitiveType::Void),
            parameter_types: parameters,
            generic_parameter_count,
        }
    }

    fn check(config: &SandboxConfig, member: &MemberRef, violations: &Violations) {
        check_member_ref(config, member, violations).unwrap();
    }

    fn messages(violations: &Violations) -> Vec<String> {
        violations.sorted().into_iter().map(|v| v.message).collect()
    }

    #[test]
    fn whitelisted_field() {
        let config = config();
        let violations = Violations::new();

        check(&config, &field(game("Point"), "X", PrimitiveType::Int32), &violations);
        assert!(violations.is_empty());

        check(&config, &field(game("Point"), "Y", PrimitiveType::Int32), &violations);
        check(&config, &field(game("Point"), "X", PrimitiveType::Int64), &violations);
        assert_eq!(
            messages(&violations),
            vec![
                "Access to field not allowed: [Engine]Game.Point.X Returns Int64".to_string(),
                "Access to field not allowed: [Engine]Game.Point.Y Returns Int32".to_string(),
            ]
        );
    }

    #[test]
    fn overloads_are_distinguished() {
        let config = config();
        let violations = Violations::new();
        let string = MType::Primitive(PrimitiveType::String);
        let int = MType::Primitive(PrimitiveType::Int32);

        check(&config, &method(game("Logger"), "Write", vec![string.clone()], 0), &violations);
        assert!(violations.is_empty());

        check(&config, &method(game("Logger"), "Write", vec![int], 0), &violations);
        assert_eq!(
            messages(&violations),
            vec![
                "Access to method not allowed: [Engine]Game.Logger.Write(Int32) Returns Void"
                    .to_string()
            ]
        );

        // same parameters, different generic arity
        check(&config, &method(game("Logger"), "Write", vec![string], 1), &violations);
        assert_eq!(violations.count(), 2);
    }

    #[test]
    fn all_and_denied_types() {
        let config = config();
        let violations = Violations::new();

        check(&config, &method(game("Everything"), "Anything", vec![], 3), &violations);
        check(&config, &field(game("Everything"), "Whatever", PrimitiveType::Byte), &violations);
        assert!(violations.is_empty());

        check(&config, &method(game("Secret"), "Run", vec![], 0), &violations);
        assert_eq!(
            messages(&violations),
            vec!["Access to type not allowed: [Engine]Game.Secret".to_string()]
        );
    }

    #[test]
    fn nested_type_in_wholesale_assembly() {
        let config = config();
        let violations = Violations::new();

        let outer = TypeReference::in_assembly("TrustedLib", Some("Lib"), "Outer");
        let nested = MType::Referenced(TypeReference::nested(outer, "Inner"));
        check(&config, &method(nested, "Run", vec![], 0), &violations);

        let global = MType::Referenced(TypeReference {
            scope: ResolutionScope::Assembly("TrustedLib".to_string()),
            name: "Global".to_string(),
            namespace: None,
        });
        check(&config, &method(global, "Run", vec![], 0), &violations);
        assert!(violations.is_empty());
    }

    #[test]
    fn parents() {
        let generic = MType::Generic {
            definition: Box::new(game("Logger")),
            arguments: vec![MType::Primitive(PrimitiveType::Int32)],
        };
        assert_eq!(base_referenced_type(&generic).unwrap().unwrap().name, "Logger");

        let defined = MType::Defined {
            name: "Mine".to_string(),
            namespace: None,
            enclosing: None,
        };
        assert!(base_referenced_type(&defined).unwrap().is_none());

        let array = MType::IrregularArray {
            element: Box::new(game("Point")),
            rank: 2,
        };
        assert!(base_referenced_type(&array).unwrap().is_none());

        assert!(matches!(
            base_referenced_type(&MType::Primitive(PrimitiveType::Int32)),
            Err(Error::Invariant(_))
        ));
        assert!(matches!(
            check_member_ref(
                &config(),
                &method(MType::Pointer(Box::new(game("Point"))), "Run", vec![], 0),
                &Violations::new()
            ),
            Err(Error::Invariant(_))
        ));
    }

    #[test]
    fn order_independent() {
        let config = config();
        let string = MType::Primitive(PrimitiveType::String);
        let members = vec![
            field(game("Point"), "X", PrimitiveType::Int32),
            field(game("Point"), "Y", PrimitiveType::Int32),
            method(game("Logger"), "Write", vec![string.clone()], 0),
            method(game("Logger"), "Write", vec![string.clone(), string], 0),
            method(game("Secret"), "Run", vec![], 0),
        ];
        let mut reversed = members.clone();
        reversed.reverse();

        let forward = Violations::new();
        check_member_refs(&config, &members, &forward, true).unwrap();
        let backward = Violations::new();
        check_member_refs(&config, &reversed, &backward, false).unwrap();

        assert_eq!(forward.count(), 3);
        assert_eq!(forward.sorted(), backward.sorted());
    }

    #[test]
    fn collect_from_metadata() {
        let mut builder = MetadataBuilder::new("Mod");
        let engine = builder.assembly_ref("Engine");
        let point = builder.type_ref_in_assembly(engine, "Game", "Point");
        let list = builder.type_ref_in_assembly(engine, "Game", "List`1");
        let own = builder.type_def("Mod", "Own", TypeAttributes::SEALED.bits(), None);
        let native = builder.module_ref("native.dll");
        let vararg_target = builder.method(own, "Log", &[0x05, 0x00, 0x01], 0);

        // GENERICINST CLASS Own<int> and GENERICINST CLASS List`1<int>
        let own_spec = builder.type_spec(&[0x15, 0x12, (own.row() << 2) as u8, 0x01, 0x08]);
        let list_spec = builder.type_spec(&[0x15, 0x12, ((list.row() << 2) | 1) as u8, 0x01, 0x08]);
        let forwarded = builder.type_ref(None, "System", "Forwarded");

        builder.member_ref(point, "X", &[0x06, 0x08]);
        builder.member_ref(list_spec, "Add", &[0x20, 0x01, 0x01, 0x13, 0x00]);
        builder.member_ref(own_spec, "Internal", &[0x20, 0x00, 0x01]);
        builder.member_ref(native, "Global", &[0x00, 0x00, 0x01]);
        builder.member_ref(vararg_target, "Log", &[0x05, 0x01, 0x01, 0x41, 0x08]);
        builder.member_ref(forwarded, "Run", &[0x00, 0x00, 0x01]);
        let reader = MetadataReader::from_metadata(builder.build()).unwrap();

        for parallel in [true, false] {
            let violations = Violations::new();
            let provider = MetadataTypeProvider::new(&reader);
            let members = collect_member_refs(&provider, &violations, parallel).unwrap();

            assert_eq!(members.len(), 2);
            assert_eq!(members[0].to_string(), "[Engine]Game.Point.X Returns Int32");
            assert_eq!(
                members[1].to_string(),
                "[Engine]Game.List`1<Int32>.Add(!0) Returns Void"
            );
            assert_eq!(members[1].token(), Token::from_parts(0x0A, 2));

            let messages = messages(&violations);
            assert_eq!(messages.len(), 3);
            let global = "Module global variables and methods are unsupported. Name: Global";
            assert!(messages.contains(&global.to_string()));
            assert!(messages.contains(&"Vararg calls are unsupported. Name: Log".to_string()));
        }
    }
}
