use crate::{
    file::io::{read_le_at, CilIO},
    metadata::{
        reader::MetadataReader,
        tables::{MethodAttributes, MethodDefRaw, MethodImplAttributes, TableId},
        token::Token,
    },
    sandbox::{
        provider::MetadataTypeProvider,
        verify::{
            body::{parse_body, ExceptionClause, MethodBody, CLAUSE_FILTER},
            opcodes::{self, Operand, TokenKind},
            Defect, IlVerifier, VerificationFinding, VerifierErrorKind, VerifyContext,
        },
    },
    Error, Result,
};

const USER_STRING_TABLE: u8 = 0x70;

/// Checks the structure of method bodies.
///
/// Every method with an RVA must have a well-formed header, decode into known instructions
/// that stay inside the code, branch only to instruction boundaries, reference existing
/// metadata rows of the right tables and carry exception clauses that cover whole
/// instructions.
///
/// Bodiless internal calls are only accepted in the configured system assembly, the one
/// library the runtime binds them for.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralVerifier;

impl IlVerifier for StructuralVerifier {
    fn verify(
        &self,
        context: &VerifyContext<'_>,
        type_def: u32,
    ) -> Result<Vec<VerificationFinding>> {
        let reader = context.reader;
        let methods = reader.methods_of(type_def)?;
        let mut findings = Vec::new();
        if methods.is_empty() {
            return Ok(findings);
        }

        let declaring_type = MetadataTypeProvider::new(reader).type_definition(type_def)?;
        for method in &methods {
            let defects = method_defects(context, method)?;
            if defects.is_empty() {
                continue;
            }

            let name = format!("{declaring_type}.{}", reader.string(method.name as usize)?);
            findings.extend(defects.into_iter().map(|defect| VerificationFinding {
                kind: defect.kind,
                token: method.token,
                method: name.clone(),
                offset: defect.offset,
                detail: defect.detail,
            }));
        }

        Ok(findings)
    }
}

/// Methods that are implemented outside of IL have no body
fn has_external_implementation(method: &MethodDefRaw) -> bool {
    method
        .attributes()
        .intersects(MethodAttributes::ABSTRACT | MethodAttributes::PINVOKE_IMPL)
        || method.code_type() == MethodImplAttributes::RUNTIME
}

fn method_defects(context: &VerifyContext<'_>, method: &MethodDefRaw) -> Result<Vec<Defect>> {
    let reader = context.reader;
    if method.rva == 0 {
        if has_external_implementation(method) {
            return Ok(Vec::new());
        }

        let detail = if !method
            .impl_attributes()
            .contains(MethodImplAttributes::INTERNAL_CALL)
        {
            "method has no RVA".to_string()
        } else if context.is_system_assembly() {
            return Ok(Vec::new());
        } else {
            format!(
                "internal call outside the system assembly '{}'",
                context.system_assembly_name
            )
        };
        return Ok(vec![Defect::new(VerifierErrorKind::MissingBody, detail)]);
    }

    let data = match reader.method_body(method.rva) {
        Ok(data) => data,
        Err(Error::NotSupported) => return Err(Error::NotSupported),
        Err(_) => {
            return Ok(vec![Defect::new(
                VerifierErrorKind::CodeOutOfBounds,
                format!("body RVA {:#x} is not mapped", method.rva),
            )])
        }
    };

    Ok(match parse_body(data) {
        Ok(body) => body_defects(reader, &body),
        Err(defect) => vec![defect],
    })
}

/// Everything decoded from an instruction stream that needs checking afterwards
struct Decoded {
    /// `true` at every instruction start and at the end of the code
    boundaries: Vec<bool>,
    /// Instruction offset and absolute target
    branches: Vec<(usize, i64)>,
    /// Instruction offset, operand and the kind of token expected
    tokens: Vec<(usize, Token, TokenKind)>,
}

fn operand<T: CilIO>(
    code: &[u8],
    offset: &mut usize,
    start: usize,
) -> std::result::Result<T, Defect> {
    read_le_at::<T>(code, offset).map_err(|_| {
        Defect::at(
            VerifierErrorKind::TruncatedInstruction,
            start,
            "operand runs past the end of the code",
        )
    })
}

fn decode(code: &[u8]) -> std::result::Result<Decoded, Defect> {
    let mut decoded = Decoded {
        boundaries: vec![false; code.len() + 1],
        branches: Vec::new(),
        tokens: Vec::new(),
    };

    let mut offset = 0;
    while offset < code.len() {
        let start = offset;
        decoded.boundaries[start] = true;

        let opcode = operand::<u8>(code, &mut offset, start)?;
        let layout = if opcode == 0xFE {
            let second = operand::<u8>(code, &mut offset, start)?;
            opcodes::prefixed(second).ok_or_else(|| {
                Defect::at(
                    VerifierErrorKind::UnknownOpcode,
                    start,
                    format!("opcode 0xFE {second:#04x}"),
                )
            })?
        } else {
            opcodes::single_byte(opcode).ok_or_else(|| {
                Defect::at(
                    VerifierErrorKind::UnknownOpcode,
                    start,
                    format!("opcode {opcode:#04x}"),
                )
            })?
        };

        match layout {
            Operand::None => {}
            Operand::Bytes(size) => {
                offset += size;
                if offset > code.len() {
                    return Err(Defect::at(
                        VerifierErrorKind::TruncatedInstruction,
                        start,
                        "operand runs past the end of the code",
                    ));
                }
            }
            Operand::ShortBranch => {
                let delta = operand::<i8>(code, &mut offset, start)?;
                decoded.branches.push((start, offset as i64 + i64::from(delta)));
            }
            Operand::Branch => {
                let delta = operand::<i32>(code, &mut offset, start)?;
                decoded.branches.push((start, offset as i64 + i64::from(delta)));
            }
            Operand::Switch => {
                let count = operand::<u32>(code, &mut offset, start)? as usize;
                let table_end = count
                    .checked_mul(4)
                    .and_then(|size| offset.checked_add(size))
                    .filter(|end| *end <= code.len())
                    .ok_or_else(|| {
                        let detail = format!("switch table of {count} targets runs past the end");
                        Defect::at(VerifierErrorKind::TruncatedInstruction, start, detail)
                    })?;

                for _ in 0..count {
                    let delta = operand::<i32>(code, &mut offset, start)?;
                    decoded.branches.push((start, table_end as i64 + i64::from(delta)));
                }
            }
            Operand::Token(kind) => {
                let token = Token::new(operand::<u32>(code, &mut offset, start)?);
                decoded.tokens.push((start, token, kind));
            }
        }
    }

    decoded.boundaries[code.len()] = true;
    Ok(decoded)
}

fn token_exists(reader: &MetadataReader, token: Token, kind: TokenKind) -> bool {
    if kind == TokenKind::String {
        return token.table() == USER_STRING_TABLE
            && reader
                .user_strings()
                .is_some_and(|heap| heap.contains(token.row() as usize));
    }

    let Some(table) = TableId::from_u8(token.table()) else {
        return false;
    };
    kind.tables().contains(&table) && token.row() >= 1 && token.row() <= reader.row_count(table)
}

/// Does `[start, start + length)` cover whole instructions of the code
fn covers_instructions(boundaries: &[bool], start: u32, length: u32) -> bool {
    let code_len = boundaries.len() - 1;
    let start = start as usize;
    let Some(end) = start.checked_add(length as usize) else {
        return false;
    };

    length > 0 && end <= code_len && boundaries[start] && boundaries[end]
}

fn clause_defect(boundaries: &[bool], clause: &ExceptionClause) -> Option<String> {
    if !covers_instructions(boundaries, clause.try_offset, clause.try_length) {
        return Some(format!(
            "try block {:#x}+{:#x} does not cover whole instructions",
            clause.try_offset, clause.try_length
        ));
    }
    if !covers_instructions(boundaries, clause.handler_offset, clause.handler_length) {
        return Some(format!(
            "handler {:#x}+{:#x} does not cover whole instructions",
            clause.handler_offset, clause.handler_length
        ));
    }

    let filter = clause.class_token_or_filter as usize;
    if clause.flags & CLAUSE_FILTER != 0
        && !(filter < boundaries.len() - 1 && boundaries[filter])
    {
        return Some(format!("filter at {filter:#x} is not an instruction"));
    }

    None
}

fn body_defects(reader: &MetadataReader, body: &MethodBody<'_>) -> Vec<Defect> {
    let mut defects = Vec::new();

    if body.local_var_sig != 0
        && !token_exists(reader, Token::new(body.local_var_sig), TokenKind::Signature)
    {
        defects.push(Defect::new(
            VerifierErrorKind::InvalidToken,
            format!("locals signature {}", Token::new(body.local_var_sig)),
        ));
    }

    let decoded = match decode(body.code) {
        Ok(decoded) => decoded,
        Err(defect) => {
            defects.push(defect);
            return defects;
        }
    };

    let code_len = body.code.len() as i64;
    for &(offset, target) in &decoded.branches {
        if target < 0 || target >= code_len {
            defects.push(Defect::at(
                VerifierErrorKind::BranchOutOfBounds,
                offset,
                format!("target {target:#x}"),
            ));
        } else if !decoded.boundaries[target as usize] {
            defects.push(Defect::at(
                VerifierErrorKind::BranchIntoInstruction,
                offset,
                format!("target {target:#x}"),
            ));
        }
    }

    for &(offset, token, kind) in &decoded.tokens {
        if !token_exists(reader, token, kind) {
            defects.push(Defect::at(
                VerifierErrorKind::InvalidToken,
                offset,
                format!("{kind:?} token {token}"),
            ));
        }
    }

    for clause in &body.clauses {
        if let Some(detail) = clause_defect(&decoded.boundaries, clause) {
            defects.push(Defect::new(VerifierErrorKind::InvalidExceptionClause, detail));
        }
    }

    defects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{MetadataBuilder, PeBuilder};

    const VOID: &[u8] = &[0x00, 0x00, 0x01];

    fn verify(
        reader: &MetadataReader,
        system_assembly: &str,
        type_def: u32,
    ) -> Result<Vec<VerificationFinding>> {
        let context = VerifyContext {
            reader,
            assembly_name: "Mod",
            system_assembly_name: system_assembly,
        };
        StructuralVerifier.verify(&context, type_def)
    }

    fn kinds(reader: &MetadataReader, type_def: u32) -> Vec<(VerifierErrorKind, Option<u32>)> {
        verify(reader, "System.Runtime", type_def)
            .unwrap()
            .into_iter()
            .map(|finding| (finding.kind, finding.offset))
            .collect()
    }

    /// One type with one method per body; bodies are laid out back to back from `BODY_RVA`
    fn image(bodies: &[&[u8]]) -> MetadataReader {
        let mut builder = MetadataBuilder::new("Mod");
        let owner = builder.type_def("Mod", "Code", 0, None);
        builder.member_ref(owner, "Target", VOID);

        let mut rva = PeBuilder::BODY_RVA;
        let mut data = Vec::new();
        for (index, body) in bodies.iter().enumerate() {
            builder.method(owner, &format!("M{index}"), VOID, rva);
            data.extend_from_slice(body);
            while data.len() % 4 != 0 {
                data.push(0);
            }
            rva = PeBuilder::BODY_RVA + data.len() as u32;
        }

        let pe = PeBuilder::new(builder.build()).method_bodies(data).build();
        MetadataReader::from_mem(pe).unwrap()
    }

    #[test]
    #[rustfmt::skip]
    fn valid_bodies() {
        let reader = image(&[
            &[0x0A, 0x00, 0x2A],                                    // nop, ret
            &[0x1A, 0x28, 0x01, 0x00, 0x00, 0x0A, 0x2A],            // call MemberRef 1, ret
            &[0x1E, 0x72, 0x01, 0x00, 0x00, 0x70, 0x26, 0x2A],      // ldstr, pop, ret
            &[0x12, 0x16, 0x2C, 0x00, 0x2A],                        // ldc.i4.0, brfalse.s +0, ret
        ]);
        assert!(kinds(&reader, 2).is_empty());
    }

    #[test]
    #[rustfmt::skip]
    fn instruction_defects() {
        let reader = image(&[
            &[0x0A, 0x24, 0x2A],                                    // unassigned opcode
            &[0x0E, 0x20, 0x01, 0x00],                              // ldc.i4 with 2 operand bytes
            &[0x0E, 0x2B, 0x05, 0x2A],                              // br.s past the end
            &[0x1E, 0x2B, 0x01, 0x20, 0x00, 0x00, 0x00, 0x00],      // br.s into ldc.i4
            &[0x1A, 0x28, 0x05, 0x00, 0x00, 0x0A, 0x2A],            // call MemberRef 5
            &[0x1A, 0x28, 0x01, 0x00, 0x00, 0x02, 0x2A],            // call a TypeDef
            &[0x1E, 0x72, 0x40, 0x00, 0x00, 0x70, 0x26, 0x2A],      // ldstr past #US
        ]);

        assert_eq!(
            kinds(&reader, 2),
            vec![
                (VerifierErrorKind::UnknownOpcode, Some(0)),
                (VerifierErrorKind::TruncatedInstruction, Some(0)),
                (VerifierErrorKind::BranchOutOfBounds, Some(0)),
                (VerifierErrorKind::BranchIntoInstruction, Some(0)),
                (VerifierErrorKind::InvalidToken, Some(0)),
                (VerifierErrorKind::InvalidToken, Some(0)),
                (VerifierErrorKind::InvalidToken, Some(0)),
            ]
        );
    }

    #[test]
    #[rustfmt::skip]
    fn switch_targets() {
        let reader = image(&[
            // ldc.i4.0, switch (2) { +0, +1 }, nop, ret
            &[0x42, 0x16, 0x45, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2A],
            // switch claiming more targets than there are bytes
            &[0x16, 0x45, 0xFF, 0x00, 0x00, 0x00],
        ]);

        assert_eq!(
            kinds(&reader, 2),
            vec![(VerifierErrorKind::TruncatedInstruction, Some(0))]
        );
    }

    #[test]
    #[rustfmt::skip]
    fn exception_clauses() {
        let reader = image(&[
            &[
                0x0B, 0x30, 0x01, 0x00,     // fat, MoreSects, max stack 1
                0x04, 0x00, 0x00, 0x00,     // code size 4
                0x00, 0x00, 0x00, 0x00,
                0x00, 0xDE, 0x00, 0x2A,     // nop, leave.s +0, ret
                0x01, 0x10, 0x00, 0x00,
                0x02, 0x00,                 // finally
                0x00, 0x00, 0x02,           // try 0..2 ends inside leave.s
                0x03, 0x00, 0x01,
                0x00, 0x00, 0x00, 0x00,
            ],
        ]);

        let findings = verify(&reader, "System.Runtime", 2).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, VerifierErrorKind::InvalidExceptionClause);
        assert_eq!(findings[0].method, "Mod.Code.M0");
    }

    #[test]
    fn bodiless_methods() {
        let mut builder = MetadataBuilder::new("Mod");
        let owner = builder.type_def("Mod", "Shapes", 0, None);
        builder.method_with_flags(owner, "Abstract", VOID, 0, 0x05C6, 0);
        builder.method_with_flags(owner, "Invoke", VOID, 0, 0x01C6, 0x0003);
        builder.method_with_flags(owner, "Intrinsic", VOID, 0, 0x0096, 0x1000);
        builder.method(owner, "Empty", VOID, 0);
        let pe = PeBuilder::new(builder.build()).build();
        let reader = MetadataReader::from_mem(pe).unwrap();

        let findings = verify(&reader, "System.Runtime", 2).unwrap();
        let missing: Vec<_> = findings.iter().map(|f| f.method.as_str()).collect();
        assert_eq!(missing, vec!["Mod.Shapes.Intrinsic", "Mod.Shapes.Empty"]);
        assert!(findings[0].detail.contains("'System.Runtime'"));
        assert!(findings.iter().all(|f| f.kind == VerifierErrorKind::MissingBody));

        // Verifying the core library itself
        let findings = verify(&reader, "Mod", 2).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].method, "Mod.Shapes.Empty");
    }

    #[test]
    fn metadata_only_reader_is_not_supported() {
        let mut builder = MetadataBuilder::new("Mod");
        let owner = builder.type_def("Mod", "Code", 0, None);
        builder.method(owner, "Run", VOID, PeBuilder::BODY_RVA);
        let reader = MetadataReader::from_metadata(builder.build()).unwrap();

        assert!(matches!(
            verify(&reader, "", 2),
            Err(Error::NotSupported)
        ));
    }
}
