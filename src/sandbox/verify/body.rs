//! Method body headers and exception handling sections (ECMA-335 II.25.4).

use crate::{
    file::io::{read_le_at, CilIO},
    sandbox::verify::{Defect, VerifierErrorKind},
};

const TINY_FORMAT: u8 = 0x02;
const FAT_FORMAT: u8 = 0x03;
const FORMAT_MASK: u8 = 0x03;
const MORE_SECTS: u16 = 0x0008;
const FAT_HEADER_SIZE: usize = 12;

const SECTION_EH_TABLE: u8 = 0x01;
const SECTION_FAT_FORMAT: u8 = 0x40;
const SECTION_MORE_SECTS: u8 = 0x80;

/// Clause kind for filter handlers
pub const CLAUSE_FILTER: u32 = 0x0001;

/// One exception handling clause, widened to the fat layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionClause {
    /// Clause kind bits
    pub flags: u32,
    /// Start of the protected block
    pub try_offset: u32,
    /// Length of the protected block
    pub try_length: u32,
    /// Start of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Catch type token or filter offset
    pub class_token_or_filter: u32,
}

/// A parsed method body.
#[derive(Debug)]
pub struct MethodBody<'a> {
    /// The IL stream
    pub code: &'a [u8],
    /// Maximum evaluation stack depth, 8 for tiny headers
    pub max_stack: u16,
    /// `StandAloneSig` token of the locals, 0 for none
    pub local_var_sig: u32,
    /// Exception handling clauses
    pub clauses: Vec<ExceptionClause>,
}

fn read<T: CilIO>(data: &[u8], offset: &mut usize, kind: VerifierErrorKind) -> Result<T, Defect> {
    let at = *offset;
    read_le_at::<T>(data, offset).map_err(|_| Defect::at(kind, at, "truncated data"))
}

/// Parse the body that starts at the beginning of `data`.
///
/// # Errors
/// Returns a [`Defect`] for unknown header formats, code running past `data` and malformed
/// exception sections.
pub fn parse_body(data: &[u8]) -> Result<MethodBody<'_>, Defect> {
    let Some(&first) = data.first() else {
        return Err(Defect::new(VerifierErrorKind::InvalidMethodHeader, "empty method body"));
    };

    match first & FORMAT_MASK {
        TINY_FORMAT => {
            let size = usize::from(first >> 2);
            let code = data.get(1..1 + size).ok_or_else(|| {
                Defect::new(
                    VerifierErrorKind::CodeOutOfBounds,
                    format!("tiny body of {size} bytes runs past the image"),
                )
            })?;

            Ok(MethodBody {
                code,
                max_stack: 8,
                local_var_sig: 0,
                clauses: Vec::new(),
            })
        }
        FAT_FORMAT => parse_fat(data),
        other => Err(Defect::new(
            VerifierErrorKind::InvalidMethodHeader,
            format!("unknown header format {other:#x}"),
        )),
    }
}

fn parse_fat(data: &[u8]) -> Result<MethodBody<'_>, Defect> {
    let mut offset = 0;
    let header = VerifierErrorKind::InvalidMethodHeader;
    let flags = read::<u16>(data, &mut offset, header)?;
    let max_stack = read::<u16>(data, &mut offset, header)?;
    let code_size = read::<u32>(data, &mut offset, header)? as usize;
    let local_var_sig = read::<u32>(data, &mut offset, header)?;

    let header_size = usize::from(flags >> 12) * 4;
    if header_size != FAT_HEADER_SIZE {
        return Err(Defect::new(
            header,
            format!("fat header declares a size of {header_size} bytes"),
        ));
    }

    let code = FAT_HEADER_SIZE
        .checked_add(code_size)
        .and_then(|end| data.get(FAT_HEADER_SIZE..end))
        .ok_or_else(|| {
            Defect::new(
                VerifierErrorKind::CodeOutOfBounds,
                format!("fat body of {code_size} bytes runs past the image"),
            )
        })?;

    let clauses = if flags & MORE_SECTS != 0 {
        parse_sections(data, align4(FAT_HEADER_SIZE + code_size))?
    } else {
        Vec::new()
    };

    Ok(MethodBody {
        code,
        max_stack,
        local_var_sig,
        clauses,
    })
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

fn parse_sections(data: &[u8], mut cursor: usize) -> Result<Vec<ExceptionClause>, Defect> {
    let kind = VerifierErrorKind::InvalidExceptionClause;
    let mut clauses = Vec::new();

    loop {
        let start = cursor;
        let section = read::<u8>(data, &mut cursor, kind)?;
        if section & SECTION_EH_TABLE == 0 {
            return Err(Defect::at(kind, start, format!("unknown data section {section:#x}")));
        }

        let fat = section & SECTION_FAT_FORMAT != 0;
        let (size, entry) = if fat {
            let low = read::<u8>(data, &mut cursor, kind)?;
            let high = read::<u16>(data, &mut cursor, kind)?;
            (usize::from(low) | (usize::from(high) << 8), 24)
        } else {
            let size = read::<u8>(data, &mut cursor, kind)?;
            cursor += 2;
            (usize::from(size), 12)
        };

        if size < 4 || (size - 4) % entry != 0 || start + size > data.len() {
            return Err(Defect::at(kind, start, format!("invalid section size {size}")));
        }

        for _ in 0..(size - 4) / entry {
            let clause = if fat {
                ExceptionClause {
                    flags: read::<u32>(data, &mut cursor, kind)?,
                    try_offset: read::<u32>(data, &mut cursor, kind)?,
                    try_length: read::<u32>(data, &mut cursor, kind)?,
                    handler_offset: read::<u32>(data, &mut cursor, kind)?,
                    handler_length: read::<u32>(data, &mut cursor, kind)?,
                    class_token_or_filter: read::<u32>(data, &mut cursor, kind)?,
                }
            } else {
                ExceptionClause {
                    flags: u32::from(read::<u16>(data, &mut cursor, kind)?),
                    try_offset: u32::from(read::<u16>(data, &mut cursor, kind)?),
                    try_length: u32::from(read::<u8>(data, &mut cursor, kind)?),
                    handler_offset: u32::from(read::<u16>(data, &mut cursor, kind)?),
                    handler_length: u32::from(read::<u8>(data, &mut cursor, kind)?),
                    class_token_or_filter: read::<u32>(data, &mut cursor, kind)?,
                }
            };
            clauses.push(clause);
        }

        if section & SECTION_MORE_SECTS == 0 {
            return Ok(clauses);
        }
        cursor = align4(cursor);
    }
}
