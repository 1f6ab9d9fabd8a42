//! Operand layout of every CIL opcode (ECMA-335 Partition III).

use crate::metadata::tables::TableId;

/// Tables a token operand may legally point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `call`, `callvirt`, `newobj`, `jmp`, `ldftn`, `ldvirtftn`
    Method,
    /// `ldfld` and friends
    Field,
    /// `box`, `castclass`, `newarr`, ...
    Type,
    /// `calli`
    Signature,
    /// `ldstr`, an offset into `#US`
    String,
    /// `ldtoken`
    Any,
}

impl TokenKind {
    /// Tables a token of this kind may reference. `String` tokens live in the `#US` heap.
    #[must_use]
    pub fn tables(self) -> &'static [TableId] {
        match self {
            TokenKind::Method => &[TableId::MethodDef, TableId::MemberRef, TableId::MethodSpec],
            TokenKind::Field => &[TableId::Field, TableId::MemberRef],
            TokenKind::Type => &[TableId::TypeDef, TableId::TypeRef, TableId::TypeSpec],
            TokenKind::Signature => &[TableId::StandAloneSig],
            TokenKind::String => &[],
            TokenKind::Any => &[
                TableId::TypeDef,
                TableId::TypeRef,
                TableId::TypeSpec,
                TableId::MethodDef,
                TableId::MemberRef,
                TableId::MethodSpec,
                TableId::Field,
            ],
        }
    }
}

/// The operand that follows an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// No operand
    None,
    /// Immediate or index of `n` bytes
    Bytes(usize),
    /// Signed 8-bit branch offset
    ShortBranch,
    /// Signed 32-bit branch offset
    Branch,
    /// `switch` jump table
    Switch,
    /// Metadata token
    Token(TokenKind),
}

/// Operand of single-byte opcode `opcode`, `None` for unassigned values and the `0xFE` prefix
#[must_use]
pub fn single_byte(opcode: u8) -> Option<Operand> {
    use Operand::{Branch, Bytes, ShortBranch, Switch, Token};

    let operand = match opcode {
        0x00..=0x0D => Operand::None,
        0x0E..=0x13 => Bytes(1),
        0x14..=0x1E => Operand::None,
        0x1F => Bytes(1),
        0x20 | 0x22 => Bytes(4),
        0x21 | 0x23 => Bytes(8),
        0x25 | 0x26 => Operand::None,
        0x27 | 0x28 => Token(TokenKind::Method),
        0x29 => Token(TokenKind::Signature),
        0x2A => Operand::None,
        0x2B..=0x37 => ShortBranch,
        0x38..=0x44 => Branch,
        0x45 => Switch,
        0x46..=0x6E => Operand::None,
        0x6F => Token(TokenKind::Method),
        0x70 | 0x71 => Token(TokenKind::Type),
        0x72 => Token(TokenKind::String),
        0x73 => Token(TokenKind::Method),
        0x74 | 0x75 => Token(TokenKind::Type),
        0x76 => Operand::None,
        0x79 => Token(TokenKind::Type),
        0x7A => Operand::None,
        0x7B..=0x80 => Token(TokenKind::Field),
        0x81 => Token(TokenKind::Type),
        0x82..=0x8B => Operand::None,
        0x8C | 0x8D => Token(TokenKind::Type),
        0x8E => Operand::None,
        0x8F => Token(TokenKind::Type),
        0x90..=0xA2 => Operand::None,
        0xA3..=0xA5 => Token(TokenKind::Type),
        0xB3..=0xBA => Operand::None,
        0xC2 => Token(TokenKind::Type),
        0xC3 => Operand::None,
        0xC6 => Token(TokenKind::Type),
        0xD0 => Token(TokenKind::Any),
        0xD1..=0xDC => Operand::None,
        0xDD => Branch,
        0xDE => ShortBranch,
        0xDF | 0xE0 => Operand::None,
        _ => return None,
    };

    Some(operand)
}

/// Operand of the two-byte opcode `0xFE opcode`
#[must_use]
pub fn prefixed(opcode: u8) -> Option<Operand> {
    use Operand::{Bytes, Token};

    let operand = match opcode {
        0x00..=0x05 => Operand::None,
        0x06 | 0x07 => Token(TokenKind::Method),
        0x09..=0x0E => Bytes(2),
        0x0F | 0x11 => Operand::None,
        0x12 => Bytes(1),
        0x13 | 0x14 => Operand::None,
        0x15 | 0x16 => Token(TokenKind::Type),
        0x17 | 0x18 => Operand::None,
        0x19 => Bytes(1),
        0x1A => Operand::None,
        0x1C => Token(TokenKind::Type),
        0x1D | 0x1E => Operand::None,
        _ => return None,
    };

    Some(operand)
}
