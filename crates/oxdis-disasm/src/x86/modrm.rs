//! ModR/M and SIB byte decoding.

use super::prefix::{Prefixes, Rex};
use oxdis_core::{
    register::ids, DisassemblerMode, Displacement, Literal, MemoryRef, Operand, Register,
};

/// Decoded ModR/M byte.
#[derive(Debug, Clone, Copy)]
pub struct ModRM {
    /// Mod field (2 bits)
    pub mod_: u8,
    /// Reg field (3 bits, extended by REX.R)
    pub reg: u8,
    /// R/M field (3 bits, extended by REX.B)
    pub rm: u8,
}

impl ModRM {
    /// Parse a ModR/M byte with REX extension.
    pub fn parse(byte: u8, rex: Option<Rex>) -> Self {
        let rex = rex.unwrap_or_default();
        Self {
            mod_: (byte >> 6) & 0x3,
            reg: ((byte >> 3) & 0x7) | ((rex.r as u8) << 3),
            rm: (byte & 0x7) | ((rex.b as u8) << 3),
        }
    }

    /// Returns true if this ModR/M encodes a register operand (mod=11).
    pub fn is_register(&self) -> bool {
        self.mod_ == 0b11
    }

    /// Returns true if this ModR/M requires a SIB byte (32/64-bit
    /// addressing only).
    pub fn needs_sib(&self) -> bool {
        self.mod_ != 0b11 && (self.rm & 0x7) == 0x4
    }
}

/// Decoded SIB byte.
#[derive(Debug, Clone, Copy)]
pub struct Sib {
    /// Scale (2 bits) - actual scale is 1 << scale
    pub scale: u8,
    /// Index register (3 bits, extended by REX.X)
    pub index: u8,
    /// Base register (3 bits, extended by REX.B)
    pub base: u8,
}

impl Sib {
    /// Parse a SIB byte with REX extension.
    pub fn parse(byte: u8, rex: Option<Rex>) -> Self {
        let rex = rex.unwrap_or_default();
        Self {
            scale: (byte >> 6) & 0x3,
            index: ((byte >> 3) & 0x7) | ((rex.x as u8) << 3),
            base: (byte & 0x7) | ((rex.b as u8) << 3),
        }
    }

    /// Returns the actual scale factor (1, 2, 4, or 8).
    pub fn scale_factor(&self) -> u8 {
        1 << self.scale
    }
}

/// Decode a general-purpose register from its hardware number.
///
/// At 8-bit width the encodings 4-7 name ah/ch/dh/bh unless any REX
/// prefix is present, in which case they name spl/bpl/sil/dil.
pub fn decode_gpr(num: u8, size: u16, rex_present: bool) -> Register {
    if size == 8 && !rex_present && (4..8).contains(&num) {
        return Register::gpr(ids::AH + (num - 4) as u16, 8);
    }
    Register::gpr(num as u16, size)
}

/// Reads a displacement of the given width from the byte stream.
fn read_displacement(bytes: &[u8], width: u16) -> Option<Displacement> {
    let value = match width {
        8 => Literal::Byte(*bytes.first()? as i8),
        16 => Literal::Word(i16::from_le_bytes([*bytes.first()?, *bytes.get(1)?])),
        32 => Literal::Dword(i32::from_le_bytes([
            *bytes.first()?,
            *bytes.get(1)?,
            *bytes.get(2)?,
            *bytes.get(3)?,
        ])),
        _ => return None,
    };
    Some(Displacement {
        size: width,
        value,
    })
}

/// Decode the r/m field of ModR/M.
/// Returns (operand, bytes_consumed) counting from after the ModR/M
/// byte, or None if the byte stream is too short.
pub fn decode_modrm_rm(
    bytes: &[u8],
    modrm: ModRM,
    prefixes: &Prefixes,
    mode: DisassemblerMode,
    address_mode: u16,
    operand_size: u16,
) -> Option<(Operand, usize)> {
    // Register operand
    if modrm.is_register() {
        return Some((
            Operand::Register(decode_gpr(modrm.rm, operand_size, prefixes.rex.is_some())),
            0,
        ));
    }

    let (mem, consumed) = if address_mode == 16 {
        decode_mem16(bytes, modrm, operand_size)?
    } else {
        decode_mem32_64(bytes, modrm, prefixes, mode, address_mode, operand_size)?
    };

    Some((
        Operand::Memory(mem.with_segment(prefixes.segment)),
        consumed,
    ))
}

/// 16-bit addressing forms: two-register bases, disp8/disp16, and the
/// mod=00 rm=110 absolute disp16 case.
fn decode_mem16(bytes: &[u8], modrm: ModRM, operand_size: u16) -> Option<(MemoryRef, usize)> {
    const BASES: [(Option<u16>, Option<u16>); 8] = [
        (Some(ids::RBX), Some(ids::RSI)), // [bx+si]
        (Some(ids::RBX), Some(ids::RDI)), // [bx+di]
        (Some(ids::RBP), Some(ids::RSI)), // [bp+si]
        (Some(ids::RBP), Some(ids::RDI)), // [bp+di]
        (Some(ids::RSI), None),           // [si]
        (Some(ids::RDI), None),           // [di]
        (Some(ids::RBP), None),           // [bp] (or disp16 when mod=00)
        (Some(ids::RBX), None),           // [bx]
    ];

    let rm = (modrm.rm & 0x7) as usize;

    // mod=00 rm=110 is an absolute disp16, no base
    if modrm.mod_ == 0b00 && rm == 6 {
        let disp = read_displacement(bytes, 16)?;
        return Some((MemoryRef::absolute(disp, operand_size), 2));
    }

    let (base, index) = BASES[rm];
    let mut mem = MemoryRef {
        base: base.map(|id| Register::gpr(id, 16)),
        index: index.map(|id| Register::gpr(id, 16)),
        scale: 1,
        size: operand_size,
        displacement: None,
        segment: None,
    };

    let consumed = match modrm.mod_ {
        0b01 => {
            mem.displacement = Some(read_displacement(bytes, 8)?);
            1
        }
        0b10 => {
            mem.displacement = Some(read_displacement(bytes, 16)?);
            2
        }
        _ => 0,
    };

    Some((mem, consumed))
}

/// 32/64-bit addressing forms: SIB, disp8/disp32, and rip-relative
/// (64-bit mode) or absolute disp32 (legacy modes) for mod=00 rm=101.
fn decode_mem32_64(
    bytes: &[u8],
    modrm: ModRM,
    prefixes: &Prefixes,
    mode: DisassemblerMode,
    address_mode: u16,
    operand_size: u16,
) -> Option<(MemoryRef, usize)> {
    let mut offset = 0;
    let mut base: Option<Register> = None;
    let mut index: Option<Register> = None;
    let mut scale: u8 = 1;
    let mut sib_disp32 = false;

    if modrm.needs_sib() {
        let sib = Sib::parse(*bytes.first()?, prefixes.rex);
        offset += 1;

        // Index number 4 (no REX.X) means no index; r12 is a valid index.
        if sib.index != 4 {
            index = Some(Register::gpr(sib.index as u16, address_mode));
            scale = sib.scale_factor();
        }

        // SIB base 101 with mod=00 drops the base but forces a disp32.
        if (sib.base & 0x7) == 0x5 && modrm.mod_ == 0b00 {
            sib_disp32 = true;
        } else {
            base = Some(Register::gpr(sib.base as u16, address_mode));
        }
    } else if (modrm.rm & 0x7) == 0x5 && modrm.mod_ == 0b00 {
        let disp = read_displacement(&bytes[offset..], 32)?;
        offset += 4;

        let mem = if mode.is_64bit() {
            MemoryRef::rip_relative(disp, operand_size)
        } else {
            MemoryRef::absolute(disp, operand_size)
        };
        return Some((mem, offset));
    } else {
        base = Some(Register::gpr(modrm.rm as u16, address_mode));
    }

    let mut mem = MemoryRef {
        base,
        index,
        scale,
        size: operand_size,
        displacement: None,
        segment: None,
    };

    if modrm.mod_ == 0b10 || sib_disp32 {
        mem.displacement = Some(read_displacement(&bytes[offset..], 32)?);
        offset += 4;
    } else if modrm.mod_ == 0b01 {
        mem.displacement = Some(read_displacement(&bytes[offset..], 8)?);
        offset += 1;
    }

    Some((mem, offset))
}
