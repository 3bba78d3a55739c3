//! Instruction operand types.
//!
//! Operands carry the raw encoded values exactly as they appear in the
//! byte stream. In particular, relative branch targets and rip-relative
//! displacements are stored as signed deltas; computing the absolute
//! address needs the surrounding instruction record and is done by the
//! target resolver in the decoder crate, so decoding itself stays
//! position-independent.

use crate::Register;

/// A raw encoded literal, tagged with its encoded width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Literal {
    Byte(i8),
    Word(i16),
    Dword(i32),
    Qword(i64),
}

impl Literal {
    /// Returns the encoded width in bits.
    pub fn width(&self) -> u16 {
        match self {
            Self::Byte(_) => 8,
            Self::Word(_) => 16,
            Self::Dword(_) => 32,
            Self::Qword(_) => 64,
        }
    }

    /// Returns the value sign-extended to i64.
    pub fn as_i64(&self) -> i64 {
        match *self {
            Self::Byte(v) => v as i64,
            Self::Word(v) => v as i64,
            Self::Dword(v) => v as i64,
            Self::Qword(v) => v,
        }
    }

    /// Returns the value zero-extended from its encoded width to u64.
    pub fn as_u64(&self) -> u64 {
        match *self {
            Self::Byte(v) => v as u8 as u64,
            Self::Word(v) => v as u16 as u64,
            Self::Dword(v) => v as u32 as u64,
            Self::Qword(v) => v as u64,
        }
    }
}

/// An immediate operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Immediate {
    /// Operand size in bits (the size the value is used at, which may be
    /// wider than the encoded width for sign-extended forms).
    pub size: u16,
    /// The raw encoded value.
    pub value: Literal,
}

/// A relative immediate: a signed delta from the address following the
/// instruction. The absolute target is not stored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelativeImmediate {
    /// Encoded delta width in bits; the width the target resolver
    /// dispatches on.
    pub size: u16,
    /// The raw encoded delta.
    pub delta: Literal,
}

/// A memory displacement with its own encoded width.
///
/// The width is significant for rip-relative operands: the target
/// resolver dispatches on it rather than on the operand's access size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Displacement {
    /// Encoded displacement width in bits.
    pub size: u16,
    /// The raw encoded displacement.
    pub value: Literal,
}

/// Memory reference operand: `[base + index*scale + disp]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryRef {
    /// Base register; the instruction-pointer register for rip-relative
    /// references.
    pub base: Option<Register>,
    /// Index register.
    pub index: Option<Register>,
    /// Scale factor for the index (1, 2, 4, or 8).
    pub scale: u8,
    /// Access size in bits.
    pub size: u16,
    /// Displacement, if one was encoded.
    pub displacement: Option<Displacement>,
    /// Segment override register.
    pub segment: Option<Register>,
}

impl MemoryRef {
    /// Creates a memory reference with just a base register.
    pub fn base(base: Register, size: u16) -> Self {
        Self {
            base: Some(base),
            index: None,
            scale: 1,
            size,
            displacement: None,
            segment: None,
        }
    }

    /// Creates a memory reference with base and displacement.
    pub fn base_disp(base: Register, displacement: Displacement, size: u16) -> Self {
        Self {
            base: Some(base),
            index: None,
            scale: 1,
            size,
            displacement: Some(displacement),
            segment: None,
        }
    }

    /// Creates an absolute (displacement-only) memory reference.
    pub fn absolute(displacement: Displacement, size: u16) -> Self {
        Self {
            base: None,
            index: None,
            scale: 1,
            size,
            displacement: Some(displacement),
            segment: None,
        }
    }

    /// Creates a rip-relative memory reference.
    pub fn rip_relative(displacement: Displacement, size: u16) -> Self {
        Self {
            base: Some(Register::instruction_pointer(64)),
            index: None,
            scale: 1,
            size,
            displacement: Some(displacement),
            segment: None,
        }
    }

    /// Sets the segment override.
    pub fn with_segment(mut self, segment: Option<Register>) -> Self {
        self.segment = segment;
        self
    }

    /// Returns true if the base is the instruction pointer.
    pub fn is_rip_relative(&self) -> bool {
        self.base.map(|r| r.is_instruction_pointer()).unwrap_or(false)
    }
}

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    /// Register operand.
    Register(Register),
    /// Memory reference.
    Memory(MemoryRef),
    /// Immediate value.
    Immediate(Immediate),
    /// Relative immediate (branch delta).
    Relative(RelativeImmediate),
    /// Far pointer (segment:offset), legacy modes only.
    FarPointer {
        segment: u16,
        offset: u32,
    },
}

impl Operand {
    /// Creates a register operand.
    pub fn reg(reg: Register) -> Self {
        Self::Register(reg)
    }

    /// Creates an immediate operand.
    pub fn imm(value: Literal, size: u16) -> Self {
        Self::Immediate(Immediate { size, value })
    }

    /// Creates a relative-immediate operand.
    pub fn rel(delta: Literal) -> Self {
        Self::Relative(RelativeImmediate {
            size: delta.width(),
            delta,
        })
    }

    /// Returns true if this is a register operand.
    pub fn is_register(&self) -> bool {
        matches!(self, Self::Register(_))
    }

    /// Returns true if this is a memory operand.
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory(_))
    }

    /// Returns true if this operand participates in target resolution:
    /// a relative immediate or a rip-relative memory reference.
    pub fn is_relative(&self) -> bool {
        match self {
            Self::Relative(_) => true,
            Self::Memory(mem) => mem.is_rip_relative(),
            _ => false,
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register(reg) => f.write_str(reg.name()),
            Self::Immediate(imm) => {
                let value = imm.value.as_i64();
                if value < 0 {
                    write!(f, "-{:#x}", value.unsigned_abs())
                } else {
                    write!(f, "{:#x}", value)
                }
            }
            Self::Relative(rel) => {
                let delta = rel.delta.as_i64();
                if delta < 0 {
                    write!(f, "$-{:#x}", delta.unsigned_abs())
                } else {
                    write!(f, "$+{:#x}", delta)
                }
            }
            Self::FarPointer { segment, offset } => write!(f, "{:#x}:{:#x}", segment, offset),
            Self::Memory(mem) => {
                write!(f, "[")?;
                if let Some(ref seg) = mem.segment {
                    write!(f, "{}:", seg.name())?;
                }
                let mut has_content = false;

                if let Some(ref base) = mem.base {
                    f.write_str(base.name())?;
                    has_content = true;
                }

                if let Some(ref index) = mem.index {
                    if has_content {
                        write!(f, " + ")?;
                    }
                    f.write_str(index.name())?;
                    if mem.scale > 1 {
                        write!(f, "*{}", mem.scale)?;
                    }
                    has_content = true;
                }

                if let Some(disp) = mem.displacement {
                    let value = disp.value.as_i64();
                    if has_content {
                        if value >= 0 {
                            write!(f, " + {:#x}", value)?;
                        } else {
                            write!(f, " - {:#x}", value.unsigned_abs())?;
                        }
                    } else {
                        write!(f, "{:#x}", disp.value.as_u64())?;
                    }
                }

                write!(f, "]")
            }
        }
    }
}
