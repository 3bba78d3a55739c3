//! x86 register representation.

/// Register class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterClass {
    /// General purpose register (rax, ecx, bp, al, ...).
    General,
    /// Segment register (cs, ds, ...).
    Segment,
    /// Instruction pointer (rip/eip/ip).
    InstructionPointer,
    /// Flags register.
    Flags,
    /// x87 FPU stack register (st0-st7).
    X87,
}

/// An x86 register, identified by class, numeric id, and access width.
///
/// The same id names different registers at different widths (id 0 is
/// rax/eax/ax/al); the high-byte registers carry their own ids so that
/// `al` and `ah` stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Register {
    /// The class of register.
    pub class: RegisterClass,
    /// Register id (see [`ids`]).
    pub id: u16,
    /// Access width in bits.
    pub size: u16,
}

impl Register {
    /// Creates a new register.
    pub fn new(class: RegisterClass, id: u16, size: u16) -> Self {
        Self { class, id, size }
    }

    /// Creates a general-purpose register.
    pub fn gpr(id: u16, size: u16) -> Self {
        Self::new(RegisterClass::General, id, size)
    }

    /// Creates the instruction-pointer register at the given width.
    pub fn instruction_pointer(size: u16) -> Self {
        Self::new(RegisterClass::InstructionPointer, ids::RIP, size)
    }

    /// Creates a segment register.
    pub fn segment(id: u16) -> Self {
        Self::new(RegisterClass::Segment, id, 16)
    }

    /// Creates an x87 stack register st(i).
    pub fn st(i: u8) -> Self {
        Self::new(RegisterClass::X87, ids::ST0 + (i & 0x7) as u16, 80)
    }

    /// Returns true for rip/eip/ip.
    pub fn is_instruction_pointer(&self) -> bool {
        matches!(self.class, RegisterClass::InstructionPointer)
    }

    /// Returns the canonical name for this register.
    pub fn name(&self) -> &'static str {
        reg_name(self)
    }
}

/// x86 register ids.
pub mod ids {
    // GPRs; id is the hardware encoding.
    pub const RAX: u16 = 0;
    pub const RCX: u16 = 1;
    pub const RDX: u16 = 2;
    pub const RBX: u16 = 3;
    pub const RSP: u16 = 4;
    pub const RBP: u16 = 5;
    pub const RSI: u16 = 6;
    pub const RDI: u16 = 7;
    pub const R8: u16 = 8;
    pub const R9: u16 = 9;
    pub const R10: u16 = 10;
    pub const R11: u16 = 11;
    pub const R12: u16 = 12;
    pub const R13: u16 = 13;
    pub const R14: u16 = 14;
    pub const R15: u16 = 15;

    // Instruction pointer and flags.
    pub const RIP: u16 = 16;
    pub const RFLAGS: u16 = 17;

    // Legacy high-byte registers (encodings 4-7 without REX, 8-bit size).
    pub const AH: u16 = 20;
    pub const CH: u16 = 21;
    pub const DH: u16 = 22;
    pub const BH: u16 = 23;

    // Segment registers.
    pub const ES: u16 = 32;
    pub const CS: u16 = 33;
    pub const SS: u16 = 34;
    pub const DS: u16 = 35;
    pub const FS: u16 = 36;
    pub const GS: u16 = 37;

    // x87 stack registers.
    pub const ST0: u16 = 48;
    pub const ST1: u16 = 49;
    pub const ST2: u16 = 50;
    pub const ST3: u16 = 51;
    pub const ST4: u16 = 52;
    pub const ST5: u16 = 53;
    pub const ST6: u16 = 54;
    pub const ST7: u16 = 55;
}

fn reg_name(reg: &Register) -> &'static str {
    match reg.class {
        RegisterClass::InstructionPointer => match reg.size {
            16 => "ip",
            32 => "eip",
            _ => "rip",
        },
        RegisterClass::Flags => match reg.size {
            16 => "flags",
            32 => "eflags",
            _ => "rflags",
        },
        RegisterClass::Segment => match reg.id {
            ids::ES => "es",
            ids::CS => "cs",
            ids::SS => "ss",
            ids::DS => "ds",
            ids::FS => "fs",
            ids::GS => "gs",
            _ => "unknown",
        },
        RegisterClass::X87 => match reg.id {
            ids::ST0 => "st0",
            ids::ST1 => "st1",
            ids::ST2 => "st2",
            ids::ST3 => "st3",
            ids::ST4 => "st4",
            ids::ST5 => "st5",
            ids::ST6 => "st6",
            ids::ST7 => "st7",
            _ => "unknown",
        },
        RegisterClass::General => gpr_name(reg.id, reg.size),
    }
}

fn gpr_name(id: u16, size: u16) -> &'static str {
    match (id, size) {
        // 64-bit
        (ids::RAX, 64) => "rax",
        (ids::RCX, 64) => "rcx",
        (ids::RDX, 64) => "rdx",
        (ids::RBX, 64) => "rbx",
        (ids::RSP, 64) => "rsp",
        (ids::RBP, 64) => "rbp",
        (ids::RSI, 64) => "rsi",
        (ids::RDI, 64) => "rdi",
        (ids::R8, 64) => "r8",
        (ids::R9, 64) => "r9",
        (ids::R10, 64) => "r10",
        (ids::R11, 64) => "r11",
        (ids::R12, 64) => "r12",
        (ids::R13, 64) => "r13",
        (ids::R14, 64) => "r14",
        (ids::R15, 64) => "r15",

        // 32-bit
        (ids::RAX, 32) => "eax",
        (ids::RCX, 32) => "ecx",
        (ids::RDX, 32) => "edx",
        (ids::RBX, 32) => "ebx",
        (ids::RSP, 32) => "esp",
        (ids::RBP, 32) => "ebp",
        (ids::RSI, 32) => "esi",
        (ids::RDI, 32) => "edi",
        (ids::R8, 32) => "r8d",
        (ids::R9, 32) => "r9d",
        (ids::R10, 32) => "r10d",
        (ids::R11, 32) => "r11d",
        (ids::R12, 32) => "r12d",
        (ids::R13, 32) => "r13d",
        (ids::R14, 32) => "r14d",
        (ids::R15, 32) => "r15d",

        // 16-bit
        (ids::RAX, 16) => "ax",
        (ids::RCX, 16) => "cx",
        (ids::RDX, 16) => "dx",
        (ids::RBX, 16) => "bx",
        (ids::RSP, 16) => "sp",
        (ids::RBP, 16) => "bp",
        (ids::RSI, 16) => "si",
        (ids::RDI, 16) => "di",
        (ids::R8, 16) => "r8w",
        (ids::R9, 16) => "r9w",
        (ids::R10, 16) => "r10w",
        (ids::R11, 16) => "r11w",
        (ids::R12, 16) => "r12w",
        (ids::R13, 16) => "r13w",
        (ids::R14, 16) => "r14w",
        (ids::R15, 16) => "r15w",

        // 8-bit low
        (ids::RAX, 8) => "al",
        (ids::RCX, 8) => "cl",
        (ids::RDX, 8) => "dl",
        (ids::RBX, 8) => "bl",
        (ids::RSP, 8) => "spl",
        (ids::RBP, 8) => "bpl",
        (ids::RSI, 8) => "sil",
        (ids::RDI, 8) => "dil",
        (ids::R8, 8) => "r8b",
        (ids::R9, 8) => "r9b",
        (ids::R10, 8) => "r10b",
        (ids::R11, 8) => "r11b",
        (ids::R12, 8) => "r12b",
        (ids::R13, 8) => "r13b",
        (ids::R14, 8) => "r14b",
        (ids::R15, 8) => "r15b",

        // 8-bit high
        (ids::AH, 8) => "ah",
        (ids::CH, 8) => "ch",
        (ids::DH, 8) => "dh",
        (ids::BH, 8) => "bh",

        _ => "unknown",
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpr_names_by_width() {
        assert_eq!(Register::gpr(ids::RAX, 64).name(), "rax");
        assert_eq!(Register::gpr(ids::RAX, 32).name(), "eax");
        assert_eq!(Register::gpr(ids::RAX, 16).name(), "ax");
        assert_eq!(Register::gpr(ids::RAX, 8).name(), "al");
        assert_eq!(Register::gpr(ids::AH, 8).name(), "ah");
        assert_eq!(Register::gpr(ids::RSP, 8).name(), "spl");
        assert_eq!(Register::gpr(ids::R9, 32).name(), "r9d");
    }

    #[test]
    fn special_names() {
        assert_eq!(Register::instruction_pointer(64).name(), "rip");
        assert_eq!(Register::instruction_pointer(16).name(), "ip");
        assert_eq!(Register::segment(ids::GS).name(), "gs");
        assert_eq!(Register::st(3).name(), "st3");
    }
}
