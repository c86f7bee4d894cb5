//! Opcodes of the managed instruction set
//!
//! The instruction set is a small stack machine modelled on the managed
//! runtime's own: every opcode is a single byte, optionally followed by a
//! fixed-size little-endian operand.
//!
//! Opcodes are organized into categories:
//! - 0x00-0x0F: Stack manipulation & constants
//! - 0x10-0x1F: Arguments and locals
//! - 0x20-0x2F: Native-int arithmetic & conversion
//! - 0x50-0x5F: Comparison
//! - 0x90-0x9F: Control flow
//! - 0xA0-0xAF: Calls and returns
//! - 0xB0-0xBF: Fields, statics and object operations
//! - 0xC0-0xCF: Raw memory
//! - 0xE0-0xEF: Exceptions

/// Bytecode opcode enumeration
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation & Constants (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Pop top value from stack
    Pop = 0x01,
    /// Duplicate top stack value
    Dup = 0x02,
    /// Push null reference
    ConstNull = 0x04,
    /// Push 32-bit integer constant (operand: i32)
    ConstI32 = 0x07,
    /// Push 64-bit integer constant (operand: i64)
    ConstI64 = 0x08,
    /// Push 32-bit float constant (operand: f32)
    ConstF32 = 0x09,
    /// Push 64-bit float constant (operand: f64)
    ConstF64 = 0x0A,
    /// Push string constant from pool (operand: u32 index)
    ConstStr = 0x0B,

    // ===== Arguments and Locals (0x10-0x1F) =====
    /// Load argument (operand: u16 index, 0 is `this` for instance methods)
    LoadArg = 0x10,
    /// Store to argument (operand: u16 index)
    StoreArg = 0x11,
    /// Load the address of an argument (operand: u16 index)
    LoadArgAddr = 0x12,
    /// Load local variable (operand: u16 index)
    LoadLocal = 0x13,
    /// Store to local variable (operand: u16 index)
    StoreLocal = 0x14,
    /// Load the address of a local variable (operand: u16 index)
    LoadLocalAddr = 0x15,

    // ===== Arithmetic & Conversion (0x20-0x2F) =====
    /// Addition: pop b, pop a, push a + b
    Add = 0x20,
    /// Subtraction: pop b, pop a, push a - b
    Sub = 0x21,
    /// Multiplication: pop b, pop a, push a * b
    Mul = 0x22,
    /// Convert top of stack to native int
    ConvI = 0x28,
    /// Convert top of stack to 32-bit integer
    ConvI4 = 0x29,

    // ===== Comparison (0x50-0x5F) =====
    /// Equality: pop b, pop a, push a == b
    Ceq = 0x50,
    /// Less than: pop b, pop a, push a < b
    Clt = 0x51,
    /// Greater than: pop b, pop a, push a > b
    Cgt = 0x52,

    // ===== Control Flow (0x90-0x9F) =====
    /// Unconditional jump (operand: i32 relative offset)
    Jmp = 0x90,
    /// Jump if top of stack is true or non-null (operand: i32 relative offset)
    JmpIfTrue = 0x91,
    /// Jump if top of stack is false or null (operand: i32 relative offset)
    JmpIfFalse = 0x92,

    // ===== Calls (0xA0-0xAF) =====
    /// Call a method (operand: u32 member token)
    Call = 0xA0,
    /// Call a method through virtual dispatch (operand: u32 member token)
    CallVirt = 0xA1,
    /// Allocate and construct an object (operand: u32 constructor token)
    NewObj = 0xA2,
    /// Return from the current method
    Ret = 0xA3,

    // ===== Fields & Objects (0xB0-0xBF) =====
    /// Load instance field (operand: u32 member token)
    LoadField = 0xB0,
    /// Store instance field (operand: u32 member token)
    StoreField = 0xB1,
    /// Load the address of an instance field (operand: u32 member token)
    LoadFieldAddr = 0xB2,
    /// Load static field (operand: u32 member token)
    LoadStatic = 0xB3,
    /// Store static field (operand: u32 member token)
    StoreStatic = 0xB4,
    /// Checked reference cast (operand: u32 type token)
    CastClass = 0xB5,
    /// Copy a value type out of an address (operand: u32 type token)
    LoadObj = 0xB6,
    /// Copy a value type into an address (operand: u32 type token)
    StoreObj = 0xB7,

    // ===== Raw Memory (0xC0-0xCF) =====
    /// Load a primitive through an address (operand: u8 native kind)
    LoadInd = 0xC0,
    /// Store a primitive through an address (operand: u8 native kind)
    StoreInd = 0xC1,
    /// Fill a block: pop size, pop value, pop address
    InitBlock = 0xC2,
    /// Allocate uninitialized stack memory: pop size, push address
    LocalAlloc = 0xC3,

    // ===== Exceptions (0xE0-0xEF) =====
    /// Throw the exception object on top of the stack
    Throw = 0xE0,
}

impl Opcode {
    /// Convert a byte to an opcode
    pub fn from_u8(byte: u8) -> Option<Self> {
        use Opcode::*;
        Some(match byte {
            0x00 => Nop,
            0x01 => Pop,
            0x02 => Dup,
            0x04 => ConstNull,
            0x07 => ConstI32,
            0x08 => ConstI64,
            0x09 => ConstF32,
            0x0A => ConstF64,
            0x0B => ConstStr,
            0x10 => LoadArg,
            0x11 => StoreArg,
            0x12 => LoadArgAddr,
            0x13 => LoadLocal,
            0x14 => StoreLocal,
            0x15 => LoadLocalAddr,
            0x20 => Add,
            0x21 => Sub,
            0x22 => Mul,
            0x28 => ConvI,
            0x29 => ConvI4,
            0x50 => Ceq,
            0x51 => Clt,
            0x52 => Cgt,
            0x90 => Jmp,
            0x91 => JmpIfTrue,
            0x92 => JmpIfFalse,
            0xA0 => Call,
            0xA1 => CallVirt,
            0xA2 => NewObj,
            0xA3 => Ret,
            0xB0 => LoadField,
            0xB1 => StoreField,
            0xB2 => LoadFieldAddr,
            0xB3 => LoadStatic,
            0xB4 => StoreStatic,
            0xB5 => CastClass,
            0xB6 => LoadObj,
            0xB7 => StoreObj,
            0xC0 => LoadInd,
            0xC1 => StoreInd,
            0xC2 => InitBlock,
            0xC3 => LocalAlloc,
            0xE0 => Throw,
            _ => return None,
        })
    }

    /// Convert opcode to its byte value
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Mnemonic used by the disassembler
    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "nop",
            Pop => "pop",
            Dup => "dup",
            ConstNull => "const.null",
            ConstI32 => "const.i32",
            ConstI64 => "const.i64",
            ConstF32 => "const.f32",
            ConstF64 => "const.f64",
            ConstStr => "const.str",
            LoadArg => "ldarg",
            StoreArg => "starg",
            LoadArgAddr => "ldarga",
            LoadLocal => "ldloc",
            StoreLocal => "stloc",
            LoadLocalAddr => "ldloca",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            ConvI => "conv.i",
            ConvI4 => "conv.i4",
            Ceq => "ceq",
            Clt => "clt",
            Cgt => "cgt",
            Jmp => "jmp",
            JmpIfTrue => "jmp.true",
            JmpIfFalse => "jmp.false",
            Call => "call",
            CallVirt => "callvirt",
            NewObj => "newobj",
            Ret => "ret",
            LoadField => "ldfld",
            StoreField => "stfld",
            LoadFieldAddr => "ldflda",
            LoadStatic => "ldsfld",
            StoreStatic => "stsfld",
            CastClass => "castclass",
            LoadObj => "ldobj",
            StoreObj => "stobj",
            LoadInd => "ldind",
            StoreInd => "stind",
            InitBlock => "initblk",
            LocalAlloc => "localloc",
            Throw => "throw",
        }
    }

    /// Size in bytes of the operand that follows this opcode
    pub fn operand_size(self) -> usize {
        use Opcode::*;
        match self {
            Nop | Pop | Dup | ConstNull | Add | Sub | Mul | ConvI | ConvI4 | Ceq | Clt | Cgt
            | Ret | InitBlock | LocalAlloc | Throw => 0,
            LoadInd | StoreInd => 1,
            LoadArg | StoreArg | LoadArgAddr | LoadLocal | StoreLocal | LoadLocalAddr => 2,
            ConstI32 | ConstF32 | ConstStr | Jmp | JmpIfTrue | JmpIfFalse | Call | CallVirt
            | NewObj | LoadField | StoreField | LoadFieldAddr | LoadStatic | StoreStatic
            | CastClass | LoadObj | StoreObj => 4,
            ConstI64 | ConstF64 => 8,
        }
    }

    /// Check if this instruction ends a basic block with no fallthrough
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Ret | Opcode::Throw | Opcode::Jmp)
    }
}

/// Primitive width used by indirect loads and stores
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NativeKind {
    I8 = 0,
    U8 = 1,
    I16 = 2,
    U16 = 3,
    I32 = 4,
    U32 = 5,
    I64 = 6,
    U64 = 7,
    F32 = 8,
    F64 = 9,
    /// Pointer-sized integer
    Ptr = 10,
}

impl NativeKind {
    /// Convert a byte to a native kind
    pub fn from_u8(byte: u8) -> Option<Self> {
        use NativeKind::*;
        Some(match byte {
            0 => I8,
            1 => U8,
            2 => I16,
            3 => U16,
            4 => I32,
            5 => U32,
            6 => I64,
            7 => U64,
            8 => F32,
            9 => F64,
            10 => Ptr,
            _ => return None,
        })
    }

    /// Size in bytes (pointers are 8 bytes on every supported target)
    pub fn size(self) -> usize {
        use NativeKind::*;
        match self {
            I8 | U8 => 1,
            I16 | U16 => 2,
            I32 | U32 | F32 => 4,
            I64 | U64 | F64 | Ptr => 8,
        }
    }

    /// Suffix used by the disassembler
    pub fn name(self) -> &'static str {
        use NativeKind::*;
        match self {
            I8 => "i8",
            U8 => "u8",
            I16 => "i16",
            U16 => "u16",
            I32 => "i32",
            U32 => "u32",
            I64 => "i64",
            U64 => "u64",
            F32 => "f32",
            F64 => "f64",
            Ptr => "ptr",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_u8(byte) {
                assert_eq!(op.to_u8(), byte, "opcode {} did not round-trip", op.name());
            }
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_u8(0x03), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_operand_sizes() {
        assert_eq!(Opcode::Ret.operand_size(), 0);
        assert_eq!(Opcode::LoadInd.operand_size(), 1);
        assert_eq!(Opcode::LoadArg.operand_size(), 2);
        assert_eq!(Opcode::Call.operand_size(), 4);
        assert_eq!(Opcode::ConstF64.operand_size(), 8);
    }

    #[test]
    fn test_terminator_detection() {
        assert!(Opcode::Ret.is_terminator());
        assert!(Opcode::Throw.is_terminator());
        assert!(Opcode::Jmp.is_terminator());
        assert!(!Opcode::JmpIfTrue.is_terminator());
        assert!(!Opcode::Call.is_terminator());
    }

    #[test]
    fn test_native_kind_sizes() {
        assert_eq!(NativeKind::U8.size(), 1);
        assert_eq!(NativeKind::I16.size(), 2);
        assert_eq!(NativeKind::F32.size(), 4);
        assert_eq!(NativeKind::Ptr.size(), 8);
        assert_eq!(NativeKind::from_u8(11), None);
    }
}
