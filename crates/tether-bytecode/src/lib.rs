//! Tether managed module format
//!
//! This crate provides the binary module format read and written by the
//! weaver: type/member tables, attributes, type signatures, the instruction
//! set, an editable instruction list, a body builder, a verifier and a
//! disassembler.

#![warn(rust_2018_idioms)]

pub mod attribute;
pub mod builder;
pub mod constants;
pub mod disasm;
pub mod encoder;
pub mod instr;
pub mod module;
pub mod opcode;
pub mod signature;
pub mod verify;

pub use attribute::{AttrValue, Attribute, AttributeList};
pub use builder::{BodyBuilder, BuildError};
pub use constants::ConstantPool;
pub use disasm::disassemble;
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use instr::{Instr, InstructionList, Label};
pub use module::{
    Access, FieldDef, LineEntry, MemberRef, MemberRefKind, Metadata, MethodBody, MethodDef,
    MethodSig, Module, ModuleError, ParamDef, PropertyDef, SourceLocation, TypeDef, TypeKind,
};
pub use opcode::{NativeKind, Opcode};
pub use signature::{TypeName, TypeSig};
pub use verify::{verify_method, verify_module, verify_type, VerifyError};
