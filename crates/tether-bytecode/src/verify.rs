//! Method body verification

use crate::instr::{Instr, InstructionList};
use crate::module::{MemberRefKind, MethodDef, Module, TypeDef};
use thiserror::Error;

const MAX_STACK_DEPTH: i32 = 1024;

/// Bytecode verification errors
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Body failed to decode
    #[error("Decode error: {0}")]
    DecodeError(#[from] crate::encoder::DecodeError),

    /// Stack underflow
    #[error("Stack underflow at offset {0}")]
    StackUnderflow(u32),

    /// Stack overflow
    #[error("Stack overflow at offset {0} (depth: {1})")]
    StackOverflow(u32, i32),

    /// Two paths reach an instruction with different stack depths
    #[error("Inconsistent stack depth at offset {offset}: {first} vs {second}")]
    StackMismatch { offset: u32, first: i32, second: i32 },

    /// `ret` with leftover values on the stack
    #[error("Unbalanced stack at return (offset {offset}, depth {depth})")]
    UnbalancedReturn { offset: u32, depth: i32 },

    /// Member or type token out of range
    #[error("Invalid token {token} at offset {offset}")]
    InvalidToken { token: u32, offset: u32 },

    /// Field instruction referencing a method or vice versa
    #[error("Token {token} at offset {offset} has the wrong member kind")]
    WrongMemberKind { token: u32, offset: u32 },

    /// String pool index out of range
    #[error("Invalid constant pool reference: index {index} at offset {offset}")]
    InvalidConstantRef { index: u32, offset: u32 },

    /// Local variable index out of range
    #[error("Invalid local variable reference: index {index} (max {max}) at offset {offset}")]
    InvalidLocalRef { index: u16, max: usize, offset: u32 },

    /// Argument index out of range
    #[error("Invalid argument reference: index {index} (max {max}) at offset {offset}")]
    InvalidArgRef { index: u16, max: usize, offset: u32 },

    /// Execution falls off end
    #[error("Execution falls off end of method at offset {0}")]
    FallOffEnd(u32),

    /// Module validation error
    #[error("Module validation error: {0}")]
    ModuleValidation(String),
}

/// Verify every method body in a module
pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    module.validate().map_err(VerifyError::ModuleValidation)?;

    for ty in &module.types {
        for method in &ty.methods {
            verify_method(module, method).map_err(|e| {
                VerifyError::ModuleValidation(format!(
                    "{}::{}: {}",
                    ty.full_name(),
                    method.name,
                    e
                ))
            })?;
        }
    }

    Ok(())
}

/// Verify every method of a single type
pub fn verify_type(module: &Module, ty: &TypeDef) -> Result<(), (String, VerifyError)> {
    for method in &ty.methods {
        verify_method(module, method).map_err(|e| (method.name.clone(), e))?;
    }
    Ok(())
}

/// Verify a single method body
///
/// Abstract methods (no body) always verify.
pub fn verify_method(module: &Module, method: &MethodDef) -> Result<(), VerifyError> {
    let body = match &method.body {
        Some(body) => body,
        None => return Ok(()),
    };

    let list = InstructionList::decode(&body.code)?;
    if list.is_empty() {
        return Err(VerifyError::FallOffEnd(0));
    }
    let offsets = list.offsets();

    // Operand ranges
    for (index, instr) in list.iter().enumerate() {
        let offset = offsets[index];
        verify_operands(module, method, body.locals.len(), instr, offset)?;
    }

    // Ensure method ends with a terminator
    if let Some(last) = list.as_slice().last() {
        if !last.opcode().is_terminator() {
            return Err(VerifyError::FallOffEnd(offsets[list.len() - 1]));
        }
    }

    verify_stack_depth(module, method, &list, &offsets)
}

fn verify_operands(
    module: &Module,
    method: &MethodDef,
    local_count: usize,
    instr: &Instr,
    offset: u32,
) -> Result<(), VerifyError> {
    match instr {
        Instr::LoadLocal(index) | Instr::StoreLocal(index) | Instr::LoadLocalAddr(index) => {
            if *index as usize >= local_count {
                return Err(VerifyError::InvalidLocalRef {
                    index: *index,
                    max: local_count,
                    offset,
                });
            }
        }
        Instr::LoadArg(index) | Instr::StoreArg(index) | Instr::LoadArgAddr(index) => {
            if *index as usize >= method.arg_count() {
                return Err(VerifyError::InvalidArgRef {
                    index: *index,
                    max: method.arg_count(),
                    offset,
                });
            }
        }
        Instr::ConstStr(index) => {
            if module.constants.get_string(*index).is_none() {
                return Err(VerifyError::InvalidConstantRef {
                    index: *index,
                    offset,
                });
            }
        }
        _ => {}
    }

    if let Some(token) = instr.member_token() {
        let member = module
            .member_ref(token)
            .ok_or(VerifyError::InvalidToken { token, offset })?;
        let kind_ok = match (&member.kind, instr) {
            (MemberRefKind::Method(_), Instr::Call(_) | Instr::CallVirt(_)) => true,
            (MemberRefKind::Method(sig), Instr::NewObj(_)) => member.is_constructor() && sig.has_this,
            (
                MemberRefKind::Field { is_static: false, .. },
                Instr::LoadField(_) | Instr::StoreField(_) | Instr::LoadFieldAddr(_),
            ) => true,
            (MemberRefKind::Field { is_static: true, .. }, Instr::LoadStatic(_) | Instr::StoreStatic(_)) => {
                true
            }
            _ => false,
        };
        if !kind_ok {
            return Err(VerifyError::WrongMemberKind { token, offset });
        }
    }

    if let Some(token) = instr.type_token() {
        if module.type_ref(token).is_none() {
            return Err(VerifyError::InvalidToken { token, offset });
        }
    }

    Ok(())
}

/// Stack effect of an instruction as (pops, pushes)
fn stack_effect(module: &Module, method: &MethodDef, instr: &Instr) -> (i32, i32) {
    use Instr::*;
    match instr {
        Nop | Jmp(_) => (0, 0),
        Pop => (1, 0),
        Dup => (1, 2),
        ConstNull | ConstI32(_) | ConstI64(_) | ConstF32(_) | ConstF64(_) | ConstStr(_) => (0, 1),
        LoadArg(_) | LoadArgAddr(_) | LoadLocal(_) | LoadLocalAddr(_) => (0, 1),
        StoreArg(_) | StoreLocal(_) => (1, 0),
        Add | Sub | Mul | Ceq | Clt | Cgt => (2, 1),
        ConvI | ConvI4 => (1, 1),
        JmpIfTrue(_) | JmpIfFalse(_) => (1, 0),
        Call(token) | CallVirt(token) => match module.member_ref(*token).and_then(|m| m.method_sig()) {
            Some(sig) => (
                sig.params.len() as i32 + i32::from(sig.has_this),
                i32::from(!sig.ret.is_void()),
            ),
            None => (0, 0),
        },
        NewObj(token) => match module.member_ref(*token).and_then(|m| m.method_sig()) {
            Some(sig) => (sig.params.len() as i32, 1),
            None => (0, 1),
        },
        Ret => (i32::from(!method.return_type.is_void()), 0),
        LoadField(_) | LoadFieldAddr(_) => (1, 1),
        StoreField(_) => (2, 0),
        LoadStatic(_) => (0, 1),
        StoreStatic(_) => (1, 0),
        CastClass(_) | LoadObj(_) => (1, 1),
        StoreObj(_) => (2, 0),
        LoadInd(_) | LocalAlloc => (1, 1),
        StoreInd(_) => (2, 0),
        InitBlock => (3, 0),
        Throw => (1, 0),
    }
}

/// Verify stack depth along every path with a worklist
fn verify_stack_depth(
    module: &Module,
    method: &MethodDef,
    list: &InstructionList,
    offsets: &[u32],
) -> Result<(), VerifyError> {
    let mut depth_at: Vec<Option<i32>> = vec![None; list.len()];
    let mut worklist = vec![(0usize, 0i32)];

    while let Some((index, entry_depth)) = worklist.pop() {
        match depth_at[index] {
            Some(known) if known == entry_depth => continue,
            Some(known) => {
                return Err(VerifyError::StackMismatch {
                    offset: offsets[index],
                    first: known,
                    second: entry_depth,
                })
            }
            None => depth_at[index] = Some(entry_depth),
        }

        let instr = &list.as_slice()[index];
        let offset = offsets[index];
        let (pops, pushes) = stack_effect(module, method, instr);
        if entry_depth < pops {
            return Err(VerifyError::StackUnderflow(offset));
        }
        let depth = entry_depth - pops + pushes;
        if depth > MAX_STACK_DEPTH {
            return Err(VerifyError::StackOverflow(offset, depth));
        }

        if matches!(instr, Instr::Ret) && depth != 0 {
            return Err(VerifyError::UnbalancedReturn { offset, depth });
        }

        if let Some(label) = instr.label() {
            worklist.push((label.index(), depth));
        }
        if !instr.opcode().is_terminator() {
            if index + 1 >= list.len() {
                return Err(VerifyError::FallOffEnd(offset));
            }
            worklist.push((index + 1, depth));
        }
    }

    Ok(())
}
