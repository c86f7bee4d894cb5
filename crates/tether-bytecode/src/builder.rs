//! Method body builder
//!
//! Synthesized bodies are built instruction by instruction. Forward branches
//! are emitted against labels that are bound later; `build` fails if any label
//! was left unbound.

use crate::instr::{Instr, InstructionList, Label};
use crate::module::MethodBody;
use crate::opcode::NativeKind;
use crate::signature::TypeSig;
use thiserror::Error;

/// Body construction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// A label was referenced but never bound
    #[error("Label {0} was never bound")]
    UnboundLabel(u32),

    /// Too many locals for a u16 index
    #[error("Too many local variables")]
    TooManyLocals,
}

/// Helper for building method bodies
#[derive(Debug, Default)]
pub struct BodyBuilder {
    locals: Vec<TypeSig>,
    instrs: Vec<Instr>,
    /// Bound instruction index per label; `None` until bound
    labels: Vec<Option<u32>>,
}

impl BodyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing local signature list
    pub fn with_locals(locals: Vec<TypeSig>) -> Self {
        Self {
            locals,
            ..Self::default()
        }
    }

    /// Allocate a new local variable, returning its index
    pub fn add_local(&mut self, ty: TypeSig) -> Result<u16, BuildError> {
        if self.locals.len() >= u16::MAX as usize {
            return Err(BuildError::TooManyLocals);
        }
        self.locals.push(ty);
        Ok((self.locals.len() - 1) as u16)
    }

    /// Create an unbound label
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label((self.labels.len() - 1) as u32)
    }

    /// Bind a label to the next emitted instruction
    pub fn bind(&mut self, label: Label) {
        if let Some(slot) = self.labels.get_mut(label.index()) {
            *slot = Some(self.instrs.len() as u32);
        }
    }

    /// Emit an instruction
    pub fn emit(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    /// Emit a sequence of instructions
    pub fn emit_all(&mut self, instrs: impl IntoIterator<Item = Instr>) {
        self.instrs.extend(instrs);
    }

    /// Number of instructions emitted so far
    pub fn current_position(&self) -> usize {
        self.instrs.len()
    }

    // ===== Shorthands =====

    pub fn load_arg(&mut self, index: u16) {
        self.emit(Instr::LoadArg(index));
    }

    pub fn load_local(&mut self, index: u16) {
        self.emit(Instr::LoadLocal(index));
    }

    pub fn store_local(&mut self, index: u16) {
        self.emit(Instr::StoreLocal(index));
    }

    pub fn const_i32(&mut self, value: i32) {
        self.emit(Instr::ConstI32(value));
    }

    pub fn call(&mut self, token: u32) {
        self.emit(Instr::Call(token));
    }

    pub fn load_static(&mut self, token: u32) {
        self.emit(Instr::LoadStatic(token));
    }

    pub fn store_static(&mut self, token: u32) {
        self.emit(Instr::StoreStatic(token));
    }

    pub fn load_ind(&mut self, kind: NativeKind) {
        self.emit(Instr::LoadInd(kind));
    }

    pub fn store_ind(&mut self, kind: NativeKind) {
        self.emit(Instr::StoreInd(kind));
    }

    pub fn jmp(&mut self, label: Label) {
        self.emit(Instr::Jmp(label));
    }

    pub fn jmp_if_true(&mut self, label: Label) {
        self.emit(Instr::JmpIfTrue(label));
    }

    pub fn jmp_if_false(&mut self, label: Label) {
        self.emit(Instr::JmpIfFalse(label));
    }

    pub fn ret(&mut self) {
        self.emit(Instr::Ret);
    }

    /// Resolve builder labels to instruction indices
    pub fn into_list(self) -> Result<(InstructionList, Vec<TypeSig>), BuildError> {
        let mut instrs = self.instrs;
        for instr in &mut instrs {
            let resolved = match instr {
                Instr::Jmp(label) | Instr::JmpIfTrue(label) | Instr::JmpIfFalse(label) => label,
                _ => continue,
            };
            let bound = self
                .labels
                .get(resolved.index())
                .copied()
                .flatten()
                .ok_or(BuildError::UnboundLabel(resolved.0))?;
            *resolved = Label(bound);
        }
        Ok((InstructionList::from_instrs(instrs), self.locals))
    }

    /// Build the final method body
    pub fn build(self) -> Result<MethodBody, BuildError> {
        let (list, locals) = self.into_list()?;
        Ok(list.encode_body(locals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_label() {
        let mut builder = BodyBuilder::new();
        let done = builder.new_label();
        builder.load_arg(0);
        builder.jmp_if_true(done);
        builder.const_i32(7);
        builder.emit(Instr::Pop);
        builder.bind(done);
        builder.ret();

        let (list, _) = builder.into_list().unwrap();
        assert_eq!(list.get(1), Some(&Instr::JmpIfTrue(Label(4))));
    }

    #[test]
    fn test_unbound_label() {
        let mut builder = BodyBuilder::new();
        let never = builder.new_label();
        builder.jmp(never);
        assert_eq!(builder.build().unwrap_err(), BuildError::UnboundLabel(0));
    }

    #[test]
    fn test_locals() {
        let mut builder = BodyBuilder::with_locals(vec![TypeSig::I32]);
        let local = builder.add_local(TypeSig::IntPtr).unwrap();
        assert_eq!(local, 1);
        builder.ret();
        let body = builder.build().unwrap();
        assert_eq!(body.locals, vec![TypeSig::I32, TypeSig::IntPtr]);
        assert_eq!(body.code, vec![0xA3]);
    }
}
