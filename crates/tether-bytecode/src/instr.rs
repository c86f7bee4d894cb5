//! Decoded instruction lists
//!
//! Method bodies are stored as raw bytes with relative branch offsets. Editing
//! them directly would require re-patching every branch after each insertion,
//! so bodies are decoded into an [`InstructionList`] whose branch operands are
//! instruction indices ([`Label`]s). Insertion and removal remap labels and
//! sequence points; encoding recomputes the relative offsets.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::module::{LineEntry, MethodBody};
use crate::opcode::{NativeKind, Opcode};
use crate::signature::TypeSig;
use rustc_hash::FxHashMap;

/// Branch target: the index of an instruction in its list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl Label {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A single decoded instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Nop,
    Pop,
    Dup,
    ConstNull,
    ConstI32(i32),
    ConstI64(i64),
    ConstF32(f32),
    ConstF64(f64),
    /// String pool index
    ConstStr(u32),
    LoadArg(u16),
    StoreArg(u16),
    LoadArgAddr(u16),
    LoadLocal(u16),
    StoreLocal(u16),
    LoadLocalAddr(u16),
    Add,
    Sub,
    Mul,
    ConvI,
    ConvI4,
    Ceq,
    Clt,
    Cgt,
    Jmp(Label),
    JmpIfTrue(Label),
    JmpIfFalse(Label),
    /// Member token
    Call(u32),
    CallVirt(u32),
    NewObj(u32),
    Ret,
    LoadField(u32),
    StoreField(u32),
    LoadFieldAddr(u32),
    LoadStatic(u32),
    StoreStatic(u32),
    /// Type token
    CastClass(u32),
    LoadObj(u32),
    StoreObj(u32),
    LoadInd(NativeKind),
    StoreInd(NativeKind),
    InitBlock,
    LocalAlloc,
    Throw,
}

impl Instr {
    /// Opcode of this instruction
    pub fn opcode(&self) -> Opcode {
        use Instr::*;
        match self {
            Nop => Opcode::Nop,
            Pop => Opcode::Pop,
            Dup => Opcode::Dup,
            ConstNull => Opcode::ConstNull,
            ConstI32(_) => Opcode::ConstI32,
            ConstI64(_) => Opcode::ConstI64,
            ConstF32(_) => Opcode::ConstF32,
            ConstF64(_) => Opcode::ConstF64,
            ConstStr(_) => Opcode::ConstStr,
            LoadArg(_) => Opcode::LoadArg,
            StoreArg(_) => Opcode::StoreArg,
            LoadArgAddr(_) => Opcode::LoadArgAddr,
            LoadLocal(_) => Opcode::LoadLocal,
            StoreLocal(_) => Opcode::StoreLocal,
            LoadLocalAddr(_) => Opcode::LoadLocalAddr,
            Add => Opcode::Add,
            Sub => Opcode::Sub,
            Mul => Opcode::Mul,
            ConvI => Opcode::ConvI,
            ConvI4 => Opcode::ConvI4,
            Ceq => Opcode::Ceq,
            Clt => Opcode::Clt,
            Cgt => Opcode::Cgt,
            Jmp(_) => Opcode::Jmp,
            JmpIfTrue(_) => Opcode::JmpIfTrue,
            JmpIfFalse(_) => Opcode::JmpIfFalse,
            Call(_) => Opcode::Call,
            CallVirt(_) => Opcode::CallVirt,
            NewObj(_) => Opcode::NewObj,
            Ret => Opcode::Ret,
            LoadField(_) => Opcode::LoadField,
            StoreField(_) => Opcode::StoreField,
            LoadFieldAddr(_) => Opcode::LoadFieldAddr,
            LoadStatic(_) => Opcode::LoadStatic,
            StoreStatic(_) => Opcode::StoreStatic,
            CastClass(_) => Opcode::CastClass,
            LoadObj(_) => Opcode::LoadObj,
            StoreObj(_) => Opcode::StoreObj,
            LoadInd(_) => Opcode::LoadInd,
            StoreInd(_) => Opcode::StoreInd,
            InitBlock => Opcode::InitBlock,
            LocalAlloc => Opcode::LocalAlloc,
            Throw => Opcode::Throw,
        }
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        1 + self.opcode().operand_size()
    }

    /// Branch target, for jumps
    pub fn label(&self) -> Option<Label> {
        match self {
            Instr::Jmp(l) | Instr::JmpIfTrue(l) | Instr::JmpIfFalse(l) => Some(*l),
            _ => None,
        }
    }

    fn label_mut(&mut self) -> Option<&mut Label> {
        match self {
            Instr::Jmp(l) | Instr::JmpIfTrue(l) | Instr::JmpIfFalse(l) => Some(l),
            _ => None,
        }
    }

    /// Member-reference token, for calls and field accesses
    pub fn member_token(&self) -> Option<u32> {
        use Instr::*;
        match self {
            Call(t) | CallVirt(t) | NewObj(t) | LoadField(t) | StoreField(t) | LoadFieldAddr(t)
            | LoadStatic(t) | StoreStatic(t) => Some(*t),
            _ => None,
        }
    }

    /// Type-reference token, for casts and object copies
    pub fn type_token(&self) -> Option<u32> {
        match self {
            Instr::CastClass(t) | Instr::LoadObj(t) | Instr::StoreObj(t) => Some(*t),
            _ => None,
        }
    }

    /// Load the indirect-access kind for a primitive signature
    pub fn native_kind_of(sig: &TypeSig) -> Option<NativeKind> {
        Some(match sig {
            TypeSig::I8 => NativeKind::I8,
            TypeSig::U8 | TypeSig::Bool => NativeKind::U8,
            TypeSig::I16 => NativeKind::I16,
            TypeSig::U16 | TypeSig::Char => NativeKind::U16,
            TypeSig::I32 => NativeKind::I32,
            TypeSig::U32 => NativeKind::U32,
            TypeSig::I64 => NativeKind::I64,
            TypeSig::U64 => NativeKind::U64,
            TypeSig::F32 => NativeKind::F32,
            TypeSig::F64 => NativeKind::F64,
            TypeSig::IntPtr => NativeKind::Ptr,
            _ => return None,
        })
    }

    fn encode(&self, writer: &mut BytecodeWriter, relative: i32) {
        use Instr::*;
        writer.emit_opcode(self.opcode());
        match self {
            ConstI32(v) => writer.emit_i32(*v),
            ConstI64(v) => writer.emit_i64(*v),
            ConstF32(v) => writer.emit_f32(*v),
            ConstF64(v) => writer.emit_f64(*v),
            LoadArg(i) | StoreArg(i) | LoadArgAddr(i) | LoadLocal(i) | StoreLocal(i)
            | LoadLocalAddr(i) => writer.emit_u16(*i),
            Jmp(_) | JmpIfTrue(_) | JmpIfFalse(_) => writer.emit_i32(relative),
            ConstStr(t) | Call(t) | CallVirt(t) | NewObj(t) | LoadField(t) | StoreField(t)
            | LoadFieldAddr(t) | LoadStatic(t) | StoreStatic(t) | CastClass(t) | LoadObj(t)
            | StoreObj(t) => writer.emit_u32(*t),
            LoadInd(kind) | StoreInd(kind) => writer.emit_u8(*kind as u8),
            Nop | Pop | Dup | ConstNull | Add | Sub | Mul | ConvI | ConvI4 | Ceq | Clt | Cgt
            | Ret | InitBlock | LocalAlloc | Throw => {}
        }
    }
}

/// A source position attached to an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePoint {
    pub index: u32,
    pub line: u32,
    pub column: u32,
}

/// An editable, label-addressed instruction sequence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstructionList {
    instrs: Vec<Instr>,
    points: Vec<SequencePoint>,
}

impl InstructionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from already label-addressed instructions
    pub fn from_instrs(instrs: Vec<Instr>) -> Self {
        Self {
            instrs,
            points: Vec::new(),
        }
    }

    /// Decode raw code into a list
    pub fn decode(code: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = BytecodeReader::new(code);
        let mut raw: Vec<(usize, Instr, Option<i64>)> = Vec::new();

        while reader.has_more() {
            let offset = reader.position();
            let opcode = reader.read_opcode()?;
            let mut target = None;
            let instr = match opcode {
                Opcode::Nop => Instr::Nop,
                Opcode::Pop => Instr::Pop,
                Opcode::Dup => Instr::Dup,
                Opcode::ConstNull => Instr::ConstNull,
                Opcode::ConstI32 => Instr::ConstI32(reader.read_i32()?),
                Opcode::ConstI64 => Instr::ConstI64(reader.read_i64()?),
                Opcode::ConstF32 => Instr::ConstF32(reader.read_f32()?),
                Opcode::ConstF64 => Instr::ConstF64(reader.read_f64()?),
                Opcode::ConstStr => Instr::ConstStr(reader.read_u32()?),
                Opcode::LoadArg => Instr::LoadArg(reader.read_u16()?),
                Opcode::StoreArg => Instr::StoreArg(reader.read_u16()?),
                Opcode::LoadArgAddr => Instr::LoadArgAddr(reader.read_u16()?),
                Opcode::LoadLocal => Instr::LoadLocal(reader.read_u16()?),
                Opcode::StoreLocal => Instr::StoreLocal(reader.read_u16()?),
                Opcode::LoadLocalAddr => Instr::LoadLocalAddr(reader.read_u16()?),
                Opcode::Add => Instr::Add,
                Opcode::Sub => Instr::Sub,
                Opcode::Mul => Instr::Mul,
                Opcode::ConvI => Instr::ConvI,
                Opcode::ConvI4 => Instr::ConvI4,
                Opcode::Ceq => Instr::Ceq,
                Opcode::Clt => Instr::Clt,
                Opcode::Cgt => Instr::Cgt,
                Opcode::Jmp | Opcode::JmpIfTrue | Opcode::JmpIfFalse => {
                    let relative = reader.read_i32()?;
                    // Relative to the end of the branch instruction
                    target = Some(reader.position() as i64 + relative as i64);
                    let placeholder = Label(0);
                    match opcode {
                        Opcode::Jmp => Instr::Jmp(placeholder),
                        Opcode::JmpIfTrue => Instr::JmpIfTrue(placeholder),
                        _ => Instr::JmpIfFalse(placeholder),
                    }
                }
                Opcode::Call => Instr::Call(reader.read_u32()?),
                Opcode::CallVirt => Instr::CallVirt(reader.read_u32()?),
                Opcode::NewObj => Instr::NewObj(reader.read_u32()?),
                Opcode::Ret => Instr::Ret,
                Opcode::LoadField => Instr::LoadField(reader.read_u32()?),
                Opcode::StoreField => Instr::StoreField(reader.read_u32()?),
                Opcode::LoadFieldAddr => Instr::LoadFieldAddr(reader.read_u32()?),
                Opcode::LoadStatic => Instr::LoadStatic(reader.read_u32()?),
                Opcode::StoreStatic => Instr::StoreStatic(reader.read_u32()?),
                Opcode::CastClass => Instr::CastClass(reader.read_u32()?),
                Opcode::LoadObj => Instr::LoadObj(reader.read_u32()?),
                Opcode::StoreObj => Instr::StoreObj(reader.read_u32()?),
                Opcode::LoadInd | Opcode::StoreInd => {
                    let kind_offset = reader.position();
                    let byte = reader.read_u8()?;
                    let kind = NativeKind::from_u8(byte).ok_or(DecodeError::InvalidTag {
                        kind: "native kind",
                        tag: byte,
                        offset: kind_offset,
                    })?;
                    if opcode == Opcode::LoadInd {
                        Instr::LoadInd(kind)
                    } else {
                        Instr::StoreInd(kind)
                    }
                }
                Opcode::InitBlock => Instr::InitBlock,
                Opcode::LocalAlloc => Instr::LocalAlloc,
                Opcode::Throw => Instr::Throw,
            };
            raw.push((offset, instr, target));
        }

        let index_of: FxHashMap<usize, u32> = raw
            .iter()
            .enumerate()
            .map(|(index, (offset, _, _))| (*offset, index as u32))
            .collect();

        let mut instrs = Vec::with_capacity(raw.len());
        for (offset, mut instr, target) in raw {
            if let Some(target) = target {
                let index = usize::try_from(target)
                    .ok()
                    .and_then(|t| index_of.get(&t).copied())
                    .ok_or(DecodeError::InvalidBranchTarget { offset, target })?;
                if let Some(label) = instr.label_mut() {
                    *label = Label(index);
                }
            }
            instrs.push(instr);
        }

        Ok(Self {
            instrs,
            points: Vec::new(),
        })
    }

    /// Decode a method body, carrying its line table over as sequence points
    pub fn decode_body(body: &MethodBody) -> Result<Self, DecodeError> {
        let mut list = Self::decode(&body.code)?;
        let offsets = list.offsets();
        for entry in &body.line_table {
            if let Ok(index) = offsets.binary_search(&entry.offset) {
                list.points.push(SequencePoint {
                    index: index as u32,
                    line: entry.line,
                    column: entry.column,
                });
            }
        }
        Ok(list)
    }

    /// Byte offset of every instruction
    pub fn offsets(&self) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(self.instrs.len());
        let mut offset = 0u32;
        for instr in &self.instrs {
            offsets.push(offset);
            offset += instr.size() as u32;
        }
        offsets
    }

    /// Encode to raw code, recomputing relative branch offsets
    pub fn encode(&self) -> Vec<u8> {
        let offsets = self.offsets();
        let total: usize = self.instrs.iter().map(Instr::size).sum();
        let mut writer = BytecodeWriter::with_capacity(total);
        for (index, instr) in self.instrs.iter().enumerate() {
            let relative = match instr.label() {
                Some(label) => {
                    let end = offsets[index] as i64 + instr.size() as i64;
                    let target = offsets
                        .get(label.index())
                        .map(|o| *o as i64)
                        .unwrap_or(total as i64);
                    (target - end) as i32
                }
                None => 0,
            };
            instr.encode(&mut writer, relative);
        }
        writer.into_bytes()
    }

    /// Encode into a method body with the given locals
    pub fn encode_body(&self, locals: Vec<TypeSig>) -> MethodBody {
        let offsets = self.offsets();
        let mut line_table: Vec<LineEntry> = self
            .points
            .iter()
            .filter_map(|p| {
                offsets.get(p.index as usize).map(|offset| LineEntry {
                    offset: *offset,
                    line: p.line,
                    column: p.column,
                })
            })
            .collect();
        line_table.sort_by_key(|e| e.offset);
        line_table.dedup_by_key(|e| e.offset);
        MethodBody {
            locals,
            code: self.encode(),
            line_table,
        }
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instr> {
        self.instrs.get(index)
    }

    pub fn as_slice(&self) -> &[Instr] {
        &self.instrs
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instr> {
        self.instrs.iter()
    }

    /// Append an instruction
    pub fn push(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    /// Source position covering an instruction (nearest preceding point)
    pub fn line_at(&self, index: usize) -> Option<(u32, u32)> {
        self.points
            .iter()
            .filter(|p| p.index as usize <= index)
            .max_by_key(|p| p.index)
            .map(|p| (p.line, p.column))
    }

    /// Insert instructions before `index`
    ///
    /// Branches targeting `index` or later keep targeting the same original
    /// instruction.
    pub fn insert(&mut self, index: usize, instrs: Vec<Instr>) {
        let count = instrs.len() as u32;
        if count == 0 {
            return;
        }
        let at = index as u32;
        for instr in &mut self.instrs {
            if let Some(label) = instr.label_mut() {
                if label.0 >= at {
                    label.0 += count;
                }
            }
        }
        for point in &mut self.points {
            if point.index >= at {
                point.index += count;
            }
        }
        self.instrs.splice(index..index, instrs);
    }

    /// Replace the instruction at `index` with a sequence
    ///
    /// Branches to the replaced instruction target the start of the sequence.
    pub fn replace(&mut self, index: usize, instrs: Vec<Instr>) {
        if instrs.is_empty() {
            self.remove(index);
            return;
        }
        let extra = instrs.len() as u32 - 1;
        let at = index as u32;
        for instr in &mut self.instrs {
            if let Some(label) = instr.label_mut() {
                if label.0 > at {
                    label.0 += extra;
                }
            }
        }
        for point in &mut self.points {
            if point.index > at {
                point.index += extra;
            }
        }
        self.instrs.splice(index..=index, instrs);
    }

    /// Remove the instruction at `index`
    ///
    /// Branches to the removed instruction target its successor.
    pub fn remove(&mut self, index: usize) -> Instr {
        let at = index as u32;
        let removed = self.instrs.remove(index);
        for instr in &mut self.instrs {
            if let Some(label) = instr.label_mut() {
                if label.0 > at {
                    label.0 -= 1;
                }
            }
        }
        let len = self.instrs.len() as u32;
        self.points.retain_mut(|point| {
            if point.index > at {
                point.index -= 1;
            }
            point.index < len
        });
        removed
    }

    /// Remove `count` instructions starting at `index`
    pub fn remove_range(&mut self, index: usize, count: usize) -> Vec<Instr> {
        (0..count).map(|_| self.remove(index)).collect()
    }
}

impl<'a> IntoIterator for &'a InstructionList {
    type Item = &'a Instr;
    type IntoIter = std::slice::Iter<'a, Instr>;

    fn into_iter(self) -> Self::IntoIter {
        self.instrs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InstructionList {
        // if (arg1) return 1; return 0;
        InstructionList::from_instrs(vec![
            Instr::LoadArg(1),
            Instr::JmpIfFalse(Label(4)),
            Instr::ConstI32(1),
            Instr::Ret,
            Instr::ConstI32(0),
            Instr::Ret,
        ])
    }

    #[test]
    fn test_encode_decode_branches() {
        let list = sample();
        let code = list.encode();
        // ldarg(3) + jmp.false(5) + const.i32(5) + ret(1) + const.i32(5) + ret(1)
        assert_eq!(code.len(), 20);
        // The branch is relative to its own end (offset 8) and lands on 14
        assert_eq!(i32::from_le_bytes([code[4], code[5], code[6], code[7]]), 6);

        let decoded = InstructionList::decode(&code).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn test_insert_keeps_branch_targets() {
        let mut list = sample();
        list.insert(2, vec![Instr::Nop, Instr::Nop]);
        assert_eq!(list.get(1), Some(&Instr::JmpIfFalse(Label(6))));
        assert_eq!(list.get(6), Some(&Instr::ConstI32(0)));

        list.insert(6, vec![Instr::Nop]);
        assert_eq!(list.get(1), Some(&Instr::JmpIfFalse(Label(7))));
    }

    #[test]
    fn test_remove_retargets_successor() {
        let mut list = sample();
        list.remove(4);
        assert_eq!(list.get(1), Some(&Instr::JmpIfFalse(Label(4))));
        assert_eq!(list.get(4), Some(&Instr::Ret));

        let mut list = sample();
        list.remove(0);
        assert_eq!(list.get(0), Some(&Instr::JmpIfFalse(Label(3))));
    }

    #[test]
    fn test_replace_with_sequence() {
        let mut list = sample();
        list.replace(2, vec![Instr::ConstI32(2), Instr::ConstI32(3), Instr::Add]);
        assert_eq!(list.len(), 8);
        assert_eq!(list.get(1), Some(&Instr::JmpIfFalse(Label(6))));
    }

    #[test]
    fn test_invalid_branch_target() {
        let mut writer = BytecodeWriter::new();
        writer.emit_opcode(Opcode::Jmp);
        writer.emit_i32(2);
        writer.emit_opcode(Opcode::Ret);
        let code = writer.into_bytes();
        let result = InstructionList::decode(&code);
        assert!(matches!(result, Err(DecodeError::InvalidBranchTarget { offset: 0, .. })));
    }

    #[test]
    fn test_sequence_points_follow_edits() {
        let body = MethodBody {
            locals: vec![],
            code: sample().encode(),
            line_table: vec![
                LineEntry { offset: 0, line: 3, column: 1 },
                LineEntry { offset: 14, line: 5, column: 1 },
            ],
        };
        let mut list = InstructionList::decode_body(&body).unwrap();
        assert_eq!(list.line_at(2), Some((3, 1)));
        assert_eq!(list.line_at(5), Some((5, 1)));

        list.insert(0, vec![Instr::Nop]);
        assert_eq!(list.line_at(5), Some((5, 1)));

        let rebuilt = list.encode_body(vec![]);
        assert_eq!(rebuilt.line_table[0].offset, 1);
        assert_eq!(rebuilt.line_table[1].offset, 15);
    }
}
